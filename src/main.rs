use anyhow::{bail, Context};
use esense::domain::settings::SettingsService;
use esense::infrastructure::bluetooth::BtleplugTransport;
use esense::infrastructure::logging::init_logger;
use esense::{
    AccelerometerOffset, ConnectionIntervals, ConnectionListener, EsenseManager, EventListener,
    SensorConfig, SensorListener, SensorSample, SessionDriver, SessionState, TokioScanTimer,
    Transport,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

struct ConsoleConnectionListener;

impl ConnectionListener for ConsoleConnectionListener {
    fn on_device_found(&mut self) {
        info!("Device found, connecting...");
    }

    fn on_device_not_found(&mut self) {
        warn!("Device not found");
    }

    fn on_connected(&mut self) {
        info!("Connected, discovering services...");
    }

    fn on_disconnected(&mut self) {
        info!("Disconnected");
    }
}

struct ConsoleEventListener;

impl EventListener for ConsoleEventListener {
    fn on_battery_read(&mut self, voltage: f64) {
        info!("Battery: {:.3} V", voltage);
    }

    fn on_button_event_changed(&mut self, pressed: bool) {
        info!("Button {}", if pressed { "pressed" } else { "released" });
    }

    fn on_advertisement_and_connection_interval_read(&mut self, intervals: ConnectionIntervals) {
        info!("Intervals: {}", intervals);
    }

    fn on_device_name_read(&mut self, name: &str) {
        info!("Device name: {}", name);
    }

    fn on_sensor_config_read(&mut self, config: SensorConfig) {
        info!("Sensor config: {}", config);
    }

    fn on_accelerometer_offset_read(&mut self, offset: AccelerometerOffset) {
        let [x, y, z] = offset.as_g();
        info!("Accelerometer offset: x={:.4}g y={:.4}g z={:.4}g", x, y, z);
    }
}

struct ConsoleSensorListener {
    config: SensorConfig,
}

impl SensorListener for ConsoleSensorListener {
    fn on_sensor_changed(&mut self, sample: SensorSample) {
        let [ax, ay, az] = sample.convert_acc_to_g(&self.config);
        let [gx, gy, gz] = sample.convert_gyro_to_deg_per_second(&self.config);
        info!(
            "#{} acc=({:+.3}, {:+.3}, {:+.3})g gyro=({:+.2}, {:+.2}, {:+.2})deg/s",
            sample.packet_index, ax, ay, az, gx, gy, gz
        );
    }
}

/// Apply the configured sensor settings, start streaming and read the device state once
fn set_up_device<T: Transport>(
    manager: &mut EsenseManager<T>,
    sensor_config: SensorConfig,
    sampling_rate_hz: u8,
) -> esense::Result<()> {
    manager.set_sensor_config(&sensor_config)?;
    manager.register_event_listener(Box::new(ConsoleEventListener))?;
    manager.register_sensor_listener(
        Box::new(ConsoleSensorListener {
            config: sensor_config,
        }),
        sampling_rate_hz,
    )?;
    manager.get_device_name()?;
    manager.get_battery_voltage()?;
    manager.get_sensor_config()?;
    manager.get_accelerometer_offset()?;
    manager.get_advertisement_and_connection_interval()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let mut settings = settings_service.get().clone();
    // A name on the command line applies to this run only.
    if let Some(name) = std::env::args().nth(1) {
        settings.device_name = name;
    }
    let _logging_guard = init_logger(&settings.log_settings)?;
    info!("Settings loaded from {}", settings_service.path().display());

    let (event_sender, event_receiver) = mpsc::unbounded_channel();
    let transport = BtleplugTransport::new(event_sender.clone()).await?;
    let timer = TokioScanTimer::new(event_sender);

    let mut manager = EsenseManager::new(settings.device_name.clone(), transport, Box::new(timer));
    manager.set_connection_listener(Box::new(ConsoleConnectionListener));

    let sensor_config = settings.sensor_config;
    let sampling_rate_hz = settings.sampling_rate_hz;
    manager.set_device_ready_handler(Box::new(move |manager: &mut EsenseManager<BtleplugTransport>| {
        if let Err(e) = set_up_device(manager, sensor_config, sampling_rate_hz) {
            warn!("Device setup failed: {}", e);
        }
    }));

    manager.connect(settings.scan_timeout())?;
    let mut driver = SessionDriver::new(manager, event_receiver);

    let settled = driver
        .run_until(|m| matches!(m.state(), SessionState::Ready | SessionState::Idle))
        .await;
    if !settled || driver.manager().state() != SessionState::Ready {
        bail!("Could not connect to {}", settings.device_name);
    }

    info!("Streaming, press Ctrl-C to stop");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            alive = driver.next_event() => {
                if !alive || driver.manager().state() == SessionState::Disconnected {
                    warn!("Connection lost");
                    return Ok(());
                }
            }
        }
    }

    let manager = driver.manager_mut();
    if let Err(e) = manager.unregister_sensor_listener() {
        warn!("Failed to stop sampling: {}", e);
    }
    manager.disconnect()?;
    let _ = tokio::time::timeout(
        Duration::from_secs(5),
        driver.run_until(|m| m.state() == SessionState::Disconnected),
    )
    .await;
    Ok(())
}
