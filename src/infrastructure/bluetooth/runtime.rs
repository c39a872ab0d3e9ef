//! Tokio glue for running a session
//!
//! The transport and the scan timer post [`TransportEvent`]s into one
//! unbounded channel. [`SessionDriver`] drains that channel into the manager,
//! which gives the serial delivery `handle_event` relies on.

use crate::infrastructure::bluetooth::scanner::{ScanGate, ScanOutcome, ScanTimer};
use crate::infrastructure::bluetooth::service::EsenseManager;
use crate::infrastructure::bluetooth::transport::{Transport, TransportEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Scan timer backed by a tokio task. Must be armed from within a runtime.
pub struct TokioScanTimer {
    event_sender: mpsc::UnboundedSender<TransportEvent>,
    task: Option<JoinHandle<()>>,
}

impl TokioScanTimer {
    pub fn new(event_sender: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            event_sender,
            task: None,
        }
    }
}

impl ScanTimer for TokioScanTimer {
    fn arm(&mut self, timeout: Duration, gate: Arc<ScanGate>) {
        self.cancel();
        let sender = self.event_sender.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if gate.claim(ScanOutcome::TimedOut) {
                let _ = sender.send(TransportEvent::ScanTimedOut {
                    generation: gate.generation(),
                });
            } else {
                debug!("Scan timer fired after the device was found");
            }
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TokioScanTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Feeds queued transport events into a session, one at a time
pub struct SessionDriver<T: Transport> {
    manager: EsenseManager<T>,
    event_receiver: mpsc::UnboundedReceiver<TransportEvent>,
}

impl<T: Transport> SessionDriver<T> {
    pub fn new(manager: EsenseManager<T>, event_receiver: mpsc::UnboundedReceiver<TransportEvent>) -> Self {
        Self {
            manager,
            event_receiver,
        }
    }

    pub fn manager(&self) -> &EsenseManager<T> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut EsenseManager<T> {
        &mut self.manager
    }

    pub fn into_manager(self) -> EsenseManager<T> {
        self.manager
    }

    /// Handle every event already queued without waiting. Returns how many.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.event_receiver.try_recv() {
            self.manager.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for and handle one event. Returns `false` once every sender is gone.
    pub async fn next_event(&mut self) -> bool {
        match self.event_receiver.recv().await {
            Some(event) => {
                self.manager.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Handle events until `done` holds for the manager
    ///
    /// Returns `false` if the channel closed first.
    pub async fn run_until<F>(&mut self, mut done: F) -> bool
    where
        F: FnMut(&EsenseManager<T>) -> bool,
    {
        while !done(&self.manager) {
            if !self.next_event().await {
                return false;
            }
        }
        true
    }
}
