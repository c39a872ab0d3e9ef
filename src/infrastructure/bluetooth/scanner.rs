//! Scan Timeout Module
//!
//! A scan ends either because the target advertisement was seen or because
//! the timeout elapsed. Both paths claim the same [`ScanGate`]; only the
//! first claim succeeds, so the two outcomes are mutually exclusive even when
//! the timer runs on another thread.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

const ARMED: u8 = 0;
const FOUND: u8 = 1;
const TIMED_OUT: u8 = 2;

/// How a scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Found,
    TimedOut,
}

impl ScanOutcome {
    fn as_flag(self) -> u8 {
        match self {
            ScanOutcome::Found => FOUND,
            ScanOutcome::TimedOut => TIMED_OUT,
        }
    }
}

/// Single-claim token shared by one scan and its timer
#[derive(Debug)]
pub struct ScanGate {
    generation: u64,
    state: AtomicU8,
}

impl ScanGate {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            state: AtomicU8::new(ARMED),
        }
    }

    /// Identifies the scan this gate belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Try to resolve the scan. Returns `true` for exactly one caller.
    pub fn claim(&self, outcome: ScanOutcome) -> bool {
        self.state
            .compare_exchange(ARMED, outcome.as_flag(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn outcome(&self) -> Option<ScanOutcome> {
        match self.state.load(Ordering::Acquire) {
            FOUND => Some(ScanOutcome::Found),
            TIMED_OUT => Some(ScanOutcome::TimedOut),
            _ => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.state.load(Ordering::Acquire) == ARMED
    }
}

/// One-shot timer bounding a scan
///
/// When the timeout elapses the timer claims the gate with
/// [`ScanOutcome::TimedOut`] and, only if that claim wins, posts
/// `TransportEvent::ScanTimedOut` carrying the gate's generation.
pub trait ScanTimer: Send {
    fn arm(&mut self, timeout: Duration, gate: Arc<ScanGate>);

    /// Stop a pending timer. Does nothing when no timer is pending.
    fn cancel(&mut self);
}
