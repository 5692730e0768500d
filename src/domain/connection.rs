use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Connection status of the billing service, shared between the worker that
/// updates it and the host thread that reads it.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    connected: Arc<AtomicBool>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Records the new status and returns the previous one.
    pub fn set(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::AcqRel)
    }
}
