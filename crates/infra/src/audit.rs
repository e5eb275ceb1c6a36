use parking_lot::Mutex;
use tracing::info;

use warden_auth::{AuditLog, AuthEvent};

/// Emits each event as a structured `info` record on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, event: AuthEvent) {
        info!(
            target: "audit",
            event_type = event.event_type(),
            user_id = %event.user_id(),
            "auth event"
        );
    }
}

/// Keeps every event in memory, in order. For tests.
#[derive(Debug, Default)]
pub struct RecordingAuditLog {
    events: Mutex<Vec<AuthEvent>>,
}

impl RecordingAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: AuthEvent) -> usize {
        self.events.lock().iter().filter(|e| **e == event).count()
    }
}

impl AuditLog for RecordingAuditLog {
    fn record(&self, event: AuthEvent) {
        self.events.lock().push(event);
    }
}
