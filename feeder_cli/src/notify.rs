//! Event forwarding for the CLI: notable events go to the log at a level
//! that matches their severity.

use feeder_core::{FeederEvent, Notifier};

#[derive(Debug, Default)]
pub struct LogNotifier {
    pub sent: usize,
}

impl Notifier for LogNotifier {
    fn notify(&mut self, event: &FeederEvent) {
        match event {
            FeederEvent::AlarmRaised { .. } => tracing::error!(event = %event, "notify"),
            FeederEvent::WarningRaised { .. } | FeederEvent::FillPaused { .. } => {
                tracing::warn!(event = %event, "notify")
            }
            e if e.is_notable() => tracing::info!(event = %event, "notify"),
            _ => {
                tracing::debug!(event = %event, "event");
                return;
            }
        }
        self.sent += 1;
    }
}
