use promwatch::models::AlertEvent;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct Pending {
    alerts: Vec<AlertEvent>,
    flush_scheduled: bool,
}

/// Collects alerts for one aggregation window. The first push of a window
/// asks the caller to schedule a flush; later pushes just append.
#[derive(Debug)]
pub struct AlertBatch {
    window: Duration,
    pending: Mutex<Pending>,
}

impl AlertBatch {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(Pending::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` when the caller must schedule a flush after `window`.
    pub fn push(&self, alerts: Vec<AlertEvent>) -> bool {
        let mut pending = self.lock();
        pending.alerts.extend(alerts);

        if pending.flush_scheduled || pending.alerts.is_empty() {
            false
        } else {
            pending.flush_scheduled = true;
            true
        }
    }

    /// Takes everything collected so far and opens a new window.
    pub fn drain(&self) -> Vec<AlertEvent> {
        let mut pending = self.lock();
        pending.flush_scheduled = false;
        std::mem::take(&mut pending.alerts)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().alerts.len()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Alert batch mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
