// Single-slot auto-pick timer.
//
// At most one timer is live at a time. Arming always cancels the previous
// timer first. A fired timer does not touch draft state itself: it sends an
// `AutoPickDue` back to the task that owns the engine, which then runs the
// pick through the normal transaction path.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default grace period before an auto-pick is forced.
pub const DEFAULT_AUTO_PICK_DELAY: Duration = Duration::from_millis(2000);

/// Notification that an armed timer elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoPickDue {
    /// Generation of the arm that produced this notification.
    pub generation: u64,
}

pub struct AutoPickScheduler {
    delay: Duration,
    tx: mpsc::Sender<AutoPickDue>,
    pending: Option<JoinHandle<()>>,
    /// Incremented on every arm. A due notification is honored only if it
    /// carries the current generation and the slot is still armed, so a
    /// timer that fired just before being cancelled is ignored.
    ///
    /// u64 overflow is not a practical concern.
    generation: u64,
}

impl AutoPickScheduler {
    pub fn new(delay: Duration, tx: mpsc::Sender<AutoPickDue>) -> Self {
        AutoPickScheduler {
            delay,
            tx,
            pending: None,
            generation: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm the timer for the current turn, replacing any armed timer.
    /// Must be called from within a tokio runtime.
    pub fn arm(&mut self) {
        self.cancel();
        self.generation += 1;

        let generation = self.generation;
        let delay = self.delay;
        let deadline = tokio::time::Instant::now() + delay;
        let tx = self.tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // Receiver gone means the app loop is shutting down.
            let _ = tx.send(AutoPickDue { generation }).await;
        }));
        debug!("Auto-pick armed (generation {}, delay {:?})", generation, delay);
    }

    /// Disarm the timer. No-op when nothing is armed.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
            debug!("Auto-pick timer cancelled (generation {})", self.generation);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Consume a due notification. Returns true, and disarms the slot, only
    /// when `due` belongs to the live timer.
    pub fn accept(&mut self, due: AutoPickDue) -> bool {
        if due.generation != self.generation || self.pending.is_none() {
            debug!(
                "Discarding stale auto-pick (due gen: {}, current gen: {})",
                due.generation, self.generation
            );
            return false;
        }
        self.pending = None;
        true
    }
}

impl Drop for AutoPickScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
