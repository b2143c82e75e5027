use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

/// Payload captured at schedule time. The title is a snapshot: tasks are
/// immutable after creation, so nothing re-reads the store at fire time.
#[derive(Debug, Clone)]
pub struct Reminder {
    pub task_id: u64,
    pub title: String,
}

/// One-shot deferred notification capability. Reminders are fire-and-forget
/// by default: dropping the handle does not cancel, and nothing survives a
/// process exit. `cancel` exists for consumers that want to opt in; the task
/// flow deliberately does not cancel on completion or deletion.
pub trait Scheduler {
    fn schedule_once(&self, delay: Duration, reminder: Reminder) -> ReminderHandle;
    fn cancel(&self, handle: &ReminderHandle);
}

#[derive(Debug)]
pub struct ReminderHandle {
    cancel_tx: Sender<()>,
}

impl ReminderHandle {
    fn cancel(&self) {
        // An already-fired reminder has dropped its receiver; that send
        // failing is the expected no-op.
        let _ = self.cancel_tx.send(());
    }
}

/// Thread-per-reminder implementation. Each reminder waits on its own cancel
/// channel; a timeout fires the notifier with the captured payload.
pub struct ThreadScheduler {
    notify: Arc<dyn Fn(Reminder) + Send + Sync>,
}

impl std::fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadScheduler").finish_non_exhaustive()
    }
}

impl ThreadScheduler {
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn(Reminder) + Send + Sync + 'static,
    {
        Self {
            notify: Arc::new(notify),
        }
    }
}

impl Scheduler for ThreadScheduler {
    #[instrument(skip(self, reminder), fields(task_id = reminder.task_id))]
    fn schedule_once(&self, delay: Duration, reminder: Reminder) -> ReminderHandle {
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let notify = Arc::clone(&self.notify);

        debug!(delay_secs = delay.as_secs(), "scheduling one-shot reminder");
        thread::spawn(move || {
            let deadline = Instant::now() + delay;
            match cancel_rx.recv_timeout(delay) {
                Ok(()) => {
                    debug!(task_id = reminder.task_id, "reminder cancelled");
                }
                Err(RecvTimeoutError::Timeout) => {
                    notify(reminder);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Handle dropped without cancelling; the reminder still
                    // owes its notification.
                    thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    notify(reminder);
                }
            }
        });

        ReminderHandle { cancel_tx }
    }

    fn cancel(&self, handle: &ReminderHandle) {
        handle.cancel();
    }
}
