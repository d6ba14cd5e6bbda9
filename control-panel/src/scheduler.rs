use std::sync::Arc;
use tokio::{
    sync::Notify,
    time::{Duration, Instant},
};

/// A value that becomes due at a specific `Instant`.
#[derive(Debug)]
pub struct Task<T> {
    /// The time when the task should fire.
    pub instant: Instant,
    pub data: T,
}

impl<T> Task<T> {
    pub fn new(instant: Instant, data: T) -> Self {
        Task { instant, data }
    }

    /// A task due `delay` from now.
    pub fn after(delay: Duration, data: T) -> Self {
        Task::new(Instant::now() + delay, data)
    }
}

/// One-shot timer holding at most one pending task.
///
/// The panel uses it to resolve a connection attempt after the connect delay.
/// Scheduling replaces whatever was pending, and [`cancel`](Scheduler::cancel)
/// drops it, so a disconnect during `Connecting` never fires a stale attempt.
///
/// # Example
///
/// ```
/// use control_panel::scheduler::{Scheduler, Task};
/// use tokio::time::Duration;
///
/// #[tokio::main(flavor = "current_thread", start_paused = true)]
/// async fn main() {
///     let mut scheduler = Scheduler::new();
///     scheduler.schedule(Task::after(Duration::from_millis(1500), "attempt")).unwrap();
///
///     assert_eq!(scheduler.next().await, "attempt");
/// }
/// ```
pub struct Scheduler<T> {
    current: Option<Task<T>>,
    notify: Arc<Notify>,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            current: None,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Schedule `task`, replacing any pending one.
    ///
    /// # Errors
    /// Returns [`SchedulerError::TaskInPast`] if the task is due before `Instant::now()`.
    pub fn schedule(&mut self, task: impl Into<Task<T>>) -> Result<(), SchedulerError> {
        let now = Instant::now();
        let task = task.into();

        if task.instant < now {
            log::warn!("Refusing to schedule a task in the past");
            return Err(SchedulerError::TaskInPast);
        }

        log::debug!(
            "Task due in {:?}",
            task.instant.saturating_duration_since(now)
        );
        self.current = Some(task);
        self.notify.notify_one();

        Ok(())
    }

    /// Drop the pending task, if any. Returns whether something was pending.
    pub fn cancel(&mut self) -> bool {
        let cancelled = self.current.take().is_some();
        if cancelled {
            log::debug!("Pending task cancelled");
        }
        cancelled
    }

    pub fn is_pending(&self) -> bool {
        self.current.is_some()
    }

    /// Wait for the pending task to become due and return its data.
    ///
    /// Suspends until something is scheduled when nothing is pending.
    ///
    /// Cancel-safe: dropping the future before it completes leaves the task
    /// in place for the next call, which is what `tokio::select!` needs.
    pub async fn next(&mut self) -> T {
        loop {
            // Register for notifications before looking, so none is missed.
            let notified = self.notify.notified();

            if let Some(ref task) = self.current {
                tokio::time::sleep_until(task.instant).await;

                // Only mutate once the sleep is over.
                if let Some(task) = self.current.take() {
                    return task.data;
                }
                continue;
            }

            notified.await;
        }
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned when scheduling a task fails.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("task is scheduled in the past")]
    TaskInPast,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new();

        scheduler
            .schedule(Task::after(Duration::from_millis(1500), 7u64))
            .unwrap();

        assert_eq!(scheduler.next().await, 7);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn works_inside_select() {
        use tokio::sync::mpsc;

        let (tx, mut rx) = mpsc::unbounded_channel::<&str>();
        let mut scheduler = Scheduler::new();

        tokio::spawn(async move {
            tx.send("first").unwrap();
            tokio::time::sleep(Duration::from_millis(150)).await;
            tx.send("second").unwrap();
        });

        let mut fired = Vec::new();
        let timeout = tokio::time::sleep(Duration::from_secs(5));
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                Some(name) = rx.recv() => {
                    scheduler.schedule(Task::after(Duration::from_millis(50), name)).unwrap();
                }
                name = scheduler.next() => {
                    fired.push(name);
                    if fired.len() == 2 {
                        break;
                    }
                }
                _ = &mut timeout => panic!("scheduler never fired"),
            }
        }

        assert_eq!(fired, vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_tasks_in_the_past() {
        tokio::time::advance(Duration::from_secs(5)).await;
        let mut scheduler = Scheduler::<()>::new();

        let result = scheduler.schedule(Task::new(Instant::now() - Duration::from_secs(1), ()));

        assert_eq!(result, Err(SchedulerError::TaskInPast));
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_pending_task() {
        let mut scheduler = Scheduler::new();

        scheduler.schedule(Task::after(Duration::from_millis(200), 1)).unwrap();
        scheduler.schedule(Task::after(Duration::from_millis(100), 2)).unwrap();

        assert_eq!(scheduler.next().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_fires() {
        let mut scheduler = Scheduler::new();

        scheduler.schedule(Task::after(Duration::from_millis(100), "stale")).unwrap();
        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());

        let result = tokio::time::timeout(Duration::from_secs(10), scheduler.next()).await;
        assert!(result.is_err());
    }
}
