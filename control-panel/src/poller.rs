use futures::Stream;
use pin_project::pin_project;
use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use telemetry::Uptime;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Drives telemetry polling.
///
/// While running it ticks once right away and then every `period`. Re-arming
/// is fixed-rate without drift correction: a late tick pushes the following
/// ones back instead of bursting to catch up. While stopped, [`tick`](Poller::tick)
/// never completes.
#[derive(Debug, Default)]
pub struct Poller {
    interval: Option<Interval>,
}

impl Poller {
    pub fn new() -> Self {
        Self { interval: None }
    }

    pub fn start(&mut self, period: Duration) {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::debug!("Polling telemetry every {:?}", period);
        self.interval = Some(interval);
    }

    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            log::debug!("Telemetry polling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next poll. Cancel-safe.
    pub async fn tick(&mut self) -> Instant {
        match self.interval.as_mut() {
            Some(interval) => interval.tick().await,
            None => std::future::pending().await,
        }
    }
}

/// A never-ending stream of uptime values, one per second.
///
/// The first value (`0h 0m 1s`) is yielded one second after creation. Missed
/// ticks are delivered in a burst, so the count always matches the elapsed
/// whole seconds even if the consumer was busy.
#[pin_project]
pub struct UptimeTicks {
    #[pin]
    interval: Interval,
    uptime: Uptime,
}

impl UptimeTicks {
    pub fn new() -> Self {
        let period = Duration::from_secs(1);
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

        Self {
            interval,
            uptime: Uptime::default(),
        }
    }

    pub fn uptime(&self) -> Uptime {
        self.uptime
    }
}

impl Default for UptimeTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream for UptimeTicks {
    type Item = Uptime;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.interval.get_mut().poll_tick(cx) {
            Poll::Ready(_) => {
                this.uptime.tick();
                Poll::Ready(Some(*this.uptime))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn first_poll_is_immediate_then_periodic() {
        let start = Instant::now();
        let mut poller = Poller::new();
        poller.start(Duration::from_secs(2));

        let mut ticks = vec![];
        for _ in 0..4 {
            ticks.push(poller.tick().await - start);
        }

        assert_eq!(
            ticks,
            vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(6),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_poller_never_ticks() {
        let mut poller = Poller::new();
        assert!(!poller.is_running());

        poller.start(Duration::from_millis(100));
        poller.tick().await;
        poller.stop();
        assert!(!poller.is_running());

        let result = time::timeout(Duration::from_secs(60), poller.tick()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn late_poll_pushes_schedule_back() {
        let start = Instant::now();
        let mut poller = Poller::new();
        poller.start(Duration::from_secs(2));
        poller.tick().await;

        // Miss the 2s tick by a second.
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(poller.tick().await - start, Duration::from_secs(2));
        assert_eq!(poller.tick().await - start, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn uptime_counts_seconds() {
        let start = Instant::now();
        let mut ticks = UptimeTicks::new();

        for expected in 1..=5u64 {
            let uptime = ticks.next().await.unwrap();

            assert_eq!(uptime.as_secs(), expected);
            assert_eq!(start.elapsed(), Duration::from_secs(expected));
        }
        assert_eq!(ticks.uptime(), Uptime::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn uptime_catches_up_after_a_stall() {
        let start = Instant::now();
        let mut ticks = UptimeTicks::new();

        time::sleep(Duration::from_millis(3500)).await;

        let mut burst = vec![];
        for _ in 0..3 {
            burst.push(ticks.next().await.unwrap().as_secs());
        }

        assert_eq!(burst, vec![1, 2, 3]);
        assert_eq!(start.elapsed(), Duration::from_millis(3500));
    }
}
