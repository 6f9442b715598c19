//! Ticker
//!
//! Publishes a `tick` every `period` while an interview is in progress.
//! Idempotent start/stop: ticking only while `interview:events` says we are
//! between a `Started` and the next `Finished`/`Reset`.

use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

use crate::bus::{MessageBus, Topic};
use crate::message::{BusMessage, InterviewEvent};

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(10);

/// Runs for the lifetime of the process; reacts to start/stop events rather
/// than being driven directly, so any number of components can start or
/// stop the interview without reaching into the Ticker.
pub struct Ticker {
    bus: MessageBus,
    period: Duration,
}

impl Ticker {
    pub fn new(bus: MessageBus, period: Duration) -> Self {
        Self { bus, period }
    }

    /// Spawn the ticking task. Returns a handle whose drop has no special
    /// effect; shutdown happens through `interview:events`, not by dropping
    /// this handle (matching the Supervisor's uniform restart story).
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let mut events = self.bus.subscribe(Topic::Events, "ticker");
        let active = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let wake = std::sync::Arc::new(Notify::new());

        let tick_bus = self.bus.clone();
        let tick_active = active.clone();
        let tick_wake = wake.clone();
        let period = self.period;
        let ticking = tokio::spawn(async move {
            loop {
                tick_wake.notified().await;
                while tick_active.load(std::sync::atomic::Ordering::Acquire) {
                    tokio::time::sleep(period).await;
                    if !tick_active.load(std::sync::atomic::Ordering::Acquire) {
                        break;
                    }
                    tick_bus.publish(Topic::Tick, BusMessage::Tick { ts: chrono::Utc::now() });
                }
            }
        });

        while let Some(msg) = events.recv().await {
            match msg {
                BusMessage::Event(InterviewEvent::Started(_)) => {
                    debug!("ticker: starting");
                    active.store(true, std::sync::atomic::Ordering::Release);
                    wake.notify_one();
                }
                BusMessage::Event(InterviewEvent::Finished) | BusMessage::Event(InterviewEvent::Reset) => {
                    debug!("ticker: stopping");
                    active.store(false, std::sync::atomic::Ordering::Release);
                }
                _ => {}
            }
        }
        ticking.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn ticks_only_while_in_progress() {
        let bus = MessageBus::new();
        let mut ticks = bus.subscribe(Topic::Tick, "test");
        let ticker = Ticker::new(bus.clone(), StdDuration::from_millis(20));
        let _handle = ticker.spawn();

        bus.publish(
            Topic::Events,
            BusMessage::Event(InterviewEvent::Started(crate::state::InterviewSnapshot::fresh())),
        );

        let first = tokio::time::timeout(StdDuration::from_millis(200), ticks.recv()).await;
        assert!(first.is_ok());

        bus.publish(Topic::Events, BusMessage::Event(InterviewEvent::Finished));
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        // Drain anything already in flight, then make sure nothing new
        // shows up after a further wait.
        while tokio::time::timeout(StdDuration::from_millis(10), ticks.recv()).await.is_ok() {}
        let after_stop = tokio::time::timeout(StdDuration::from_millis(80), ticks.recv()).await;
        assert!(after_stop.is_err());
    }
}
