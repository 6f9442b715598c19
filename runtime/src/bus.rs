//! Message Bus
//!
//! A topic-indexed publish/subscribe primitive. Delivery is local,
//! best-effort, and non-blocking for the publisher: `publish` never awaits
//! a slow subscriber. Each subscriber gets its own mailbox per topic, so one
//! slow consumer cannot starve another.
//!
//! `student_response` and `coordinator_directive` are *critical* topics:
//! their mailboxes are unbounded and messages are never dropped. Every other
//! topic gets a bounded mailbox that drops the oldest queued message when
//! full, trading history for responsiveness.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::message::BusMessage;

/// Bus topics used throughout the interview coordination core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Events,
    Tick,
    StudentResponse,
    QuestionAsked,
    TopicCompleted,
    AgentObservation,
    CoordinatorDirective,
}

impl Topic {
    /// `student_response` and `coordinator_directive` must never be dropped.
    fn is_critical(self) -> bool {
        matches!(self, Topic::StudentResponse | Topic::CoordinatorDirective)
    }

    pub fn name(self) -> &'static str {
        match self {
            Topic::Events => "interview:events",
            Topic::Tick => "interview:tick",
            Topic::StudentResponse => "interview:student_response",
            Topic::QuestionAsked => "interview:question_asked",
            Topic::TopicCompleted => "interview:topic_completed",
            Topic::AgentObservation => "interview:agent_observation",
            Topic::CoordinatorDirective => "interview:coordinator_directive",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

const NON_CRITICAL_MAILBOX_CAPACITY: usize = 64;

/// A single subscriber's inbox for one topic.
enum Mailbox {
    /// Unbounded, used for critical topics. Never drops.
    Unbounded(mpsc::UnboundedSender<BusMessage>),
    /// Bounded ring buffer with drop-oldest-on-full semantics, paired with a
    /// `Notify` so the receiving task can wake up without polling.
    Bounded {
        queue: Arc<Mutex<std::collections::VecDeque<BusMessage>>>,
        notify: Arc<Notify>,
        capacity: usize,
    },
}

/// Receiving half handed back to a subscriber by `MessageBus::subscribe`.
pub enum Subscription {
    Unbounded(mpsc::UnboundedReceiver<BusMessage>),
    Bounded {
        queue: Arc<Mutex<std::collections::VecDeque<BusMessage>>>,
        notify: Arc<Notify>,
    },
}

impl Subscription {
    /// Await the next message for this subscriber.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        match self {
            Subscription::Unbounded(rx) => rx.recv().await,
            Subscription::Bounded { queue, notify } => loop {
                if let Some(msg) = queue.lock().pop_front() {
                    return Some(msg);
                }
                notify.notified().await;
            },
        }
    }
}

struct Subscriber {
    name: String,
    mailbox: Mailbox,
}

/// Topic-indexed broadcast bus. Cheaply cloneable; all clones share the
/// same subscriber tables. The table itself is a `DashMap` so subscribing
/// to one topic never contends with a publish on another.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<DashMap<Topic, Vec<Subscriber>>>,
    sequence: Arc<AtomicU64>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Monotonic counter publishers can use to tag messages (e.g. student
    /// response sequence numbers) without sharing mutable state directly.
    pub fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Register `name` as a subscriber of `topic`, returning the receiving
    /// half of its mailbox.
    pub fn subscribe(&self, topic: Topic, name: impl Into<String>) -> Subscription {
        let name = name.into();
        let (subscriber, subscription) = if topic.is_critical() {
            let (tx, rx) = mpsc::unbounded_channel();
            (Mailbox::Unbounded(tx), Subscription::Unbounded(rx))
        } else {
            let queue = Arc::new(Mutex::new(std::collections::VecDeque::with_capacity(
                NON_CRITICAL_MAILBOX_CAPACITY,
            )));
            let notify = Arc::new(Notify::new());
            (
                Mailbox::Bounded {
                    queue: queue.clone(),
                    notify: notify.clone(),
                    capacity: NON_CRITICAL_MAILBOX_CAPACITY,
                },
                Subscription::Bounded { queue, notify },
            )
        };

        debug!(topic = %topic, subscriber = %name, "subscribed");
        self.inner.entry(topic).or_default().push(Subscriber { name, mailbox: subscriber });
        subscription
    }

    /// Deliver `msg` to every current subscriber of `topic`. Never blocks
    /// and never fails for the publisher; a full non-critical mailbox drops
    /// its oldest entry and a closed mailbox is logged and skipped.
    pub fn publish(&self, topic: Topic, msg: BusMessage) {
        let mut dead = Vec::new();
        if let Some(subscribers) = self.inner.get(&topic) {
            for (idx, sub) in subscribers.iter().enumerate() {
                match &sub.mailbox {
                    Mailbox::Unbounded(tx) => {
                        if tx.send(msg.clone()).is_err() {
                            dead.push(idx);
                        }
                    }
                    Mailbox::Bounded { queue, notify, capacity } => {
                        let mut q = queue.lock();
                        if q.len() >= *capacity {
                            q.pop_front();
                            warn!(topic = %topic, subscriber = %sub.name, "mailbox full, dropped oldest message");
                        }
                        q.push_back(msg.clone());
                        drop(q);
                        notify.notify_one();
                    }
                }
            }
        } else {
            debug!(topic = %topic, "publish with no subscribers");
        }

        if !dead.is_empty() {
            // Closed mailboxes are pruned lazily on the next publish so a
            // crashed subscriber doesn't leak forever; this is best-effort
            // bookkeeping, not a correctness requirement.
            if let Some(mut subscribers) = self.inner.get_mut(&topic) {
                for idx in dead.into_iter().rev() {
                    if idx < subscribers.len() {
                        let removed = subscribers.remove(idx);
                        warn!(topic = %topic, subscriber = %removed.name, "subscriber mailbox closed, removed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::InterviewEvent;

    #[tokio::test]
    async fn delivers_to_all_subscribers() {
        let bus = MessageBus::new();
        let mut a = bus.subscribe(Topic::Events, "a");
        let mut b = bus.subscribe(Topic::Events, "b");

        bus.publish(Topic::Events, BusMessage::Event(InterviewEvent::Finished));

        assert!(matches!(a.recv().await, Some(BusMessage::Event(InterviewEvent::Finished))));
        assert!(matches!(b.recv().await, Some(BusMessage::Event(InterviewEvent::Finished))));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = MessageBus::new();
        bus.publish(Topic::Tick, BusMessage::Tick { ts: chrono::Utc::now() });
    }

    #[tokio::test]
    async fn bounded_mailbox_drops_oldest_when_full() {
        let bus = MessageBus::new();
        let mut sub = bus.subscribe(Topic::Tick, "slow");

        for _ in 0..(NON_CRITICAL_MAILBOX_CAPACITY + 5) {
            bus.publish(Topic::Tick, BusMessage::Tick { ts: chrono::Utc::now() });
        }

        let mut received = 0;
        while let Ok(Some(_)) = tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await {
            received += 1;
        }
        assert_eq!(received, NON_CRITICAL_MAILBOX_CAPACITY);
    }

    #[tokio::test]
    async fn critical_topic_never_drops() {
        let bus = MessageBus::new();
        let mut sub = bus.subscribe(Topic::StudentResponse, "coordinator");

        for i in 0..(NON_CRITICAL_MAILBOX_CAPACITY * 3) {
            bus.publish(
                Topic::StudentResponse,
                BusMessage::StudentResponse(crate::message::StudentResponseMsg {
                    topic: crate::content::TopicId::Theme,
                    text: format!("resp {i}"),
                    ts: chrono::Utc::now(),
                    seq: i as u64,
                }),
            );
        }

        let mut received = 0;
        while let Ok(Some(_)) = tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await {
            received += 1;
        }
        assert_eq!(received, NON_CRITICAL_MAILBOX_CAPACITY * 3);
    }
}
