//! Timekeeper agent
//!
//! Pure, deterministic computation of elapsed/remaining time and pace
//! pressure. Stateful only in the sense of tracking `started_at` and the
//! topic count it has observed go by on the bus; the actual pressure
//! function is a pure, total function of its inputs, exercised directly in
//! tests below.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::bus::{MessageBus, Topic};
use crate::message::{
    AgentKind, AgentObservationMsg, BusMessage, InterviewEvent, ObservationPayload, Pressure,
    TimeRecommendation, TimekeeperObservation,
};

const TOPICS_TOTAL: u32 = 5;

/// Pure computation: given how much time has elapsed and how many topics
/// remain, produce the full observation. Total over its domain — every
/// input combination yields exactly one of the four pressure levels.
pub fn evaluate(elapsed_secs: f64, topics_completed: u32, total_seconds: u64) -> TimekeeperObservation {
    let topics_left = TOPICS_TOTAL.saturating_sub(topics_completed);
    let remaining_secs = (total_seconds as f64 - elapsed_secs).max(0.0);
    let pace_secs = if topics_left > 0 { remaining_secs / topics_left as f64 } else { 0.0 };

    let pressure = if topics_left == 0 {
        Pressure::Low
    } else if remaining_secs <= 30.0 {
        Pressure::Critical
    } else if remaining_secs <= 90.0 {
        Pressure::High
    } else if pace_secs < 55.0 {
        Pressure::High
    } else if pace_secs < 65.0 {
        Pressure::Medium
    } else {
        Pressure::Low
    };

    let recommendation = match pressure {
        Pressure::Critical => TimeRecommendation::WrapUp,
        Pressure::High => TimeRecommendation::Accelerate,
        Pressure::Medium | Pressure::Low => TimeRecommendation::OnPace,
    };

    TimekeeperObservation {
        elapsed_secs,
        remaining_secs,
        topics_left,
        pace_secs,
        pressure,
        recommendation,
    }
}

pub struct Timekeeper {
    bus: MessageBus,
    total_seconds: u64,
}

impl Timekeeper {
    pub fn new(bus: MessageBus, total_seconds: u64) -> Self {
        Self { bus, total_seconds }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let mut events = self.bus.subscribe(Topic::Events, "timekeeper:events");
        let mut ticks = self.bus.subscribe(Topic::Tick, "timekeeper:tick");
        let mut topic_completed = self.bus.subscribe(Topic::TopicCompleted, "timekeeper:topic_completed");
        let mut responses = self.bus.subscribe(Topic::StudentResponse, "timekeeper:student_response");

        let mut started_at: Option<DateTime<Utc>> = None;
        let mut topics_completed: u32 = 0;

        loop {
            tokio::select! {
                Some(msg) = events.recv() => {
                    match msg {
                        BusMessage::Event(InterviewEvent::Started(snapshot)) => {
                            started_at = snapshot.started_at;
                            topics_completed = snapshot.topics_completed;
                        }
                        BusMessage::Event(InterviewEvent::Finished) | BusMessage::Event(InterviewEvent::Reset) => {
                            started_at = None;
                            topics_completed = 0;
                        }
                        _ => {}
                    }
                }
                Some(msg) = topic_completed.recv() => {
                    if let BusMessage::TopicCompleted(m) = msg {
                        topics_completed = m.topics_completed;
                    }
                }
                Some(msg) = ticks.recv() => {
                    if let BusMessage::Tick { ts } = msg {
                        self.publish_observation(started_at, topics_completed, ts);
                    }
                }
                Some(msg) = responses.recv() => {
                    if let BusMessage::StudentResponse(m) = msg {
                        self.publish_observation(started_at, topics_completed, m.ts);
                    }
                }
                else => break,
            }
        }
    }

    fn publish_observation(&self, started_at: Option<DateTime<Utc>>, topics_completed: u32, ts: DateTime<Utc>) {
        let Some(started_at) = started_at else {
            debug!("timekeeper: no active interview, skipping observation");
            return;
        };
        let elapsed_secs = (ts - started_at).num_milliseconds().max(0) as f64 / 1000.0;
        let observation = evaluate(elapsed_secs, topics_completed, self.total_seconds);
        self.bus.publish(
            Topic::AgentObservation,
            BusMessage::AgentObservation(AgentObservationMsg {
                agent: AgentKind::Timekeeper,
                timestamp: ts,
                observation: ObservationPayload::Timekeeper(observation),
            }),
        );
    }
}
