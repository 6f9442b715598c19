//! Grader agent
//!
//! Pure aggregation of DepthExpert ratings into a running letter grade.
//! Keeps at most one score per topic — the most recent DepthExpert rating
//! for that topic always wins.

use std::collections::HashMap;

use tracing::debug;

use crate::bus::{MessageBus, Topic};
use crate::content::TopicId;
use crate::message::{AgentKind, AgentObservationMsg, BusMessage, GraderObservation, ObservationPayload};

/// Pure letter-grade lookup, closed on the lower bound of each band.
pub fn letter_grade(average: f64) -> &'static str {
    if average >= 2.7 {
        "A"
    } else if average >= 2.3 {
        "B+"
    } else if average >= 2.0 {
        "B"
    } else if average >= 1.7 {
        "C+"
    } else if average >= 1.3 {
        "C"
    } else if average >= 1.0 {
        "D"
    } else {
        "F"
    }
}

/// Pure aggregation: scores recorded so far -> the observation payload.
pub fn summarize(scores: &HashMap<TopicId, u8>) -> GraderObservation {
    let coverage_gaps: Vec<TopicId> = TopicId::ORDER
        .into_iter()
        .filter(|t| !scores.contains_key(t))
        .collect();

    if scores.is_empty() {
        return GraderObservation {
            running_grade: "N/A".to_string(),
            numeric_average: None,
            topics_scored: 0,
            coverage_gaps,
        };
    }

    let sum: u32 = scores.values().map(|&r| r as u32).sum();
    let average = sum as f64 / scores.len() as f64;
    GraderObservation {
        running_grade: letter_grade(average).to_string(),
        numeric_average: Some(average),
        topics_scored: scores.len() as u32,
        coverage_gaps,
    }
}

pub struct Grader {
    bus: MessageBus,
}

impl Grader {
    pub fn new(bus: MessageBus) -> Self {
        Self { bus }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let mut observations = self.bus.subscribe(Topic::AgentObservation, "grader:agent_observation");
        let mut topic_completed = self.bus.subscribe(Topic::TopicCompleted, "grader:topic_completed");
        let mut events = self.bus.subscribe(crate::bus::Topic::Events, "grader:events");

        let mut scores: HashMap<TopicId, u8> = HashMap::new();

        loop {
            tokio::select! {
                Some(msg) = observations.recv() => {
                    if let BusMessage::AgentObservation(AgentObservationMsg {
                        agent: AgentKind::DepthExpert,
                        observation: ObservationPayload::DepthExpert(depth),
                        timestamp,
                    }) = msg
                    {
                        scores.insert(depth.topic, depth.rating);
                        debug!(topic = %depth.topic, rating = depth.rating, "grader: score updated");
                        self.publish(timestamp, &scores);
                    }
                }
                Some(msg) = topic_completed.recv() => {
                    if let BusMessage::TopicCompleted(_) = msg {
                        self.publish(chrono::Utc::now(), &scores);
                    }
                }
                Some(msg) = events.recv() => {
                    match msg {
                        BusMessage::Event(crate::message::InterviewEvent::Reset)
                        | BusMessage::Event(crate::message::InterviewEvent::Started(_)) => {
                            scores.clear();
                        }
                        _ => {}
                    }
                }
                else => break,
            }
        }
    }

    fn publish(&self, ts: chrono::DateTime<chrono::Utc>, scores: &HashMap<TopicId, u8>) {
        self.bus.publish(
            Topic::AgentObservation,
            BusMessage::AgentObservation(AgentObservationMsg {
                agent: AgentKind::Grader,
                timestamp: ts,
                observation: ObservationPayload::Grader(summarize(scores)),
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_thresholds_closed_on_lower_bound() {
        assert_eq!(letter_grade(2.7), "A");
        assert_eq!(letter_grade(2.3), "B+");
        assert_eq!(letter_grade(2.0), "B");
        assert_eq!(letter_grade(1.7), "C+");
        assert_eq!(letter_grade(1.3), "C");
        assert_eq!(letter_grade(1.0), "D");
        assert_eq!(letter_grade(0.99), "F");
    }

    #[test]
    fn no_scores_is_not_applicable() {
        let summary = summarize(&HashMap::new());
        assert_eq!(summary.running_grade, "N/A");
        assert_eq!(summary.numeric_average, None);
        assert_eq!(summary.coverage_gaps.len(), 5);
    }

    #[test]
    fn all_threes_is_an_a() {
        let mut scores = HashMap::new();
        for t in TopicId::ORDER {
            scores.insert(t, 3);
        }
        let summary = summarize(&scores);
        assert_eq!(summary.running_grade, "A");
        assert_eq!(summary.numeric_average, Some(3.0));
        assert!(summary.coverage_gaps.is_empty());
    }

    #[test]
    fn partial_coverage_tracks_gaps() {
        let mut scores = HashMap::new();
        scores.insert(TopicId::Theme, 2);
        let summary = summarize(&scores);
        assert_eq!(summary.topics_scored, 1);
        assert_eq!(summary.coverage_gaps.len(), 4);
        assert!(!summary.coverage_gaps.contains(&TopicId::Theme));
    }

    #[tokio::test]
    async fn starting_a_new_interview_clears_prior_scores() {
        let bus = MessageBus::new();
        let mut observations = bus.subscribe(Topic::AgentObservation, "test");
        let _join = Grader::new(bus.clone()).spawn();

        bus.publish(
            Topic::AgentObservation,
            BusMessage::AgentObservation(AgentObservationMsg {
                agent: AgentKind::DepthExpert,
                timestamp: chrono::Utc::now(),
                observation: ObservationPayload::DepthExpert(crate::message::DepthExpertObservation {
                    topic: TopicId::Theme,
                    rating: 3,
                    recommendation: crate::message::DepthRecommendation::Accept,
                    note: "n".into(),
                    frustration_detected: false,
                }),
            }),
        );
        let first = observations.recv().await.unwrap();
        if let BusMessage::AgentObservation(AgentObservationMsg { observation: ObservationPayload::Grader(g), .. }) = first {
            assert_eq!(g.topics_scored, 1);
        } else {
            panic!("expected a grader observation");
        }

        bus.publish(
            crate::bus::Topic::Events,
            BusMessage::Event(crate::message::InterviewEvent::Started(crate::state::InterviewSnapshot::fresh())),
        );
        // Give the agent's event loop a moment to process the reset before
        // the next observation arrives, since `tokio::select!` makes no
        // ordering promise between messages on different topics.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        bus.publish(
            Topic::AgentObservation,
            BusMessage::AgentObservation(AgentObservationMsg {
                agent: AgentKind::DepthExpert,
                timestamp: chrono::Utc::now(),
                observation: ObservationPayload::DepthExpert(crate::message::DepthExpertObservation {
                    topic: TopicId::Characters,
                    rating: 2,
                    recommendation: crate::message::DepthRecommendation::Accept,
                    note: "n".into(),
                    frustration_detected: false,
                }),
            }),
        );
        let second = observations.recv().await.unwrap();
        if let BusMessage::AgentObservation(AgentObservationMsg { observation: ObservationPayload::Grader(g), .. }) = second {
            assert_eq!(g.topics_scored, 1);
            assert_eq!(g.numeric_average, Some(2.0), "stale Theme score from the prior session must not survive Started");
        } else {
            panic!("expected a grader observation");
        }
    }
}
