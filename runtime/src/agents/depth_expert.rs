//! DepthExpert agent
//!
//! LLM-based evaluation of each student response: a 1-3 depth rating, a
//! recommendation for what the Coordinator should do next, and whether the
//! student sounds frustrated. Never blocks its own event loop on the LLM
//! call — every evaluation happens in a spawned task that publishes its
//! result (or a conservative fallback) when it completes.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, warn};

use crate::bus::{MessageBus, Topic};
use crate::content::{ContentRegistry, TopicId};
use crate::error::LlmError;
use crate::llm::{strip_code_fence, LlmClient, LlmPrompt, LlmRequest};
use crate::message::{
    AgentKind, AgentObservationMsg, BusMessage, DepthExpertObservation, DepthRecommendation,
    InterviewEvent, ObservationPayload,
};

#[derive(Debug, Deserialize)]
struct RawDepthResponse {
    rating: u8,
    recommendation: String,
    #[serde(default)]
    note: String,
    #[serde(default)]
    frustration_detected: bool,
}

/// Parse a (possibly markdown-fenced) JSON blob into a depth evaluation,
/// applying the frustration upgrade rule. Pure aside from its input.
pub fn parse_evaluation(raw_text: &str) -> Result<DepthExpertObservation, LlmError> {
    let inner = strip_code_fence(raw_text);
    let parsed: RawDepthResponse =
        serde_json::from_str(inner).map_err(|e| LlmError::Parse(e.to_string()))?;

    let rating = parsed.rating.clamp(1, 3);
    let mut recommendation = match parsed.recommendation.as_str() {
        "probe" => DepthRecommendation::Probe,
        "accept" => DepthRecommendation::Accept,
        "move_on" => DepthRecommendation::MoveOn,
        other => return Err(LlmError::Parse(format!("unknown recommendation: {other}"))),
    };

    if parsed.frustration_detected && recommendation == DepthRecommendation::Probe {
        recommendation = DepthRecommendation::MoveOn;
    }

    Ok(DepthExpertObservation {
        // `topic` is filled in by the caller, which knows which response
        // this evaluation belongs to.
        topic: TopicId::Theme,
        rating,
        recommendation,
        note: parsed.note,
        frustration_detected: parsed.frustration_detected,
    })
}

fn conservative_default(topic: TopicId) -> DepthExpertObservation {
    DepthExpertObservation {
        topic,
        rating: 2,
        recommendation: DepthRecommendation::Accept,
        note: "Evaluation unavailable".to_string(),
        frustration_detected: false,
    }
}

fn build_prompt(topic_name: &str, depth_criteria: &str, question: &str, response: &str) -> LlmPrompt {
    LlmPrompt {
        system: "You evaluate a student's spoken book-report answer for depth. \
                 Respond with strict JSON only, no prose, matching exactly: \
                 {\"rating\": 1|2|3, \"recommendation\": \"probe\"|\"accept\"|\"move_on\", \
                 \"note\": string, \"frustration_detected\": boolean}."
            .to_string(),
        user: format!(
            "Topic: {topic_name}\nWhat counts as depth here: {depth_criteria}\nQuestion asked: {question}\nStudent response: {response}"
        ),
    }
}

pub struct DepthExpert {
    bus: MessageBus,
    registry: Arc<ContentRegistry>,
    llm: Option<Arc<dyn LlmClient>>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl DepthExpert {
    pub fn new(
        bus: MessageBus,
        registry: Arc<ContentRegistry>,
        llm: Option<Arc<dyn LlmClient>>,
        model: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self { bus, registry, llm, model, temperature, max_tokens }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let mut responses = self.bus.subscribe(Topic::StudentResponse, "depth_expert:student_response");
        let mut questions = self.bus.subscribe(Topic::QuestionAsked, "depth_expert:question_asked");
        let mut events = self.bus.subscribe(Topic::Events, "depth_expert:events");
        let mut topic_completed = self.bus.subscribe(Topic::TopicCompleted, "depth_expert:topic_completed");

        let mut last_question: Option<(TopicId, String)> = None;

        loop {
            tokio::select! {
                Some(msg) = responses.recv() => {
                    if let BusMessage::StudentResponse(m) = msg {
                        let question = match &last_question {
                            Some((topic, q)) if *topic == m.topic => q.clone(),
                            _ => self.registry.get(m.topic).starter.clone(),
                        };
                        self.spawn_evaluation(m.topic, question, m.text);
                    }
                }
                Some(msg) = questions.recv() => {
                    if let BusMessage::QuestionAsked(m) = msg {
                        last_question = Some((m.topic, m.question));
                    }
                }
                Some(msg) = topic_completed.recv() => {
                    if let BusMessage::TopicCompleted(m) = msg {
                        if last_question.as_ref().is_some_and(|(t, _)| *t == m.topic) {
                            last_question = None;
                        }
                    }
                }
                Some(msg) = events.recv() => {
                    if matches!(msg, BusMessage::Event(InterviewEvent::Reset)) {
                        last_question = None;
                    }
                }
                else => break,
            }
        }
    }

    /// Dispatch the LLM evaluation to its own task so the loop above keeps
    /// handling `question_asked`/`topic_completed` while the request is in
    /// flight.
    fn spawn_evaluation(&self, topic: TopicId, question: String, response_text: String) {
        let bus = self.bus.clone();
        let registry = self.registry.clone();
        let llm = self.llm.clone();
        let model = self.model.clone();
        let temperature = self.temperature;
        let max_tokens = self.max_tokens;

        tokio::spawn(async move {
            let topic_info = registry.get(topic);
            let observation = match &llm {
                None => conservative_default(topic),
                Some(client) => {
                    let prompt = build_prompt(&topic_info.name, &topic_info.depth_criteria, &question, &response_text);
                    let request = LlmRequest { model, prompt, temperature, max_tokens };
                    match client.complete(request).await {
                        Ok(resp) => match parse_evaluation(&resp.content) {
                            Ok(mut obs) => {
                                obs.topic = topic;
                                obs
                            }
                            Err(e) => {
                                warn!(error = %e, "depth_expert: malformed model output, using fallback");
                                conservative_default(topic)
                            }
                        },
                        Err(e) => {
                            error!(error = %e, "depth_expert: llm call failed, using fallback");
                            conservative_default(topic)
                        }
                    }
                }
            };

            bus.publish(
                Topic::AgentObservation,
                BusMessage::AgentObservation(AgentObservationMsg {
                    agent: AgentKind::DepthExpert,
                    timestamp: chrono::Utc::now(),
                    observation: ObservationPayload::DepthExpert(observation),
                }),
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let raw = r#"{"rating": 3, "recommendation": "accept", "note": "great", "frustration_detected": false}"#;
        let obs = parse_evaluation(raw).unwrap();
        assert_eq!(obs.rating, 3);
        assert_eq!(obs.recommendation, DepthRecommendation::Accept);
    }

    #[test]
    fn parses_fenced_json_identically() {
        let bare = r#"{"rating": 1, "recommendation": "probe", "note": "n", "frustration_detected": false}"#;
        let fenced = format!("```json\n{bare}\n```");
        let a = parse_evaluation(bare).unwrap();
        let b = parse_evaluation(&fenced).unwrap();
        assert_eq!(a.rating, b.rating);
        assert_eq!(a.recommendation, b.recommendation);
    }

    #[test]
    fn frustration_upgrades_probe_to_move_on() {
        let raw = r#"{"rating": 1, "recommendation": "probe", "note": "n", "frustration_detected": true}"#;
        let obs = parse_evaluation(raw).unwrap();
        assert_eq!(obs.recommendation, DepthRecommendation::MoveOn);
    }

    #[test]
    fn frustration_does_not_change_accept_or_move_on() {
        let accept = r#"{"rating": 2, "recommendation": "accept", "note": "n", "frustration_detected": true}"#;
        assert_eq!(parse_evaluation(accept).unwrap().recommendation, DepthRecommendation::Accept);

        let move_on = r#"{"rating": 2, "recommendation": "move_on", "note": "n", "frustration_detected": true}"#;
        assert_eq!(parse_evaluation(move_on).unwrap().recommendation, DepthRecommendation::MoveOn);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_evaluation("not json").is_err());
    }

    #[test]
    fn conservative_default_matches_spec_shape() {
        let obs = conservative_default(TopicId::Plot);
        assert_eq!(obs.rating, 2);
        assert_eq!(obs.recommendation, DepthRecommendation::Accept);
        assert_eq!(obs.note, "Evaluation unavailable");
    }
}
