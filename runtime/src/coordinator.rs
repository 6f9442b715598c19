//! Coordinator
//!
//! The synthesis engine. Collects every agent's observation about the
//! latest student response for a short window, then emits exactly one
//! directive: try LLM synthesis first, fall back to a deterministic rule
//! ladder when the LLM is unavailable, errors, or returns something that
//! doesn't parse.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::bus::{MessageBus, Topic};
use crate::content::{ContentRegistry, TopicId};
use crate::llm::{LlmClient, LlmPrompt, LlmRequest};
use crate::message::{
    AgentKind, AgentObservationMsg, BusMessage, DepthExpertObservation, Directive, DirectiveKind,
    DirectiveSource, InterviewEvent, ObservationPayload, Pressure, StudentResponseMsg,
    TimekeeperObservation,
};
use crate::message::DepthRecommendation;
use crate::state::InterviewStateHandle;

/// Parse the LLM's fixed `DECISION: <label>` / `REASONING: <text>` block.
/// Lenient: only requires the two prefixed lines to appear somewhere in the
/// text, in either order.
pub fn parse_llm_decision(text: &str) -> Option<(DirectiveKind, String)> {
    let mut decision = None;
    let mut reasoning = String::new();

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("DECISION:") {
            decision = match rest.trim().to_uppercase().as_str() {
                "PROBE" => Some(DirectiveKind::Probe),
                "TRANSITION" => Some(DirectiveKind::Transition),
                "FINAL_QUESTION" => Some(DirectiveKind::FinalQuestion),
                "END_INTERVIEW" => Some(DirectiveKind::EndInterview),
                _ => None,
            };
        } else if let Some(rest) = line.strip_prefix("REASONING:") {
            reasoning = rest.trim().to_string();
        }
    }

    decision.map(|d| (d, reasoning))
}

fn timekeeper_of(observations: &HashMap<AgentKind, ObservationPayload>) -> Option<&TimekeeperObservation> {
    match observations.get(&AgentKind::Timekeeper) {
        Some(ObservationPayload::Timekeeper(t)) => Some(t),
        _ => None,
    }
}

fn depth_of(observations: &HashMap<AgentKind, ObservationPayload>) -> Option<&DepthExpertObservation> {
    match observations.get(&AgentKind::DepthExpert) {
        Some(ObservationPayload::DepthExpert(d)) => Some(d),
        _ => None,
    }
}

/// The rule-based fallback decision procedure. Pure given the window's
/// collected observations; used both when the LLM is unavailable and when
/// LLM synthesis fails to parse.
pub fn decide_fallback(
    topic: TopicId,
    observations: &HashMap<AgentKind, ObservationPayload>,
) -> (DirectiveKind, Option<TopicId>, String) {
    let timekeeper = timekeeper_of(observations);
    let depth = depth_of(observations);

    if let Some(tk) = timekeeper {
        if tk.pressure == Pressure::Critical || tk.remaining_secs <= 30.0 {
            return (DirectiveKind::EndInterview, None, "time pressure is critical".to_string());
        }
    }

    let topic_not_yet_accepted =
        !matches!(depth.map(|d| d.recommendation), Some(DepthRecommendation::Accept) | Some(DepthRecommendation::MoveOn));

    if let Some(tk) = timekeeper {
        if tk.pressure == Pressure::High && tk.topics_left > 0 && topic_not_yet_accepted {
            return (
                DirectiveKind::FinalQuestion,
                None,
                "time pressure is high and the current topic isn't accepted yet".to_string(),
            );
        }
    }

    if let Some(d) = depth {
        if matches!(d.recommendation, DepthRecommendation::MoveOn | DepthRecommendation::Accept) {
            let next = topic.next();
            return match next {
                Some(_) => (DirectiveKind::Transition, next, "depth expert says this topic is covered".to_string()),
                None => (DirectiveKind::EndInterview, None, "depth expert says this topic is covered, no topics remain".to_string()),
            };
        }
        if d.recommendation == DepthRecommendation::Probe {
            let pace_allows_it = timekeeper.map(|t| matches!(t.pressure, Pressure::Low | Pressure::Medium)).unwrap_or(true);
            if pace_allows_it {
                return (DirectiveKind::Probe, None, "depth expert recommends probing further".to_string());
            }
        }
    }

    (DirectiveKind::Probe, None, "no conclusive observations yet, probing by default".to_string())
}

fn render_observations(observations: &HashMap<AgentKind, ObservationPayload>) -> String {
    let mut agents: Vec<&AgentKind> = observations.keys().collect();
    agents.sort();
    agents
        .into_iter()
        .map(|agent| match &observations[agent] {
            ObservationPayload::Timekeeper(t) => {
                format!("timekeeper: pressure={:?} remaining={:.0}s topics_left={}", t.pressure, t.remaining_secs, t.topics_left)
            }
            ObservationPayload::Grader(g) => {
                format!("grader: grade={} topics_scored={}", g.running_grade, g.topics_scored)
            }
            ObservationPayload::DepthExpert(d) => {
                format!("depth_expert: rating={} recommendation={:?} frustration={}", d.rating, d.recommendation, d.frustration_detected)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct Coordinator {
    bus: MessageBus,
    state: InterviewStateHandle,
    registry: Arc<ContentRegistry>,
    llm: Option<Arc<dyn LlmClient>>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    collection_window: Duration,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: MessageBus,
        state: InterviewStateHandle,
        registry: Arc<ContentRegistry>,
        llm: Option<Arc<dyn LlmClient>>,
        model: String,
        temperature: f32,
        max_tokens: u32,
        collection_window: Duration,
    ) -> Self {
        Self { bus, state, registry, llm, model, temperature, max_tokens, collection_window }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let mut responses = self.bus.subscribe(Topic::StudentResponse, "coordinator:student_response");
        let mut agent_observations = self.bus.subscribe(Topic::AgentObservation, "coordinator:agent_observation");
        let mut events = self.bus.subscribe(Topic::Events, "coordinator:events");
        let mut topic_completed = self.bus.subscribe(Topic::TopicCompleted, "coordinator:topic_completed");

        let (window_tx, mut window_rx) = mpsc::channel::<u64>(8);
        let mut epoch: u64 = 0;
        let mut collecting = false;
        let mut window_response: Option<StudentResponseMsg> = None;
        let mut observations: HashMap<AgentKind, ObservationPayload> = HashMap::new();

        loop {
            tokio::select! {
                Some(msg) = responses.recv() => {
                    if let BusMessage::StudentResponse(resp) = msg {
                        epoch += 1;
                        let this_epoch = epoch;
                        collecting = true;
                        window_response = Some(resp);
                        observations.clear();
                        let tx = window_tx.clone();
                        let window = self.collection_window;
                        tokio::spawn(async move {
                            tokio::time::sleep(window).await;
                            let _ = tx.send(this_epoch).await;
                        });
                    }
                }
                Some(msg) = agent_observations.recv() => {
                    if collecting {
                        if let BusMessage::AgentObservation(AgentObservationMsg { agent, observation, .. }) = msg {
                            observations.insert(agent, observation);
                        }
                    }
                }
                Some(_) = topic_completed.recv() => {}
                Some(msg) = events.recv() => {
                    if matches!(msg, BusMessage::Event(InterviewEvent::Reset) | BusMessage::Event(InterviewEvent::Finished)) {
                        collecting = false;
                        window_response = None;
                        observations.clear();
                    }
                }
                Some(closed_epoch) = window_rx.recv() => {
                    if collecting && closed_epoch == epoch {
                        collecting = false;
                        let response = window_response.take();
                        let obs = std::mem::take(&mut observations);
                        self.emit_directive(response, obs).await;
                    }
                }
                else => break,
            }
        }
    }

    async fn try_llm_decision(
        &self,
        topic: TopicId,
        response_text: &str,
        observations: &HashMap<AgentKind, ObservationPayload>,
    ) -> Option<(DirectiveKind, String)> {
        let llm = self.llm.as_ref()?;
        let topic_info = self.registry.get(topic);
        let prompt = LlmPrompt {
            system: "You coordinate a book-report interview. Given the current topic, the student's \
                     latest response, and what your specialist agents observed, decide the single next \
                     action. Respond with exactly two lines: `DECISION: <PROBE|TRANSITION|FINAL_QUESTION|END_INTERVIEW>` \
                     and `REASONING: <one short sentence>`."
                .to_string(),
            user: format!(
                "Topic: {}\nStudent response: {}\nObservations:\n{}",
                topic_info.name,
                response_text,
                render_observations(observations)
            ),
        };
        let request = LlmRequest { model: self.model.clone(), prompt, temperature: self.temperature, max_tokens: self.max_tokens };
        match llm.complete(request).await {
            Ok(resp) => match parse_llm_decision(&resp.content) {
                Some(decision) => Some(decision),
                None => {
                    warn!("coordinator: llm synthesis response did not parse, using fallback");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "coordinator: llm synthesis failed, using fallback");
                None
            }
        }
    }

    async fn emit_directive(&self, response: Option<StudentResponseMsg>, observations: HashMap<AgentKind, ObservationPayload>) {
        let Some(response) = response else { return };
        let topic = response.topic;

        let (mut kind, mut next_topic, mut reasoning, source) = match self.try_llm_decision(topic, &response.text, &observations).await {
            Some((kind, reasoning)) => {
                let next_topic = if kind == DirectiveKind::Transition { topic.next() } else { None };
                (kind, next_topic, reasoning, DirectiveSource::Llm)
            }
            None => {
                let (kind, next_topic, reasoning) = decide_fallback(topic, &observations);
                (kind, next_topic, reasoning, DirectiveSource::Fallback)
            }
        };

        // The LLM may choose TRANSITION on the last topic, which has no
        // next_topic; end the interview instead.
        if kind == DirectiveKind::Transition && next_topic.is_none() {
            kind = DirectiveKind::EndInterview;
            reasoning = format!("{reasoning} (no topic follows, ending interview instead)");
        }

        if kind == DirectiveKind::Transition {
            if let Err(e) = self.state.complete_topic(topic).await {
                warn!(error = %e, "coordinator: failed to mark topic complete before transition");
            }
        } else if kind == DirectiveKind::EndInterview {
            if let Err(e) = self.state.finish().await {
                warn!(error = %e, "coordinator: failed to mark interview finished");
            }
        }

        let observations_received: BTreeSet<AgentKind> = observations.keys().copied().collect();
        info!(directive = ?kind, topic = %topic, source = ?source, "coordinator: directive emitted");

        self.bus.publish(
            Topic::CoordinatorDirective,
            BusMessage::CoordinatorDirective(Directive {
                directive: kind,
                topic,
                next_topic,
                reasoning,
                source,
                observations_received,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DepthExpertObservation, TimeRecommendation};

    fn timekeeper_obs(pressure: Pressure, remaining_secs: f64, topics_left: u32) -> ObservationPayload {
        ObservationPayload::Timekeeper(TimekeeperObservation {
            elapsed_secs: 300.0 - remaining_secs,
            remaining_secs,
            topics_left,
            pace_secs: 0.0,
            pressure,
            recommendation: match pressure {
                Pressure::Critical => TimeRecommendation::WrapUp,
                Pressure::High => TimeRecommendation::Accelerate,
                _ => TimeRecommendation::OnPace,
            },
        })
    }

    fn depth_obs(recommendation: DepthRecommendation) -> ObservationPayload {
        ObservationPayload::DepthExpert(DepthExpertObservation {
            topic: TopicId::Theme,
            rating: 2,
            recommendation,
            note: "n".into(),
            frustration_detected: false,
        })
    }

    #[test]
    fn critical_pressure_always_ends_interview() {
        let mut obs = HashMap::new();
        obs.insert(AgentKind::Timekeeper, timekeeper_obs(Pressure::Critical, 10.0, 3));
        obs.insert(AgentKind::DepthExpert, depth_obs(DepthRecommendation::Probe));
        let (kind, next, _) = decide_fallback(TopicId::Theme, &obs);
        assert_eq!(kind, DirectiveKind::EndInterview);
        assert_eq!(next, None);
    }

    #[test]
    fn high_pressure_and_unaccepted_topic_asks_final_question() {
        let mut obs = HashMap::new();
        obs.insert(AgentKind::Timekeeper, timekeeper_obs(Pressure::High, 60.0, 2));
        obs.insert(AgentKind::DepthExpert, depth_obs(DepthRecommendation::Probe));
        let (kind, _, _) = decide_fallback(TopicId::Theme, &obs);
        assert_eq!(kind, DirectiveKind::FinalQuestion);
    }

    #[test]
    fn move_on_transitions_to_next_topic() {
        let mut obs = HashMap::new();
        obs.insert(AgentKind::DepthExpert, depth_obs(DepthRecommendation::MoveOn));
        let (kind, next, _) = decide_fallback(TopicId::Theme, &obs);
        assert_eq!(kind, DirectiveKind::Transition);
        assert_eq!(next, Some(TopicId::Characters));
    }

    #[test]
    fn move_on_on_last_topic_ends_interview() {
        let mut obs = HashMap::new();
        obs.insert(AgentKind::DepthExpert, depth_obs(DepthRecommendation::Accept));
        let (kind, next, _) = decide_fallback(TopicId::Personal, &obs);
        assert_eq!(kind, DirectiveKind::EndInterview);
        assert_eq!(next, None);
    }

    #[test]
    fn probe_recommendation_under_low_pressure_probes() {
        let mut obs = HashMap::new();
        obs.insert(AgentKind::Timekeeper, timekeeper_obs(Pressure::Low, 200.0, 4));
        obs.insert(AgentKind::DepthExpert, depth_obs(DepthRecommendation::Probe));
        let (kind, _, _) = decide_fallback(TopicId::Theme, &obs);
        assert_eq!(kind, DirectiveKind::Probe);
    }

    #[test]
    fn no_observations_probes_by_default() {
        let (kind, next, _) = decide_fallback(TopicId::Theme, &HashMap::new());
        assert_eq!(kind, DirectiveKind::Probe);
        assert_eq!(next, None);
    }

    #[test]
    fn parses_valid_decision_block() {
        let text = "DECISION: TRANSITION\nREASONING: the student covered this well";
        let (kind, reasoning) = parse_llm_decision(text).unwrap();
        assert_eq!(kind, DirectiveKind::Transition);
        assert_eq!(reasoning, "the student covered this well");
    }

    #[test]
    fn parses_decision_block_regardless_of_line_order() {
        let text = "REASONING: time is short\nDECISION: end_interview";
        let (kind, reasoning) = parse_llm_decision(text).unwrap();
        assert_eq!(kind, DirectiveKind::EndInterview);
        assert_eq!(reasoning, "time is short");
    }

    #[test]
    fn garbage_text_does_not_parse() {
        assert!(parse_llm_decision("I think we should keep going.").is_none());
    }

    #[tokio::test]
    async fn window_closes_and_emits_directive_from_collected_observations() {
        use crate::bus::MessageBus;
        use crate::state::InterviewStateHandle;

        let bus = MessageBus::new();
        let state = InterviewStateHandle::spawn(bus.clone());
        state.start().await.unwrap();
        let registry = Arc::new(ContentRegistry::default());

        let coordinator = Coordinator::new(
            bus.clone(),
            state,
            registry,
            None,
            "model".into(),
            0.3,
            200,
            Duration::from_millis(20),
        );
        let mut directives = bus.subscribe(Topic::CoordinatorDirective, "test");
        let _join = coordinator.spawn();

        bus.publish(
            Topic::StudentResponse,
            BusMessage::StudentResponse(StudentResponseMsg {
                topic: TopicId::Theme,
                text: "I think the theme is about courage.".into(),
                ts: chrono::Utc::now(),
                seq: 0,
            }),
        );
        bus.publish(
            Topic::AgentObservation,
            BusMessage::AgentObservation(AgentObservationMsg {
                agent: AgentKind::DepthExpert,
                timestamp: chrono::Utc::now(),
                observation: depth_obs(DepthRecommendation::MoveOn),
            }),
        );

        let msg = tokio::time::timeout(Duration::from_millis(200), directives.recv()).await.unwrap().unwrap();
        if let BusMessage::CoordinatorDirective(d) = msg {
            assert_eq!(d.directive, DirectiveKind::Transition);
            assert_eq!(d.next_topic, Some(TopicId::Characters));
            assert_eq!(d.source, DirectiveSource::Fallback);
        } else {
            panic!("expected CoordinatorDirective");
        }
    }
}
