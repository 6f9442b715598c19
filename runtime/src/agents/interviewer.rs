//! Interviewer agent
//!
//! LLM-based question generation. Reacts to Coordinator directives to probe
//! deeper, transition topics, ask a final question, or wrap up; also
//! exposes a direct `ask_starter` call used once per topic to emit the
//! predefined starter question verbatim, bypassing the LLM entirely.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::bus::{MessageBus, Topic};
use crate::content::{ContentRegistry, TopicId};
use crate::error::StateError;
use crate::llm::{LlmClient, LlmPrompt, LlmRequest};
use crate::message::{BusMessage, Directive, DirectiveKind, InterviewEvent, QuestionAskedMsg};
use crate::state::{InterviewStateHandle, Role};

const PROBE_FALLBACK: &str = "That's interesting! Can you tell me more about what made you think that?";

fn transition_fallback(next_starter: &str) -> String {
    format!("Great thoughts! Now, {next_starter}")
}

fn final_question_template(starter: &str) -> String {
    format!("We're almost out of time, but I'd love to hear one quick thought: {starter}")
}

const END_INTERVIEW_MESSAGE: &str =
    "That's a wrap! Thank you so much for sharing your thoughts on the book today — great job.";

enum Command {
    AskStarter { topic: TopicId, reply: oneshot::Sender<()> },
}

#[derive(Clone)]
pub struct InterviewerHandle {
    tx: mpsc::Sender<Command>,
}

impl InterviewerHandle {
    /// Emit the topic's predefined starter question verbatim. Used once per
    /// topic, bypassing the LLM.
    pub async fn ask_starter(&self, topic: TopicId) -> Result<(), StateError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::AskStarter { topic, reply })
            .await
            .map_err(|_| StateError::ActorGone)?;
        rx.await.map_err(|_| StateError::ActorGone)
    }
}

struct HistoryEntry {
    line: String,
}

pub struct Interviewer {
    bus: MessageBus,
    state: InterviewStateHandle,
    registry: Arc<ContentRegistry>,
    llm: Option<Arc<dyn LlmClient>>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_history: usize,
    command_rx: mpsc::Receiver<Command>,
}

impl Interviewer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: MessageBus,
        state: InterviewStateHandle,
        registry: Arc<ContentRegistry>,
        llm: Option<Arc<dyn LlmClient>>,
        model: String,
        temperature: f32,
        max_tokens: u32,
        max_history: usize,
    ) -> (Self, InterviewerHandle) {
        let (tx, rx) = mpsc::channel(16);
        let handle = InterviewerHandle { tx };
        let agent = Self {
            bus,
            state,
            registry,
            llm,
            model,
            temperature,
            max_tokens,
            max_history,
            command_rx: rx,
        };
        (agent, handle)
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(mut self) {
        let mut directives = self.bus.subscribe(Topic::CoordinatorDirective, "interviewer:directive");
        let mut events = self.bus.subscribe(Topic::Events, "interviewer:events");
        let mut history: VecDeque<HistoryEntry> = VecDeque::with_capacity(self.max_history);

        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        Command::AskStarter { topic, reply } => {
                            let starter = self.registry.get(topic).starter.clone();
                            self.publish_question(topic, starter.clone());
                            self.state.add_to_history(Role::Interviewer, Some(topic), starter).await;
                            let _ = reply.send(());
                        }
                    }
                }
                Some(msg) = directives.recv() => {
                    if let BusMessage::CoordinatorDirective(directive) = msg {
                        self.handle_directive(directive, &history).await;
                    }
                }
                Some(msg) = events.recv() => {
                    match msg {
                        BusMessage::Event(InterviewEvent::Reset) => history.clear(),
                        BusMessage::HistoryAppended { role, content, .. } => {
                            push_history(&mut history, self.max_history, role, content);
                        }
                        _ => {}
                    }
                }
                else => break,
            }
        }
    }

    async fn handle_directive(&self, directive: Directive, history: &VecDeque<HistoryEntry>) {
        match directive.directive {
            DirectiveKind::Probe => {
                let question = self.generate_probe(&directive, history).await;
                self.publish_question(directive.topic, question.clone());
                self.state.add_to_history(Role::Interviewer, Some(directive.topic), question).await;
            }
            DirectiveKind::Transition => {
                let Some(next_topic) = directive.next_topic else {
                    warn!("interviewer: transition directive with no next_topic, ending instead");
                    self.publish_question(directive.topic, END_INTERVIEW_MESSAGE.to_string());
                    return;
                };
                let question = self.generate_transition(&directive, next_topic, history).await;
                self.publish_question(next_topic, question.clone());
                self.state.add_to_history(Role::Interviewer, Some(next_topic), question).await;
            }
            DirectiveKind::FinalQuestion => {
                let starter = self.registry.get(directive.topic).starter.clone();
                let question = final_question_template(&starter);
                self.publish_question(directive.topic, question.clone());
                self.state.add_to_history(Role::Interviewer, Some(directive.topic), question).await;
            }
            DirectiveKind::EndInterview => {
                self.publish_question(directive.topic, END_INTERVIEW_MESSAGE.to_string());
                self.state
                    .add_to_history(Role::Interviewer, Some(directive.topic), END_INTERVIEW_MESSAGE.to_string())
                    .await;
            }
        }
    }

    async fn generate_probe(&self, directive: &Directive, history: &VecDeque<HistoryEntry>) -> String {
        let Some(llm) = &self.llm else {
            return PROBE_FALLBACK.to_string();
        };
        let topic_info = self.registry.get(directive.topic);
        let prompt = LlmPrompt {
            system: "You are a warm, encouraging interviewer asking a student about a book they read. \
                     Ask exactly one short, natural follow-up question that goes deeper on the current topic."
                .to_string(),
            user: format!(
                "Topic: {}\nRecent conversation:\n{}\nAsk one natural follow-up question.",
                topic_info.name,
                render_history(history)
            ),
        };
        self.complete_or_fallback(prompt, PROBE_FALLBACK.to_string()).await
    }

    async fn generate_transition(
        &self,
        directive: &Directive,
        next_topic: TopicId,
        history: &VecDeque<HistoryEntry>,
    ) -> String {
        let next_info = self.registry.get(next_topic);
        let fallback = transition_fallback(&next_info.starter);
        let Some(llm) = &self.llm else {
            return fallback;
        };
        let current_info = self.registry.get(directive.topic);
        let prompt = LlmPrompt {
            system: "You are a warm, encouraging interviewer asking a student about a book they read. \
                     Write one short sentence that bridges from the current topic to the next, then ask the next topic's starter question."
                .to_string(),
            user: format!(
                "Current topic: {}\nNext topic: {}\nNext topic's starter question: {}\nRecent conversation:\n{}",
                current_info.name,
                next_info.name,
                next_info.starter,
                render_history(history)
            ),
        };
        self.complete_or_fallback(prompt, fallback).await
    }

    async fn complete_or_fallback(&self, prompt: LlmPrompt, fallback: String) -> String {
        let Some(llm) = &self.llm else {
            return fallback;
        };
        let request = LlmRequest {
            model: self.model.clone(),
            prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        match llm.complete(request).await {
            Ok(resp) => resp.content.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "interviewer: llm call failed, using fallback");
                fallback
            }
        }
    }

    fn publish_question(&self, topic: TopicId, question: String) {
        self.bus.publish(
            Topic::QuestionAsked,
            BusMessage::QuestionAsked(QuestionAskedMsg { question, topic, ts: chrono::Utc::now() }),
        );
    }
}

fn push_history(history: &mut VecDeque<HistoryEntry>, max_history: usize, role: Role, content: String) {
    if history.len() >= max_history {
        history.pop_front();
    }
    let speaker = match role {
        Role::Interviewer => "Interviewer",
        Role::Student => "Student",
        Role::System => "System",
    };
    history.push_back(HistoryEntry { line: format!("{speaker}: {content}") });
}

fn render_history(history: &VecDeque<HistoryEntry>) -> String {
    history.iter().map(|h| h.line.clone()).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use crate::state::InterviewStateHandle;

    #[tokio::test]
    async fn ask_starter_emits_verbatim_question() {
        let bus = MessageBus::new();
        let registry = Arc::new(ContentRegistry::default());
        let mut questions = bus.subscribe(Topic::QuestionAsked, "test");
        let state = InterviewStateHandle::spawn(bus.clone());
        let (agent, handle) = Interviewer::new(bus, state, registry.clone(), None, "model".into(), 0.3, 200, 6);
        let _join = agent.spawn();

        handle.ask_starter(TopicId::Theme).await.unwrap();

        let msg = questions.recv().await.unwrap();
        if let BusMessage::QuestionAsked(q) = msg {
            assert_eq!(q.topic, TopicId::Theme);
            assert_eq!(q.question, registry.get(TopicId::Theme).starter);
        } else {
            panic!("expected QuestionAsked");
        }
    }

    #[tokio::test]
    async fn probe_directive_without_llm_uses_fallback() {
        let bus = MessageBus::new();
        let registry = Arc::new(ContentRegistry::default());
        let mut questions = bus.subscribe(Topic::QuestionAsked, "test");
        let state = InterviewStateHandle::spawn(bus.clone());
        let (agent, _handle) = Interviewer::new(bus.clone(), state, registry, None, "model".into(), 0.3, 200, 6);
        let _join = agent.spawn();

        bus.publish(
            Topic::CoordinatorDirective,
            BusMessage::CoordinatorDirective(Directive {
                directive: DirectiveKind::Probe,
                topic: TopicId::Theme,
                next_topic: None,
                reasoning: "test".into(),
                source: crate::message::DirectiveSource::Fallback,
                observations_received: Default::default(),
            }),
        );

        let msg = questions.recv().await.unwrap();
        if let BusMessage::QuestionAsked(q) = msg {
            assert_eq!(q.question, PROBE_FALLBACK);
        } else {
            panic!("expected QuestionAsked");
        }
    }

    #[tokio::test]
    async fn transition_without_next_topic_ends_interview() {
        let bus = MessageBus::new();
        let registry = Arc::new(ContentRegistry::default());
        let mut questions = bus.subscribe(Topic::QuestionAsked, "test");
        let state = InterviewStateHandle::spawn(bus.clone());
        let (agent, _handle) = Interviewer::new(bus.clone(), state, registry, None, "model".into(), 0.3, 200, 6);
        let _join = agent.spawn();

        bus.publish(
            Topic::CoordinatorDirective,
            BusMessage::CoordinatorDirective(Directive {
                directive: DirectiveKind::Transition,
                topic: TopicId::Personal,
                next_topic: None,
                reasoning: "test".into(),
                source: crate::message::DirectiveSource::Fallback,
                observations_received: Default::default(),
            }),
        );

        let msg = questions.recv().await.unwrap();
        if let BusMessage::QuestionAsked(q) = msg {
            assert_eq!(q.question, END_INTERVIEW_MESSAGE);
        } else {
            panic!("expected QuestionAsked");
        }
    }
}
