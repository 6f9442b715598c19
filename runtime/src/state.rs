//! InterviewState
//!
//! The single-writer authoritative session state. All mutations serialize
//! through one actor task; everything else in the system reads the session
//! only via bus events or [`InterviewStateHandle::snapshot`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::info;
use uuid::Uuid;

use crate::bus::{MessageBus, Topic};
use crate::content::TopicId;
use crate::error::StateError;
use crate::message::{BusMessage, InterviewEvent, StudentResponseMsg, TopicCompletedMsg};

/// Who said a given line in `conversation_history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Interviewer,
    Student,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub topic: Option<TopicId>,
    pub content: String,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterviewStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// A read-only copy of the session, safe to hand out freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSnapshot {
    /// Generated fresh on every `start()`; correlates logs and observations
    /// across one interview run (this system never resumes a prior one).
    pub session_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub status: InterviewStatus,
    pub current_topic: TopicId,
    pub responses_by_topic: HashMap<TopicId, Vec<String>>,
    pub topic_scores: HashMap<TopicId, Option<u8>>,
    pub conversation_history: Vec<HistoryEntry>,
    pub topics_completed: u32,
}

impl InterviewSnapshot {
    pub(crate) fn fresh() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: None,
            status: InterviewStatus::NotStarted,
            current_topic: TopicId::first(),
            responses_by_topic: HashMap::new(),
            topic_scores: HashMap::new(),
            conversation_history: Vec::new(),
            topics_completed: 0,
        }
    }
}

enum Command {
    Start { reply: oneshot::Sender<InterviewSnapshot> },
    RecordResponse { topic: TopicId, text: String, reply: oneshot::Sender<Result<(), StateError>> },
    AddToHistory { role: Role, topic: Option<TopicId>, content: String, reply: oneshot::Sender<()> },
    CompleteTopic { topic: TopicId, reply: oneshot::Sender<Result<(), StateError>> },
    Finish { reply: oneshot::Sender<()> },
    Reset { reply: oneshot::Sender<()> },
    Snapshot { reply: oneshot::Sender<InterviewSnapshot> },
}

/// Handle used by every other component to talk to the state actor.
/// Cheaply cloneable; every clone talks to the same underlying task.
#[derive(Clone)]
pub struct InterviewStateHandle {
    tx: mpsc::Sender<Command>,
}

impl InterviewStateHandle {
    /// Spawn the state actor and return a handle to it.
    pub fn spawn(bus: MessageBus) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(run_actor(bus, rx));
        Self { tx }
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, StateError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StateError::ActorGone)?;
        reply_rx.await.map_err(|_| StateError::ActorGone)
    }

    pub async fn start(&self) -> Result<InterviewSnapshot, StateError> {
        self.call(|reply| Command::Start { reply }).await
    }

    pub async fn record_response(&self, topic: TopicId, text: impl Into<String>) -> Result<(), StateError> {
        let text = text.into();
        self.call(|reply| Command::RecordResponse { topic, text, reply }).await?
    }

    pub async fn add_to_history(&self, role: Role, topic: Option<TopicId>, content: impl Into<String>) {
        let content = content.into();
        let _ = self.call(|reply| Command::AddToHistory { role, topic, content, reply }).await;
    }

    pub async fn complete_topic(&self, topic: TopicId) -> Result<(), StateError> {
        self.call(|reply| Command::CompleteTopic { topic, reply }).await?
    }

    pub async fn finish(&self) -> Result<(), StateError> {
        self.call(|reply| Command::Finish { reply }).await
    }

    pub async fn reset(&self) -> Result<(), StateError> {
        self.call(|reply| Command::Reset { reply }).await
    }

    pub async fn snapshot(&self) -> Result<InterviewSnapshot, StateError> {
        self.call(|reply| Command::Snapshot { reply }).await
    }
}

async fn run_actor(bus: MessageBus, mut rx: mpsc::Receiver<Command>) {
    let mut session = InterviewSnapshot::fresh();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Start { reply } => {
                session = InterviewSnapshot::fresh();
                session.started_at = Some(Utc::now());
                session.status = InterviewStatus::InProgress;
                session.current_topic = TopicId::first();
                info!(session_id = %session.session_id, "interview started");
                bus.publish(Topic::Events, BusMessage::Event(InterviewEvent::Started(session.clone())));
                let _ = reply.send(session.clone());
            }
            Command::RecordResponse { topic, text, reply } => {
                if session.status != InterviewStatus::InProgress {
                    let _ = reply.send(Err(StateError::NotInProgress));
                    continue;
                }
                let ts = Utc::now();
                session.responses_by_topic.entry(topic).or_default().push(text.clone());
                session.conversation_history.push(HistoryEntry {
                    role: Role::Student,
                    topic: Some(topic),
                    content: text.clone(),
                    ts,
                });
                let seq = bus.next_seq();
                bus.publish(
                    Topic::StudentResponse,
                    BusMessage::StudentResponse(StudentResponseMsg { topic, text, ts, seq }),
                );
                let _ = reply.send(Ok(()));
            }
            Command::AddToHistory { role, topic, content, reply } => {
                let ts = Utc::now();
                session.conversation_history.push(HistoryEntry { role, topic, content: content.clone(), ts });
                bus.publish(Topic::Events, BusMessage::HistoryAppended { role, topic, content, ts });
                let _ = reply.send(());
            }
            Command::CompleteTopic { topic, reply } => {
                if session.status != InterviewStatus::InProgress {
                    let _ = reply.send(Err(StateError::NotInProgress));
                    continue;
                }
                session.topics_completed = (session.topics_completed + 1).min(crate::content::TopicId::ORDER.len() as u32);
                if let Some(next) = topic.next() {
                    session.current_topic = next;
                }
                info!(topic = %topic, topics_completed = session.topics_completed, "topic completed");
                bus.publish(
                    Topic::TopicCompleted,
                    BusMessage::TopicCompleted(TopicCompletedMsg { topic, topics_completed: session.topics_completed }),
                );
                let _ = reply.send(Ok(()));
            }
            Command::Finish { reply } => {
                session.status = InterviewStatus::Completed;
                info!("interview finished");
                bus.publish(Topic::Events, BusMessage::Event(InterviewEvent::Finished));
                let _ = reply.send(());
            }
            Command::Reset { reply } => {
                session = InterviewSnapshot::fresh();
                info!("interview reset");
                bus.publish(Topic::Events, BusMessage::Event(InterviewEvent::Reset));
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(session.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_resets_and_marks_in_progress() {
        let bus = MessageBus::new();
        let handle = InterviewStateHandle::spawn(bus);
        let snap = handle.start().await.unwrap();
        assert_eq!(snap.status, InterviewStatus::InProgress);
        assert_eq!(snap.current_topic, TopicId::first());
        assert_eq!(snap.topics_completed, 0);
    }

    #[tokio::test]
    async fn record_response_requires_in_progress() {
        let bus = MessageBus::new();
        let handle = InterviewStateHandle::spawn(bus);
        let err = handle.record_response(TopicId::Theme, "hi").await.unwrap_err();
        assert!(matches!(err, StateError::NotInProgress));
    }

    #[tokio::test]
    async fn complete_topic_advances_monotonically() {
        let bus = MessageBus::new();
        let handle = InterviewStateHandle::spawn(bus);
        handle.start().await.unwrap();
        handle.complete_topic(TopicId::Theme).await.unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.topics_completed, 1);
        assert_eq!(snap.current_topic, TopicId::Characters);
    }

    #[tokio::test]
    async fn reset_returns_to_not_started() {
        let bus = MessageBus::new();
        let handle = InterviewStateHandle::spawn(bus);
        handle.start().await.unwrap();
        handle.record_response(TopicId::Theme, "hi").await.unwrap();
        handle.reset().await.unwrap();
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.status, InterviewStatus::NotStarted);
        assert!(snap.responses_by_topic.is_empty());
    }
}
