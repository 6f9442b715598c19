//! Bus message and observation/directive payloads
//!
//! These are the tagged-union values carried over [`crate::bus::MessageBus`]
//! topics. None of these types are ever mutated after being published; a
//! subscriber that wants to react differently just pattern-matches on the
//! variant.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::TopicId;
use crate::state::{InterviewSnapshot, Role};

/// Which specialist agent produced an observation or directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    Timekeeper,
    Grader,
    DepthExpert,
    Interviewer,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentKind::Timekeeper => "timekeeper",
            AgentKind::Grader => "grader",
            AgentKind::DepthExpert => "depth_expert",
            AgentKind::Interviewer => "interviewer",
        };
        write!(f, "{name}")
    }
}

/// Timekeeper's categorical urgency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pressure {
    Critical,
    High,
    Medium,
    Low,
}

/// Timekeeper's recommendation derived from `Pressure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRecommendation {
    WrapUp,
    Accelerate,
    OnPace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimekeeperObservation {
    pub elapsed_secs: f64,
    pub remaining_secs: f64,
    pub topics_left: u32,
    pub pace_secs: f64,
    pub pressure: Pressure,
    pub recommendation: TimeRecommendation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderObservation {
    pub running_grade: String,
    pub numeric_average: Option<f64>,
    pub topics_scored: u32,
    pub coverage_gaps: Vec<TopicId>,
}

/// DepthExpert's recommendation for what to do about the current topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthRecommendation {
    Probe,
    Accept,
    MoveOn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthExpertObservation {
    pub topic: TopicId,
    pub rating: u8,
    pub recommendation: DepthRecommendation,
    pub note: String,
    pub frustration_detected: bool,
}

/// An agent's published opinion about the latest student response or tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ObservationPayload {
    Timekeeper(TimekeeperObservation),
    Grader(GraderObservation),
    DepthExpert(DepthExpertObservation),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentObservationMsg {
    pub agent: AgentKind,
    pub timestamp: DateTime<Utc>,
    pub observation: ObservationPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentResponseMsg {
    pub topic: TopicId,
    pub text: String,
    pub ts: DateTime<Utc>,
    /// Monotonic sequence number, used by the Coordinator to detect a
    /// second response arriving before the first window closes.
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAskedMsg {
    pub question: String,
    pub topic: TopicId,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicCompletedMsg {
    pub topic: TopicId,
    pub topics_completed: u32,
}

/// The Coordinator's single decision for the next interviewer action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectiveKind {
    Probe,
    Transition,
    FinalQuestion,
    EndInterview,
}

/// Whether a directive came from the LLM synthesis path or the rule-based
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectiveSource {
    Llm,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub directive: DirectiveKind,
    pub topic: TopicId,
    pub next_topic: Option<TopicId>,
    pub reasoning: String,
    pub source: DirectiveSource,
    pub observations_received: BTreeSet<AgentKind>,
}

/// Lifecycle events published on `interview:events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InterviewEvent {
    Started(InterviewSnapshot),
    Finished,
    Reset,
}

/// The tagged-union value carried on every bus topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusMessage {
    Event(InterviewEvent),
    Tick { ts: DateTime<Utc> },
    StudentResponse(StudentResponseMsg),
    QuestionAsked(QuestionAskedMsg),
    TopicCompleted(TopicCompletedMsg),
    AgentObservation(AgentObservationMsg),
    CoordinatorDirective(Directive),
    /// Not a spec topic on its own; used for history bookkeeping that has
    /// no external subscriber contract (system/interviewer utterances).
    HistoryAppended { role: Role, topic: Option<TopicId>, content: String, ts: DateTime<Utc> },
}
