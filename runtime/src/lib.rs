//! Interview coordination core
//!
//! A publish/subscribe message bus, a handful of long-lived specialist
//! agents (deterministic and LLM-backed), and a windowed Coordinator that
//! turns their observations into a single next-question directive, every
//! turn, on time. See `supervisor::start` for the entry point that wires
//! all of it together in the required startup order.

pub mod agents;
pub mod bus;
pub mod config;
pub mod content;
pub mod coordinator;
pub mod error;
pub mod llm;
pub mod message;
pub mod state;
pub mod supervisor;
pub mod ticker;

pub use config::InterviewConfig;
pub use content::{ContentRegistry, TopicId, TopicInfo};
pub use error::{LlmError, Result, RuntimeError, StateError};
pub use message::{AgentKind, BusMessage, Directive, DirectiveKind};
pub use state::{InterviewSnapshot, InterviewStateHandle, InterviewStatus, Role};
pub use supervisor::{start, RuntimeHandles};
