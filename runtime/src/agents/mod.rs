//! The four specialist agents that subscribe to the bus and publish their
//! findings as observations or directives. Each is a standalone task with
//! its own mailbox subscriptions; none of them hold a lock on another's
//! state.

pub mod depth_expert;
pub mod grader;
pub mod interviewer;
pub mod timekeeper;

pub use depth_expert::DepthExpert;
pub use grader::Grader;
pub use interviewer::{Interviewer, InterviewerHandle};
pub use timekeeper::Timekeeper;
