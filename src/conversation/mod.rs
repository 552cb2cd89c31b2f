//! Conversation orchestration — the dialogue state machine and its driver.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{FailureKind, Orchestrator, OrchestratorSettings, RunReport};
pub use state::{ConversationState, Ending, Event, Phase, transition};
