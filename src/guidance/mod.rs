//! Guidance generation — the language-model side of the conversation.
//!
//! The orchestrator only sees the `GuidanceGenerator` trait: a template id
//! plus the accumulated context in, generated text out.

pub mod generator;
pub mod prompts;

pub use generator::LlmGuidanceGenerator;
pub use prompts::PromptSet;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Which prompt to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplate {
    /// 1-3 clarifying questions about the intake question.
    Followup,
    /// Short teaser shown before the donation gate.
    Preview,
    /// The full guidance delivered after a verified donation.
    Advice,
    /// Premium oracle insight.
    Oracle,
}

impl std::fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Followup => "followup",
            Self::Preview => "preview",
            Self::Advice => "advice",
            Self::Oracle => "oracle",
        };
        write!(f, "{s}")
    }
}

/// One clarifying question and the user's answer, if one was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowupExchange {
    pub question: String,
    pub answer: Option<String>,
}

/// Everything the generator may draw on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationContext {
    pub question: String,
    pub followups: Vec<FollowupExchange>,
    pub donation_amount: Option<Decimal>,
}

/// Produces text for a prompt template.
#[async_trait]
pub trait GuidanceGenerator: Send + Sync {
    async fn generate(
        &self,
        template: PromptTemplate,
        context: &GenerationContext,
    ) -> Result<String, LlmError>;
}
