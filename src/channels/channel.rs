//! The dialogue channel trait.

use async_trait::async_trait;

use crate::error::ChannelError;

/// Progress notices shown outside the dialogue text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Waiting on the language model.
    Thinking(String),
    /// Waiting on the ledger.
    Verifying(String),
    /// Something degraded but the conversation continues.
    Warning(String),
    Status(String),
}

/// A line-oriented, turn-by-turn conversation with one user.
#[async_trait]
pub trait Channel: Send {
    /// Channel name for logging.
    fn name(&self) -> &str;

    /// Show `prompt` and read one line. `Ok(None)` once input is closed.
    async fn ask(&mut self, prompt: &str) -> Result<Option<String>, ChannelError>;

    /// Show dialogue text.
    async fn say(&mut self, text: &str) -> Result<(), ChannelError>;

    /// Show a status notice.
    async fn send_status(&mut self, status: StatusUpdate) -> Result<(), ChannelError>;
}
