//! Error types for Kairos.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel (terminal I/O) errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to read input on channel {name}: {reason}")]
    ReadFailed { name: String, reason: String },

    #[error("Failed to send output on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited the request")]
    RateLimited { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Ledger query errors. Always distinct from an empty result.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger RPC request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Ledger RPC returned an error: {0}")]
    Rpc(String),

    #[error("Malformed ledger response: {0}")]
    Malformed(String),
}

/// Conversation state machine errors.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Event {event} is not valid in phase {phase}")]
    InvalidEvent { phase: String, event: String },
}
