//! Kairos — donation-gated purpose guidance agent.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod donation;
pub mod error;
pub mod guidance;
pub mod ledger;
pub mod llm;
