//! Channel abstraction for dialogue I/O.

pub mod channel;
pub mod cli;
pub mod scripted;

pub use channel::*;
pub use cli::CliChannel;
pub use scripted::{ScriptedChannel, Transcript, TranscriptLine};
