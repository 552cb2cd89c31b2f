//! Scripted channel — replays canned answers and records the transcript.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::channels::{Channel, StatusUpdate};
use crate::error::ChannelError;

/// A line of recorded output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptLine {
    Prompt(String),
    Said(String),
    Status(StatusUpdate),
}

/// Shared view of everything a `ScriptedChannel` printed.
#[derive(Debug, Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<TranscriptLine>>>);

impl Transcript {
    pub fn lines(&self) -> Vec<TranscriptLine> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether any said line contains `needle`.
    pub fn said_contains(&self, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|l| matches!(l, TranscriptLine::Said(text) if text.contains(needle)))
    }

    /// Number of prompts shown.
    pub fn prompt_count(&self) -> usize {
        self.lines()
            .iter()
            .filter(|l| matches!(l, TranscriptLine::Prompt(_)))
            .count()
    }

    fn push(&self, line: TranscriptLine) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(line);
    }
}

/// Answers prompts from a fixed script; input closes when the script runs out.
pub struct ScriptedChannel {
    answers: VecDeque<String>,
    transcript: Transcript,
}

impl ScriptedChannel {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: Transcript::default(),
        }
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn ask(&mut self, prompt: &str) -> Result<Option<String>, ChannelError> {
        self.transcript.push(TranscriptLine::Prompt(prompt.to_string()));
        Ok(self.answers.pop_front())
    }

    async fn say(&mut self, text: &str) -> Result<(), ChannelError> {
        self.transcript.push(TranscriptLine::Said(text.to_string()));
        Ok(())
    }

    async fn send_status(&mut self, status: StatusUpdate) -> Result<(), ChannelError> {
        self.transcript.push(TranscriptLine::Status(status));
        Ok(())
    }
}
