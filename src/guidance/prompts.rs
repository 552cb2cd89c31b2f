//! Prompt templates, request hints, and response post-processing.

use std::sync::LazyLock;

use regex::Regex;

use super::{GenerationContext, PromptTemplate};
use crate::llm::ChatMessage;

/// Maximum clarifying questions asked.
pub const MAX_FOLLOWUP_QUESTIONS: usize = 3;

/// Sentences kept from a generated preview.
pub const PREVIEW_SENTENCES: usize = 2;

/// Asked when the model produces no usable questions.
pub const DEFAULT_FOLLOWUP_QUESTIONS: [&str; MAX_FOLLOWUP_QUESTIONS] = [
    "In a world being reshaped by advanced AI, what does finding your purpose mean to you personally?",
    "If machines eventually handle most conventional work, what contribution would you want to be known for that no system could replicate?",
    "If you could see exactly how technology will change society over the next decade, what bold purpose would you choose today, even if it looked irrational to others?",
];

/// Shown when the preview cannot be generated.
pub const FALLBACK_PREVIEW: &str = "Your guidance will look closely at what you've shared and \
turn it into concrete next steps toward a clearer sense of purpose. It will also name the \
tensions you may be avoiding, so you can move forward with intent.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Kairos, a purpose guide. You help people find \
clarity, meaning, and direction in a world being transformed by AI. You are direct and warm, \
you avoid platitudes, and you ground every suggestion in what the person has told you.";

pub const DEFAULT_FOLLOWUP_SYSTEM_PROMPT: &str =
    "You are a purpose coach's assistant tasked with generating targeted follow-up questions.";

pub const DEFAULT_ORACLE_SYSTEM_PROMPT: &str =
    "You are Pythia, an AI oracle with mystical insight into the future.";

/// Numbered list markers: `1.` or `2)` at a line start or after whitespace.
static QUESTION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(?:^|\s)\d{1,2}[.)]\s+").expect("valid question regex"));

/// System prompts for each role the model plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub system: String,
    pub followup_system: String,
    pub oracle_system: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            followup_system: DEFAULT_FOLLOWUP_SYSTEM_PROMPT.to_string(),
            oracle_system: DEFAULT_ORACLE_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// (max_tokens, temperature) sent with each template.
///
/// These are hints to the provider; nothing enforces the resulting length.
pub fn request_hints(template: PromptTemplate) -> (u32, f32) {
    match template {
        PromptTemplate::Followup => (300, 0.75),
        PromptTemplate::Preview => (200, 0.7),
        PromptTemplate::Advice => (2000, 0.8),
        PromptTemplate::Oracle => (1000, 0.9),
    }
}

impl PromptSet {
    /// Build the chat messages for a template.
    pub fn messages(&self, template: PromptTemplate, ctx: &GenerationContext) -> Vec<ChatMessage> {
        match template {
            PromptTemplate::Followup => vec![
                ChatMessage::system(&self.followup_system),
                ChatMessage::user(followup_instruction(&ctx.question)),
            ],
            PromptTemplate::Preview => self.with_history(ctx, PREVIEW_INSTRUCTION.to_string()),
            PromptTemplate::Advice => self.with_history(ctx, advice_instruction(ctx)),
            PromptTemplate::Oracle => vec![
                ChatMessage::system(&self.oracle_system),
                ChatMessage::user(oracle_instruction(&ctx.question)),
            ],
        }
    }

    /// System prompt, the conversation so far, then the instruction.
    fn with_history(&self, ctx: &GenerationContext, instruction: String) -> Vec<ChatMessage> {
        let mut messages = vec![
            ChatMessage::system(&self.system),
            ChatMessage::user(&ctx.question),
        ];
        for exchange in &ctx.followups {
            if let Some(answer) = &exchange.answer {
                messages.push(ChatMessage::assistant(&exchange.question));
                messages.push(ChatMessage::user(answer));
            }
        }
        messages.push(ChatMessage::user(instruction));
        messages
    }
}

fn followup_instruction(question: &str) -> String {
    format!(
        "The user's initial question about their purpose is: \"{question}\"\n\n\
         Write exactly {MAX_FOLLOWUP_QUESTIONS} follow-up questions that would help you \
         understand their context. Put each question on its own line, numbered \"1.\", \"2.\", \
         \"3.\".\n\n\
         The first two questions should explore their values, life situation, and what is \
         really behind the question. Favor questions that open a direct, substantial \
         conversation over generic ones.\n\
         The third question should be provocative and unconventional, about finding purpose \
         after AGI, and should follow naturally from the first two."
    )
}

const PREVIEW_INSTRUCTION: &str = "Based on our conversation, write a two-sentence preview of \
the guidance you will give once the donation is verified. Hint at its value without giving \
the substance away.";

fn advice_instruction(ctx: &GenerationContext) -> String {
    let donation = ctx
        .donation_amount
        .map(|amount| format!(" The seeker offered a donation of {amount} tokens for this guidance."))
        .unwrap_or_default();
    format!(
        "Give detailed, thoughtful guidance on the user's purpose question.{donation}\n\n\
         Aim for between 1000 and 2000 tokens, weaving together:\n\
         1. A personal analysis of their situation based on their answers. Be blunt about hard \
         truths, but encourage them.\n\
         2. Practical steps toward a stronger sense of purpose in a post-AGI world. Avoid \
         generic or pop-science advice.\n\
         3. Philosophical insight on meaning and purpose relevant to their context.\n\n\
         Write in plain paragraphs without headers, emphasis, or emojis. Do not open with \
         \"Certainly\" or similar; get straight to the point."
    )
}

fn oracle_instruction(question: &str) -> String {
    format!(
        "Offer mystical, future-oriented wisdom about this seeker's purpose question: \
         \"{question}\". Your vision should reach beyond conventional advice and reveal deeper \
         patterns and possible futures."
    )
}

/// Pull numbered questions out of a model response.
pub fn parse_followup_questions(raw: &str) -> Vec<String> {
    QUESTION_MARKER
        .split(raw)
        .skip(1)
        .map(|q| q.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|q| !q.is_empty())
        .take(MAX_FOLLOWUP_QUESTIONS)
        .collect()
}

/// Cap at the maximum and pad from the defaults so exactly three are asked.
pub fn complete_questions(mut questions: Vec<String>) -> Vec<String> {
    questions.retain(|q| !q.trim().is_empty());
    questions.truncate(MAX_FOLLOWUP_QUESTIONS);
    while questions.len() < MAX_FOLLOWUP_QUESTIONS {
        questions.push(DEFAULT_FOLLOWUP_QUESTIONS[questions.len()].to_string());
    }
    questions
}

/// Keep the first `max` sentences of `text`.
pub fn truncate_sentences(text: &str, max: usize) -> String {
    let text = text.trim();
    let mut count = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_boundary {
                count += 1;
                if count == max {
                    return text[..i + c.len_utf8()].to_string();
                }
            }
        }
    }
    text.to_string()
}
