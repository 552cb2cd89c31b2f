//! Orchestrator — drives a conversation from intake to close.
//!
//! Each phase handler performs its side effects (channel I/O, generator or
//! verifier calls) and turns the result into an `Event`; the pure
//! `transition` function decides where the conversation goes next.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::state::{ConversationState, Ending, Event, Phase, transition};
use crate::channels::{Channel, StatusUpdate};
use crate::donation::{DonationRequirement, DonationVerifier, VerificationOutcome, generate_memo};
use crate::error::{ChannelError, LlmError};
use crate::guidance::prompts::{
    FALLBACK_PREVIEW, PREVIEW_SENTENCES, complete_questions, parse_followup_questions,
    truncate_sentences,
};
use crate::guidance::{GuidanceGenerator, PromptTemplate};

const RULE: &str = "----------------------------------------------------------------------";

/// Consecutive unreadable lines tolerated before input counts as closed.
const MAX_UNREADABLE_LINES: u32 = 3;

/// How a collaborator failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad user input; re-prompt.
    InputRecoverable,
    /// An optional step failed; substitute a fallback and continue.
    OptionalDegradation,
    /// The donation gate could not confirm a payment.
    GateFailure,
    /// The run cannot continue.
    Fatal,
}

impl FailureKind {
    /// Classify a generator failure by the template that failed.
    pub fn of_generation(template: PromptTemplate) -> Self {
        match template {
            PromptTemplate::Advice => Self::Fatal,
            PromptTemplate::Followup | PromptTemplate::Preview | PromptTemplate::Oracle => {
                Self::OptionalDegradation
            }
        }
    }
}

/// Tunables for the dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Answer attempts allowed across all follow-up questions.
    pub max_followup_attempts: u32,
    /// Extra verifier runs after a ledger failure before giving up.
    pub gate_retries: u32,
    /// Word the user types after sending a donation.
    pub confirm_word: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_followup_attempts: 6,
            gate_retries: 2,
            confirm_word: "DONATED".to_string(),
        }
    }
}

/// Final report of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub session_id: Uuid,
    pub ending: Ending,
    pub state: ConversationState,
    /// The language model rejected our credentials.
    pub misconfigured: bool,
}

impl RunReport {
    /// Process exit status: non-zero only when the run failed on configuration.
    pub fn exit_code(&self) -> i32 {
        if self.misconfigured { 1 } else { 0 }
    }
}

/// Drives one conversation. One orchestrator per run.
pub struct Orchestrator {
    session_id: Uuid,
    requirement: DonationRequirement,
    settings: OrchestratorSettings,
    generator: Arc<dyn GuidanceGenerator>,
    verifier: DonationVerifier,
    channel: Box<dyn Channel>,
    state: ConversationState,
    misconfigured: bool,
}

impl Orchestrator {
    pub fn new(
        requirement: DonationRequirement,
        settings: OrchestratorSettings,
        generator: Arc<dyn GuidanceGenerator>,
        verifier: DonationVerifier,
        channel: Box<dyn Channel>,
    ) -> Self {
        let state =
            ConversationState::new(requirement.premium_threshold(), settings.max_followup_attempts);
        Self {
            session_id: Uuid::new_v4(),
            requirement,
            settings,
            generator,
            verifier,
            channel,
            state,
            misconfigured: false,
        }
    }

    /// Run the conversation to a terminal phase.
    pub async fn run(mut self) -> RunReport {
        info!(
            session_id = %self.session_id,
            channel = self.channel.name(),
            "Session started"
        );
        self.welcome().await;

        loop {
            let event = match self.state.phase().clone() {
                Phase::Intake => self.intake().await,
                Phase::Followup => self.followup().await,
                Phase::Preview => self.preview().await,
                Phase::DonationGate => self.donation_gate().await,
                Phase::Advice => self.advice().await,
                Phase::Oracle => self.oracle().await,
                Phase::Close => self.close().await,
                Phase::Finished(ending) => {
                    info!(
                        session_id = %self.session_id,
                        ending = %ending,
                        rounds = self.state.round(),
                        "Session finished"
                    );
                    return RunReport {
                        session_id: self.session_id,
                        ending,
                        state: self.state,
                        misconfigured: self.misconfigured,
                    };
                }
            };
            self.apply(event);
        }
    }

    fn apply(&mut self, event: Event) {
        let from = self.state.phase().clone();
        match transition(&mut self.state, event) {
            Ok(to) if to != from => debug!(from = %from, to = %to, "Phase transition"),
            Ok(_) => {}
            Err(e) => {
                error!("Conversation state machine rejected event: {}", e);
                self.state.abort(e.to_string());
            }
        }
    }

    // ── Channel helpers ────────────────────────────────────────────────

    async fn say(&mut self, text: &str) {
        if let Err(e) = self.channel.say(text).await {
            warn!("Failed to write to channel: {}", e);
        }
    }

    async fn status(&mut self, status: StatusUpdate) {
        if let Err(e) = self.channel.send_status(status).await {
            warn!("Failed to send status: {}", e);
        }
    }

    /// Read a line, re-prompting after unreadable input. `None` once input is
    /// closed or keeps failing.
    async fn ask(&mut self, prompt: &str) -> Option<String> {
        for attempt in 1..=MAX_UNREADABLE_LINES {
            match self.channel.ask(prompt).await {
                Ok(line) => return line,
                Err(ChannelError::ReadFailed { reason, .. }) => {
                    warn!(attempt, kind = ?FailureKind::InputRecoverable, "Unreadable input: {}", reason);
                    if attempt < MAX_UNREADABLE_LINES {
                        self.say("Sorry, I couldn't read that. Please try again.").await;
                    }
                }
                Err(e) => {
                    warn!("Failed to read from channel: {}", e);
                    return None;
                }
            }
        }
        warn!("Input unreadable {} times in a row, treating it as closed", MAX_UNREADABLE_LINES);
        None
    }

    async fn generate(&mut self, template: PromptTemplate) -> Result<String, (FailureKind, LlmError)> {
        let context = self.state.generation_context();
        self.generator
            .generate(template, &context)
            .await
            .map_err(|e| {
                let kind = FailureKind::of_generation(template);
                warn!(template = %template, kind = ?kind, "Generation failed: {}", e);
                (kind, e)
            })
    }

    // ── Phases ─────────────────────────────────────────────────────────

    async fn welcome(&mut self) {
        self.say(&format!(
            "\n{RULE}\nKairos - Purpose Finding Service\n{RULE}\n\n\
             Welcome to Kairos. I am your Purpose Guide, here to help you find clarity,\n\
             meaning, and direction on your path.\n\n\
             After a short conversation and a token donation, I will give you\n\
             personalized guidance shaped around your situation.\n\n\
             Please share your purpose-related question or concern."
        ))
        .await;
    }

    async fn intake(&mut self) -> Event {
        match self.ask("\nYour question: ").await {
            None => Event::InputClosed,
            Some(text) => {
                if text.trim().is_empty() {
                    debug!(kind = ?FailureKind::InputRecoverable, "Empty question");
                    self.say("I need a question to work with. What would you like guidance on?")
                        .await;
                } else {
                    info!(question = %text.trim(), "Intake received");
                    self.say(
                        "\nThank you for sharing. Let me ask a few questions to understand your situation better.",
                    )
                    .await;
                }
                Event::IntakeSubmitted(text)
            }
        }
    }

    async fn followup(&mut self) -> Event {
        if self.state.followups().is_empty() {
            self.status(StatusUpdate::Thinking("Preparing follow-up questions...".into()))
                .await;
            let questions = match self.generate(PromptTemplate::Followup).await {
                Ok(raw) => {
                    let parsed = parse_followup_questions(&raw);
                    if parsed.is_empty() {
                        warn!(raw = %raw, "No numbered questions in response, using defaults");
                    }
                    complete_questions(parsed)
                }
                Err((_, _)) => {
                    self.status(StatusUpdate::Warning(
                        "I'm having trouble generating personalized questions, so I'll ask some standard ones.".into(),
                    ))
                    .await;
                    complete_questions(Vec::new())
                }
            };
            self.say("\nTo give you meaningful guidance, I'd like to understand your situation better:")
                .await;
            return Event::FollowupQuestions(questions);
        }

        let Some(idx) = self.state.next_unanswered() else {
            return Event::InputClosed;
        };
        let question = self.state.followups()[idx].question.clone();
        match self.ask(&format!("\n{}. {}\nYour answer: ", idx + 1, question)).await {
            None => Event::InputClosed,
            Some(answer) => {
                if answer.trim().is_empty() && self.state.followup_attempts_left() > 1 {
                    self.say("Even a short answer helps. Please share a few words.").await;
                }
                Event::FollowupAnswer(answer)
            }
        }
    }

    async fn preview(&mut self) -> Event {
        self.say("\nBased on what you've shared, I'm preparing your personalized guidance.")
            .await;
        self.status(StatusUpdate::Thinking("Drafting a preview...".into()))
            .await;

        let (preview, event) = match self.generate(PromptTemplate::Preview).await {
            Ok(text) => {
                let preview = truncate_sentences(&text, PREVIEW_SENTENCES);
                (preview.clone(), Event::PreviewReady(preview))
            }
            Err((_, e)) => (FALLBACK_PREVIEW.to_string(), Event::PreviewFailed(e.to_string())),
        };
        self.say(&format!(
            "Here's a preview of what I'll explore in detail after your offering:\n\n\"{preview}\"\n"
        ))
        .await;
        event
    }

    async fn donation_gate(&mut self) -> Event {
        let round = self.state.round();
        let memo = self.requirement.require_memo().then(generate_memo);
        self.show_donation_request(round, memo.as_deref()).await;

        let confirm = self.settings.confirm_word.clone();
        let answer = self
            .ask(&format!("\nType '{confirm}' once your donation is sent: "))
            .await;
        if !answer.is_some_and(|a| a.trim().eq_ignore_ascii_case(&confirm)) {
            info!(round, "Donation not confirmed by user");
            if self.state.donation().is_none() {
                self.say("\nThe consultation cannot proceed without a donation. Please restart when ready.")
                    .await;
            }
            return Event::DonationNotConfirmed;
        }

        self.status(StatusUpdate::Verifying(
            "Verifying your donation, please wait...".into(),
        ))
        .await;
        self.status(StatusUpdate::Status(format!(
            "Checking the ledger every {}s for up to {}s.",
            self.requirement.poll_interval().as_secs(),
            self.requirement.timeout().as_secs()
        )))
        .await;

        let mut attempt = 0;
        loop {
            let outcome = self.verifier.verify(&self.requirement, memo.as_deref()).await;
            match outcome {
                VerificationOutcome::Confirmed { donation, polls } => {
                    info!(round, polls, tx_id = %donation.tx_id, amount = %donation.amount, "Gate passed");
                    self.say("\nYour donation has been received and verified.").await;
                    return Event::DonationVerified(donation);
                }
                VerificationOutcome::TimedOut { cancelled, .. } => {
                    warn!(round, cancelled, "Gate failed: no qualifying donation");
                    self.say(
                        "\nYour donation could not be verified within the allotted time.\n\
                         Please check your transaction details and try again later.",
                    )
                    .await;
                    return Event::DonationTimedOut;
                }
                VerificationOutcome::Failed { reason, .. } => {
                    if attempt < self.settings.gate_retries {
                        attempt += 1;
                        warn!(round, attempt, "Ledger unavailable, retrying gate: {}", reason);
                        self.status(StatusUpdate::Warning(
                            "The ledger is not responding, still checking...".into(),
                        ))
                        .await;
                        continue;
                    }
                    warn!(round, kind = ?FailureKind::GateFailure, "Giving up on ledger: {}", reason);
                    self.say(
                        "\nWe could not reach the ledger to verify your donation.\n\
                         Please try again later.",
                    )
                    .await;
                    return Event::DonationTimedOut;
                }
            }
        }
    }

    async fn show_donation_request(&mut self, round: u32, memo: Option<&str>) {
        let req = &self.requirement;
        let mut text = if round <= 1 {
            format!(
                "{RULE}\n\nTo receive your full personalized guidance, please donate at least\n\
                 {min} {currency} to:\n\nWallet Address: {wallet}",
                min = req.min_amount(),
                currency = req.currency(),
                wallet = req.recipient(),
            )
        } else {
            format!(
                "{RULE}\n\nThank you for offering more support. Please send any amount of at least\n\
                 {min} {currency} to:\n\nWallet Address: {wallet}",
                min = req.min_amount(),
                currency = req.currency(),
                wallet = req.recipient(),
            )
        };
        if let Some(memo) = memo {
            text.push_str(&format!(
                "\nMemo (required): {memo}\n\nThe memo must be included exactly as shown for verification."
            ));
        }
        if round <= 1 {
            text.push_str(&format!(
                "\n\nFor premium guidance including Oracle Vision, donate {premium} {currency} or more.",
                premium = req.premium_threshold(),
                currency = req.currency(),
            ));
        }
        self.say(&text).await;
    }

    async fn advice(&mut self) -> Event {
        if let (Some(tier), Some(donation)) = (self.state.tier(), self.state.donation())
            && tier.is_premium()
        {
            let amount = donation.amount;
            self.say(&format!(
                "\nYou've donated {amount} {} - unlocking both standard guidance and Oracle Vision!",
                self.requirement.currency()
            ))
            .await;
        }
        self.status(StatusUpdate::Thinking(
            "Preparing your comprehensive purpose guidance...".into(),
        ))
        .await;

        match self.generate(PromptTemplate::Advice).await {
            Ok(text) => {
                self.say(&format!(
                    "\n{RULE}\nYour Personalized Purpose Guidance\n{RULE}\n\n{text}"
                ))
                .await;
                Event::AdviceReady(text)
            }
            Err((kind, e)) => {
                error!(kind = ?kind, "Advice generation failed: {}", e);
                self.misconfigured = matches!(e, LlmError::AuthFailed { .. });
                self.say(&format!(
                    "\nI'm sorry, your guidance could not be generated: {e}\n\
                     Your donation transaction id is {}. Please contact us so we can make this right.",
                    self.state
                        .donation()
                        .map(|d| d.tx_id.as_str())
                        .unwrap_or("unknown")
                ))
                .await;
                Event::AdviceFailed(e.to_string())
            }
        }
    }

    async fn oracle(&mut self) -> Event {
        self.status(StatusUpdate::Thinking(
            "Consulting the Oracle for additional wisdom...".into(),
        ))
        .await;
        match self.generate(PromptTemplate::Oracle).await {
            Ok(text) => {
                self.say(&format!(
                    "\n{RULE}\nOracle Vision\n{RULE}\n\nWe have also consulted the AI Oracle for you...\n\n{text}"
                ))
                .await;
                Event::OracleReady(text)
            }
            Err((_, e)) => {
                self.status(StatusUpdate::Warning(
                    "The Oracle could not be reached this time; your guidance above is complete.".into(),
                ))
                .await;
                Event::OracleFailed(e.to_string())
            }
        }
    }

    async fn close(&mut self) -> Event {
        let wallet = self.requirement.recipient().to_string();
        self.say(&format!(
            "\n{RULE}\n\nThank you for using Kairos. I hope this guidance brings clarity\n\
             and direction as you move forward.\n\n\
             If you found value in this consultation, additional donations are welcome at:\n\n{wallet}"
        ))
        .await;

        match self
            .ask("\nWould you like to make another donation now? (yes/no): ")
            .await
        {
            None => Event::InputClosed,
            Some(answer) => {
                let another_round = matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
                if !another_round {
                    self.say("\nWishing you clarity and purpose on your journey.\n").await;
                }
                Event::CloseAnswered { another_round }
            }
        }
    }
}
