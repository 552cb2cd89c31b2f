//! Conversation state machine — phases, events, and the transition function.

use rust_decimal::Decimal;

use crate::donation::{ConfirmedDonation, Tier};
use crate::error::ConversationError;
use crate::guidance::prompts::{FALLBACK_PREVIEW, MAX_FOLLOWUP_QUESTIONS, complete_questions};
use crate::guidance::{FollowupExchange, GenerationContext};
use crate::llm::ChatMessage;

/// How a finished run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ending {
    /// Guidance delivered and the user declined further rounds.
    Completed,
    /// No qualifying donation arrived before the gate timed out.
    DonationTimedOut,
    /// The user never confirmed sending a donation.
    DonationNotConfirmed,
    /// Input closed before a question was asked.
    Abandoned,
    /// Fatal failure; the reason is shown to the user.
    Aborted(String),
}

impl std::fmt::Display for Ending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::DonationTimedOut => write!(f, "donation_timed_out"),
            Self::DonationNotConfirmed => write!(f, "donation_not_confirmed"),
            Self::Abandoned => write!(f, "abandoned"),
            Self::Aborted(reason) => write!(f, "aborted ({reason})"),
        }
    }
}

/// The phases of a conversation.
///
/// Progresses Intake → Followup → Preview → DonationGate → Advice →
/// Oracle (premium only) → Close, with Close → DonationGate as the only loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Intake,
    Followup,
    Preview,
    DonationGate,
    Advice,
    Oracle,
    Close,
    Finished(Ending),
}

impl Phase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &Phase) -> bool {
        use Phase::*;
        match (self, target) {
            (Intake, Followup)
            | (Followup, Preview)
            | (Preview, DonationGate)
            | (DonationGate, Advice)
            | (DonationGate, Close)
            | (Advice, Oracle)
            | (Advice, Close)
            | (Oracle, Close)
            | (Close, DonationGate) => true,
            (Intake, Finished(Ending::Abandoned)) => true,
            (
                DonationGate,
                Finished(
                    Ending::DonationTimedOut | Ending::DonationNotConfirmed | Ending::Completed,
                ),
            ) => true,
            (Advice, Finished(Ending::Aborted(_))) => true,
            (Close, Finished(Ending::Completed)) => true,
            _ => false,
        }
    }

    /// Whether this phase is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intake => write!(f, "intake"),
            Self::Followup => write!(f, "followup"),
            Self::Preview => write!(f, "preview"),
            Self::DonationGate => write!(f, "donation_gate"),
            Self::Advice => write!(f, "advice"),
            Self::Oracle => write!(f, "oracle"),
            Self::Close => write!(f, "close"),
            Self::Finished(ending) => write!(f, "finished: {ending}"),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    IntakeSubmitted(String),
    FollowupQuestions(Vec<String>),
    FollowupAnswer(String),
    /// The user's input stream closed.
    InputClosed,
    PreviewReady(String),
    PreviewFailed(String),
    DonationVerified(ConfirmedDonation),
    DonationTimedOut,
    DonationNotConfirmed,
    AdviceReady(String),
    AdviceFailed(String),
    OracleReady(String),
    OracleFailed(String),
    CloseAnswered { another_round: bool },
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Self::IntakeSubmitted(_) => "intake_submitted",
            Self::FollowupQuestions(_) => "followup_questions",
            Self::FollowupAnswer(_) => "followup_answer",
            Self::InputClosed => "input_closed",
            Self::PreviewReady(_) => "preview_ready",
            Self::PreviewFailed(_) => "preview_failed",
            Self::DonationVerified(_) => "donation_verified",
            Self::DonationTimedOut => "donation_timed_out",
            Self::DonationNotConfirmed => "donation_not_confirmed",
            Self::AdviceReady(_) => "advice_ready",
            Self::AdviceFailed(_) => "advice_failed",
            Self::OracleReady(_) => "oracle_ready",
            Self::OracleFailed(_) => "oracle_failed",
            Self::CloseAnswered { .. } => "close_answered",
        }
    }
}

/// All state for one run. Owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub(crate) phase: Phase,
    messages: Vec<ChatMessage>,
    question: Option<String>,
    followups: Vec<FollowupExchange>,
    followup_attempts: u32,
    max_followup_attempts: u32,
    preview: Option<String>,
    donation: Option<ConfirmedDonation>,
    extra_donations: Vec<ConfirmedDonation>,
    advice: Option<String>,
    oracle: Option<String>,
    round: u32,
    premium_threshold: Decimal,
}

impl ConversationState {
    pub fn new(premium_threshold: Decimal, max_followup_attempts: u32) -> Self {
        Self {
            phase: Phase::Intake,
            messages: Vec::new(),
            question: None,
            followups: Vec::new(),
            followup_attempts: 0,
            max_followup_attempts: max_followup_attempts.max(1),
            preview: None,
            donation: None,
            extra_donations: Vec::new(),
            advice: None,
            oracle: None,
            round: 0,
            premium_threshold,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn question(&self) -> Option<&str> {
        self.question.as_deref()
    }

    pub fn followups(&self) -> &[FollowupExchange] {
        &self.followups
    }

    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }

    /// The donation that unlocked the guidance (first gate round).
    pub fn donation(&self) -> Option<&ConfirmedDonation> {
        self.donation.as_ref()
    }

    /// Donations from later rounds. They never change the tier.
    pub fn extra_donations(&self) -> &[ConfirmedDonation] {
        &self.extra_donations
    }

    pub fn advice(&self) -> Option<&str> {
        self.advice.as_deref()
    }

    pub fn oracle(&self) -> Option<&str> {
        self.oracle.as_deref()
    }

    /// Gate rounds entered so far.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Derived from the first donation; `None` until it is verified.
    pub fn tier(&self) -> Option<Tier> {
        self.donation
            .as_ref()
            .map(|d| Tier::for_amount(d.amount, self.premium_threshold))
    }

    /// Index of the next follow-up question awaiting an answer.
    pub fn next_unanswered(&self) -> Option<usize> {
        self.followups.iter().position(|f| f.answer.is_none())
    }

    pub fn followup_attempts_left(&self) -> u32 {
        self.max_followup_attempts
            .saturating_sub(self.followup_attempts)
    }

    /// Context handed to the guidance generator.
    pub fn generation_context(&self) -> GenerationContext {
        GenerationContext {
            question: self.question.clone().unwrap_or_default(),
            followups: self.followups.clone(),
            donation_amount: self.donation.as_ref().map(|d| d.amount),
        }
    }

    /// Force a terminal abort outside the normal transition table.
    pub(crate) fn abort(&mut self, reason: String) {
        self.phase = Phase::Finished(Ending::Aborted(reason));
    }
}

/// Apply `event` to `state`, returning the resulting phase.
///
/// Events that do not belong to the current phase leave the state untouched
/// and return `ConversationError::InvalidEvent`.
pub fn transition(
    state: &mut ConversationState,
    event: Event,
) -> Result<Phase, ConversationError> {
    let invalid = |state: &ConversationState, event: &Event| ConversationError::InvalidEvent {
        phase: state.phase.to_string(),
        event: event.name().to_string(),
    };

    let next = match (&state.phase, event) {
        (Phase::Intake, Event::IntakeSubmitted(text)) => {
            let text = text.trim();
            if text.is_empty() {
                Phase::Intake
            } else {
                state.question = Some(text.to_string());
                state.messages.push(ChatMessage::user(text));
                Phase::Followup
            }
        }
        (Phase::Intake, Event::InputClosed) => Phase::Finished(Ending::Abandoned),

        (Phase::Followup, Event::FollowupQuestions(questions)) if state.followups.is_empty() => {
            let mut questions: Vec<String> = questions
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .take(MAX_FOLLOWUP_QUESTIONS)
                .collect();
            if questions.is_empty() {
                questions = complete_questions(questions);
            }
            state.followups = questions
                .into_iter()
                .map(|question| FollowupExchange {
                    question,
                    answer: None,
                })
                .collect();
            Phase::Followup
        }
        (Phase::Followup, Event::FollowupAnswer(text)) if !state.followups.is_empty() => {
            state.followup_attempts += 1;
            let answer = text.trim();
            if !answer.is_empty()
                && let Some(idx) = state.next_unanswered()
            {
                let exchange = &mut state.followups[idx];
                exchange.answer = Some(answer.to_string());
                state
                    .messages
                    .push(ChatMessage::assistant(exchange.question.clone()));
                state.messages.push(ChatMessage::user(answer));
            }
            if state.next_unanswered().is_none() || state.followup_attempts_left() == 0 {
                Phase::Preview
            } else {
                Phase::Followup
            }
        }
        (Phase::Followup, Event::InputClosed) => Phase::Preview,

        (Phase::Preview, Event::PreviewReady(text)) => {
            state.messages.push(ChatMessage::assistant(text.clone()));
            state.preview = Some(text);
            state.round += 1;
            Phase::DonationGate
        }
        (Phase::Preview, Event::PreviewFailed(_)) => {
            state.preview = Some(FALLBACK_PREVIEW.to_string());
            state.round += 1;
            Phase::DonationGate
        }

        (Phase::DonationGate, Event::DonationVerified(donation)) => {
            if state.donation.is_none() {
                state.donation = Some(donation);
                Phase::Advice
            } else {
                state.extra_donations.push(donation);
                Phase::Close
            }
        }
        (Phase::DonationGate, Event::DonationTimedOut) => Phase::Finished(Ending::DonationTimedOut),
        (Phase::DonationGate, Event::DonationNotConfirmed) => {
            if state.donation.is_none() {
                Phase::Finished(Ending::DonationNotConfirmed)
            } else {
                Phase::Finished(Ending::Completed)
            }
        }

        (Phase::Advice, Event::AdviceReady(text)) => {
            state.messages.push(ChatMessage::assistant(text.clone()));
            state.advice = Some(text);
            if state.tier().is_some_and(|t| t.is_premium()) {
                Phase::Oracle
            } else {
                Phase::Close
            }
        }
        (Phase::Advice, Event::AdviceFailed(reason)) => Phase::Finished(Ending::Aborted(reason)),

        (Phase::Oracle, Event::OracleReady(text)) => {
            state.messages.push(ChatMessage::assistant(text.clone()));
            state.oracle = Some(text);
            Phase::Close
        }
        (Phase::Oracle, Event::OracleFailed(_)) => Phase::Close,

        (Phase::Close, Event::CloseAnswered { another_round: true }) => {
            state.round += 1;
            Phase::DonationGate
        }
        (Phase::Close, Event::CloseAnswered { another_round: false } | Event::InputClosed) => {
            Phase::Finished(Ending::Completed)
        }

        (_, event) => return Err(invalid(state, &event)),
    };

    if next != state.phase {
        debug_assert!(
            state.phase.can_transition_to(&next),
            "transition table out of sync: {} -> {}",
            state.phase,
            next
        );
        state.phase = next.clone();
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn donation(tx_id: &str, amount: Decimal) -> ConfirmedDonation {
        ConfirmedDonation {
            amount,
            tx_id: tx_id.to_string(),
        }
    }

    fn state() -> ConversationState {
        ConversationState::new(dec!(10), 6)
    }

    /// Drive a fresh state up to the donation gate.
    fn at_gate() -> ConversationState {
        let mut s = state();
        transition(&mut s, Event::IntakeSubmitted("What is my purpose?".into())).unwrap();
        transition(&mut s, Event::FollowupQuestions(vec!["Why now?".into()])).unwrap();
        transition(&mut s, Event::FollowupAnswer("Because AGI.".into())).unwrap();
        transition(&mut s, Event::PreviewReady("A preview.".into())).unwrap();
        assert_eq!(s.phase, Phase::DonationGate);
        s
    }

    #[test]
    fn empty_intake_does_not_advance() {
        let mut s = state();
        assert_eq!(transition(&mut s, Event::IntakeSubmitted("   ".into())).unwrap(), Phase::Intake);
        assert!(s.question().is_none());
        assert_eq!(
            transition(&mut s, Event::IntakeSubmitted("  Why am I here? ".into())).unwrap(),
            Phase::Followup
        );
        assert_eq!(s.question(), Some("Why am I here?"));
    }

    #[test]
    fn followups_capped_at_three() {
        let mut s = state();
        transition(&mut s, Event::IntakeSubmitted("q".into())).unwrap();
        let qs = (1..=5).map(|i| format!("Question {i}?")).collect();
        transition(&mut s, Event::FollowupQuestions(qs)).unwrap();
        assert_eq!(s.followups().len(), 3);
    }

    #[test]
    fn no_questions_fall_back_to_defaults() {
        let mut s = state();
        transition(&mut s, Event::IntakeSubmitted("q".into())).unwrap();
        transition(&mut s, Event::FollowupQuestions(vec!["  ".into()])).unwrap();
        assert_eq!(s.followups().len(), 3);
    }

    #[test]
    fn empty_answers_reprompt_until_budget_exhausted() {
        let mut s = ConversationState::new(dec!(10), 3);
        transition(&mut s, Event::IntakeSubmitted("q".into())).unwrap();
        transition(&mut s, Event::FollowupQuestions(vec!["A?".into(), "B?".into()])).unwrap();

        assert_eq!(transition(&mut s, Event::FollowupAnswer("".into())).unwrap(), Phase::Followup);
        assert_eq!(s.next_unanswered(), Some(0));
        assert_eq!(transition(&mut s, Event::FollowupAnswer("yes".into())).unwrap(), Phase::Followup);
        // third attempt exhausts the budget even though B? is unanswered
        assert_eq!(transition(&mut s, Event::FollowupAnswer(" ".into())).unwrap(), Phase::Preview);
        assert_eq!(s.followups()[0].answer.as_deref(), Some("yes"));
        assert!(s.followups()[1].answer.is_none());
    }

    #[test]
    fn closed_input_during_followup_keeps_partial_context() {
        let mut s = state();
        transition(&mut s, Event::IntakeSubmitted("q".into())).unwrap();
        transition(&mut s, Event::FollowupQuestions(vec!["A?".into(), "B?".into()])).unwrap();
        transition(&mut s, Event::FollowupAnswer("a".into())).unwrap();
        assert_eq!(transition(&mut s, Event::InputClosed).unwrap(), Phase::Preview);
        assert_eq!(s.generation_context().followups.len(), 2);
    }

    #[test]
    fn preview_failure_uses_fallback() {
        let mut s = state();
        transition(&mut s, Event::IntakeSubmitted("q".into())).unwrap();
        transition(&mut s, Event::FollowupQuestions(vec!["A?".into()])).unwrap();
        transition(&mut s, Event::FollowupAnswer("a".into())).unwrap();
        let next = transition(&mut s, Event::PreviewFailed("provider down".into())).unwrap();
        assert_eq!(next, Phase::DonationGate);
        assert_eq!(s.preview(), Some(FALLBACK_PREVIEW));
        assert_eq!(s.round(), 1);
    }

    #[test]
    fn standard_donation_skips_oracle() {
        let mut s = at_gate();
        transition(&mut s, Event::DonationVerified(donation("T1", dec!(2)))).unwrap();
        assert_eq!(s.tier(), Some(Tier::Standard));
        assert_eq!(transition(&mut s, Event::AdviceReady("advice".into())).unwrap(), Phase::Close);
    }

    #[test]
    fn premium_boundary_reaches_oracle() {
        let mut s = at_gate();
        transition(&mut s, Event::DonationVerified(donation("T1", dec!(10)))).unwrap();
        assert_eq!(s.tier(), Some(Tier::Premium));
        assert_eq!(transition(&mut s, Event::AdviceReady("advice".into())).unwrap(), Phase::Oracle);
        assert_eq!(transition(&mut s, Event::OracleFailed("silent".into())).unwrap(), Phase::Close);
        assert!(s.oracle().is_none());
    }

    #[test]
    fn timeout_is_distinct_terminal() {
        let mut s = at_gate();
        let next = transition(&mut s, Event::DonationTimedOut).unwrap();
        assert_eq!(next, Phase::Finished(Ending::DonationTimedOut));
        assert!(s.advice().is_none());
        assert!(transition(&mut s, Event::AdviceReady("late".into())).is_err());
    }

    #[test]
    fn advice_failure_aborts() {
        let mut s = at_gate();
        transition(&mut s, Event::DonationVerified(donation("T1", dec!(50)))).unwrap();
        let next = transition(&mut s, Event::AdviceFailed("auth".into())).unwrap();
        assert_eq!(next, Phase::Finished(Ending::Aborted("auth".into())));
    }

    #[test]
    fn second_round_does_not_change_tier() {
        let mut s = at_gate();
        transition(&mut s, Event::DonationVerified(donation("T1", dec!(3)))).unwrap();
        transition(&mut s, Event::AdviceReady("advice".into())).unwrap();
        assert_eq!(
            transition(&mut s, Event::CloseAnswered { another_round: true }).unwrap(),
            Phase::DonationGate
        );
        assert_eq!(s.round(), 2);
        assert_eq!(
            transition(&mut s, Event::DonationVerified(donation("T2", dec!(100)))).unwrap(),
            Phase::Close
        );
        assert_eq!(s.tier(), Some(Tier::Standard));
        assert_eq!(s.donation().unwrap().tx_id, "T1");
        assert_eq!(s.extra_donations().len(), 1);
        assert_eq!(
            transition(&mut s, Event::CloseAnswered { another_round: false }).unwrap(),
            Phase::Finished(Ending::Completed)
        );
    }

    #[test]
    fn unconfirmed_later_round_still_completes() {
        let mut s = at_gate();
        transition(&mut s, Event::DonationVerified(donation("T1", dec!(3)))).unwrap();
        transition(&mut s, Event::AdviceReady("advice".into())).unwrap();
        transition(&mut s, Event::CloseAnswered { another_round: true }).unwrap();
        assert_eq!(
            transition(&mut s, Event::DonationNotConfirmed).unwrap(),
            Phase::Finished(Ending::Completed)
        );
    }

    #[test]
    fn out_of_phase_event_rejected_without_change() {
        let mut s = state();
        let err = transition(&mut s, Event::DonationTimedOut).unwrap_err();
        assert!(matches!(err, ConversationError::InvalidEvent { .. }));
        assert_eq!(s.phase, Phase::Intake);

        // answers before questions are generated
        transition(&mut s, Event::IntakeSubmitted("q".into())).unwrap();
        assert!(transition(&mut s, Event::FollowupAnswer("a".into())).is_err());
    }

    #[test]
    fn invalid_transitions() {
        use Phase::*;
        // Skip phases
        assert!(!Intake.can_transition_to(&Preview));
        assert!(!Preview.can_transition_to(&Advice));
        // Go backward
        assert!(!Advice.can_transition_to(&DonationGate));
        assert!(!Close.can_transition_to(&Advice));
        // Terminal
        assert!(!Finished(Ending::Completed).can_transition_to(&Intake));
        // Self-transition
        assert!(!Followup.can_transition_to(&Followup));
        // The CLOSE loop
        assert!(Close.can_transition_to(&DonationGate));
    }

    #[test]
    fn messages_record_the_exchange() {
        let s = at_gate();
        let roles: Vec<_> = s.messages().iter().map(|m| m.role).collect();
        use crate::llm::Role::*;
        assert_eq!(roles, vec![User, Assistant, User, Assistant]);
    }
}
