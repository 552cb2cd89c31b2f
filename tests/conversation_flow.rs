//! End-to-end runs of the conversation through the public API.
//!
//! The real guidance generator and verifier are wired to a stub LLM and a
//! stub ledger; a manual clock stands in for the polling delays.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::timeout;

use kairos::channels::{ScriptedChannel, Transcript, TranscriptLine};
use kairos::conversation::{Ending, Orchestrator, OrchestratorSettings, RunReport};
use kairos::donation::{DonationRequirement, DonationVerifier, ManualClock, Tier};
use kairos::error::{LedgerError, LlmError};
use kairos::guidance::{LlmGuidanceGenerator, PromptSet};
use kairos::ledger::{LedgerClient, ObservedTransfer};
use kairos::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const WALLET: &str = "rKairosWallet";

/// Stub LLM provider; answers by the max-token hint each template sends.
struct StubLlm;

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (Decimal::ZERO, Decimal::ZERO)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        assert_eq!(request.messages[0].role, Role::System);
        let content = match request.max_tokens {
            Some(300) => "1. What do you love doing?\n2. What are you avoiding?\n3. Who are you without work?",
            Some(200) => "Your answers point toward mentoring. There is a harder truth underneath. And more.",
            Some(2000) => "Start teaching one evening a week and see what it stirs.",
            Some(1000) => "A door you closed years ago is still warm.",
            other => panic!("unexpected max_tokens {other:?}"),
        };
        Ok(CompletionResponse {
            content: content.to_string(),
            input_tokens: 120,
            output_tokens: 40,
            finish_reason: FinishReason::Stop,
        })
    }
}

/// Serves one transfer list per poll, repeating the last.
struct StubLedger {
    polls: Vec<Vec<ObservedTransfer>>,
    calls: AtomicU32,
}

#[async_trait]
impl LedgerClient for StubLedger {
    async fn query_transfers(
        &self,
        recipient: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<ObservedTransfer>, LedgerError> {
        assert_eq!(recipient, WALLET);
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        Ok(self
            .polls
            .get(call)
            .or_else(|| self.polls.last())
            .cloned()
            .unwrap_or_default())
    }
}

fn transfer(tx_id: &str, amount: Decimal) -> ObservedTransfer {
    ObservedTransfer {
        tx_id: tx_id.to_string(),
        sender: "rDonor".to_string(),
        recipient: WALLET.to_string(),
        amount,
        currency: "PFT".to_string(),
        issuer: None,
        memos: vec![],
        timestamp: Utc::now(),
        ledger_index: 90_000_000,
    }
}

async fn run(answers: &[&str], polls: Vec<Vec<ObservedTransfer>>) -> (RunReport, Transcript, Arc<ManualClock>) {
    let requirement = DonationRequirement::new(
        WALLET,
        dec!(2),
        dec!(10),
        Duration::from_secs(10),
        Duration::from_secs(300),
    )
    .unwrap()
    .with_require_memo(false);

    let ledger = Arc::new(StubLedger {
        polls,
        calls: AtomicU32::new(0),
    });
    let clock = Arc::new(ManualClock::new());
    let verifier = DonationVerifier::new(ledger, clock.clone(), 3);
    let generator = Arc::new(LlmGuidanceGenerator::new(Arc::new(StubLlm), PromptSet::default()));
    let channel = ScriptedChannel::new(answers.iter().copied());
    let transcript = channel.transcript();

    let orchestrator = Orchestrator::new(
        requirement,
        OrchestratorSettings::default(),
        generator,
        verifier,
        Box::new(channel),
    );
    let report = timeout(TEST_TIMEOUT, orchestrator.run())
        .await
        .expect("run timed out");
    (report, transcript, clock)
}

const ANSWERS: [&str; 6] = [
    "How do I find meaning after my job is automated?",
    "Woodworking and long walks",
    "Telling my family I'm unhappy",
    "Someone who makes things by hand",
    "DONATED",
    "no",
];

#[tokio::test]
async fn standard_run_delivers_advice_only() {
    let (report, transcript, clock) = run(&ANSWERS, vec![vec![transfer("A1B2", dec!(2))]]).await;

    assert_eq!(report.ending, Ending::Completed);
    assert_eq!(report.state.tier(), Some(Tier::Standard));
    assert_eq!(report.state.donation().unwrap().tx_id, "A1B2");
    assert!(report.state.oracle().is_none());
    assert!(transcript.said_contains("Start teaching one evening a week"));
    assert!(!transcript.said_contains("A door you closed"));
    assert_eq!(clock.elapsed(), Duration::ZERO);

    // three follow-up questions were asked, numbered
    let asked: Vec<_> = transcript
        .lines()
        .into_iter()
        .filter_map(|l| match l {
            TranscriptLine::Prompt(p) if p.contains("Your answer") => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(asked.len(), 3);
    assert!(asked[0].contains("1. What do you love doing?"));
}

#[tokio::test]
async fn premium_run_adds_oracle() {
    let polls = vec![vec![], vec![], vec![transfer("C3D4", dec!(15))]];
    let (report, transcript, clock) = run(&ANSWERS, polls).await;

    assert_eq!(report.ending, Ending::Completed);
    assert_eq!(report.state.tier(), Some(Tier::Premium));
    assert_eq!(clock.elapsed(), Duration::from_secs(20));
    assert!(transcript.said_contains("A door you closed years ago is still warm."));
    assert!(transcript.said_contains("unlocking both standard guidance and Oracle Vision"));
}

#[tokio::test]
async fn missing_donation_times_out_without_guidance() {
    let (report, transcript, clock) = run(&ANSWERS[..5], vec![vec![]]).await;

    assert_eq!(report.ending, Ending::DonationTimedOut);
    assert!(report.state.advice().is_none());
    assert_eq!(clock.elapsed(), Duration::from_secs(300));
    assert!(!transcript.said_contains("Start teaching"));
    // the preview was still shown, cut to two sentences
    assert_eq!(
        report.state.preview(),
        Some("Your answers point toward mentoring. There is a harder truth underneath.")
    );
}

#[tokio::test]
async fn below_minimum_transfer_is_ignored() {
    let (report, _, _) = run(&ANSWERS[..5], vec![vec![transfer("SMALL", dec!(1.99))]]).await;
    assert_eq!(report.ending, Ending::DonationTimedOut);
    assert!(report.state.donation().is_none());
}
