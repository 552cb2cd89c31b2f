//! Donation verifier — polls the ledger until a qualifying transfer appears.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::donation::{Clock, ConfirmedDonation, DonationRequirement};
use crate::ledger::{LedgerClient, ObservedTransfer};

/// Result of one gate verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// A transfer qualified. Returned as soon as it is seen.
    Confirmed {
        donation: ConfirmedDonation,
        polls: u32,
    },
    /// Nothing qualified before the timeout, or the wait was cancelled.
    TimedOut {
        elapsed: Duration,
        polls: u32,
        cancelled: bool,
    },
    /// Too many consecutive ledger query failures.
    Failed { reason: String, polls: u32 },
}

/// Cancels an in-progress donation wait from another task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancel: Arc<AtomicBool>,
    waiting: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Request that the current wait end as a timeout.
    ///
    /// Returns `false` when no wait is running or one was already cancelled;
    /// the request is then ignored.
    pub fn cancel(&self) -> bool {
        self.waiting.load(Ordering::SeqCst) && !self.cancel.swap(true, Ordering::SeqCst)
    }

    /// Whether a donation wait is in progress.
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }
}

/// Marks a wait as active for as long as it lives.
struct ActiveWait(Arc<AtomicBool>);

impl ActiveWait {
    fn enter(waiting: &Arc<AtomicBool>) -> Self {
        waiting.store(true, Ordering::SeqCst);
        Self(Arc::clone(waiting))
    }
}

impl Drop for ActiveWait {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Watches the ledger for donations over the lifetime of one run.
///
/// Transaction ids that confirmed an earlier round are remembered and never
/// confirm again.
pub struct DonationVerifier {
    ledger: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    max_consecutive_failures: u32,
    since: DateTime<Utc>,
    consumed: HashSet<String>,
    cancel: Arc<AtomicBool>,
    waiting: Arc<AtomicBool>,
}

impl DonationVerifier {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        clock: Arc<dyn Clock>,
        max_consecutive_failures: u32,
    ) -> Self {
        let since = clock.wall_now();
        Self {
            ledger,
            clock,
            max_consecutive_failures: max_consecutive_failures.max(1),
            since,
            consumed: HashSet::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            waiting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for cancelling waits; only effective while `verify` runs.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: Arc::clone(&self.cancel),
            waiting: Arc::clone(&self.waiting),
        }
    }

    /// Whether a transaction id already confirmed a round.
    pub fn is_consumed(&self, tx_id: &str) -> bool {
        self.consumed.contains(tx_id)
    }

    /// Poll until a qualifying transfer is seen, the timeout elapses, or the
    /// ledger fails too many times in a row.
    ///
    /// When `memo` is given only transfers carrying that memo qualify. A query
    /// still in flight at the deadline is abandoned, so the wait never runs
    /// past `timeout` by more than one poll interval.
    pub async fn verify(
        &mut self,
        requirement: &DonationRequirement,
        memo: Option<&str>,
    ) -> VerificationOutcome {
        // a cancel requested outside a wait must not end this one
        self.cancel.store(false, Ordering::SeqCst);
        let _active = ActiveWait::enter(&self.waiting);

        let start = self.clock.now();
        let mut polls = 0u32;
        let mut consecutive_failures = 0u32;

        info!(
            recipient = requirement.recipient(),
            min_amount = %requirement.min_amount(),
            timeout_secs = requirement.timeout().as_secs(),
            memo = memo.unwrap_or("-"),
            "Waiting for donation"
        );

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                info!(polls, "Donation wait cancelled");
                return VerificationOutcome::TimedOut {
                    elapsed: self.clock.now().saturating_duration_since(start),
                    polls,
                    cancelled: true,
                };
            }

            polls += 1;
            let remaining = requirement
                .timeout()
                .saturating_sub(self.clock.now().saturating_duration_since(start));
            let queried = tokio::select! {
                biased;
                result = self.ledger.query_transfers(requirement.recipient(), self.since) => Some(result),
                _ = self.clock.sleep(remaining) => None,
            };
            let Some(queried) = queried else {
                let elapsed = self.clock.now().saturating_duration_since(start);
                info!(polls, elapsed_secs = elapsed.as_secs(), "Donation wait timed out during a ledger query");
                return VerificationOutcome::TimedOut {
                    elapsed,
                    polls,
                    cancelled: false,
                };
            };

            match queried {
                Ok(transfers) => {
                    consecutive_failures = 0;
                    if let Some(best) = self.select(requirement, memo, &transfers) {
                        let donation = ConfirmedDonation {
                            amount: best.amount,
                            tx_id: best.tx_id.clone(),
                        };
                        self.consumed.insert(best.tx_id.clone());
                        info!(
                            tx_id = %donation.tx_id,
                            amount = %donation.amount,
                            polls,
                            "Donation confirmed"
                        );
                        return VerificationOutcome::Confirmed { donation, polls };
                    }
                    debug!(polls, seen = transfers.len(), "No qualifying transfer yet");
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        polls,
                        consecutive_failures,
                        "Ledger query failed: {}", e
                    );
                    if consecutive_failures >= self.max_consecutive_failures {
                        return VerificationOutcome::Failed {
                            reason: e.to_string(),
                            polls,
                        };
                    }
                }
            }

            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= requirement.timeout() {
                info!(polls, elapsed_secs = elapsed.as_secs(), "Donation wait timed out");
                return VerificationOutcome::TimedOut {
                    elapsed,
                    polls,
                    cancelled: false,
                };
            }

            let remaining = requirement.timeout() - elapsed;
            self.clock
                .sleep(requirement.poll_interval().min(remaining))
                .await;
        }
    }

    /// Largest individually-qualifying transfer; ties go to the earliest one.
    fn select<'a>(
        &self,
        requirement: &DonationRequirement,
        memo: Option<&str>,
        transfers: &'a [ObservedTransfer],
    ) -> Option<&'a ObservedTransfer> {
        transfers
            .iter()
            .filter(|t| t.recipient == requirement.recipient())
            .filter(|t| t.currency == requirement.currency())
            .filter(|t| requirement.issuer().is_none_or(|i| t.issuer.as_deref() == Some(i)))
            .filter(|t| t.amount >= requirement.min_amount())
            .filter(|t| memo.is_none_or(|m| t.memos.iter().any(|tm| tm == m)))
            .filter(|t| !self.consumed.contains(&t.tx_id))
            .max_by(|a, b| {
                a.amount
                    .cmp(&b.amount)
                    .then_with(|| b.timestamp.cmp(&a.timestamp))
                    .then_with(|| b.ledger_index.cmp(&a.ledger_index))
            })
    }
}
