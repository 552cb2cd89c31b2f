//! Donation gate — requirement, tiers, and ledger verification.

pub mod clock;
pub mod memo;
pub mod requirement;
pub mod verifier;

pub use clock::{Clock, ManualClock, TokioClock};
pub use memo::generate_memo;
pub use requirement::DonationRequirement;
pub use verifier::{CancelHandle, DonationVerifier, VerificationOutcome};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A donation the verifier confirmed on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedDonation {
    pub amount: Decimal,
    pub tx_id: String,
}

/// Service tier unlocked by a donation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Standard,
    Premium,
}

impl Tier {
    /// Premium iff `amount >= premium_threshold`.
    pub fn for_amount(amount: Decimal, premium_threshold: Decimal) -> Self {
        if amount >= premium_threshold {
            Self::Premium
        } else {
            Self::Standard
        }
    }

    pub fn is_premium(&self) -> bool {
        matches!(self, Self::Premium)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn premium_boundary_is_inclusive() {
        let threshold = dec!(10);
        assert_eq!(Tier::for_amount(dec!(10), threshold), Tier::Premium);
        assert_eq!(Tier::for_amount(dec!(10.000), threshold), Tier::Premium);
        assert_eq!(Tier::for_amount(dec!(9.999999), threshold), Tier::Standard);
        assert_eq!(Tier::for_amount(dec!(15), threshold), Tier::Premium);
        assert_eq!(Tier::for_amount(dec!(2), threshold), Tier::Standard);
    }
}
