//! Per-run donation requirement.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::ConfigError;

/// What a transfer must look like to pass the gate. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationRequirement {
    recipient: String,
    min_amount: Decimal,
    premium_threshold: Decimal,
    poll_interval: Duration,
    timeout: Duration,
    currency: String,
    issuer: Option<String>,
    require_memo: bool,
}

impl DonationRequirement {
    /// Build and validate a requirement.
    ///
    /// Requires `min_amount > 0`, `premium_threshold >= min_amount` and
    /// `poll_interval < timeout`.
    pub fn new(
        recipient: impl Into<String>,
        min_amount: Decimal,
        premium_threshold: Decimal,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let recipient = recipient.into();
        if recipient.trim().is_empty() {
            return Err(invalid("WALLET_ADDRESS", "recipient address is empty"));
        }
        if min_amount <= Decimal::ZERO {
            return Err(invalid("MIN_AMOUNT", "must be greater than zero"));
        }
        if premium_threshold < min_amount {
            return Err(invalid(
                "MIN_AMOUNT_ADDON",
                "premium threshold must be at least the minimum amount",
            ));
        }
        if poll_interval.is_zero() || poll_interval >= timeout {
            return Err(invalid(
                "POLL_INTERVAL",
                "must be non-zero and shorter than TIMEOUT",
            ));
        }
        Ok(Self {
            recipient,
            min_amount,
            premium_threshold,
            poll_interval,
            timeout,
            currency: "PFT".to_string(),
            issuer: None,
            require_memo: true,
        })
    }

    /// Token the donation must be paid in.
    pub fn with_currency(mut self, currency: impl Into<String>, issuer: Option<String>) -> Self {
        self.currency = currency.into();
        self.issuer = issuer;
        self
    }

    pub fn with_require_memo(mut self, require_memo: bool) -> Self {
        self.require_memo = require_memo;
        self
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn min_amount(&self) -> Decimal {
        self.min_amount
    }

    pub fn premium_threshold(&self) -> Decimal {
        self.premium_threshold
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    pub fn require_memo(&self) -> bool {
        self.require_memo
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn accepts_valid_requirement() {
        let req = DonationRequirement::new("rWallet", dec!(2), dec!(10), secs(10), secs(300)).unwrap();
        assert_eq!(req.min_amount(), dec!(2));
        assert_eq!(req.currency(), "PFT");
        assert!(req.require_memo());
    }

    #[test]
    fn premium_may_equal_minimum() {
        assert!(DonationRequirement::new("rWallet", dec!(5), dec!(5), secs(1), secs(2)).is_ok());
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            DonationRequirement::new("rWallet", dec!(0), dec!(10), secs(10), secs(300)),
            DonationRequirement::new("rWallet", dec!(-1), dec!(10), secs(10), secs(300)),
            DonationRequirement::new("rWallet", dec!(10), dec!(9.99), secs(10), secs(300)),
            DonationRequirement::new("rWallet", dec!(2), dec!(10), secs(300), secs(300)),
            DonationRequirement::new("rWallet", dec!(2), dec!(10), secs(0), secs(300)),
            DonationRequirement::new("  ", dec!(2), dec!(10), secs(10), secs(300)),
        ];
        for case in cases {
            assert!(matches!(case, Err(ConfigError::InvalidValue { .. })));
        }
    }
}
