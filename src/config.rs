//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;

use crate::conversation::OrchestratorSettings;
use crate::donation::DonationRequirement;
use crate::error::ConfigError;
use crate::guidance::PromptSet;
use crate::llm::{LlmBackend, LlmConfig};

pub const DEFAULT_RPC_ENDPOINT: &str = "https://xrplcluster.com";
pub const DEFAULT_LOG_FILE: &str = "kairos.log";

/// Everything a run needs, read once at startup.
#[derive(Debug, Clone)]
pub struct KairosConfig {
    pub requirement: DonationRequirement,
    /// XRPL JSON-RPC endpoint.
    pub rpc_endpoint: String,
    pub prompts: PromptSet,
    pub llm: LlmConfig,
    pub orchestrator: OrchestratorSettings,
    /// Consecutive ledger query failures tolerated per gate wait.
    pub max_query_failures: u32,
    pub log_file: PathBuf,
}

impl KairosConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for each variable. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let wallet = var("WALLET_ADDRESS")
            .ok_or_else(|| ConfigError::MissingEnvVar("WALLET_ADDRESS".to_string()))?;
        let min_amount: Decimal = parse_or(&var, "MIN_AMOUNT", Decimal::from(2))?;
        let premium_threshold: Decimal = parse_or(&var, "MIN_AMOUNT_ADDON", Decimal::from(10))?;
        let timeout_secs: u64 = parse_or(&var, "TIMEOUT", 300)?;
        let poll_interval_secs: u64 = parse_or(&var, "POLL_INTERVAL", 10)?;

        let requirement = DonationRequirement::new(
            wallet,
            min_amount,
            premium_threshold,
            Duration::from_secs(poll_interval_secs),
            Duration::from_secs(timeout_secs),
        )?
        .with_currency(
            var("DONATION_CURRENCY").unwrap_or_else(|| "PFT".to_string()),
            var("DONATION_ISSUER"),
        )
        .with_require_memo(parse_bool(&var, "REQUIRE_MEMO", true)?);

        let defaults = PromptSet::default();
        let prompts = PromptSet {
            system: var("SYSTEM_PROMPT").unwrap_or(defaults.system),
            followup_system: var("FOLLOWUP_SYSTEM_PROMPT").unwrap_or(defaults.followup_system),
            oracle_system: var("PYTHIA_SYSTEM_PROMPT").unwrap_or(defaults.oracle_system),
        };

        let backend: LlmBackend = match var("KAIROS_LLM_BACKEND") {
            Some(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "KAIROS_LLM_BACKEND".to_string(),
                message,
            })?,
            None => LlmBackend::OpenAi,
        };
        let api_key = var(backend.api_key_var())
            .ok_or_else(|| ConfigError::MissingEnvVar(backend.api_key_var().to_string()))?;
        let llm = LlmConfig {
            backend,
            api_key: SecretString::from(api_key),
            model: var("KAIROS_MODEL").unwrap_or_else(|| backend.default_model().to_string()),
        };

        let defaults = OrchestratorSettings::default();
        let orchestrator = OrchestratorSettings {
            max_followup_attempts: parse_or(
                &var,
                "MAX_FOLLOWUP_ATTEMPTS",
                defaults.max_followup_attempts,
            )?,
            gate_retries: parse_or(&var, "GATE_RETRIES", defaults.gate_retries)?,
            confirm_word: defaults.confirm_word,
        };
        if orchestrator.max_followup_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_FOLLOWUP_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let max_query_failures: u32 = parse_or(&var, "MAX_QUERY_FAILURES", 3)?;
        if max_query_failures == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_QUERY_FAILURES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            requirement,
            rpc_endpoint: var("XRPL_RPC_ENDPOINT").unwrap_or_else(|| DEFAULT_RPC_ENDPOINT.to_string()),
            prompts,
            llm,
            orchestrator,
            max_query_failures,
            log_file: var("KAIROS_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        })
    }
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

fn parse_bool(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match var(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{v}' is not a boolean"),
        }),
    }
}
