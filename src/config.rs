//! Ledger and flow configuration.
//!
//! Loaded from TOML. Decimal values are written as quoted strings so they
//! never pass through floating point:
//!
//! ```toml
//! [ledger]
//! lock_timeout_ms = 250
//!
//! [policy]
//! signup_bonus = "50"
//!
//! [policy.transfer]
//! min = "10"
//! max = "50000"
//! fee_rate = "0.02"
//! ```

use crate::decimal::{Credits, FeeRate};
use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub policy: Policy,
}

impl Config {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Config = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<()> {
        self.ledger.validate()?;
        self.policy.validate()
    }
}

/// Engine-level settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// How long an operation waits for an account lock before failing.
    pub lock_timeout_ms: u64,

    /// Generated-reference collisions tolerated per record.
    pub reference_attempts: usize,

    /// Route platform fees to a dedicated account instead of dropping them.
    pub platform_account: bool,
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(LedgerError::Config("lock_timeout_ms must be positive".into()));
        }
        if self.reference_attempts == 0 {
            return Err(LedgerError::Config("reference_attempts must be positive".into()));
        }
        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            lock_timeout_ms: 250,
            reference_attempts: 8,
            platform_account: false,
        }
    }
}

/// Amount bounds and fee for one flow.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    pub min: Credits,
    pub max: Option<Credits>,
    #[serde(default)]
    pub fee_rate: FeeRate,
}

impl Limits {
    fn validate(&self, name: &str) -> Result<()> {
        if !self.min.is_positive() {
            return Err(LedgerError::Config(format!("{name}.min must be positive")));
        }
        if let Some(max) = self.max {
            if max < self.min {
                return Err(LedgerError::Config(format!("{name}.max is below {name}.min")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadingPolicy {
    pub credits_per_page: Credits,
    /// Most a reader can earn per UTC day.
    pub daily_cap: Credits,
    /// Cut of the reading reward paid to the book's author; the reader
    /// keeps the rest.
    pub author_share: FeeRate,
}

impl Default for ReadingPolicy {
    fn default() -> Self {
        ReadingPolicy {
            credits_per_page: Credits::whole(1),
            daily_cap: Credits::whole(50),
            author_share: FeeRate::percent(80),
        }
    }
}

/// Business-rule values used by the flows.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    pub signup_bonus: Credits,
    pub transfer: Limits,
    pub marketplace_fee_rate: FeeRate,
    pub listing_min_price: Credits,
    pub reading: ReadingPolicy,
    pub watch_reward: Credits,
    pub vote_reward: Credits,
    pub upload_bonus: Credits,
    pub donation: Limits,
}

impl Policy {
    pub fn validate(&self) -> Result<()> {
        self.transfer.validate("transfer")?;
        self.donation.validate("donation")?;

        let rewards = [
            ("signup_bonus", self.signup_bonus),
            ("watch_reward", self.watch_reward),
            ("vote_reward", self.vote_reward),
            ("upload_bonus", self.upload_bonus),
            ("reading.credits_per_page", self.reading.credits_per_page),
            ("reading.daily_cap", self.reading.daily_cap),
        ];
        for (name, value) in rewards {
            if value.is_negative() {
                return Err(LedgerError::Config(format!("{name} must not be negative")));
            }
        }
        if !self.listing_min_price.is_positive() {
            return Err(LedgerError::Config("listing_min_price must be positive".into()));
        }
        Ok(())
    }
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            signup_bonus: Credits::whole(50),
            transfer: Limits {
                min: Credits::whole(10),
                max: Some(Credits::whole(50_000)),
                fee_rate: FeeRate::percent(2),
            },
            marketplace_fee_rate: FeeRate::percent(5),
            listing_min_price: Credits::whole(1),
            reading: ReadingPolicy::default(),
            watch_reward: Credits::whole(2),
            vote_reward: Credits::whole(5),
            upload_bonus: Credits::whole(10),
            donation: Limits {
                min: Credits::whole(1),
                max: None,
                fee_rate: FeeRate::ZERO,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ledger.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.policy.transfer.fee_rate, FeeRate::percent(2));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.policy.signup_bonus, Credits::whole(50));
        assert!(!config.ledger.platform_account);
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml_str(
            r#"
            [ledger]
            platform_account = true

            [policy]
            signup_bonus = "100"

            [policy.transfer]
            min = "1"
            fee_rate = "0.1"

            [policy.reading]
            daily_cap = "25"
            "#,
        )
        .unwrap();

        assert!(config.ledger.platform_account);
        assert_eq!(config.ledger.reference_attempts, 8);
        assert_eq!(config.policy.signup_bonus, Credits::whole(100));
        assert_eq!(config.policy.transfer.min, Credits::whole(1));
        assert_eq!(config.policy.transfer.max, None);
        assert_eq!(config.policy.transfer.fee_rate, FeeRate::percent(10));
        assert_eq!(config.policy.reading.daily_cap, Credits::whole(25));
        assert_eq!(config.policy.reading.author_share, FeeRate::percent(80));
    }

    #[test]
    fn test_rejects_out_of_range_rate() {
        let err = Config::from_toml_str(
            r#"
            [policy]
            marketplace_fee_rate = "1.5"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let err = Config::from_toml_str(
            r#"
            [policy.transfer]
            min = "100"
            max = "10"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(Config::from_toml_str("[ledger]\nshards = 4\n").is_err());
    }

    #[test]
    fn test_author_takes_the_larger_reading_share() {
        let reading = Policy::default().reading;
        assert_eq!(reading.author_share, FeeRate::percent(80));
        assert_eq!(
            Credits::whole(10).portion(reading.author_share),
            Credits::whole(8)
        );
    }

    #[test]
    fn test_rejects_oversized_amount() {
        let err = Config::from_toml_str(
            r#"
            [policy]
            signup_bonus = "50000000000000000000000000000"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }
}
