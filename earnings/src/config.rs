//! Service tuning, loadable from the `[earnings]` table of the config file.

use serde::{Deserialize, Serialize};
use yalls_types::PayoutGateway;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsConfig {
    /// Extra attempts after the first for transient store failures and timeouts.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubled per retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Upper bound on a single store call.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Gateway used when a payout request names none.
    #[serde(default)]
    pub default_gateway: PayoutGateway,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

impl Default for EarningsConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            default_gateway: PayoutGateway::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_uses_defaults() {
        let config: EarningsConfig = toml::from_str("").unwrap();
        assert_eq!(config, EarningsConfig::default());
        assert_eq!(config.default_gateway, PayoutGateway::Stripe);
    }

    #[test]
    fn partial_table_overrides() {
        let config: EarningsConfig = toml::from_str(
            r#"
            max_retries = 5
            default_gateway = "venmo"
        "#,
        )
        .unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.default_gateway, PayoutGateway::Venmo);
        assert_eq!(config.write_timeout_ms, 5_000);
    }
}
