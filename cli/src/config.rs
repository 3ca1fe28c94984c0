//! CLI configuration with TOML file support.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use yalls_commission::RankRequirement;
use yalls_earnings::EarningsConfig;
use yalls_utils::LogFormat;

/// Configuration for the `yalls` binary.
///
/// Loaded from a TOML file via [`YallsConfig::from_toml_file`]; command-line
/// flags and `YALLS_*` environment variables override file values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YallsConfig {
    /// Directory holding the LMDB environment.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in MiB.
    #[serde(default = "default_map_size_mb")]
    pub map_size_mb: usize,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Base URL referral links point at.
    #[serde(default = "default_referral_base_url")]
    pub referral_base_url: String,

    /// Rank ladder thresholds used by `yalls rank`.
    #[serde(default)]
    pub rank_requirements: Vec<RankRequirement>,

    #[serde(default)]
    pub earnings: EarningsConfig,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./yalls_data")
}

fn default_map_size_mb() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_referral_base_url() -> String {
    "https://yalls.ai".to_string()
}

impl YallsConfig {
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn map_size_bytes(&self) -> usize {
        self.map_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for YallsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            map_size_mb: default_map_size_mb(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            referral_base_url: default_referral_base_url(),
            rank_requirements: Vec::new(),
            earnings: EarningsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = YallsConfig::from_toml_str("").unwrap();
        assert_eq!(config, YallsConfig::default());
        assert_eq!(config.map_size_bytes(), 1024 * 1024 * 1024);
    }

    #[test]
    fn partial_toml_overrides() {
        let config = YallsConfig::from_toml_str(
            r#"
            data_dir = "/var/lib/yalls"
            log_format = "json"

            [earnings]
            max_retries = 7
        "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/yalls"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.earnings.max_retries, 7);
        assert_eq!(config.earnings.write_timeout_ms, 5_000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = YallsConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(YallsConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn rank_table_parses() {
        let config = YallsConfig::from_toml_str(
            r#"
            [[rank_requirements]]
            rank = "unranked"
            min_personal_volume_cents = 0
            min_team_volume_cents = 0
            min_direct_referrals = 0
            min_active_downline = 0
            monthly_bonus_cents = 0

            [[rank_requirements]]
            rank = "bronze"
            min_personal_volume_cents = 10000
            min_team_volume_cents = 100000
            min_direct_referrals = 3
            min_active_downline = 6
            monthly_bonus_cents = 2500
        "#,
        )
        .unwrap();
        assert_eq!(config.rank_requirements.len(), 2);
        assert_eq!(config.rank_requirements[1].rank, yalls_commission::Rank::Bronze);
        assert_eq!(config.rank_requirements[1].min_direct_referrals, 3);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(YallsConfig::from_toml_file(Path::new("/nonexistent/yalls.toml")).is_err());
    }
}
