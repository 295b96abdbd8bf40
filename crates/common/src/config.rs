use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub hostaway: HostawayConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(".")
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Config::builder()
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/default")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/local")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(Environment::default().separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub test_admin_url: Option<String>,
}

/// Credentials and paging knobs for the Hostaway review feed.
///
/// Both `account_id` and `api_key` must be present for ingestion to run;
/// hosts check [`HostawayConfig::is_configured`] and skip the feature otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct HostawayConfig {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "HostawayConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "HostawayConfig::default_page_size")]
    pub page_size: u32,
    /// Upper bound on pages fetched per run. `None` follows the feed until a short page.
    #[serde(default = "HostawayConfig::default_max_pages")]
    pub max_pages: Option<u32>,
    #[serde(default = "HostawayConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HostawayConfig {
    fn default() -> Self {
        Self {
            account_id: None,
            api_key: None,
            base_url: Self::default_base_url(),
            page_size: Self::default_page_size(),
            max_pages: Self::default_max_pages(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

impl HostawayConfig {
    fn default_base_url() -> String {
        "https://api.hostaway.com/v1".to_string()
    }

    const fn default_page_size() -> u32 {
        100
    }

    const fn default_max_pages() -> Option<u32> {
        Some(500)
    }

    const fn default_timeout_secs() -> u64 {
        30
    }

    pub fn is_configured(&self) -> bool {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false)
        };
        present(&self.account_id) && present(&self.api_key)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "SyncConfig::default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub run_once: bool,
    /// Delete unapproved reviews older than this many days after each run.
    #[serde(default)]
    pub cleanup_after_days: Option<u32>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: Self::default_interval_secs(),
            run_once: false,
            cleanup_after_days: None,
        }
    }
}

impl SyncConfig {
    const fn default_interval_secs() -> u64 {
        3600
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "ObservabilityConfig::default_metrics_path")]
    pub metrics_path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_path: Self::default_metrics_path(),
        }
    }
}

impl ObservabilityConfig {
    fn default_metrics_path() -> String {
        "/metrics".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostaway_defaults_apply() {
        let cfg: HostawayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.base_url, "https://api.hostaway.com/v1");
        assert_eq!(cfg.page_size, 100);
        assert_eq!(cfg.max_pages, Some(500));
        assert!(!cfg.is_configured());
    }

    #[test]
    fn hostaway_requires_both_credentials() {
        let cfg: HostawayConfig =
            serde_json::from_str(r#"{"account_id": "61148", "api_key": "  "}"#).unwrap();
        assert!(!cfg.is_configured());

        let cfg: HostawayConfig =
            serde_json::from_str(r#"{"account_id": "61148", "api_key": "secret"}"#).unwrap();
        assert!(cfg.is_configured());
    }

    #[test]
    fn max_pages_can_be_disabled() {
        let cfg: HostawayConfig = serde_json::from_str(r#"{"max_pages": null}"#).unwrap();
        assert_eq!(cfg.max_pages, None);
    }
}
