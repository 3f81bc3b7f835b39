pub mod runtime;
pub use runtime::{new_runtime_config, RuntimeConfig, SharedRuntimeConfig};

use serde::Deserialize;

/// Complete FanRide configuration, loaded from TOML at startup (§2 ambient
/// stack, §6 "Configuration").
#[derive(Debug, Clone, Deserialize)]
pub struct FanRideConfig {
    #[serde(default)]
    pub cosmos: CosmosConfig,
    #[serde(default, rename = "changeFeed")]
    pub change_feed: ChangeFeedConfig,
    #[serde(default, rename = "aflFeed")]
    pub afl_feed: AflFeedConfig,
}

impl Default for FanRideConfig {
    fn default() -> Self {
        Self {
            cosmos: CosmosConfig::default(),
            change_feed: ChangeFeedConfig::default(),
            afl_feed: AflFeedConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CosmosEnvValues {
    #[serde(default)]
    pub dev: Option<String>,
    #[serde(default)]
    pub test: Option<String>,
    #[serde(default)]
    pub prod: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CosmosContainers {
    #[serde(default = "default_container_es")]
    pub es: String,
    #[serde(default = "default_container_rm_match_state", rename = "rmMatchState")]
    pub rm_match_state: String,
    #[serde(default = "default_container_rm_tes_history", rename = "rmTesHistory")]
    pub rm_tes_history: String,
    #[serde(default = "default_container_rm_leaderboard", rename = "rmLeaderboard")]
    pub rm_leaderboard: String,
    #[serde(default = "default_container_leases")]
    pub leases: String,
}

fn default_container_es() -> String {
    "es".to_string()
}
fn default_container_rm_match_state() -> String {
    "rm_match_state".to_string()
}
fn default_container_rm_tes_history() -> String {
    "rm_tes_history".to_string()
}
fn default_container_rm_leaderboard() -> String {
    "rm_leaderboard".to_string()
}
fn default_container_leases() -> String {
    "leases".to_string()
}

impl Default for CosmosContainers {
    fn default() -> Self {
        Self {
            es: default_container_es(),
            rm_match_state: default_container_rm_match_state(),
            rm_tes_history: default_container_rm_tes_history(),
            rm_leaderboard: default_container_rm_leaderboard(),
            leases: default_container_leases(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CosmosConfig {
    #[serde(default, rename = "accountEndpoint")]
    pub account_endpoint: CosmosEnvValues,
    #[serde(default)]
    pub key: CosmosEnvValues,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub containers: CosmosContainers,
    #[serde(default = "default_consistency_level", rename = "consistencyLevel")]
    pub consistency_level: String,
    #[serde(default = "default_true", rename = "useSameType")]
    pub use_same_type: bool,
}

fn default_database() -> String {
    "fanride".to_string()
}
fn default_consistency_level() -> String {
    "Strong".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for CosmosConfig {
    fn default() -> Self {
        Self {
            account_endpoint: CosmosEnvValues::default(),
            key: CosmosEnvValues::default(),
            database: default_database(),
            containers: CosmosContainers::default(),
            consistency_level: default_consistency_level(),
            use_same_type: default_true(),
        }
    }
}

/// `changeFeed.mode`: `"live"` (default) or `"rebuild"`, with
/// `"startfrombeginning"` accepted as an alias for `"rebuild"` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectorMode {
    Live,
    Rebuild,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeFeedConfig {
    #[serde(default = "default_change_feed_mode")]
    pub mode: String,
}

fn default_change_feed_mode() -> String {
    "live".to_string()
}

impl Default for ChangeFeedConfig {
    fn default() -> Self {
        Self {
            mode: default_change_feed_mode(),
        }
    }
}

impl ChangeFeedConfig {
    pub fn parsed_mode(&self) -> ProjectorMode {
        match self.mode.to_ascii_lowercase().as_str() {
            "rebuild" | "startfrombeginning" => ProjectorMode::Rebuild,
            _ => ProjectorMode::Live,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AflFeedConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, rename = "streamId")]
    pub stream_id: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_poll_interval", rename = "pollIntervalSeconds")]
    pub poll_interval_seconds: u64,
    #[serde(default, rename = "apiKeyHeader")]
    pub api_key_header: Option<String>,
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for AflFeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stream_id: String::new(),
            endpoint: String::new(),
            poll_interval_seconds: default_poll_interval(),
            api_key_header: None,
            api_key: None,
        }
    }
}

impl AflFeedConfig {
    /// Resolves `apiKey`, following `env:VAR` indirection if present.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.as_deref().map(resolve_secret)
    }
}

/// Resolves an `env:VAR` indirection to the named environment variable's
/// value; any other string passes through unchanged.
pub fn resolve_secret(value: &str) -> String {
    match value.strip_prefix("env:") {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => value.to_string(),
    }
}

impl FanRideConfig {
    /// Fatal startup checks (§6 "Startup validates strong consistency and
    /// parity; misconfiguration is fatal").
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cosmos.consistency_level != "Strong" {
            anyhow::bail!(
                "cosmos.consistencyLevel must be \"Strong\", got {:?}",
                self.cosmos.consistency_level
            );
        }
        if !self.cosmos.use_same_type {
            anyhow::bail!("cosmos.useSameType must be true");
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file at `path`.
pub fn load_config(path: &str) -> Result<FanRideConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: FanRideConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Path to the config file, overridable via `FANRIDE_CONFIG` (§2 ambient stack).
pub fn config_path() -> String {
    std::env::var("FANRIDE_CONFIG").unwrap_or_else(|_| "config.toml".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_strong_and_valid() {
        let cfg = FanRideConfig::default();
        assert_eq!(cfg.cosmos.consistency_level, "Strong");
        assert!(cfg.cosmos.use_same_type);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn weak_consistency_fails_validation() {
        let mut cfg = FanRideConfig::default();
        cfg.cosmos.consistency_level = "Eventual".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn change_feed_mode_aliases_resolve_to_rebuild() {
        let mut cfg = ChangeFeedConfig::default();
        assert_eq!(cfg.parsed_mode(), ProjectorMode::Live);
        cfg.mode = "StartFromBeginning".to_string();
        assert_eq!(cfg.parsed_mode(), ProjectorMode::Rebuild);
        cfg.mode = "rebuild".to_string();
        assert_eq!(cfg.parsed_mode(), ProjectorMode::Rebuild);
    }

    #[test]
    fn env_secret_indirection_resolves() {
        std::env::set_var("FANRIDE_TEST_SECRET", "resolved-value");
        assert_eq!(resolve_secret("env:FANRIDE_TEST_SECRET"), "resolved-value");
        assert_eq!(resolve_secret("literal-value"), "literal-value");
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let toml = r#"
            [changeFeed]
            mode = "rebuild"
        "#;
        let cfg: FanRideConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.change_feed.parsed_mode(), ProjectorMode::Rebuild);
        assert_eq!(cfg.cosmos.database, "fanride");
    }
}
