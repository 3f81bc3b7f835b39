use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Runtime-configurable knobs. Changes via `PUT /api/admin/config` take
/// effect immediately without restart (§2 "Supplemented features").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub poll_interval_seconds: u64,
    pub momentum_window_points: usize,
    pub leaderboard_top_k: usize,
    pub body_size_limit_single_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 5,
            momentum_window_points: 60,
            leaderboard_top_k: 10,
            body_size_limit_single_bytes: 1_048_576, // 1 MB
        }
    }
}

impl RuntimeConfig {
    /// Build from env vars, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("FANRIDE_POLL_INTERVAL_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.poll_interval_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("FANRIDE_MOMENTUM_WINDOW_POINTS") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.momentum_window_points = n;
            }
        }
        if let Ok(v) = std::env::var("FANRIDE_LEADERBOARD_TOP_K") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.leaderboard_top_k = n;
            }
        }
        if let Ok(v) = std::env::var("FANRIDE_BODY_SIZE_LIMIT_SINGLE_BYTES") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.body_size_limit_single_bytes = n;
            }
        }

        cfg
    }
}

pub type SharedRuntimeConfig = Arc<RwLock<RuntimeConfig>>;

pub fn new_runtime_config() -> SharedRuntimeConfig {
    Arc::new(RwLock::new(RuntimeConfig::from_env()))
}
