use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_KEYSPACE: &str = "kairos";
pub const DEFAULT_NODE_NAME: &str = "local";
pub const DEFAULT_LOCK_TTL_SECS: u64 = 15;
pub const DEFAULT_DISPATCH_QUEUE_DEPTH: usize = 256;

/// Top-level config (kairos.toml + KAIROS_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KairosConfig {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Identity of this member and the keyspace shared by the whole cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_node_name")]
    pub node_name: String,
    /// Prefix under which every cluster-scoped key (job locks included) lives.
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            keyspace: default_keyspace(),
        }
    }
}

/// Distributed job lock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Give up acquiring a job lock after this many milliseconds.
    /// Unset means wait until the lock is free or the caller cancels.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Session TTL requested from the lock backend.
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: u64,
    /// Ask the backend to keep renewing the session while the lock is held.
    #[serde(default = "bool_true")]
    pub renew: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            ttl_secs: DEFAULT_LOCK_TTL_SECS,
            renew: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Capacity of the bounded channel feeding the executor.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_DISPATCH_QUEUE_DEPTH,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| DEFAULT_NODE_NAME.to_string())
}
fn default_keyspace() -> String {
    DEFAULT_KEYSPACE.to_string()
}
fn default_lock_ttl_secs() -> u64 {
    DEFAULT_LOCK_TTL_SECS
}
fn default_queue_depth() -> usize {
    DEFAULT_DISPATCH_QUEUE_DEPTH
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.kairos/kairos.db", home)
}

impl KairosConfig {
    /// Load config from a TOML file with KAIROS_<SECTION>_<KEY> env var overrides.
    ///
    /// Falls back to `~/.kairos/kairos.toml` when no path is given. A missing
    /// file is not an error: every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::KairosError::Config(e.to_string()))
    }

    /// `KAIROS_<SECTION>_<KEY>` maps to `<section>.<key>`; only the first
    /// underscore separates, so `KAIROS_LOCK_TIMEOUT_MS` is `lock.timeout_ms`.
    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("KAIROS_").map(|key| key.as_str().replacen('_', ".", 1).into()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.kairos/kairos.toml", home)
}
