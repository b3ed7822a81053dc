use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::risk::SeverityLevel;

/// Name of the project-local data directory.
pub const DATA_DIR_NAME: &str = ".warden";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct WardenConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub index: IndexConfig,
    pub memory: MemoryConfig,
    pub risk: RiskConfig,
    pub security: SecurityConfig,
    pub gate: GateConfig,
    pub context: ContextConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory, relative to the project root unless absolute.
    pub data_dir: String,
    pub store_timeout_ms: u64,
    pub command_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub impact_depth: usize,
    pub max_file_bytes: u64,
    /// Worker threads for per-file scan units. 0 means one per core.
    pub workers: usize,
    pub scan_timeout_ms: u64,
    /// Extra exclude globs on top of `.gitignore`.
    pub exclude: Vec<String>,
    /// How many change generations count as "recent" for churn.
    pub churn_window: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub page_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RiskWeights {
    pub churn: f64,
    pub symbols: f64,
    pub fan_in: f64,
    pub fan_out: f64,
    pub history: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RiskConfig {
    pub weights: RiskWeights,
    /// Raw values at which each signal saturates to 1.0.
    pub churn_saturation: f64,
    pub symbols_saturation: f64,
    pub fan_in_saturation: f64,
    pub fan_out_saturation: f64,
    /// Number of prior gate decisions consulted for the history signal.
    pub history_window: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuleConfig {
    pub name: String,
    pub pattern: String,
    pub weight: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Additional rules appended to the built-in set.
    pub rules: Vec<RuleConfig>,
    /// Names of built-in rules to switch off.
    pub disabled: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GateConfig {
    pub severity_threshold: SeverityLevel,
    pub bug_threshold: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ContextConfig {
    pub seed_files: usize,
    pub max_memories: usize,
    pub token_budget: usize,
    pub hotspots: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: DATA_DIR_NAME.into(),
            store_timeout_ms: 5000,
            command_timeout_ms: 120_000,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            impact_depth: 3,
            max_file_bytes: 1024 * 1024,
            workers: 0,
            scan_timeout_ms: 60_000,
            exclude: Vec::new(),
            churn_window: 10,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            churn: 0.35,
            symbols: 0.15,
            fan_in: 0.15,
            fan_out: 0.10,
            history: 0.25,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            churn_saturation: 5.0,
            symbols_saturation: 40.0,
            fan_in_saturation: 12.0,
            fan_out_saturation: 12.0,
            history_window: 5,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            severity_threshold: SeverityLevel::Critical,
            bug_threshold: 0.8,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            seed_files: 5,
            max_memories: 10,
            token_budget: 4000,
            hotspots: 5,
        }
    }
}

impl StorageConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl IndexConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

/// Returns `~/.warden/`
pub fn default_warden_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DATA_DIR_NAME))
}

impl WardenConfig {
    /// Load config for a project: explicit path, else `<root>/.warden/config.toml`,
    /// else `~/.warden/config.toml`, else defaults. Env overrides apply last.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let candidates: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => {
                let mut paths = vec![root.join(DATA_DIR_NAME).join("config.toml")];
                if let Some(home) = default_warden_dir() {
                    paths.push(home.join("config.toml"));
                }
                paths
            }
        };

        if let Some(path) = explicit {
            anyhow::ensure!(path.exists(), "config file not found: {}", path.display());
        }

        for path in &candidates {
            if path.exists() {
                let mut config = Self::load_from(path)?;
                config.apply_env_overrides();
                return Ok(config);
            }
        }

        info!(root = %root.display(), "no config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a specific TOML file without env overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: WardenConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config TOML {}", path.display()))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Apply environment variable overrides (WARDEN_DATA_DIR, WARDEN_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("WARDEN_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("WARDEN_LOG_LEVEL") {
            self.logging.log_level = val;
        }
    }

    /// Resolve the data directory against the project root, expanding `~`.
    pub fn resolved_data_dir(&self, root: &Path) -> PathBuf {
        let expanded = expand_tilde(&self.storage.data_dir);
        if expanded.is_absolute() {
            expanded
        } else {
            root.join(expanded)
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
