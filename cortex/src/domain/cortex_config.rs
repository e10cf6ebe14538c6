// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Cortex Configuration Types
//
// Defines the configuration schema for an Inkwell cortex, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Scope (owning user) for every query
// - Search fan-out, timeouts and query expansion
// - Pattern lifecycle thresholds
// - Backend endpoints and credentials
// - Logging settings

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_API_VERSION: &str = "100monkeys.ai/v1";
pub const CONFIG_KIND: &str = "CortexConfig";
pub const CONFIG_PATH_ENV: &str = "INKWELL_CONFIG_PATH";

/// Top-level Kubernetes-style cortex configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CortexConfig {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "CortexConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: CortexConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CortexConfigSpec {
    /// Owner id injected into every search filter
    pub scope_id: String,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub backends: BackendsConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of memories returned
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Upper bound on every backend call (and the rerank call)
    #[serde(default = "default_backend_timeout", with = "humantime_serde")]
    pub backend_timeout: Duration,

    /// Whether short queries are widened with the synonym table
    #[serde(default = "default_true")]
    pub expand_queries: bool,

    /// Maximum synonyms appended per matched token
    #[serde(default = "default_max_synonyms")]
    pub max_synonyms_per_token: usize,

    /// Filter key that carries the scope id
    #[serde(default = "default_scope_key")]
    pub scope_key: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            backend_timeout: default_backend_timeout(),
            expand_queries: true,
            max_synonyms_per_token: default_max_synonyms(),
            scope_key: default_scope_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Consecutive failures that trigger a one-step downgrade
    #[serde(default = "default_downgrade_threshold")]
    pub downgrade_threshold: u32,

    /// Days without reinforcement before a non-HIGH pattern is stale
    #[serde(default = "default_stale_days")]
    pub stale_days: i64,

    /// Maximum stale pattern names reported
    #[serde(default = "default_stale_display_limit")]
    pub stale_display_limit: usize,

    /// How long the content-type registry trusts its cache
    #[serde(default = "default_registry_ttl", with = "humantime_serde")]
    pub content_type_ttl: Duration,

    /// Interval of the background health monitor
    #[serde(default = "default_monitor_interval", with = "humantime_serde")]
    pub monitor_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            downgrade_threshold: default_downgrade_threshold(),
            stale_days: default_stale_days(),
            stale_display_limit: default_stale_display_limit(),
            content_type_ttl: default_registry_ttl(),
            monitor_interval: default_monitor_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    /// PostgreSQL pattern and memory stores; in-memory when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relational: Option<RelationalConfig>,

    /// Knowledge graph service; graph search is skipped when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<HttpBackendConfig>,

    /// Reranking service; results keep fusion order when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker: Option<HttpBackendConfig>,

    /// Content types accepted in `applicable_content_types`
    #[serde(default = "default_content_types")]
    pub content_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalConfig {
    /// Connection string (supports "env:VAR_NAME")
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    pub endpoint: String,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Idle period after which a stateful session is re-established
    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_search_limit() -> usize {
    10
}

fn default_backend_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_synonyms() -> usize {
    2
}

fn default_scope_key() -> String {
    crate::domain::filter::DEFAULT_SCOPE_KEY.to_string()
}

fn default_downgrade_threshold() -> u32 {
    2
}

fn default_stale_days() -> i64 {
    30
}

fn default_stale_display_limit() -> usize {
    10
}

fn default_registry_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_content_types() -> Vec<String> {
    ["newsletter", "blog_post", "social_post", "thread", "essay", "email"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_connections() -> u32 {
    5
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for CortexConfigSpec {
    fn default() -> Self {
        Self {
            scope_id: "default".to_string(),
            search: SearchConfig::default(),
            lifecycle: LifecycleConfig::default(),
            backends: BackendsConfig {
                content_types: default_content_types(),
                ..Default::default()
            },
            retry: RetryConfig::default(),
            logging: None,
        }
    }
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            api_version: CONFIG_API_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            metadata: ManifestMetadata {
                name: "inkwell".to_string(),
                labels: None,
            },
            spec: CortexConfigSpec::default(),
        }
    }
}

impl CortexConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse and validate configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != CONFIG_API_VERSION {
            anyhow::bail!(
                "Unsupported apiVersion '{}' (expected '{}')",
                self.api_version,
                CONFIG_API_VERSION
            );
        }
        if self.kind != CONFIG_KIND {
            anyhow::bail!("Unsupported kind '{}' (expected '{}')", self.kind, CONFIG_KIND);
        }
        if self.spec.scope_id.trim().is_empty() {
            anyhow::bail!("spec.scope_id must not be empty");
        }
        if self.spec.lifecycle.downgrade_threshold == 0 {
            anyhow::bail!("spec.lifecycle.downgrade_threshold must be at least 1");
        }
        if self.spec.lifecycle.stale_days < 0 {
            anyhow::bail!("spec.lifecycle.stale_days must not be negative");
        }
        if self.spec.search.default_limit == 0 {
            anyhow::bail!("spec.search.default_limit must be at least 1");
        }
        if self.spec.retry.max_attempts == 0 {
            anyhow::bail!("spec.retry.max_attempts must be at least 1");
        }
        if self.spec.search.backend_timeout.is_zero() {
            anyhow::bail!("spec.search.backend_timeout must be greater than zero");
        }
        if self.spec.lifecycle.monitor_interval.is_zero() {
            anyhow::bail!("spec.lifecycle.monitor_interval must be greater than zero");
        }
        Ok(())
    }

    /// Discover configuration file using precedence order
    /// 1. INKWELL_CONFIG_PATH environment variable
    /// 2. ./inkwell-config.yaml (working directory)
    /// 3. ~/.inkwell/config.yaml (user home)
    /// 4. /etc/inkwell/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./inkwell-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".inkwell").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/inkwell/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            return config.with_env_overrides();
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?.with_env_overrides()
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default().with_env_overrides()
        }
    }

    /// Overrides can break what the file validated, so check again.
    fn with_env_overrides(mut self) -> anyhow::Result<Self> {
        self.apply_env_overrides();
        self.validate().context("Invalid configuration after environment overrides")?;
        Ok(self)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("INKWELL_DATABASE_URL") {
            tracing::info!("Environment override: INKWELL_DATABASE_URL");
            match &mut self.spec.backends.relational {
                Some(relational) => relational.database_url = url,
                None => {
                    self.spec.backends.relational = Some(RelationalConfig {
                        database_url: url,
                        max_connections: default_max_connections(),
                    })
                }
            }
        }

        if let Ok(scope) = std::env::var("INKWELL_SCOPE_ID") {
            if !scope.trim().is_empty() {
                tracing::info!("Environment override: INKWELL_SCOPE_ID={}", scope);
                self.spec.scope_id = scope;
            }
        }

        if let Ok(val) = std::env::var("INKWELL_BACKEND_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => {
                    tracing::info!("Environment override: INKWELL_BACKEND_TIMEOUT_MS={}", ms);
                    self.spec.search.backend_timeout = Duration::from_millis(ms);
                }
                _ => tracing::warn!("Ignoring invalid INKWELL_BACKEND_TIMEOUT_MS value: {}", val),
            }
        }

        if let Ok(val) = std::env::var("INKWELL_DOWNGRADE_THRESHOLD") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => {
                    tracing::info!("Environment override: INKWELL_DOWNGRADE_THRESHOLD={}", n);
                    self.spec.lifecycle.downgrade_threshold = n;
                }
                _ => tracing::warn!("Ignoring invalid INKWELL_DOWNGRADE_THRESHOLD value: {}", val),
            }
        }
    }
}

/// Resolve a secret from config (supports "env:VAR_NAME" syntax)
pub fn resolve_secret(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var_name) => std::env::var(var_name)
            .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
        None => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
apiVersion: 100monkeys.ai/v1
kind: CortexConfig
metadata:
  name: writer-desk
spec:
  scope_id: alice
  search:
    backend_timeout: 2s
    max_synonyms_per_token: 1
  lifecycle:
    downgrade_threshold: 3
    stale_days: 14
  backends:
    reranker:
      endpoint: http://localhost:8080
      api_key: env:INKWELL_TEST_RERANK_KEY
"#;

    #[test]
    fn test_parse_sample() {
        let config = CortexConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.metadata.name, "writer-desk");
        assert_eq!(config.spec.scope_id, "alice");
        assert_eq!(config.spec.search.backend_timeout, Duration::from_secs(2));
        assert_eq!(config.spec.search.max_synonyms_per_token, 1);
        assert_eq!(config.spec.search.default_limit, 10);
        assert_eq!(config.spec.lifecycle.downgrade_threshold, 3);
        assert_eq!(config.spec.lifecycle.stale_days, 14);
        assert_eq!(config.spec.lifecycle.stale_display_limit, 10);
        assert!(config.spec.backends.graph.is_none());
        let reranker = config.spec.backends.reranker.as_ref().unwrap();
        assert_eq!(reranker.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.spec.backends.content_types.len(), 6);
    }

    #[test]
    fn test_rejects_wrong_kind() {
        let yaml = SAMPLE.replace("kind: CortexConfig", "kind: NodeConfig");
        assert!(CortexConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let yaml = SAMPLE.replace("downgrade_threshold: 3", "downgrade_threshold: 0");
        assert!(CortexConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_durations() {
        let yaml = SAMPLE.replace("backend_timeout: 2s", "backend_timeout: 0s");
        assert!(CortexConfig::from_yaml_str(&yaml).is_err());

        let yaml = SAMPLE.replace("stale_days: 14", "stale_days: 14\n    monitor_interval: 0s");
        let err = CortexConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("monitor_interval"));
    }

    #[test]
    fn test_overridden_config_is_validated() {
        let mut config = CortexConfig::default();
        config.spec.lifecycle.monitor_interval = Duration::ZERO;
        assert!(config.with_env_overrides().is_err());
        assert!(CortexConfig::default().with_env_overrides().is_ok());
    }

    #[test]
    fn test_yaml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inkwell-config.yaml");
        let config = CortexConfig::default();
        config.to_yaml_file(&path).unwrap();

        let loaded = CortexConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.kind, CONFIG_KIND);
        assert_eq!(loaded.spec.lifecycle.downgrade_threshold, 2);
    }

    #[test]
    fn test_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CortexConfig::load_or_default(Some(dir.path().join("missing.yaml"))).is_err());
    }

    #[test]
    fn test_resolve_secret() {
        assert_eq!(resolve_secret("plain").unwrap(), "plain");
        assert!(resolve_secret("env:INKWELL_DEFINITELY_UNSET_VAR").is_err());
    }
}
