use crate::dataset::FieldMapping;
use crate::errors::ConfigError;
use crate::judge::retry::RetryPolicy;
use crate::judge::JudgeRuntimeConfig;
use crate::model::{Guideline, ModelConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_FILE: &str = "assize.yaml";
pub const DEFAULT_GUIDELINES_FILE: &str = "guidelines.yaml";

/// Evaluation file: what to run and against which models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvalConfig {
    pub version: u32,
    pub dataset: DatasetSpec,
    pub guidelines: Vec<String>,
    pub completion: ModelConfig,
    pub judge: ModelConfig,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    #[serde(default)]
    pub fields: FieldMapping,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Per-file overrides; unset values fall back to [`EngineSettings`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_parallel: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_db")]
    pub db: String,
    #[serde(default = "default_blobs")]
    pub blobs: String,
}

fn default_db() -> String {
    ".assize/assize.db".to_string()
}

fn default_blobs() -> String {
    ".assize/blobs".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db: default_db(),
            blobs: default_blobs(),
        }
    }
}

impl StorageSettings {
    fn relative_to(self, config_path: &Path) -> Self {
        let base = config_path.parent().unwrap_or(Path::new("."));
        Self {
            db: resolve_relative(base, &self.db),
            blobs: resolve_relative(base, &self.blobs),
        }
    }
}

/// Engine limits, from defaults overlaid with `ASSIZE_*` variables.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    /// Samples processed concurrently within one run.
    pub parallel: usize,
    /// Judge calls in flight per run.
    pub judge_parallel: usize,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub timeout_seconds: u64,
    pub owner: String,
    pub log_level: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            parallel: 10,
            judge_parallel: 10,
            max_attempts: 3,
            backoff_ms: 1000,
            timeout_seconds: 60,
            owner: "default".to_string(),
            log_level: "info".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.trim().parse() {
            Ok(n) => *slot = n,
            Err(_) => tracing::warn!(event = "config_env_ignored", key, value = %v),
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        env_parse("ASSIZE_PARALLEL", &mut cfg.parallel);
        env_parse("ASSIZE_JUDGE_PARALLEL", &mut cfg.judge_parallel);
        env_parse("ASSIZE_MAX_ATTEMPTS", &mut cfg.max_attempts);
        env_parse("ASSIZE_BACKOFF_MS", &mut cfg.backoff_ms);
        env_parse("ASSIZE_TIMEOUT_SECONDS", &mut cfg.timeout_seconds);
        if let Ok(v) = env::var("ASSIZE_OWNER") {
            cfg.owner = v;
        }
        if let Ok(v) = env::var("ASSIZE_LOG") {
            cfg.log_level = v;
        }
        cfg
    }

    /// Apply the evaluation file's `settings` block on top.
    pub fn with_overrides(mut self, s: &Settings) -> Self {
        if let Some(v) = s.parallel {
            self.parallel = v;
        }
        if let Some(v) = s.judge_parallel {
            self.judge_parallel = v;
        }
        if let Some(v) = s.max_attempts {
            self.max_attempts = v;
        }
        if let Some(v) = s.backoff_ms {
            self.backoff_ms = v;
        }
        if let Some(v) = s.timeout_seconds {
            self.timeout_seconds = v;
        }
        if let Some(v) = &s.owner {
            self.owner = v.clone();
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn judge_runtime(&self) -> JudgeRuntimeConfig {
        JudgeRuntimeConfig {
            retry: RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_ms)),
            parallel: self.judge_parallel,
            timeout: self.timeout(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel == 0 {
            return Err(ConfigError("parallel must be at least 1".into()));
        }
        if self.judge_parallel == 0 {
            return Err(ConfigError("judge_parallel must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError("max_attempts must be at least 1".into()));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError("timeout_seconds must be at least 1".into()));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<EvalConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    let mut cfg: EvalConfig = serde_yaml::from_str(&raw)
        .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;
    if cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    if cfg.dataset.name.trim().is_empty() {
        return Err(ConfigError("dataset.name must not be empty".into()));
    }
    if cfg.guidelines.is_empty() {
        return Err(ConfigError("config has no guidelines".into()));
    }
    if cfg.settings.parallel == Some(0) || cfg.settings.judge_parallel == Some(0) {
        return Err(ConfigError("parallel must be at least 1".into()));
    }
    if cfg.settings.max_attempts == Some(0) {
        return Err(ConfigError("max_attempts must be at least 1".into()));
    }

    cfg.storage = cfg.storage.relative_to(path);
    Ok(cfg)
}

/// Only the `storage` block of a config file, for commands that read the
/// store without running anything. Other sections are not validated.
pub fn load_storage(path: &Path) -> Result<StorageSettings, ConfigError> {
    #[derive(Deserialize)]
    struct StorageOnly {
        #[serde(default)]
        storage: StorageSettings,
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    let parsed: StorageOnly = serde_yaml::from_str(&raw)
        .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;
    Ok(parsed.storage.relative_to(path))
}

/// Storage paths in the file are relative to the file itself.
fn resolve_relative(base: &Path, p: &str) -> String {
    let pb = PathBuf::from(p);
    if p.trim().is_empty() || pb.is_absolute() {
        return p.to_string();
    }
    let mut out = PathBuf::new();
    for c in base.join(pb).components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out.to_string_lossy().to_string()
}

/// Read and validate a YAML list of guidelines.
pub fn load_guidelines(path: &Path) -> Result<Vec<Guideline>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ConfigError(format!("failed to read guidelines {}: {}", path.display(), e))
    })?;
    let guidelines: Vec<Guideline> = serde_yaml::from_str(&raw)
        .map_err(|e| ConfigError(format!("failed to parse guidelines YAML: {}", e)))?;
    crate::guideline::validate_all(&guidelines).map_err(|e| ConfigError(e.to_string()))?;
    Ok(guidelines)
}

const SAMPLE_CONFIG: &str = r#"version: 1
dataset:
  name: jokes
  fields:
    query: prompt
  limit: 50
guidelines:
  - humor
completion:
  provider: openai
  model: gpt-4o-mini
  temperature: 0.7
judge:
  provider: openai
  model: gpt-4o
  temperature: 0.0
settings:
  parallel: 10
  judge_parallel: 10
  max_attempts: 3
  backoff_ms: 1000
  timeout_seconds: 60
"#;

const SAMPLE_GUIDELINES: &str = r#"- name: humor
  category: style
  prompt: |
    Rate how funny the following response is.

    Response:
    {completion}
  scale:
    type: numeric
    min_value: 0
    max_value: 10
- name: on_topic
  category: relevance
  prompt: |
    Does the following response stay on topic?

    {completion}
  scale:
    type: boolean
"#;

/// Write a starter evaluation file and guideline file into `dir`.
/// Existing files are left untouched; returns the paths written.
pub fn write_sample_config(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut written = Vec::new();
    for (name, content) in [
        (DEFAULT_CONFIG_FILE, SAMPLE_CONFIG),
        (DEFAULT_GUIDELINES_FILE, SAMPLE_GUIDELINES),
    ] {
        let path = dir.join(name);
        if path.exists() {
            continue;
        }
        std::fs::write(&path, content)
            .map_err(|e| ConfigError(format!("failed to write {}: {}", path.display(), e)))?;
        written.push(path);
    }
    Ok(written)
}
