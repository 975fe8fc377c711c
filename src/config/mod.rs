use crate::global;
use crate::summarization::PromptSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod env {
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const ASSEMBLYAI_API_KEY: &str = "ASSEMBLYAI_API_KEY";
    pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
    pub const STORAGE_ROOT: &str = "MINUTIA_STORAGE_ROOT";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Overrides the default `jobs.db` location under the data directory.
    pub database_path: Option<String>,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub transcription: TranscriptionConfig,
    pub summarization: SummarizationConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Attempts allowed per stage before a record is marked failed.
    pub retry_limit: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
    /// A claim idle for longer than this is considered abandoned.
    pub stale_after_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            backoff_base_seconds: 5,
            backoff_max_seconds: 300,
            stale_after_seconds: 900,
            sweep_interval_seconds: 60,
        }
    }
}

impl PipelineConfig {
    /// Delay before re-delivering a trigger after the given failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let secs = self
            .backoff_base_seconds
            .saturating_mul(1u64 << exponent)
            .min(self.backoff_max_seconds);
        Duration::from_secs(secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Deposited objects live at `<root_dir>/<bucket>/<key>`.
    pub root_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub provider: String,
    pub api_key: Option<String>,
    pub api_endpoint: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: "openai-api".to_string(),
            api_key: None,
            api_endpoint: None,
            model: Some("whisper-1".to_string()),
            language: None,
            timeout_seconds: 600,
        }
    }
}

impl TranscriptionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    pub provider: String,
    pub api_key: Option<String>,
    pub api_endpoint: Option<String>,
    /// Provider default when unset.
    pub model: Option<String>,
    pub timeout_seconds: u64,
    pub prompt: PromptSpec,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            provider: "openai-api".to_string(),
            api_key: None,
            api_endpoint: None,
            model: None,
            timeout_seconds: 120,
            prompt: PromptSpec::default(),
        }
    }
}

impl SummarizationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3838,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location. A missing default
    /// config file is created with defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => global::config_file()?,
        };

        let config = if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
            info!("Loaded config from {:?}", config_path);
            config
        } else if path.is_some() {
            anyhow::bail!("Config file not found: {}", config_path.display());
        } else {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save(&config_path)?;
            config
        };

        let config = config.with_env_overrides(|key| std::env::var(key).ok());
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", config_path.display()))?;
        Ok(config)
    }

    /// Collaborator deadlines must expire before the sweeper treats a claim
    /// as abandoned, or live claims get reclaimed underneath their workers.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.retry_limit == 0 {
            anyhow::bail!("pipeline.retry_limit must be at least 1");
        }
        let stale_after = self.pipeline.stale_after_seconds;
        for (name, timeout) in [
            ("transcription", self.transcription.timeout_seconds),
            ("summarization", self.summarization.timeout_seconds),
        ] {
            if timeout == 0 {
                anyhow::bail!("{}.timeout_seconds must be greater than 0", name);
            }
            if timeout >= stale_after {
                anyhow::bail!(
                    "{}.timeout_seconds ({}) must be less than pipeline.stale_after_seconds ({})",
                    name,
                    timeout,
                    stale_after
                );
            }
        }
        Ok(())
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Fill unset secrets and paths from the environment.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if is_blank(&self.transcription.api_key) {
            let key = match self.transcription.provider.as_str() {
                "assembly-ai" => env::ASSEMBLYAI_API_KEY,
                _ => env::OPENAI_API_KEY,
            };
            if let Some(value) = lookup(key) {
                self.transcription.api_key = Some(value);
            }
        }

        if is_blank(&self.summarization.api_key) {
            let key = match self.summarization.provider.as_str() {
                "gemini" => env::GEMINI_API_KEY,
                _ => env::OPENAI_API_KEY,
            };
            if let Some(value) = lookup(key) {
                self.summarization.api_key = Some(value);
            }
        }

        if let Some(root) = lookup(env::STORAGE_ROOT) {
            self.storage.root_dir = Some(root);
        }

        self
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => global::db_file(),
        }
    }

    pub fn storage_root(&self) -> Result<PathBuf> {
        match &self.storage.root_dir {
            Some(path) => Ok(PathBuf::from(path)),
            None => global::storage_dir(),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.stale_after(), Duration::from_secs(900));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = PipelineConfig {
            backoff_base_seconds: 5,
            backoff_max_seconds: 30,
            ..Default::default()
        };
        assert_eq!(config.backoff(1), Duration::from_secs(5));
        assert_eq!(config.backoff(2), Duration::from_secs(10));
        assert_eq!(config.backoff(3), Duration::from_secs(20));
        assert_eq!(config.backoff(4), Duration::from_secs(30));
        assert_eq!(config.backoff(60), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            retry_limit = 5

            [summarization]
            provider = "gemini"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.retry_limit, 5);
        assert_eq!(config.pipeline.backoff_base_seconds, 5);
        assert_eq!(config.summarization.provider, "gemini");
        assert_eq!(config.transcription.provider, "openai-api");
        assert_eq!(config.api.port, 3838);
        assert!(!config.summarization.prompt.role.is_empty());
    }

    #[test]
    fn test_env_overrides_fill_missing_secrets() {
        let env: HashMap<&str, &str> = [
            (env::OPENAI_API_KEY, "sk-openai"),
            (env::GEMINI_API_KEY, "gm-key"),
            (env::STORAGE_ROOT, "/srv/objects"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.summarization.provider = "gemini".to_string();
        let config = config.with_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.transcription.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.summarization.api_key.as_deref(), Some("gm-key"));
        assert_eq!(config.storage.root_dir.as_deref(), Some("/srv/objects"));
    }

    #[test]
    fn test_env_does_not_replace_configured_key() {
        let mut config = Config::default();
        config.transcription.api_key = Some("from-file".to_string());
        let config = config.with_env_overrides(|_| Some("from-env".to_string()));
        assert_eq!(config.transcription.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.pipeline.retry_limit = 7;
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.pipeline.retry_limit, 7);
    }

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_timeout_must_undercut_stale_threshold() {
        let mut config = Config::default();
        config.transcription.timeout_seconds = config.pipeline.stale_after_seconds;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("transcription.timeout_seconds"));

        let mut config = Config::default();
        config.summarization.timeout_seconds = 3600;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.retry_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_timeout_past_stale_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[pipeline]\nstale_after_seconds = 300\n\n[transcription]\ntimeout_seconds = 600\n",
        )
        .unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("stale_after_seconds"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
