//! Configuration management for SceneSmith.
//!
//! Configuration is read from environment variables:
//! - `OPENAI_API_KEY` - Required. Key for the OpenAI-bound stages.
//! - `ANTHROPIC_API_KEY` - Required. Key for the Anthropic-bound stages.
//! - `OPENAI_MODEL` - Optional. Defaults to `gpt-4o`.
//! - `ANTHROPIC_MODEL` - Optional. Defaults to `claude-3-5-sonnet-20241022`.
//! - `OPENAI_BASE_URL` / `ANTHROPIC_BASE_URL` - Optional. API endpoint overrides.
//! - `TEMPERATURE_<STAGE>` / `MAX_TOKENS_<STAGE>` - Optional. Per-stage sampling overrides,
//!   where `<STAGE>` is one of `DRAMATURGE`, `CHARACTER_CREATOR`, `ARCHITECT`, `DIALOGUE`,
//!   `REVIEWER`.
//! - `MAX_ATTEMPTS` - Optional. Pipeline attempt budget. Defaults to `3`.
//! - `REQUEST_TIMEOUT_SECS` - Optional. Upper bound on any single HTTP request. Defaults to `120`.
//! - `ENABLE_CHARACTER_BIBLE` - Optional. Defaults to `true`.
//! - `ENABLE_CLARIFICATION` - Optional. Defaults to `true`.
//! - `ENABLE_MEMORY` - Optional. Defaults to `true`.
//! - `MEMORY_PERSIST_DIR` - Optional. Defaults to `./scene_memory`.
//! - `MEMORY_EMBED_MODEL` - Optional. Defaults to `text-embedding-3-small`.
//! - `LOG_LEVEL` - Optional. Fallback log filter when `RUST_LOG` is unset. Defaults to `info`.
//! - `LOG_FILE` - Optional. Defaults to `scene_smith.log`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::agents::{AgentRole, ModelBinding};
use crate::llm::Provider;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Per-request HTTP timeout. A hung provider call fails and consumes one attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials and model selection for one hosted provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Sampling settings for one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageConfig {
    pub temperature: f64,
    pub max_tokens: u64,
}

/// Scene archive configuration.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Whether successful runs are archived
    pub enabled: bool,

    /// Directory holding the SQLite archive
    pub persist_dir: PathBuf,

    /// Embedding model for similarity search
    pub embed_model: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persist_dir: PathBuf::from("./scene_memory"),
            embed_model: "text-embedding-3-small".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,

    /// File receiving the full log stream
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("scene_smith.log")),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai: ProviderConfig,

    pub anthropic: ProviderConfig,

    /// Per-stage sampling settings (every role has an entry)
    pub stages: BTreeMap<AgentRole, StageConfig>,

    /// Maximum number of full pipeline attempts per scene
    pub max_attempts: u32,

    /// Upper bound on each provider or embedding request
    pub request_timeout: Duration,

    /// Run the character-psychology stage
    pub character_bible: bool,

    /// Ask the checkpoint agent for a clarification after a failed validation
    pub clarification: bool,

    pub memory: MemoryConfig,

    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if either provider key is unset, and
    /// `ConfigError::InvalidValue` for unparseable overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        let openai_key = var("OPENAI_API_KEY");
        if openai_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        let anthropic_key = var("ANTHROPIC_API_KEY");
        if anthropic_key.is_none() {
            missing.push("ANTHROPIC_API_KEY");
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvVar(missing.join(", ")));
        }

        let openai = ProviderConfig {
            api_key: openai_key.unwrap_or_default(),
            model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            base_url: var("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        };
        let anthropic = ProviderConfig {
            api_key: anthropic_key.unwrap_or_default(),
            model: var("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            base_url: var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
        };

        let mut stages = BTreeMap::new();
        for role in AgentRole::ALL {
            let temperature_key = format!("TEMPERATURE_{}", role.env_key());
            let max_tokens_key = format!("MAX_TOKENS_{}", role.env_key());
            let stage = StageConfig {
                temperature: parse_or(&var, &temperature_key, role.default_temperature())?,
                max_tokens: parse_or(&var, &max_tokens_key, role.default_max_tokens())?,
            };
            if !(0.0..=2.0).contains(&stage.temperature) {
                return Err(ConfigError::InvalidValue(
                    temperature_key,
                    format!("{} is outside 0.0..=2.0", stage.temperature),
                ));
            }
            if stage.max_tokens == 0 {
                return Err(ConfigError::InvalidValue(
                    max_tokens_key,
                    "must be greater than zero".to_string(),
                ));
            }
            stages.insert(role, stage);
        }

        let max_attempts: u32 = parse_or(&var, "MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let timeout_secs: u64 =
            parse_or(&var, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT.as_secs())?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "REQUEST_TIMEOUT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let memory = MemoryConfig {
            enabled: flag_or(&var, "ENABLE_MEMORY", true)?,
            persist_dir: var("MEMORY_PERSIST_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| MemoryConfig::default().persist_dir),
            embed_model: var("MEMORY_EMBED_MODEL")
                .unwrap_or_else(|| MemoryConfig::default().embed_model),
        };

        let logging = LoggingConfig {
            level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            file: Some(
                var("LOG_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("scene_smith.log")),
            ),
        };

        Ok(Self {
            openai,
            anthropic,
            stages,
            max_attempts,
            request_timeout: Duration::from_secs(timeout_secs),
            character_bible: flag_or(&var, "ENABLE_CHARACTER_BIBLE", true)?,
            clarification: flag_or(&var, "ENABLE_CLARIFICATION", true)?,
            memory,
            logging,
        })
    }

    /// Create a config with default settings and the given keys (useful for testing).
    pub fn new(openai_api_key: String, anthropic_api_key: String) -> Self {
        let stages = AgentRole::ALL
            .iter()
            .map(|role| {
                (
                    *role,
                    StageConfig {
                        temperature: role.default_temperature(),
                        max_tokens: role.default_max_tokens(),
                    },
                )
            })
            .collect();

        Self {
            openai: ProviderConfig {
                api_key: openai_api_key,
                model: DEFAULT_OPENAI_MODEL.to_string(),
                base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            },
            anthropic: ProviderConfig {
                api_key: anthropic_api_key,
                model: DEFAULT_ANTHROPIC_MODEL.to_string(),
                base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            },
            stages,
            max_attempts: 3,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            character_bible: true,
            clarification: true,
            memory: MemoryConfig {
                enabled: false,
                ..MemoryConfig::default()
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Resolve the model binding for a pipeline stage.
    pub fn binding(&self, role: AgentRole) -> ModelBinding {
        let provider = role.default_provider();
        let model = match provider {
            Provider::OpenAi => self.openai.model.clone(),
            Provider::Anthropic => self.anthropic.model.clone(),
        };
        let stage = self.stages.get(&role).copied().unwrap_or(StageConfig {
            temperature: role.default_temperature(),
            max_tokens: role.default_max_tokens(),
        });

        ModelBinding {
            provider,
            model,
            temperature: stage.temperature,
            max_tokens: stage.max_tokens,
        }
    }
}

fn parse_or<T, F>(var: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        None => Ok(default),
    }
}

fn flag_or<F>(var: &F, name: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("expected a boolean, got '{}'", other),
            )),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const KEYS: [(&str, &str); 2] = [("OPENAI_API_KEY", "sk-o"), ("ANTHROPIC_API_KEY", "sk-a")];

    #[test]
    fn missing_keys_are_reported_together() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        match err {
            ConfigError::MissingEnvVar(names) => {
                assert_eq!(names, "OPENAI_API_KEY, ANTHROPIC_API_KEY");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let err = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "  "),
            ("ANTHROPIC_API_KEY", "sk-a"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref n) if n == "OPENAI_API_KEY"));
    }

    #[test]
    fn defaults_apply_when_only_keys_are_set() {
        let config = Config::from_lookup(lookup(&KEYS)).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert!(config.character_bible);
        assert!(config.clarification);
        assert!(config.memory.enabled);
        assert_eq!(config.openai.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(config.anthropic.model, DEFAULT_ANTHROPIC_MODEL);

        let dramaturge = config.binding(AgentRole::Dramaturge);
        assert_eq!(dramaturge.provider, Provider::OpenAi);
        assert_eq!(dramaturge.temperature, 0.3);
        assert_eq!(dramaturge.max_tokens, 1000);

        let dialogue = config.binding(AgentRole::DialogueSpecialist);
        assert_eq!(dialogue.provider, Provider::Anthropic);
        assert_eq!(dialogue.model, DEFAULT_ANTHROPIC_MODEL);
    }

    #[test]
    fn stage_overrides_are_applied() {
        let mut pairs = KEYS.to_vec();
        pairs.push(("TEMPERATURE_DIALOGUE", "0.9"));
        pairs.push(("MAX_TOKENS_REVIEWER", "2048"));
        pairs.push(("MAX_ATTEMPTS", "5"));
        pairs.push(("ENABLE_MEMORY", "false"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.binding(AgentRole::DialogueSpecialist).temperature, 0.9);
        assert_eq!(config.binding(AgentRole::CreativeReviewer).max_tokens, 2048);
        assert_eq!(config.max_attempts, 5);
        assert!(!config.memory.enabled);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut pairs = KEYS.to_vec();
        pairs.push(("MAX_ATTEMPTS", "0"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue(ref name, _)) if name == "MAX_ATTEMPTS"
        ));

        let mut pairs = KEYS.to_vec();
        pairs.push(("TEMPERATURE_ARCHITECT", "warm"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue(ref name, _)) if name == "TEMPERATURE_ARCHITECT"
        ));

        let mut pairs = KEYS.to_vec();
        pairs.push(("ENABLE_CLARIFICATION", "maybe"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn request_timeout_is_configurable() {
        let mut pairs = KEYS.to_vec();
        pairs.push(("REQUEST_TIMEOUT_SECS", "45"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(45));

        let mut pairs = KEYS.to_vec();
        pairs.push(("REQUEST_TIMEOUT_SECS", "0"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue(ref name, _)) if name == "REQUEST_TIMEOUT_SECS"
        ));
    }
}
