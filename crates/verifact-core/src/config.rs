use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{SecretValue, VerifactError, require_env};

const DEFAULT_CONFIG_PATH: &str = "verifact.toml";
const CONFIG_PATH_ENV: &str = "VERIFACT_CONFIG";

/// Top-level settings passed into [`crate::Pipeline::new`].
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub crew: CrewConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Settings for the offline backend with the given roster files.
    pub fn offline(agents_path: impl Into<PathBuf>, tasks_path: impl Into<PathBuf>) -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Offline,
                model: "offline".into(),
                api_key_env: String::new(),
                base_url: LlmConfig::default_base_url(),
                temperature: LlmConfig::default_temperature(),
                timeout_secs: LlmConfig::default_timeout_secs(),
            },
            search: SearchConfig::default(),
            crew: CrewConfig {
                agents_path: agents_path.into(),
                tasks_path: tasks_path.into(),
                default_agent: None,
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Resolve the configured LLM secret value (from environment only).
    pub fn llm_api_key(&self) -> Result<SecretValue, VerifactError> {
        require_env(&self.llm.api_key_env)
    }

    /// Resolve the configured search secret value (from environment only).
    pub fn search_api_key(&self) -> Result<SecretValue, VerifactError> {
        require_env(&self.search.api_key_env)
    }
}

/// Helper to load settings with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load settings from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `VERIFACT_CONFIG` environment variable.
    /// 3. `verifact.toml` in the current working directory.
    ///
    /// Relative roster paths are resolved against the settings file's directory.
    pub fn load(path: Option<PathBuf>) -> Result<Settings, VerifactError> {
        let candidate = resolve_path(path);
        let raw = fs::read_to_string(&candidate)
            .map_err(|err| VerifactError::config_io(candidate.clone(), err))?;
        let mut settings = Self::parse(&raw)?;

        if let Some(base) = candidate.parent() {
            settings.crew.agents_path = anchor(base, &settings.crew.agents_path);
            settings.crew.tasks_path = anchor(base, &settings.crew.tasks_path);
        }

        Ok(settings)
    }

    /// Parse and validate settings from TOML text.
    pub fn parse(raw: &str) -> Result<Settings, VerifactError> {
        let settings: Settings = toml::from_str(raw)
            .map_err(|err| VerifactError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&settings)?;
        Ok(settings)
    }

    fn validate(settings: &Settings) -> Result<(), VerifactError> {
        if settings.llm.provider == LlmProvider::OpenAi
            && settings.llm.api_key_env.trim().is_empty()
        {
            return Err(VerifactError::InvalidConfiguration(
                "llm.api_key_env must reference an environment variable".into(),
            ));
        }

        if settings.search.provider == SearchProvider::Serper
            && settings.search.api_key_env.trim().is_empty()
        {
            return Err(VerifactError::InvalidConfiguration(
                "search.api_key_env must reference an environment variable".into(),
            ));
        }

        if settings.llm.model.trim().is_empty() {
            return Err(VerifactError::InvalidConfiguration(
                "llm.model must not be empty".into(),
            ));
        }

        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = path {
        return path;
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return PathBuf::from(from_env);
        }
    }

    Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() && !base.as_os_str().is_empty() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Offline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    #[serde(default)]
    pub api_key_env: String,
    #[serde(default = "LlmConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "LlmConfig::default_temperature")]
    pub temperature: f32,
    #[serde(default = "LlmConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    fn default_base_url() -> String {
        "https://api.openai.com/v1".to_string()
    }

    const fn default_temperature() -> f32 {
        0.2
    }

    const fn default_timeout_secs() -> u64 {
        120
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchProvider {
    Serper,
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "SearchConfig::default_provider")]
    pub provider: SearchProvider,
    #[serde(default)]
    pub api_key_env: String,
    #[serde(default = "SearchConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "SearchConfig::default_max_results")]
    pub max_results: usize,
}

impl SearchConfig {
    const fn default_provider() -> SearchProvider {
        SearchProvider::None
    }

    fn default_endpoint() -> String {
        "https://google.serper.dev/search".to_string()
    }

    const fn default_max_results() -> usize {
        5
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            api_key_env: String::new(),
            endpoint: Self::default_endpoint(),
            max_results: Self::default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrewConfig {
    #[serde(default = "CrewConfig::default_agents_path")]
    pub agents_path: PathBuf,
    #[serde(default = "CrewConfig::default_tasks_path")]
    pub tasks_path: PathBuf,
    /// Agent used for tasks that do not need a specialist.
    #[serde(default)]
    pub default_agent: Option<String>,
}

impl CrewConfig {
    fn default_agents_path() -> PathBuf {
        PathBuf::from("config/agents.yaml")
    }

    fn default_tasks_path() -> PathBuf {
        PathBuf::from("config/tasks.yaml")
    }
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            agents_path: Self::default_agents_path(),
            tasks_path: Self::default_tasks_path(),
            default_agent: None,
        }
    }
}

/// Console logging only; check data is never written to disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}
