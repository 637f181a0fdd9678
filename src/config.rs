use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the history file in the user's home directory
pub const HISTORY_FILE_NAME: &str = ".shmel_history";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub prompt: PromptConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub completion: CompletionConfig,
}

/// Command history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of entries kept in memory and on disk
    #[serde(default = "default_history_size")]
    pub max_size: usize,

    /// History file location. Defaults to `~/.shmel_history`.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_history_size() -> usize {
    100
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: default_history_size(),
            file: None,
        }
    }
}

impl HistoryConfig {
    /// The effective history file path, if one can be determined.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.file
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(HISTORY_FILE_NAME)))
    }
}

/// Prompt rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Text placed after the working directory, e.g. `"$ "`
    #[serde(default = "default_prompt_suffix")]
    pub suffix: String,
}

fn default_prompt_suffix() -> String {
    "$ ".to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            suffix: default_prompt_suffix(),
        }
    }
}

/// Child process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Value of `TERM` injected into every child environment
    #[serde(default = "default_term")]
    pub term: String,

    /// How long a terminated job gets to exit after SIGTERM before SIGKILL
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

fn default_term() -> String {
    "xterm".to_string()
}

fn default_kill_grace_ms() -> u64 {
    500
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            term: default_term(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

impl JobsConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// How Tab behaves when a prefix matches several candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStyle {
    /// Substitute the first candidate; repeated Tab rotates through the rest
    #[default]
    Cycle,
    /// Print every candidate and extend the token to their common prefix
    List,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default)]
    pub style: CompletionStyle,
}

impl Config {
    /// Default config file location: `<config_dir>/shmel/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("shmel").join("config.json"))
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load the configuration from an explicit path, or from the default
    /// location when it exists. A missing default file yields the defaults;
    /// a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.max_size == 0 {
            return Err(ConfigError::ValidationError(
                "history.max_size must be greater than 0".to_string(),
            ));
        }

        if self.jobs.term.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "jobs.term cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {msg}"),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.history.max_size, 100);
        assert_eq!(config.prompt.suffix, "$ ");
        assert_eq!(config.jobs.term, "xterm");
        assert_eq!(config.jobs.kill_grace(), Duration::from_millis(500));
        assert_eq!(config.completion.style, CompletionStyle::Cycle);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.history.max_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.jobs.term = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dumped_config_loads_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let mut config = Config::default();
        config.history.max_size = 42;
        config.completion.style = CompletionStyle::List;
        std::fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.history.max_size, 42);
        assert_eq!(loaded.completion.style, CompletionStyle::List);
        assert_eq!(loaded.prompt.suffix, config.prompt.suffix);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{
            "history": { "file": "/tmp/hist" },
            "completion": { "style": "list" }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.history.max_size, 100);
        assert_eq!(config.history.file, Some(PathBuf::from("/tmp/hist")));
        assert_eq!(
            config.history.resolved_path(),
            Some(PathBuf::from("/tmp/hist"))
        );
        assert_eq!(config.completion.style, CompletionStyle::List);
        assert_eq!(config.jobs.term, "xterm");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("nope.json");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
