// Configuration Support
//
// This module loads the server configuration: an optional TOML file with
// `[logging]` and `[policy]` tables, overridden by environment variables.
// The policy half is turned into an immutable `SecurityPolicy` once at startup.

use crate::policy::{
    PathArgumentRule, SecurityPolicy, DEFAULT_ALLOWED_COMMANDS, DEFAULT_ALLOWED_FLAGS,
    DEFAULT_ALLOWED_PATTERNS, DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_MAX_COMMAND_LENGTH,
    DEFAULT_MAX_OUTPUT_BYTES,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Fatal startup errors. Never produced while serving requests.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ALLOWED_DIR is required")]
    MissingAllowedDir,

    #[error("ALLOWED_DIR {path:?} cannot be resolved: {source}")]
    UnresolvableAllowedDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ALLOWED_DIR {0:?} is not a directory")]
    NotADirectory(PathBuf),

    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),

    #[error("allowed command '{0}' must be a bare name without path separators")]
    InvalidCommandName(String),

    #[error("allowed flag '{0}' must start with '-'")]
    InvalidFlag(String),

    #[error("invalid file pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("invalid path argument rule '{0}'. Must be 'separator' or 'all'")]
    InvalidPathRule(String),

    #[error("invalid log level '{0}'. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format '{0}'. Must be one of: json, pretty, compact")]
    InvalidLogFormat(String),

    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Command policy configuration
    pub policy: PolicyConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Convert log level string to tracing::Level
    pub fn level(&self) -> Result<tracing::Level, ConfigError> {
        self.level
            .to_lowercase()
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.level.clone()))
    }
}

/// Raw, unvalidated policy settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Sandbox directory; required
    pub allowed_dir: Option<PathBuf>,

    /// Command names that may be executed
    pub allowed_commands: Vec<String>,

    /// Flags that may be passed, matched exactly
    pub allowed_flags: Vec<String>,

    /// Filename globs for path arguments; empty disables the check
    pub allowed_patterns: Vec<String>,

    /// Maximum raw command length in characters
    pub max_command_length: u64,

    /// Per-command timeout in seconds
    pub command_timeout_secs: u64,

    /// Captured bytes per output stream
    pub max_output_bytes: u64,

    /// Which arguments are held to the filename patterns (separator, all)
    pub path_arguments: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_dir: None,
            allowed_commands: DEFAULT_ALLOWED_COMMANDS.iter().map(|s| s.to_string()).collect(),
            allowed_flags: DEFAULT_ALLOWED_FLAGS.iter().map(|s| s.to_string()).collect(),
            allowed_patterns: DEFAULT_ALLOWED_PATTERNS.iter().map(|s| s.to_string()).collect(),
            max_command_length: DEFAULT_MAX_COMMAND_LENGTH as u64,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES as u64,
            path_arguments: PathArgumentRule::default().as_str().to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file plus the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or if
    /// an environment override is malformed.
    /// If no path is given or the file does not exist, defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an explicit environment lookup
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };

        let config = config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file at `path` without environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - ALLOWED_DIR, ALLOWED_COMMANDS, ALLOWED_FLAGS, ALLOWED_PATTERNS
    /// - MAX_COMMAND_LENGTH, COMMAND_TIMEOUT, MAX_OUTPUT_BYTES
    /// - PATH_ARGUMENTS
    /// - CMDGUARD_LOG_LEVEL, CMDGUARD_LOG_FORMAT
    pub fn apply_env_overrides<F>(mut self, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = env("ALLOWED_DIR") {
            self.policy.allowed_dir = Some(PathBuf::from(dir));
        }
        if let Some(commands) = env("ALLOWED_COMMANDS") {
            self.policy.allowed_commands = split_list(&commands);
        }
        if let Some(flags) = env("ALLOWED_FLAGS") {
            self.policy.allowed_flags = split_list(&flags);
        }
        if let Some(patterns) = env("ALLOWED_PATTERNS") {
            self.policy.allowed_patterns = split_list(&patterns);
        }
        if let Some(length) = env("MAX_COMMAND_LENGTH") {
            self.policy.max_command_length = parse_number("MAX_COMMAND_LENGTH", &length)?;
        }
        if let Some(timeout) = env("COMMAND_TIMEOUT") {
            self.policy.command_timeout_secs = parse_number("COMMAND_TIMEOUT", &timeout)?;
        }
        if let Some(bytes) = env("MAX_OUTPUT_BYTES") {
            self.policy.max_output_bytes = parse_number("MAX_OUTPUT_BYTES", &bytes)?;
        }
        if let Some(rule) = env("PATH_ARGUMENTS") {
            self.policy.path_arguments = rule;
        }

        if let Some(level) = env("CMDGUARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = env("CMDGUARD_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(self)
    }

    /// Validate the parts of the configuration that do not touch the filesystem
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(ConfigError::InvalidLogLevel(self.logging.level.clone())),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => return Err(ConfigError::InvalidLogFormat(self.logging.format.clone())),
        }

        self.policy.path_arguments.parse::<PathArgumentRule>()?;
        Ok(())
    }

    /// Build the immutable security policy
    ///
    /// # Errors
    ///
    /// Fails if `allowed_dir` is missing or not a directory, or any policy
    /// field violates its invariant.
    pub fn security_policy(&self) -> Result<SecurityPolicy, ConfigError> {
        let policy = &self.policy;
        let allowed_dir = policy
            .allowed_dir
            .as_ref()
            .ok_or(ConfigError::MissingAllowedDir)?;

        SecurityPolicy::builder(allowed_dir)
            .allowed_commands(policy.allowed_commands.iter().cloned())
            .allowed_flags(policy.allowed_flags.iter().cloned())
            .allowed_patterns(policy.allowed_patterns.iter().cloned())
            .max_command_length(to_usize(policy.max_command_length))
            .command_timeout_secs(policy.command_timeout_secs)
            .max_output_bytes(to_usize(policy.max_output_bytes))
            .path_arguments(policy.path_arguments.parse()?)
            .build()
    }
}

/// Split a comma separated list, dropping blanks
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    let number: u64 = value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: value.to_string(),
    })?;
    if number == 0 {
        return Err(ConfigError::NonPositive(key));
    }
    Ok(number)
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
