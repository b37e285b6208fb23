//! Security Policy
//!
//! The immutable rule set every request is checked against. A policy is built
//! once at startup (see [`crate::config`]) and then shared read-only across
//! all in-flight requests through an `Arc`, so no locking is needed.

use crate::config::ConfigError;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default commands when none are configured
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &["ls", "cat", "pwd"];

/// Default flags when none are configured
pub const DEFAULT_ALLOWED_FLAGS: &[&str] = &["-l", "-a", "--help"];

/// Default filename patterns when none are configured
pub const DEFAULT_ALLOWED_PATTERNS: &[&str] = &["*.txt", "*.log", "*.md"];

/// Default maximum raw command length, in characters
pub const DEFAULT_MAX_COMMAND_LENGTH: usize = 1024;

/// Default command timeout in seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Maximum captured bytes per output stream (1MB)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Which non-flag arguments are held to the filename patterns
///
/// Containment applies to every non-flag argument under either rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathArgumentRule {
    /// Only arguments containing a path separator, and `.`/`..`
    Separator,

    /// Every non-flag argument
    #[default]
    All,
}

impl PathArgumentRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Separator => "separator",
            Self::All => "all",
        }
    }
}

impl FromStr for PathArgumentRule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "separator" => Ok(Self::Separator),
            "all" => Ok(Self::All),
            _ => Err(ConfigError::InvalidPathRule(s.to_string())),
        }
    }
}

impl fmt::Display for PathArgumentRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated, immutable security policy
///
/// Construct through [`SecurityPolicy::builder`]; there are no setters.
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    allowed_dir: PathBuf,
    allowed_commands: BTreeSet<String>,
    allowed_flags: BTreeSet<String>,
    allowed_patterns: Vec<Pattern>,
    max_command_length: usize,
    command_timeout: Duration,
    max_output_bytes: usize,
    path_arguments: PathArgumentRule,
}

impl SecurityPolicy {
    /// Start building a policy rooted at `allowed_dir`
    pub fn builder(allowed_dir: impl Into<PathBuf>) -> PolicyBuilder {
        PolicyBuilder::new(allowed_dir)
    }

    /// Canonical absolute path of the sandbox directory
    pub fn allowed_dir(&self) -> &Path {
        &self.allowed_dir
    }

    pub fn allowed_commands(&self) -> &BTreeSet<String> {
        &self.allowed_commands
    }

    pub fn allowed_flags(&self) -> &BTreeSet<String> {
        &self.allowed_flags
    }

    pub fn allowed_patterns(&self) -> &[Pattern] {
        &self.allowed_patterns
    }

    pub fn has_patterns(&self) -> bool {
        !self.allowed_patterns.is_empty()
    }

    pub fn max_command_length(&self) -> usize {
        self.max_command_length
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    pub fn path_arguments(&self) -> PathArgumentRule {
        self.path_arguments
    }

    pub fn is_command_allowed(&self, name: &str) -> bool {
        self.allowed_commands.contains(name)
    }

    pub fn is_flag_allowed(&self, flag: &str) -> bool {
        self.allowed_flags.contains(flag)
    }

    /// Whether `file_name` matches at least one configured pattern
    pub fn matches_pattern(&self, file_name: &str) -> bool {
        self.allowed_patterns
            .iter()
            .any(|pattern| pattern.matches(file_name))
    }

    /// Read-only view of the policy for `show_security_rules`
    pub fn snapshot(&self) -> SecurityPolicySnapshot {
        SecurityPolicySnapshot {
            allowed_dir: self.allowed_dir.display().to_string(),
            allowed_commands: self.allowed_commands.iter().cloned().collect(),
            allowed_flags: self.allowed_flags.iter().cloned().collect(),
            allowed_patterns: self
                .allowed_patterns
                .iter()
                .map(|p| p.as_str().to_string())
                .collect(),
            max_command_length: self.max_command_length,
            command_timeout_seconds: self.command_timeout.as_secs(),
            max_output_bytes: self.max_output_bytes,
            path_arguments: self.path_arguments,
        }
    }
}

/// Builder for [`SecurityPolicy`]
///
/// Starts from the documented defaults; `build` checks every invariant.
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    allowed_dir: PathBuf,
    allowed_commands: Vec<String>,
    allowed_flags: Vec<String>,
    allowed_patterns: Vec<String>,
    max_command_length: usize,
    command_timeout_secs: u64,
    max_output_bytes: usize,
    path_arguments: PathArgumentRule,
}

impl PolicyBuilder {
    fn new(allowed_dir: impl Into<PathBuf>) -> Self {
        Self {
            allowed_dir: allowed_dir.into(),
            allowed_commands: to_strings(DEFAULT_ALLOWED_COMMANDS),
            allowed_flags: to_strings(DEFAULT_ALLOWED_FLAGS),
            allowed_patterns: to_strings(DEFAULT_ALLOWED_PATTERNS),
            max_command_length: DEFAULT_MAX_COMMAND_LENGTH,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            path_arguments: PathArgumentRule::default(),
        }
    }

    pub fn allowed_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn allowed_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn allowed_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_command_length(mut self, length: usize) -> Self {
        self.max_command_length = length;
        self
    }

    pub fn command_timeout_secs(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn path_arguments(mut self, rule: PathArgumentRule) -> Self {
        self.path_arguments = rule;
        self
    }

    /// Validate every field and produce the immutable policy
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the directory does not exist or is not a
    /// directory, a limit is zero, a command name contains a path separator,
    /// a flag does not start with `-`, or a pattern is not a valid glob.
    pub fn build(self) -> Result<SecurityPolicy, ConfigError> {
        if self.allowed_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingAllowedDir);
        }
        let allowed_dir = std::fs::canonicalize(&self.allowed_dir).map_err(|source| {
            ConfigError::UnresolvableAllowedDir {
                path: self.allowed_dir.clone(),
                source,
            }
        })?;
        if !allowed_dir.is_dir() {
            return Err(ConfigError::NotADirectory(self.allowed_dir));
        }

        if self.max_command_length == 0 {
            return Err(ConfigError::NonPositive("MAX_COMMAND_LENGTH"));
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::NonPositive("COMMAND_TIMEOUT"));
        }
        if self.max_output_bytes == 0 {
            return Err(ConfigError::NonPositive("MAX_OUTPUT_BYTES"));
        }

        let mut allowed_commands = BTreeSet::new();
        for command in self.allowed_commands {
            if command.contains(['/', '\\']) {
                return Err(ConfigError::InvalidCommandName(command));
            }
            allowed_commands.insert(command);
        }

        let mut allowed_flags = BTreeSet::new();
        for flag in self.allowed_flags {
            if !flag.starts_with('-') {
                return Err(ConfigError::InvalidFlag(flag));
            }
            allowed_flags.insert(flag);
        }

        let allowed_patterns = self
            .allowed_patterns
            .into_iter()
            .map(|pattern| {
                Pattern::new(&pattern)
                    .map_err(|source| ConfigError::InvalidPattern { pattern, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SecurityPolicy {
            allowed_dir,
            allowed_commands,
            allowed_flags,
            allowed_patterns,
            max_command_length: self.max_command_length,
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            max_output_bytes: self.max_output_bytes,
            path_arguments: self.path_arguments,
        })
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Serializable copy of the policy, safe to hand to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicySnapshot {
    pub allowed_dir: String,
    pub allowed_commands: Vec<String>,
    pub allowed_flags: Vec<String>,
    pub allowed_patterns: Vec<String>,
    pub max_command_length: usize,
    pub command_timeout_seconds: u64,
    pub max_output_bytes: usize,
    pub path_arguments: PathArgumentRule,
}

impl fmt::Display for SecurityPolicySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns = if self.allowed_patterns.is_empty() {
            "(none)".to_string()
        } else {
            self.allowed_patterns.join(", ")
        };

        writeln!(f, "Security Configuration:")?;
        writeln!(f, "==================")?;
        writeln!(f, "Working Directory: {}", self.allowed_dir)?;
        writeln!(f)?;
        writeln!(f, "Allowed Commands:")?;
        writeln!(f, "----------------")?;
        writeln!(f, "{}", self.allowed_commands.join(", "))?;
        writeln!(f)?;
        writeln!(f, "Allowed Flags:")?;
        writeln!(f, "-------------")?;
        writeln!(f, "{}", self.allowed_flags.join(", "))?;
        writeln!(f)?;
        writeln!(f, "Allowed Patterns:")?;
        writeln!(f, "----------------")?;
        writeln!(f, "{}", patterns)?;
        writeln!(f)?;
        writeln!(f, "Security Limits:")?;
        writeln!(f, "---------------")?;
        writeln!(f, "Max Command Length: {} characters", self.max_command_length)?;
        writeln!(f, "Command Timeout: {} seconds", self.command_timeout_seconds)?;
        writeln!(f, "Max Output Size: {} bytes", self.max_output_bytes)?;
        writeln!(f, "Path Arguments: {}", self.path_arguments)
    }
}
