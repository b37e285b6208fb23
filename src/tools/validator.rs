//! Command Validation Module
//!
//! Applies the security policy to a raw command string. Checks run in a fixed
//! order and the first failure wins:
//!
//! 1. raw length
//! 2. shell operators
//! 3. tokenization (empty input, path-qualified names, open quotes)
//! 4. command allowlist
//! 5. flag allowlist (exact match, no bundling)
//! 6. path containment for every non-flag argument
//! 7. filename patterns for path-like arguments

use super::path::PathResolver;
use super::scanner::OperatorScanner;
use super::tokenizer::{CommandTokenizer, ParsedCommand};
use crate::policy::{PathArgumentRule, SecurityPolicy};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reasons a command is rejected before execution
///
/// Messages only echo what the caller supplied; resolved paths are never
/// included.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error(
        "Shell operator '{}' at position {} is not supported. Only single commands are allowed.",
        .operator.escape_default(),
        .position
    )]
    ShellOperator {
        operator: &'static str,
        position: usize,
    },

    #[error("Command string too long ({length} characters, maximum is {max})")]
    CommandTooLong { length: usize, max: usize },

    #[error("Command '{0}' is not allowed")]
    CommandNotAllowed(String),

    #[error("Flag '{0}' is not allowed")]
    FlagNotAllowed(String),

    #[error("Path '{0}' is not allowed")]
    PathTraversal(String),

    #[error("Argument '{0}' doesn't match allowed patterns")]
    PatternNotAllowed(String),

    #[error("Invalid command format: {0}")]
    InvalidFormat(String),
}

impl ValidationError {
    /// Stable, machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ShellOperator { .. } => "shell_operator",
            Self::CommandTooLong { .. } => "command_too_long",
            Self::CommandNotAllowed(_) => "command_not_allowed",
            Self::FlagNotAllowed(_) => "flag_not_allowed",
            Self::PathTraversal(_) => "path_traversal",
            Self::PatternNotAllowed(_) => "pattern_not_allowed",
            Self::InvalidFormat(_) => "invalid_format",
        }
    }
}

/// Command validator that enforces a [`SecurityPolicy`]
///
/// # Security Principles
///
/// 1. **Allowlist Only**: only configured commands and flags pass
/// 2. **No Shell Injection**: operators are rejected outright
/// 3. **Containment**: path arguments must resolve inside the sandbox
/// 4. **Filename Patterns**: path arguments must match a configured glob
#[derive(Debug, Clone)]
pub struct PolicyValidator {
    policy: Arc<SecurityPolicy>,
}

impl PolicyValidator {
    /// Create a validator for `policy`
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }

    /// Run every check against `raw`
    ///
    /// Returns the tokenized command unchanged on success.
    pub fn validate(&self, raw: &str) -> Result<ParsedCommand, ValidationError> {
        self.check_length(raw)?;
        OperatorScanner::scan(raw)?;
        let parsed = CommandTokenizer::tokenize(raw)?;
        self.check(&parsed)?;
        Ok(parsed)
    }

    /// Reject raw input longer than the configured maximum
    pub fn check_length(&self, raw: &str) -> Result<(), ValidationError> {
        let length = raw.chars().count();
        let max = self.policy.max_command_length();
        if length > max {
            return Err(ValidationError::CommandTooLong { length, max });
        }
        Ok(())
    }

    /// Apply the command, flag, containment and pattern checks
    pub fn check(&self, command: &ParsedCommand) -> Result<(), ValidationError> {
        self.check_command(&command.name)?;
        self.check_flags(&command.flags)?;

        let resolved = self.check_containment(&command.arguments)?;
        self.check_patterns(&resolved)?;

        Ok(())
    }

    fn check_command(&self, name: &str) -> Result<(), ValidationError> {
        if !self.policy.is_command_allowed(name) {
            return Err(ValidationError::CommandNotAllowed(name.to_string()));
        }
        Ok(())
    }

    fn check_flags(&self, flags: &[String]) -> Result<(), ValidationError> {
        match flags.iter().find(|flag| !self.policy.is_flag_allowed(flag)) {
            Some(flag) => Err(ValidationError::FlagNotAllowed(flag.clone())),
            None => Ok(()),
        }
    }

    /// Resolve every argument, returning `(argument, resolved)`
    ///
    /// A bare word resolves inside the sandbox unless it names a symlink
    /// leading out of it.
    fn check_containment<'a>(
        &self,
        arguments: &'a [String],
    ) -> Result<Vec<(&'a str, PathBuf)>, ValidationError> {
        let root = self.policy.allowed_dir();

        arguments
            .iter()
            .map(|argument| {
                PathResolver::resolve_within(Path::new(argument), root)
                    .map(|resolved| (argument.as_str(), resolved))
                    .ok_or_else(|| ValidationError::PathTraversal(argument.clone()))
            })
            .collect()
    }

    /// Directories are governed by containment only
    fn check_patterns(&self, resolved: &[(&str, PathBuf)]) -> Result<(), ValidationError> {
        if !self.policy.has_patterns() {
            return Ok(());
        }

        for (argument, path) in resolved {
            if !self.is_path_like(argument) || path.is_dir() {
                continue;
            }
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy())
                .unwrap_or_default();
            if !self.policy.matches_pattern(&file_name) {
                return Err(ValidationError::PatternNotAllowed(argument.to_string()));
            }
        }

        Ok(())
    }

    /// Whether an argument is held to the filename patterns
    pub fn is_path_like(&self, argument: &str) -> bool {
        match self.policy.path_arguments() {
            PathArgumentRule::All => true,
            PathArgumentRule::Separator => {
                argument.contains(['/', '\\']) || argument == "." || argument == ".."
            }
        }
    }

    /// Get the policy being enforced
    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Sandbox {
        _dir: TempDir,
        root: PathBuf,
    }

    fn sandbox() -> Sandbox {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub").join("file.txt"), "hello").unwrap();
        fs::write(root.join("notes.md"), "# notes").unwrap();
        fs::write(root.join("id_rsa"), "key").unwrap();
        Sandbox { _dir: dir, root }
    }

    fn validator(root: &Path, patterns: &[&str]) -> PolicyValidator {
        let policy = SecurityPolicy::builder(root)
            .allowed_commands(["ls", "cat", "pwd", "head"])
            .allowed_flags(["-l", "-a", "--help", "-n"])
            .allowed_patterns(patterns.iter().copied())
            .max_command_length(64)
            .build()
            .unwrap();
        PolicyValidator::new(Arc::new(policy))
    }

    #[test]
    fn test_validate_allowed_command() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &[]);

        let parsed = validator.validate("ls -l -a").unwrap();
        assert_eq!(parsed.name, "ls");
        assert_eq!(parsed.flags, vec!["-l", "-a"]);
        assert!(parsed.arguments.is_empty());
    }

    #[test]
    fn test_validate_not_allowed_command() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &[]);

        let result = validator.validate("echo hi");
        assert_eq!(result, Err(ValidationError::CommandNotAllowed("echo".into())));
    }

    #[test]
    fn test_validate_flag_not_allowed() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &[]);

        let result = validator.validate("ls -R");
        assert_eq!(result, Err(ValidationError::FlagNotAllowed("-R".into())));

        // No bundling: -la is not -l plus -a
        let result = validator.validate("ls -la");
        assert_eq!(result, Err(ValidationError::FlagNotAllowed("-la".into())));
    }

    #[test]
    fn test_validate_shell_metacharacters() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &[]);

        let dangerous = vec![
            "ls; rm -rf /",
            "ls | cat",
            "ls & pwd",
            "cat `whoami`",
            "cat $(whoami)",
            "ls > out.txt",
            "cat < in.txt",
            "ls && pwd",
            "ls || pwd",
            "ls\npwd",
        ];

        for command in dangerous {
            let result = validator.validate(command);
            assert!(
                matches!(result, Err(ValidationError::ShellOperator { .. })),
                "Should reject {:?}",
                command
            );
        }
    }

    #[test]
    fn test_length_checked_first() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &[]);

        // Over-long beats every other failure, including operators
        let long = format!("ls; {}", "a".repeat(100));
        let result = validator.validate(&long);
        assert!(matches!(result, Err(ValidationError::CommandTooLong { .. })));

        let exactly = format!("ls {}", "a".repeat(61));
        assert_eq!(exactly.chars().count(), 64);
        assert!(validator.check_length(&exactly).is_ok());
    }

    #[test]
    fn test_traversal_rejected() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &[]);

        let attack = format!("cat {}/../etc/passwd", sandbox.root.display());
        let result = validator.validate(&attack);
        assert!(matches!(result, Err(ValidationError::PathTraversal(_))));

        let result = validator.validate("cat ../../etc/passwd");
        assert_eq!(
            result,
            Err(ValidationError::PathTraversal("../../etc/passwd".into()))
        );

        let result = validator.validate("ls ..");
        assert_eq!(result, Err(ValidationError::PathTraversal("..".into())));
    }

    #[test]
    fn test_contained_path_accepted() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &[]);

        let absolute = format!("cat {}/sub/file.txt", sandbox.root.display());
        assert!(validator.validate(&absolute).is_ok());
        assert!(validator.validate("cat sub/file.txt").is_ok());
        assert!(validator.validate("ls .").is_ok());
    }

    #[test]
    fn test_unresolvable_path_rejected() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &[]);

        let result = validator.validate("cat missing/file.txt");
        assert_eq!(
            result,
            Err(ValidationError::PathTraversal("missing/file.txt".into()))
        );
    }

    #[test]
    fn test_bare_filename_contained_without_patterns() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &[]);

        assert!(validator.validate("cat id_rsa").is_ok());
        assert!(validator.validate("cat does-not-exist").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_bare_symlink_escape_rejected_without_patterns() {
        let sandbox = sandbox();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), "secret").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), sandbox.root.join("link"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path(), sandbox.root.join("elsewhere")).unwrap();
        let validator = validator(&sandbox.root, &[]);

        assert_eq!(
            validator.validate("cat link"),
            Err(ValidationError::PathTraversal("link".into()))
        );
        assert_eq!(
            validator.validate("ls -l elsewhere"),
            Err(ValidationError::PathTraversal("elsewhere".into()))
        );
    }

    #[test]
    fn test_patterns_apply_to_bare_filenames() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &["*.txt", "*.md"]);

        assert!(validator.validate("cat notes.md").is_ok());
        assert!(validator.validate("cat sub/file.txt").is_ok());

        let result = validator.validate("cat id_rsa");
        assert_eq!(result, Err(ValidationError::PatternNotAllowed("id_rsa".into())));
    }

    #[test]
    fn test_directories_skip_patterns() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &["*.txt"]);

        assert!(validator.validate("ls sub").is_ok());
        assert!(validator.validate("ls -l sub/").is_ok());
    }

    #[test]
    fn test_containment_before_patterns() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &["*.txt"]);

        // The first argument fails patterns, the second fails containment;
        // containment is checked across all arguments first
        let result = validator.validate("cat id_rsa ../outside.txt");
        assert_eq!(
            result,
            Err(ValidationError::PathTraversal("../outside.txt".into()))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_name_checked_by_target() {
        let sandbox = sandbox();
        std::os::unix::fs::symlink(sandbox.root.join("id_rsa"), sandbox.root.join("key.txt"))
            .unwrap();
        let validator = validator(&sandbox.root, &["*.txt"]);

        let result = validator.validate("cat key.txt");
        assert_eq!(result, Err(ValidationError::PatternNotAllowed("key.txt".into())));
    }

    #[test]
    fn test_separator_rule_exempts_bare_words_from_patterns() {
        let sandbox = sandbox();
        let policy = SecurityPolicy::builder(&sandbox.root)
            .allowed_commands(["head", "cat"])
            .allowed_flags(["-n"])
            .allowed_patterns(["*.txt"])
            .path_arguments(PathArgumentRule::Separator)
            .build()
            .unwrap();
        let validator = PolicyValidator::new(Arc::new(policy));

        assert!(!validator.is_path_like("5"));
        assert!(validator.is_path_like("sub/file.txt"));
        assert!(validator.validate("head -n 5 sub/file.txt").is_ok());
        assert_eq!(
            validator.validate("cat ./id_rsa"),
            Err(ValidationError::PatternNotAllowed("./id_rsa".into()))
        );
        assert!(matches!(
            validator.validate("head ../x"),
            Err(ValidationError::PathTraversal(_))
        ));
    }

    #[test]
    fn test_all_rule_applies_patterns_to_bare_words() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &["*.txt"]);

        assert!(validator.is_path_like("5"));
        assert_eq!(
            validator.validate("head -n 5 sub/file.txt"),
            Err(ValidationError::PatternNotAllowed("5".into()))
        );
    }

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(
            ValidationError::ShellOperator {
                operator: ";",
                position: 0
            }
            .kind(),
            "shell_operator"
        );
        assert_eq!(
            ValidationError::CommandTooLong { length: 2, max: 1 }.kind(),
            "command_too_long"
        );
        assert_eq!(
            ValidationError::CommandNotAllowed("x".into()).kind(),
            "command_not_allowed"
        );
        assert_eq!(ValidationError::FlagNotAllowed("-x".into()).kind(), "flag_not_allowed");
        assert_eq!(ValidationError::PathTraversal("x".into()).kind(), "path_traversal");
        assert_eq!(
            ValidationError::PatternNotAllowed("x".into()).kind(),
            "pattern_not_allowed"
        );
        assert_eq!(ValidationError::InvalidFormat("x".into()).kind(), "invalid_format");
    }

    #[test]
    fn test_error_messages() {
        let err = ValidationError::ShellOperator {
            operator: "\n",
            position: 2,
        };
        assert_eq!(
            err.to_string(),
            "Shell operator '\\n' at position 2 is not supported. Only single commands are allowed."
        );

        let err = ValidationError::CommandNotAllowed("rm".into());
        assert_eq!(err.to_string(), "Command 'rm' is not allowed");
    }

    #[test]
    fn test_error_message_does_not_leak_root() {
        let sandbox = sandbox();
        let validator = validator(&sandbox.root, &[]);

        let err = validator.validate("cat ../secret").unwrap_err();
        let root = sandbox.root.display().to_string();
        assert!(!err.to_string().contains(&root));
    }
}
