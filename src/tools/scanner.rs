//! Shell Operator Scanner
//!
//! Rejects raw input containing shell metacharacters before anything else
//! looks at it. Commands are never passed through a shell, so any of these
//! sequences is either meaningless or an injection attempt. Scanning is not
//! quote-aware: `cat "a;b"` is rejected as well.

use super::validator::ValidationError;

/// Disallowed sequences, longest first so compound operators win at a
/// given position
pub const SHELL_OPERATORS: &[&str] = &[
    "&&", "||", "$(", ";", "|", "&", "`", ")", ">", "<", "\n", "\r",
];

/// Scanner for shell metacharacters
#[derive(Debug, Clone, Copy, Default)]
pub struct OperatorScanner;

impl OperatorScanner {
    /// Fail on the first operator found in `raw`
    ///
    /// The reported position is a character offset into `raw`.
    ///
    /// # Example
    ///
    /// ```
    /// use cmdguard_server::tools::{OperatorScanner, ValidationError};
    ///
    /// assert!(OperatorScanner::scan("ls -l").is_ok());
    /// let err = OperatorScanner::scan("ls; rm -rf /").unwrap_err();
    /// assert_eq!(
    ///     err,
    ///     ValidationError::ShellOperator { operator: ";", position: 2 }
    /// );
    /// ```
    pub fn scan(raw: &str) -> Result<(), ValidationError> {
        match Self::find(raw) {
            Some((operator, position)) => {
                Err(ValidationError::ShellOperator { operator, position })
            }
            None => Ok(()),
        }
    }

    /// Locate the earliest operator in `raw`, if any
    pub fn find(raw: &str) -> Option<(&'static str, usize)> {
        for (position, (offset, _)) in raw.char_indices().enumerate() {
            let rest = &raw[offset..];
            if let Some(operator) = SHELL_OPERATORS.iter().find(|op| rest.starts_with(*op)) {
                return Some((*operator, position));
            }
        }
        None
    }
}
