//! Property-Based Tests for Command Validation
//!
//! These tests use proptest to check that the validation pipeline holds its
//! invariants for arbitrary inputs.
//!
//! # Test Strategies
//!
//! - **Operator Rejection**: any input containing a shell operator is refused,
//!   whatever surrounds it
//! - **Tokenization**: unquoted words split exactly like whitespace splitting
//! - **Robustness**: the validator returns a result for every input, never panics
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib tools::proptests
//! ```

use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

use crate::policy::SecurityPolicy;
use crate::tools::{CommandTokenizer, OperatorScanner, PolicyValidator, ValidationError};
use crate::tools::SHELL_OPERATORS;

// Helper: Generate one shell operator
fn arb_operator() -> impl Strategy<Value = &'static str> {
    prop::sample::select(SHELL_OPERATORS.to_vec())
}

// Helper: Text free of operator characters and quotes
fn arb_plain_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ._/-]{0,40}"
}

fn validator(root: &std::path::Path) -> PolicyValidator {
    let policy = SecurityPolicy::builder(root)
        .allowed_commands(["ls", "cat", "echo"])
        .build()
        .unwrap();
    PolicyValidator::new(Arc::new(policy))
}

// ============================================================================
// Property 1: Shell operators are always rejected
// ============================================================================

proptest! {
    #[test]
    fn prop_operator_always_rejected(
        prefix in arb_plain_text(),
        operator in arb_operator(),
        suffix in arb_plain_text(),
    ) {
        let raw = format!("{}{}{}", prefix, operator, suffix);
        let result = OperatorScanner::scan(&raw);
        let is_shell_operator = matches!(result, Err(ValidationError::ShellOperator { .. }));
        prop_assert!(is_shell_operator);
    }

    /// Quoting an operator does not hide it
    #[test]
    fn prop_quoted_operator_rejected(
        word in "[a-z]{1,10}",
        operator in arb_operator(),
        quote in prop::sample::select(vec!['\'', '"']),
    ) {
        let raw = format!("echo {q}{w}{o}{w}{q}", q = quote, w = word, o = operator);
        prop_assert!(OperatorScanner::scan(&raw).is_err());
    }

    /// The reported position is the first operator in the input
    #[test]
    fn prop_operator_position_is_prefix_length(
        prefix in arb_plain_text(),
        operator in arb_operator(),
    ) {
        let raw = format!("{}{}", prefix, operator);
        let (_, position) = OperatorScanner::find(&raw).unwrap();
        prop_assert_eq!(position, prefix.chars().count());
    }
}

// ============================================================================
// Property 2: Unquoted words tokenize like whitespace splitting
// ============================================================================

proptest! {
    #[test]
    fn prop_plain_words_split_on_whitespace(
        words in prop::collection::vec("[a-zA-Z0-9._/-]{1,12}", 1..8),
        separators in prop::collection::vec("[ \t]{1,3}", 8),
    ) {
        let mut raw = String::new();
        for (word, separator) in words.iter().zip(separators.iter()) {
            raw.push_str(word);
            raw.push_str(separator);
        }

        let tokens = CommandTokenizer::split(&raw).unwrap();
        let expected: Vec<String> = raw.split_whitespace().map(String::from).collect();
        prop_assert_eq!(tokens, expected);
    }

    /// Flags and arguments partition argv without reordering
    #[test]
    fn prop_flags_and_arguments_partition_argv(
        words in prop::collection::vec("-?[a-z]{1,6}", 2..8),
    ) {
        let raw = words.join(" ");
        let parsed = CommandTokenizer::tokenize(&raw).unwrap();

        prop_assert_eq!(parsed.argv().len(), parsed.flags.len() + parsed.arguments.len());
        prop_assert!(parsed.flags.iter().all(|flag| flag.starts_with('-')));
        prop_assert!(parsed.arguments.iter().all(|arg| !arg.starts_with('-')));
    }
}

// ============================================================================
// Property 3: Validation never panics
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_validator_never_panics(raw in "\\PC{0,64}") {
        let dir = TempDir::new().unwrap();
        let validator = validator(dir.path());
        let _ = validator.validate(&raw);
    }

    /// Anything that passes validation names an allowed command
    #[test]
    fn prop_accepted_commands_are_allowed(raw in "(ls|cat|echo|rm|sh)( [a-z.]{1,8}){0,3}") {
        let dir = TempDir::new().unwrap();
        let validator = validator(dir.path());
        if let Ok(parsed) = validator.validate(&raw) {
            prop_assert!(["ls", "cat", "echo"].contains(&parsed.name.as_str()));
        }
    }
}
