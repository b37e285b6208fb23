//! Command Tokenizer
//!
//! Splits a scanned command string into a command name, flags and arguments.
//! Whitespace separates tokens; single- and double-quoted spans are kept
//! together and the quotes are stripped. Backslashes are ordinary characters.

use super::validator::ValidationError;

/// A tokenized command, ready for policy checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// The command to execute (first token)
    pub name: String,

    /// Tokens starting with `-`, in original order
    pub flags: Vec<String>,

    /// All other tokens, in original order
    pub arguments: Vec<String>,

    /// Every token after the name in original order, as executed
    argv: Vec<String>,
}

impl ParsedCommand {
    /// Build from already-split tokens
    ///
    /// Returns `None` when there are no tokens.
    pub fn from_tokens(tokens: Vec<String>) -> Option<Self> {
        let mut tokens = tokens.into_iter();
        let name = tokens.next()?;
        let argv: Vec<String> = tokens.collect();

        let (flags, arguments): (Vec<String>, Vec<String>) =
            argv.iter().cloned().partition(|token| is_flag(token));

        Some(Self {
            name,
            flags,
            arguments,
            argv,
        })
    }

    /// Arguments vector passed to the process, flags and arguments interleaved
    /// as the caller wrote them
    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

/// Whether a token is a flag
pub fn is_flag(token: &str) -> bool {
    token.starts_with('-')
}

/// Quote-aware command tokenizer
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandTokenizer;

impl CommandTokenizer {
    /// Tokenize `raw` into a [`ParsedCommand`]
    ///
    /// # Errors
    ///
    /// - `CommandNotAllowed` if there are no tokens, the name is empty, or
    ///   the name contains a path separator
    /// - `InvalidFormat` if a quote is left open
    ///
    /// # Example
    ///
    /// ```
    /// use cmdguard_server::tools::CommandTokenizer;
    ///
    /// let parsed = CommandTokenizer::tokenize("ls -l 'my dir'").unwrap();
    /// assert_eq!(parsed.name, "ls");
    /// assert_eq!(parsed.flags, vec!["-l"]);
    /// assert_eq!(parsed.arguments, vec!["my dir"]);
    /// ```
    pub fn tokenize(raw: &str) -> Result<ParsedCommand, ValidationError> {
        let tokens = Self::split(raw)?;
        let parsed = ParsedCommand::from_tokens(tokens)
            .ok_or_else(|| ValidationError::CommandNotAllowed(String::new()))?;

        if parsed.name.is_empty() || parsed.name.contains(['/', '\\']) {
            return Err(ValidationError::CommandNotAllowed(parsed.name));
        }

        Ok(parsed)
    }

    /// Split `raw` on whitespace, honouring quotes
    pub fn split(raw: &str) -> Result<Vec<String>, ValidationError> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut in_token = false;
        let mut quote: Option<char> = None;

        for c in raw.chars() {
            match quote {
                Some(open) if c == open => quote = None,
                Some(_) => current.push(c),
                None if c == '\'' || c == '"' => {
                    quote = Some(c);
                    in_token = true;
                }
                None if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                None => {
                    current.push(c);
                    in_token = true;
                }
            }
        }

        if let Some(open) = quote {
            return Err(ValidationError::InvalidFormat(format!(
                "unterminated {} quote",
                if open == '\'' { "single" } else { "double" }
            )));
        }

        if in_token {
            tokens.push(current);
        }

        Ok(tokens)
    }
}
