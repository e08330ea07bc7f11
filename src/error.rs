//! Parse diagnostics
//!
//! A failed parse surfaces as a single [`ParseError`]. The two user-facing
//! variants render the diagnostic formats shown below; the remaining
//! variants report grammar defects discovered while parsing.
//!
//! ```text
//! <filename>:<line>:<column> Failed to parse
//! Expected:
//!     "a"
//!     /[0-9]+/
//! Found: "c"
//! ```
//!
//! ```text
//! <filename>:<line>:<column> Unconsumed input at <line>:<column>
//!
//! <remaining input>
//! ```

use crate::state::Failures;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Filename used in diagnostics when none is supplied.
pub const DEFAULT_FILENAME: &str = "<input>";

/// A position in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    /// Byte offset from the start of the input
    pub offset: usize,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based, counted in characters)
    pub column: usize,
}

impl SourcePosition {
    /// Calculate the position of `offset` in `input`.
    ///
    /// Lines are delimited by `\n`, `\r\n`, or a lone `\r`; a `\r\n` pair
    /// counts as one line break.
    pub fn from_offset(input: &str, offset: usize) -> Self {
        let offset = offset.min(input.len());

        let mut line = 1;
        let mut column = 1;
        let mut chars = input[..offset].chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '\r' => {
                    line += 1;
                    column = 1;
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                }
                '\n' => {
                    line += 1;
                    column = 1;
                }
                _ => column += 1,
            }
        }

        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// Short look-ahead used for the `Found:` hint: a run of non-space, a run
// of whitespace, or nothing at end of input.
static HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A(?s:\S+|\s+)").expect("hint pattern"));

/// JSON-quote a string for diagnostics and emitted code.
pub(crate) fn json_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{:?}", s))
}

/// The `Found:` hint at `pos`: the next token-ish run, JSON-quoted, or
/// `EOF` at end of input.
pub(crate) fn lookahead_hint(input: &str, pos: usize) -> String {
    if pos >= input.len() {
        return "EOF".to_owned();
    }
    match HINT.find(&input[pos..]) {
        Some(m) if !m.as_str().is_empty() => json_str(m.as_str()),
        _ => "EOF".to_owned(),
    }
}

/// Error raised by a parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No result at the start rule
    Failed {
        /// Diagnostic label for the input
        filename: String,
        /// Where the rightmost failure was recorded
        position: SourcePosition,
        /// Deduplicated, pretty-printed expectations at that position
        expected: Vec<String>,
        /// Short look-ahead at the failure position
        found: String,
    },

    /// The start rule matched but input remains
    Unconsumed {
        /// Diagnostic label for the input
        filename: String,
        /// Where parsing stopped
        position: SourcePosition,
        /// The input left over
        remaining: String,
    },

    /// A rule reference did not resolve
    UnknownRule {
        /// The unresolved name
        name: String,
    },

    /// The grammar has no rules
    EmptyGrammar,

    /// Rule recursion exceeded the configured limit
    RecursionLimitExceeded {
        /// Depth reached
        depth: usize,
        /// Configured limit
        max_depth: usize,
    },

    /// A regex atom's pattern failed to compile
    InvalidPattern {
        /// The offending pattern source
        pattern: String,
    },

    /// A functional action was encountered; action bodies only run in the
    /// compiled artifact
    UnsupportedAction {
        /// The rule carrying the action
        rule: String,
    },
}

impl ParseError {
    /// Build the "Failed to parse" diagnostic from the failure scratch.
    pub(crate) fn failed(filename: &str, input: &str, failures: &Failures<'_>) -> Self {
        let pos = failures.max_fail_pos();
        let mut expected: Vec<String> = Vec::new();
        for expectation in failures.expected() {
            let pretty = expectation.to_string();
            if !expected.contains(&pretty) {
                expected.push(pretty);
            }
        }
        ParseError::Failed {
            filename: filename.to_owned(),
            position: SourcePosition::from_offset(input, pos),
            expected,
            found: lookahead_hint(input, pos),
        }
    }

    /// Build the "Unconsumed input" diagnostic at `pos`.
    pub(crate) fn unconsumed(filename: &str, input: &str, pos: usize) -> Self {
        ParseError::Unconsumed {
            filename: filename.to_owned(),
            position: SourcePosition::from_offset(input, pos),
            remaining: input[pos..].to_owned(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Failed {
                filename,
                position,
                expected,
                found,
            } => {
                writeln!(f, "{}:{} Failed to parse", filename, position)?;
                writeln!(f, "Expected:")?;
                for expectation in expected {
                    writeln!(f, "    {}", expectation)?;
                }
                write!(f, "Found: {}", found)
            }
            ParseError::Unconsumed {
                filename,
                position,
                remaining,
            } => {
                writeln!(
                    f,
                    "{}:{} Unconsumed input at {}",
                    filename, position, position
                )?;
                writeln!(f)?;
                write!(f, "{}", remaining)
            }
            ParseError::UnknownRule { name } => {
                write!(f, "reference to unknown rule {:?}", name)
            }
            ParseError::EmptyGrammar => write!(f, "grammar has no rules"),
            ParseError::RecursionLimitExceeded { depth, max_depth } => {
                write!(
                    f,
                    "recursion limit exceeded: depth {} exceeds limit of {}",
                    depth, max_depth
                )
            }
            ParseError::InvalidPattern { pattern } => {
                write!(f, "invalid regex pattern: {:?}", pattern)
            }
            ParseError::UnsupportedAction { rule } => {
                write!(
                    f,
                    "rule {:?} carries a functional action; actions run only in compiled parsers",
                    rule
                )
            }
        }
    }
}

impl std::error::Error for ParseError {}
