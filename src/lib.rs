//! Pegcore - PEG Parsing Toolkit
//!
//! A small toolkit built around a single grammar representation:
//! - Core PEG parsing with committed, greedy, ordered-choice semantics
//! - Rightmost-failure tracking for readable diagnostics
//! - Sticky regex atoms with a thread-local pattern cache
//! - Structural semantic actions applied as rules succeed
//! - A parser DSL for idiomatic grammar definition
//! - JSON grammar interchange
//! - A compiler emitting standalone JavaScript (or TypeScript) parsers
//!
//! ## Quick Start
//!
//! ```rust
//! use pegcore::parser_dsl::{lit, re, seq, GrammarBuilder};
//! use pegcore::Value;
//!
//! let grammar = GrammarBuilder::new()
//!     .rule("Pair", seq([re("[a-z]+"), lit("="), re("[0-9]+")]))
//!     .build();
//!
//! let value = grammar.parse("answer=42").unwrap();
//! assert_eq!(
//!     value,
//!     Value::list(vec!["answer".into(), "=".into(), "42".into()])
//! );
//! ```
//!
//! ## Compiling a grammar
//!
//! ```rust
//! use pegcore::compiler::{compile, CompileOptions};
//! use pegcore::parser_dsl::{lit, GrammarBuilder};
//!
//! let grammar = GrammarBuilder::new().rule("Start", lit("a").star()).build();
//! let artifact = compile(&grammar, &CompileOptions::default()).unwrap();
//! assert!(artifact.contains("module.exports = { parse };"));
//! ```
//!
//! ## Grammars as JSON
//!
//! ```rust
//! use pegcore::Grammar;
//!
//! let grammar = Grammar::from_json(r#"[["Start", ["+", ["L", "ab"]]]]"#).unwrap();
//! assert!(grammar.parse("abab").is_ok());
//! ```
//!
//! ## Feature Flags
//!
//! - `logging` - Enable debug logging using the `log` crate

// Lint configuration for production quality
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

pub mod compiler;
pub mod error;
pub mod grammar;
pub mod parser;
pub mod parser_dsl;
pub mod regex_cache;
pub mod state;
pub mod value;

/// Re-export commonly used types for convenience
pub use compiler::{compile, CompileError, CompileOptions};
pub use error::{ParseError, SourcePosition};
pub use grammar::{Expr, Grammar, GrammarIssue, Handler, Mapping, Rule};
pub use parser::{ParseOptions, Parser, DEFAULT_MAX_RECURSION_DEPTH};
pub use parser_dsl::GrammarBuilder;
pub use state::{Expectation, Failures, Loc, MatchResult, ParseState, Parsed};
pub use value::Value;
