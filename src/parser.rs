//! The PEG engine
//!
//! [`Parser`] interprets a [`Grammar`] over an input string with the
//! classic PEG semantics: matching is committed and greedy, choice is
//! ordered, and backtracking happens only inside an enclosing choice or
//! optional. One method per operator; the atoms (`match_literal`,
//! `match_regex`) record expectations into the shared [`Failures`]
//! scratch so a failed parse can point at the rightmost interesting
//! position.
//!
//! Structural mappings are applied as rules succeed; functional action
//! bodies are opaque target-language text and only run in a compiled
//! artifact (see [`crate::compiler`]).
//!
//! # Example
//!
//! ```
//! use pegcore::parser_dsl::{lit, GrammarBuilder};
//! use pegcore::{Parser, Value};
//!
//! let grammar = GrammarBuilder::new().rule("Start", lit("a").star()).build();
//! let mut parser = Parser::new(&grammar, "aaa");
//!
//! let value = parser.parse().unwrap();
//! assert_eq!(value, Value::list(vec!["a".into(), "a".into(), "a".into()]));
//! ```

use crate::error::{ParseError, DEFAULT_FILENAME};
use crate::grammar::{mapping_shape, Expr, Grammar, Handler, Mapping};
use crate::regex_cache;
use crate::state::{Expectation, Failures, MatchResult, ParseState, Parsed};
use crate::value::Value;

/// Logging macros - no-op when the logging feature is disabled
#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

/// Logging macros - use the log crate when the logging feature is enabled
#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

/// Default maximum rule-recursion depth
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Configuration for a parse.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Label used in diagnostics; defaults to `<input>`
    pub filename: Option<String>,
    /// Maximum rule-recursion depth (0 = unlimited)
    pub max_recursion_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            filename: None,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

impl ParseOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the diagnostic filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the recursion depth limit (0 = unlimited).
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }
}

/// Internal outcome of one matching step. `Mismatch` is the ordinary PEG
/// failure an enclosing choice may recover from; `Fatal` aborts the parse.
enum Halt {
    Mismatch,
    Fatal(ParseError),
}

type Step = Result<Parsed<Value>, Halt>;

/// The engine. One instance per parse; the failure scratch is reused if
/// the same instance parses again.
pub struct Parser<'g> {
    grammar: &'g Grammar,
    input: &'g str,
    failures: Failures<'g>,
    filename: String,
    max_recursion_depth: usize,
    depth: usize,
}

impl<'g> Parser<'g> {
    /// Create a parser with default options.
    pub fn new(grammar: &'g Grammar, input: &'g str) -> Self {
        Self::with_options(grammar, input, ParseOptions::default())
    }

    /// Create a parser with explicit options.
    pub fn with_options(grammar: &'g Grammar, input: &'g str, options: ParseOptions) -> Self {
        Self {
            grammar,
            input,
            failures: Failures::new(),
            filename: options
                .filename
                .unwrap_or_else(|| DEFAULT_FILENAME.to_owned()),
            max_recursion_depth: options.max_recursion_depth,
            depth: 0,
        }
    }

    /// Run the start rule over the whole input.
    ///
    /// Returns the start rule's value, or exactly one [`ParseError`]:
    /// the "Failed to parse" diagnostic when nothing matched, the
    /// "Unconsumed input" diagnostic when the start rule stopped early,
    /// or a grammar defect discovered along the way.
    pub fn parse(&mut self) -> Result<Value, ParseError> {
        let grammar = self.grammar;
        let start = match grammar.start_rule() {
            Some(rule) => rule,
            None => return Err(ParseError::EmptyGrammar),
        };
        if let Some(issue) = grammar.check().into_iter().next() {
            return Err(issue.into_parse_error());
        }

        self.failures.reset();
        self.depth = 0;

        log_debug!(
            "starting parse: input_len={}, start_rule={}",
            self.input.len(),
            start.name
        );

        let state = ParseState::new(self.input);
        match self.eval_rule_body(&start.name, &start.expr, state) {
            Ok(parsed) if parsed.pos == self.input.len() => {
                log_debug!("parse successful: consumed all input");
                Ok(parsed.value)
            }
            Ok(parsed) => Err(ParseError::unconsumed(
                &self.filename,
                self.input,
                parsed.pos,
            )),
            Err(Halt::Mismatch) => Err(ParseError::failed(
                &self.filename,
                self.input,
                &self.failures,
            )),
            Err(Halt::Fatal(err)) => Err(err),
        }
    }

    /// Resolve a rule reference and run its body, guarding recursion depth.
    fn eval_rule(&mut self, name: &str, state: ParseState<'g>) -> Step {
        let grammar = self.grammar;
        let rule = match grammar.get(name) {
            Some(rule) => rule,
            None => {
                return Err(Halt::Fatal(ParseError::UnknownRule {
                    name: name.to_owned(),
                }))
            }
        };

        self.depth += 1;
        let result = if self.max_recursion_depth > 0 && self.depth > self.max_recursion_depth {
            Err(Halt::Fatal(ParseError::RecursionLimitExceeded {
                depth: self.depth,
                max_depth: self.max_recursion_depth,
            }))
        } else {
            self.eval_rule_body(&rule.name, &rule.expr, state)
        };
        self.depth -= 1;
        result
    }

    /// Run a rule body: the combinator tree first, then its handler.
    ///
    /// A handler-less top-level choice is the one place alternatives carry
    /// handlers directly: each alternative runs with its own handler, or
    /// with the default regex transform enabled when it has none.
    fn eval_rule_body(&mut self, rule_name: &str, expr: &'g Expr, state: ParseState<'g>) -> Step {
        let (inner, handler) = expr.split_handler();

        match handler {
            Some(handler) => {
                let parsed = self.eval(inner, state, false)?;
                apply_handler(rule_name, handler, inner, parsed)
            }
            None => {
                if let Expr::Choice(alternatives) = inner {
                    for alt in alternatives {
                        let (alt_inner, alt_handler) = alt.split_handler();
                        let attempt = match alt_handler {
                            Some(h) => self.eval(alt_inner, state, false).and_then(|parsed| {
                                apply_handler(rule_name, h, alt_inner, parsed)
                            }),
                            None => self.eval(alt_inner, state, true),
                        };
                        match attempt {
                            Err(Halt::Mismatch) => continue,
                            other => return other,
                        }
                    }
                    Err(Halt::Mismatch)
                } else {
                    self.eval(inner, state, true)
                }
            }
        }
    }

    /// Evaluate one expression node.
    ///
    /// `default_handler` marks a position whose bare regex result should
    /// collapse to the full-match string. It propagates through choice and
    /// sequence but not through repetition, optional, capture, or
    /// lookahead, matching the compiler's translation.
    fn eval(&mut self, expr: &'g Expr, state: ParseState<'g>, default_handler: bool) -> Step {
        match expr {
            Expr::Literal(lit) => self.match_literal(lit, state).ok_or(Halt::Mismatch),
            Expr::Regex(pattern) => {
                let parsed = self.match_regex(pattern, state)?;
                if default_handler {
                    Ok(default_regex_transform(parsed))
                } else {
                    Ok(parsed)
                }
            }
            Expr::Sequence(items) => self.match_sequence(items, state, default_handler),
            Expr::Choice(alternatives) => self.match_choice(alternatives, state, default_handler),
            Expr::ZeroOrMore(body) => self.match_zero_or_more(body, state),
            Expr::OneOrMore(body) => self.match_one_or_more(body, state),
            Expr::Optional(body) => self.match_optional(body, state),
            Expr::Text(body) => self.match_text(body, state),
            Expr::Lookahead(body) => self.match_lookahead(body, state, true),
            Expr::NegLookahead(body) => self.match_lookahead(body, state, false),
            Expr::RuleRef(name) => self.eval_rule(name, state),
            // Handlers bind at rule and alternative level; deeper ones are inert.
            Expr::WithHandler(wrapped, _) => self.eval(wrapped, state, default_handler),
        }
    }

    /// Match a literal string at the current position.
    fn match_literal(&mut self, literal: &'g str, state: ParseState<'g>) -> MatchResult<Value> {
        let end = state.pos + literal.len();
        if end <= state.input.len()
            && &state.input.as_bytes()[state.pos..end] == literal.as_bytes()
        {
            Some(Parsed::spanning(
                state.pos,
                end,
                Value::Str(literal.to_owned()),
            ))
        } else {
            self.failures.record(state.pos, Expectation::Literal(literal));
            None
        }
    }

    /// Match a sticky regex at the current position. The value is the
    /// match array: element 0 is the full match, the rest are capture
    /// groups (`Absent` when a group did not participate).
    fn match_regex(&mut self, pattern: &'g str, state: ParseState<'g>) -> Step {
        let regex = match regex_cache::get_or_compile(pattern) {
            Some(regex) => regex,
            None => {
                return Err(Halt::Fatal(ParseError::InvalidPattern {
                    pattern: pattern.to_owned(),
                }))
            }
        };

        match regex.captures(state.rest()) {
            Some(caps) => {
                let length = caps.get(0).map(|m| m.end()).unwrap_or(0);
                let groups = caps
                    .iter()
                    .map(|group| match group {
                        Some(m) => Value::Str(m.as_str().to_owned()),
                        None => Value::Absent,
                    })
                    .collect();
                Ok(Parsed::spanning(
                    state.pos,
                    state.pos + length,
                    Value::List(groups),
                ))
            }
            None => {
                self.failures.record(state.pos, Expectation::Pattern(pattern));
                Err(Halt::Mismatch)
            }
        }
    }

    /// Thread the position through each item; any sub-failure fails the
    /// whole sequence.
    fn match_sequence(
        &mut self,
        items: &'g [Expr],
        state: ParseState<'g>,
        default_handler: bool,
    ) -> Step {
        let mut values = Vec::with_capacity(items.len());
        let mut pos = state.pos;
        for item in items {
            let parsed = self.eval(item, state.at(pos), default_handler)?;
            values.push(parsed.value);
            pos = parsed.pos;
        }
        Ok(Parsed::spanning(state.pos, pos, Value::List(values)))
    }

    /// First success wins. Failure records from rejected alternatives are
    /// kept; the scratch self-filters by position.
    fn match_choice(
        &mut self,
        alternatives: &'g [Expr],
        state: ParseState<'g>,
        default_handler: bool,
    ) -> Step {
        for alt in alternatives {
            match self.eval(alt, state, default_handler) {
                Err(Halt::Mismatch) => continue,
                other => return other,
            }
        }
        Err(Halt::Mismatch)
    }

    /// Greedy repetition. Terminates on failure or on a zero-width
    /// success, which is dropped rather than appended so nullable bodies
    /// cannot loop. Always succeeds.
    fn match_zero_or_more(&mut self, body: &'g Expr, state: ParseState<'g>) -> Step {
        let mut values = Vec::new();
        let mut pos = state.pos;
        loop {
            match self.eval(body, state.at(pos), false) {
                Ok(parsed) => {
                    if parsed.pos == pos {
                        break;
                    }
                    values.push(parsed.value);
                    pos = parsed.pos;
                }
                Err(Halt::Mismatch) => break,
                Err(fatal) => return Err(fatal),
            }
        }
        Ok(Parsed::spanning(state.pos, pos, Value::List(values)))
    }

    /// Like zero-or-more, but the first attempt must succeed. A zero-width
    /// first success terminates immediately with an empty list.
    fn match_one_or_more(&mut self, body: &'g Expr, state: ParseState<'g>) -> Step {
        let first = self.eval(body, state, false)?;
        if first.is_zero_width() {
            return Ok(Parsed::zero_width(state.pos, Value::List(Vec::new())));
        }

        let mut values = vec![first.value];
        let mut pos = first.pos;
        loop {
            match self.eval(body, state.at(pos), false) {
                Ok(parsed) => {
                    if parsed.pos == pos {
                        break;
                    }
                    values.push(parsed.value);
                    pos = parsed.pos;
                }
                Err(Halt::Mismatch) => break,
                Err(fatal) => return Err(fatal),
            }
        }
        Ok(Parsed::spanning(state.pos, pos, Value::List(values)))
    }

    /// Sub-success passes through; sub-failure becomes a zero-width
    /// success with no value.
    fn match_optional(&mut self, body: &'g Expr, state: ParseState<'g>) -> Step {
        match self.eval(body, state, false) {
            Ok(parsed) => Ok(parsed),
            Err(Halt::Mismatch) => Ok(Parsed::zero_width(state.pos, Value::Absent)),
            Err(fatal) => Err(fatal),
        }
    }

    /// Replace the sub-result's value with the raw matched span.
    fn match_text(&mut self, body: &'g Expr, state: ParseState<'g>) -> Step {
        let parsed = self.eval(body, state, false)?;
        let text = state.input[state.pos..parsed.pos].to_owned();
        Ok(Parsed::spanning(state.pos, parsed.pos, Value::Str(text)))
    }

    /// Zero-width lookahead; never advances the position and records no
    /// expectations of its own.
    fn match_lookahead(&mut self, body: &'g Expr, state: ParseState<'g>, positive: bool) -> Step {
        match self.eval(body, state, false) {
            Ok(_) if positive => Ok(Parsed::zero_width(state.pos, Value::Absent)),
            Ok(_) => Err(Halt::Mismatch),
            Err(Halt::Mismatch) if positive => Err(Halt::Mismatch),
            Err(Halt::Mismatch) => Ok(Parsed::zero_width(state.pos, Value::Absent)),
            Err(fatal) => Err(fatal),
        }
    }
}

/// Collapse a regex match array to its full-match string.
fn default_regex_transform(mut parsed: Parsed<Value>) -> Parsed<Value> {
    parsed.value = match parsed.value {
        Value::List(mut groups) if !groups.is_empty() => groups.swap_remove(0),
        _ => Value::Absent,
    };
    parsed
}

/// Apply a structural mapping to a captured value. Out-of-range indices
/// yield `Absent`.
fn apply_mapping(mapping: &Mapping, value: &Value, single: bool, offset: i64) -> Value {
    match mapping {
        Mapping::Str(s) => Value::Str(s.clone()),
        Mapping::Index(n) => {
            if single {
                return value.clone();
            }
            let index = n + offset;
            if index < 0 {
                return Value::Absent;
            }
            match value {
                Value::List(items) => items
                    .get(index as usize)
                    .cloned()
                    .unwrap_or(Value::Absent),
                _ => Value::Absent,
            }
        }
        Mapping::List(items) => Value::List(
            items
                .iter()
                .map(|item| apply_mapping(item, value, single, offset))
                .collect(),
        ),
    }
}

/// Thread a successful result through a rule's handler.
fn apply_handler(
    rule_name: &str,
    handler: &Handler,
    node: &Expr,
    mut parsed: Parsed<Value>,
) -> Step {
    match handler {
        Handler::Action(_) => Err(Halt::Fatal(ParseError::UnsupportedAction {
            rule: rule_name.to_owned(),
        })),
        Handler::Mapping(mapping) => {
            let (single, offset) = mapping_shape(node);
            parsed.value = apply_mapping(mapping, &parsed.value, single, offset);
            Ok(parsed)
        }
    }
}
