//! Parser DSL - fluent grammar definition
//!
//! Free constructor functions build atoms and composites; postfix methods
//! on [`Expr`] add repetition, lookahead, capture, and semantic actions.
//! [`GrammarBuilder`] collects named rules in insertion order; the first
//! rule becomes the start rule.
//!
//! # Example
//!
//! ```
//! use pegcore::parser_dsl::{choice, lit, re, seq, GrammarBuilder};
//!
//! let grammar = GrammarBuilder::new()
//!     .rule("Greeting", seq([lit("hello"), re("\\s+"), lit("world")]))
//!     .build();
//!
//! assert!(grammar.parse("hello  world").is_ok());
//! # let _ = choice([lit("a")]);
//! ```

use crate::grammar::{Expr, Grammar, Handler, Mapping};

/// A literal string atom.
pub fn lit(s: impl Into<String>) -> Expr {
    Expr::Literal(s.into())
}

/// A sticky regex atom.
pub fn re(pattern: impl Into<String>) -> Expr {
    Expr::Regex(pattern.into())
}

/// A sequence of sub-expressions.
pub fn seq(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Sequence(items.into_iter().collect())
}

/// An ordered choice over alternatives.
pub fn choice(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Choice(items.into_iter().collect())
}

/// A late-bound reference to a named rule.
pub fn ref_(name: impl Into<String>) -> Expr {
    Expr::RuleRef(name.into())
}

impl Expr {
    /// Greedy zero-or-more repetition.
    pub fn star(self) -> Expr {
        Expr::ZeroOrMore(Box::new(self))
    }

    /// Greedy one-or-more repetition.
    pub fn plus(self) -> Expr {
        Expr::OneOrMore(Box::new(self))
    }

    /// Optional match.
    pub fn opt(self) -> Expr {
        Expr::Optional(Box::new(self))
    }

    /// Replace the result with the raw matched text.
    pub fn text(self) -> Expr {
        Expr::Text(Box::new(self))
    }

    /// Positive lookahead; matches without consuming.
    pub fn ahead(self) -> Expr {
        Expr::Lookahead(Box::new(self))
    }

    /// Negative lookahead; succeeds when `self` does not match.
    pub fn not_ahead(self) -> Expr {
        Expr::NegLookahead(Box::new(self))
    }

    /// Attach a functional action body (runs in compiled artifacts only).
    pub fn action(self, body: impl Into<String>) -> Expr {
        Expr::WithHandler(Box::new(self), Handler::Action(body.into()))
    }

    /// Attach a structural mapping.
    pub fn map(self, mapping: Mapping) -> Expr {
        Expr::WithHandler(Box::new(self), Handler::Mapping(mapping))
    }

    /// Attach a single-index structural mapping; `pick(1)` selects the
    /// first element of a sequence or the first capture group of a regex.
    pub fn pick(self, index: i64) -> Expr {
        self.map(Mapping::Index(index))
    }
}

/// Builder collecting named rules into a [`Grammar`].
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    grammar: Grammar,
}

impl GrammarBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. The first rule added becomes the start rule.
    pub fn rule(mut self, name: &str, expr: Expr) -> Self {
        self.grammar.add_rule(name, expr);
        self
    }

    /// Finish building.
    pub fn build(self) -> Grammar {
        self.grammar
    }
}
