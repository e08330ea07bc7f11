//! Grammar types
//!
//! A grammar is an ordered table of named rules; the first rule is the
//! start rule. Each rule body is an expression tree of PEG operators.
//! Rule references are late-bound names, so rules may recurse and refer
//! forward.
//!
//! Grammars round-trip through a compact JSON form: an expression is
//! either a bare string (a rule reference) or a tagged array
//! `[op, args, handler?]`, and a grammar is an array of `[name, expr]`
//! pairs. Handlers are `{"f": "..."}` for functional actions or a
//! string/integer/array mapping literal for structural rearrangement.
//!
//! ```
//! use pegcore::Grammar;
//!
//! let grammar = Grammar::from_json(
//!     r#"[["Start", ["*", ["L", "a"]]]]"#,
//! ).unwrap();
//! assert_eq!(grammar.rule_count(), 1);
//! ```

use crate::error::ParseError;
use crate::parser::{ParseOptions, Parser};
use crate::regex_cache;
use crate::value::Value;
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as Json;
use std::fmt;

/// A parse expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `L` - match a literal string
    Literal(String),
    /// `R` - match a sticky regex at the current position
    Regex(String),
    /// `S` - match sub-expressions in order
    Sequence(Vec<Expr>),
    /// `/` - ordered choice, first success wins
    Choice(Vec<Expr>),
    /// `*` - greedy zero-or-more
    ZeroOrMore(Box<Expr>),
    /// `+` - greedy one-or-more
    OneOrMore(Box<Expr>),
    /// `?` - optional
    Optional(Box<Expr>),
    /// `$` - replace the sub-result with the raw matched text
    Text(Box<Expr>),
    /// `&` - positive lookahead, zero-width
    Lookahead(Box<Expr>),
    /// `!` - negative lookahead, zero-width
    NegLookahead(Box<Expr>),
    /// A late-bound reference to a named rule
    RuleRef(String),
    /// An expression with a semantic action attached. Handlers bind at
    /// rule level and on the alternatives of a rule's top-level choice;
    /// anywhere deeper they are carried but ignored.
    WithHandler(Box<Expr>, Handler),
}

impl Expr {
    /// Split off an attached handler, if any.
    #[inline]
    pub fn split_handler(&self) -> (&Expr, Option<&Handler>) {
        match self {
            Expr::WithHandler(inner, handler) => (inner, Some(handler)),
            other => (other, None),
        }
    }
}

/// A semantic action attached to a rule or alternative.
#[derive(Debug, Clone, PartialEq)]
pub enum Handler {
    /// An opaque action body in the artifact's target language
    Action(String),
    /// A structural rearrangement of the captured value
    Mapping(Mapping),
}

/// A structural mapping literal.
///
/// A string is emitted verbatim; a number selects from the captured
/// value (with per-operator offset adjustments); an array constructs a
/// list element-wise.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapping {
    /// A literal string
    Str(String),
    /// Select element `n` of the captured value
    Index(i64),
    /// Construct a list, translating each element
    List(Vec<Mapping>),
}

impl Mapping {
    /// A list mapping selecting the given indices, e.g. `indices(&[2, 1])`
    /// reorders a two-element sequence.
    pub fn indices(indices: &[i64]) -> Mapping {
        Mapping::List(indices.iter().map(|&i| Mapping::Index(i)).collect())
    }
}

/// A named rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// The rule's name, referenced by `Expr::RuleRef`
    pub name: String,
    /// The rule body
    pub expr: Expr,
}

/// An ordered rule table. The first rule is the start rule.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Grammar {
    /// The rules in declaration order
    pub rules: Vec<Rule>,
}

/// A problem found by [`Grammar::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarIssue {
    /// A rule reference does not resolve
    UnknownRule {
        /// The rule containing the reference
        rule: String,
        /// The unresolved name
        name: String,
    },
    /// A regex atom's pattern does not compile
    InvalidPattern {
        /// The rule containing the atom
        rule: String,
        /// The offending pattern
        pattern: String,
    },
    /// A functional action, which the in-process engine cannot run
    UnsupportedAction {
        /// The rule carrying the action
        rule: String,
    },
}

impl fmt::Display for GrammarIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarIssue::UnknownRule { rule, name } => {
                write!(f, "rule {:?} references unknown rule {:?}", rule, name)
            }
            GrammarIssue::InvalidPattern { rule, pattern } => {
                write!(f, "rule {:?} has invalid regex pattern {:?}", rule, pattern)
            }
            GrammarIssue::UnsupportedAction { rule } => {
                write!(f, "rule {:?} carries a functional action", rule)
            }
        }
    }
}

impl GrammarIssue {
    pub(crate) fn into_parse_error(self) -> ParseError {
        match self {
            GrammarIssue::UnknownRule { name, .. } => ParseError::UnknownRule { name },
            GrammarIssue::InvalidPattern { pattern, .. } => {
                ParseError::InvalidPattern { pattern }
            }
            GrammarIssue::UnsupportedAction { rule } => {
                ParseError::UnsupportedAction { rule }
            }
        }
    }
}

impl Grammar {
    /// Create an empty grammar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. The first rule added becomes the start rule.
    pub fn add_rule(&mut self, name: impl Into<String>, expr: Expr) -> &mut Self {
        self.rules.push(Rule {
            name: name.into(),
            expr,
        });
        self
    }

    /// Look up a rule by name.
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// The start rule, if any.
    #[inline]
    pub fn start_rule(&self) -> Option<&Rule> {
        self.rules.first()
    }

    /// Number of rules.
    #[inline]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Serialize to the compact JSON form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from the compact JSON form.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Check that this grammar is executable by the in-process engine.
    ///
    /// Reports every issue found: unresolved rule references, regex
    /// patterns that do not compile, and functional actions (which only
    /// run in a compiled artifact).
    pub fn check(&self) -> Vec<GrammarIssue> {
        let mut issues = Vec::new();

        for rule in &self.rules {
            let mut action_reported = false;
            walk(&rule.expr, &mut |expr| match expr {
                Expr::RuleRef(name) => {
                    if self.get(name).is_none() {
                        issues.push(GrammarIssue::UnknownRule {
                            rule: rule.name.clone(),
                            name: name.clone(),
                        });
                    }
                }
                Expr::Regex(pattern) => {
                    if regex_cache::get_or_compile(pattern).is_none() {
                        issues.push(GrammarIssue::InvalidPattern {
                            rule: rule.name.clone(),
                            pattern: pattern.clone(),
                        });
                    }
                }
                Expr::WithHandler(_, Handler::Action(_)) => {
                    if !action_reported {
                        action_reported = true;
                        issues.push(GrammarIssue::UnsupportedAction {
                            rule: rule.name.clone(),
                        });
                    }
                }
                _ => {}
            });
        }

        issues
    }

    /// One-shot parse with default options.
    ///
    /// ```
    /// use pegcore::parser_dsl::{lit, GrammarBuilder};
    ///
    /// let grammar = GrammarBuilder::new().rule("Start", lit("hi")).build();
    /// assert!(grammar.parse("hi").is_ok());
    /// ```
    pub fn parse(&self, input: &str) -> Result<Value, ParseError> {
        Parser::new(self, input).parse()
    }

    /// One-shot parse with explicit options.
    pub fn parse_with(&self, input: &str, options: ParseOptions) -> Result<Value, ParseError> {
        Parser::with_options(self, input, options).parse()
    }
}

/// The `single`/`offset` pair a structural mapping uses against a given
/// operator: sequences index with `1` meaning the first element, regexes
/// with `0` meaning the full match, everything else collapses to the
/// scalar value.
pub(crate) fn mapping_shape(node: &Expr) -> (bool, i64) {
    match node {
        Expr::Sequence(_) => (false, -1),
        Expr::Regex(_) => (false, 0),
        _ => (true, 0),
    }
}

/// Pre-order walk over an expression tree, including handler-wrapped
/// nodes' interiors.
pub(crate) fn walk<'e>(expr: &'e Expr, visit: &mut impl FnMut(&'e Expr)) {
    visit(expr);
    match expr {
        Expr::Sequence(items) | Expr::Choice(items) => {
            for item in items {
                walk(item, visit);
            }
        }
        Expr::ZeroOrMore(inner)
        | Expr::OneOrMore(inner)
        | Expr::Optional(inner)
        | Expr::Text(inner)
        | Expr::Lookahead(inner)
        | Expr::NegLookahead(inner)
        | Expr::WithHandler(inner, _) => walk(inner, visit),
        Expr::Literal(_) | Expr::Regex(_) | Expr::RuleRef(_) => {}
    }
}

// ---------------------------------------------------------------------------
// JSON interchange
// ---------------------------------------------------------------------------

fn expr_to_wire(expr: &Expr) -> Result<Json, String> {
    let (node, handler) = expr.split_handler();

    let mut items: Vec<Json> = match node {
        Expr::RuleRef(name) => {
            if handler.is_some() {
                return Err("a rule reference cannot carry a handler".to_owned());
            }
            return Ok(Json::String(name.clone()));
        }
        Expr::Literal(s) => vec![Json::from("L"), Json::from(s.as_str())],
        Expr::Regex(p) => vec![Json::from("R"), Json::from(p.as_str())],
        Expr::Sequence(children) => vec![Json::from("S"), children_to_wire(children)?],
        Expr::Choice(children) => vec![Json::from("/"), children_to_wire(children)?],
        Expr::ZeroOrMore(inner) => vec![Json::from("*"), expr_to_wire(inner)?],
        Expr::OneOrMore(inner) => vec![Json::from("+"), expr_to_wire(inner)?],
        Expr::Optional(inner) => vec![Json::from("?"), expr_to_wire(inner)?],
        Expr::Text(inner) => vec![Json::from("$"), expr_to_wire(inner)?],
        Expr::Lookahead(inner) => vec![Json::from("&"), expr_to_wire(inner)?],
        Expr::NegLookahead(inner) => vec![Json::from("!"), expr_to_wire(inner)?],
        Expr::WithHandler(..) => {
            return Err("nested handlers cannot be serialized".to_owned());
        }
    };

    if let Some(handler) = handler {
        items.push(handler_to_wire(handler));
    }
    Ok(Json::Array(items))
}

fn children_to_wire(children: &[Expr]) -> Result<Json, String> {
    let items: Result<Vec<Json>, String> = children.iter().map(expr_to_wire).collect();
    Ok(Json::Array(items?))
}

fn handler_to_wire(handler: &Handler) -> Json {
    match handler {
        Handler::Action(body) => serde_json::json!({ "f": body }),
        Handler::Mapping(mapping) => mapping_to_wire(mapping),
    }
}

fn mapping_to_wire(mapping: &Mapping) -> Json {
    match mapping {
        Mapping::Str(s) => Json::from(s.as_str()),
        Mapping::Index(n) => Json::from(*n),
        Mapping::List(items) => Json::Array(items.iter().map(mapping_to_wire).collect()),
    }
}

fn expr_from_wire(value: &Json) -> Result<Expr, String> {
    match value {
        Json::String(name) => Ok(Expr::RuleRef(name.clone())),
        Json::Array(items) => {
            let op = items
                .first()
                .and_then(Json::as_str)
                .ok_or_else(|| "expression array must start with an operator tag".to_owned())?;
            let args = items
                .get(1)
                .ok_or_else(|| format!("operator {:?} is missing its arguments", op))?;

            let node = match op {
                "L" => Expr::Literal(string_arg(op, args)?),
                "R" => Expr::Regex(string_arg(op, args)?),
                "S" => Expr::Sequence(children_from_wire(op, args)?),
                "/" => Expr::Choice(children_from_wire(op, args)?),
                "*" => Expr::ZeroOrMore(Box::new(expr_from_wire(args)?)),
                "+" => Expr::OneOrMore(Box::new(expr_from_wire(args)?)),
                "?" => Expr::Optional(Box::new(expr_from_wire(args)?)),
                "$" => Expr::Text(Box::new(expr_from_wire(args)?)),
                "&" => Expr::Lookahead(Box::new(expr_from_wire(args)?)),
                "!" => Expr::NegLookahead(Box::new(expr_from_wire(args)?)),
                other => return Err(format!("unknown operator {:?}", other)),
            };

            match items.get(2) {
                Some(h) => Ok(Expr::WithHandler(
                    Box::new(node),
                    handler_from_wire(h)?,
                )),
                None => Ok(node),
            }
        }
        _ => Err("expected a rule name or [op, args, handler?] array".to_owned()),
    }
}

fn string_arg(op: &str, args: &Json) -> Result<String, String> {
    args.as_str()
        .map(str::to_owned)
        .ok_or_else(|| format!("operator {:?} takes a string argument", op))
}

fn children_from_wire(op: &str, args: &Json) -> Result<Vec<Expr>, String> {
    args.as_array()
        .ok_or_else(|| format!("operator {:?} takes a list of sub-expressions", op))?
        .iter()
        .map(expr_from_wire)
        .collect()
}

fn handler_from_wire(value: &Json) -> Result<Handler, String> {
    match value {
        Json::Object(map) => match map.get("f").and_then(Json::as_str) {
            Some(body) if map.len() == 1 => Ok(Handler::Action(body.to_owned())),
            _ => Err("functional handler must be {\"f\": \"...\"}".to_owned()),
        },
        other => Ok(Handler::Mapping(mapping_from_wire(other)?)),
    }
}

fn mapping_from_wire(value: &Json) -> Result<Mapping, String> {
    match value {
        Json::String(s) => Ok(Mapping::Str(s.clone())),
        Json::Number(n) => n
            .as_i64()
            .map(Mapping::Index)
            .ok_or_else(|| "mapping index must be an integer".to_owned()),
        Json::Array(items) => Ok(Mapping::List(
            items
                .iter()
                .map(mapping_from_wire)
                .collect::<Result<_, _>>()?,
        )),
        _ => Err("mapping must be a string, integer, or array".to_owned()),
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = expr_to_wire(self).map_err(ser::Error::custom)?;
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = Json::deserialize(deserializer)?;
        expr_from_wire(&wire).map_err(de::Error::custom)
    }
}

impl Serialize for Grammar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let pairs: Result<Vec<Json>, String> = self
            .rules
            .iter()
            .map(|rule| {
                Ok(Json::Array(vec![
                    Json::from(rule.name.as_str()),
                    expr_to_wire(&rule.expr)?,
                ]))
            })
            .collect();
        let pairs = pairs.map_err(ser::Error::custom)?;
        Json::Array(pairs).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Grammar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = Json::deserialize(deserializer)?;
        let pairs = wire
            .as_array()
            .ok_or_else(|| de::Error::custom("grammar must be an array of [name, expr] pairs"))?;

        let mut grammar = Grammar::new();
        for pair in pairs {
            let pair = pair
                .as_array()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| de::Error::custom("each rule must be a [name, expr] pair"))?;
            let name = pair[0]
                .as_str()
                .ok_or_else(|| de::Error::custom("rule name must be a string"))?;
            let expr = expr_from_wire(&pair[1]).map_err(de::Error::custom)?;
            grammar.add_rule(name, expr);
        }
        Ok(grammar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Grammar {
        let mut grammar = Grammar::new();
        grammar.add_rule(
            "Start",
            Expr::Sequence(vec![
                Expr::Literal("a".to_owned()),
                Expr::RuleRef("Tail".to_owned()),
            ]),
        );
        grammar.add_rule(
            "Tail",
            Expr::ZeroOrMore(Box::new(Expr::Regex("[b-z]".to_owned()))),
        );
        grammar
    }

    #[test]
    fn test_start_rule_is_first() {
        let grammar = sample();
        assert_eq!(grammar.start_rule().map(|r| r.name.as_str()), Some("Start"));
        assert_eq!(grammar.rule_count(), 2);
    }

    #[test]
    fn test_json_roundtrip() {
        let grammar = sample();
        let json = grammar.to_json().unwrap();
        let back = Grammar::from_json(&json).unwrap();
        assert_eq!(grammar, back);
    }

    #[test]
    fn test_json_roundtrip_with_handlers() {
        let mut grammar = Grammar::new();
        grammar.add_rule(
            "Pair",
            Expr::WithHandler(
                Box::new(Expr::Sequence(vec![
                    Expr::Literal("a".to_owned()),
                    Expr::Literal("b".to_owned()),
                ])),
                Handler::Mapping(Mapping::indices(&[2, 1])),
            ),
        );
        grammar.add_rule(
            "Word",
            Expr::WithHandler(
                Box::new(Expr::Regex("(\\w)(\\w*)".to_owned())),
                Handler::Action("$1 + $2".to_owned()),
            ),
        );

        let json = grammar.to_json().unwrap();
        let back = Grammar::from_json(&json).unwrap();
        assert_eq!(grammar, back);
    }

    #[test]
    fn test_wire_shape() {
        let grammar = sample();
        let json = grammar.to_json().unwrap();
        assert!(json.contains(r#"["L","a"]"#));
        assert!(json.contains(r#"["*",["R","[b-z]"]]"#));
        assert!(json.contains(r#""Tail""#));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = Grammar::from_json(r#"[["Start", ["Z", "a"]]]"#).unwrap_err();
        assert!(err.to_string().contains("unknown operator"));
    }

    #[test]
    fn test_bad_mapping_rejected() {
        let err = Grammar::from_json(r#"[["Start", ["L", "a", true]]]"#).unwrap_err();
        assert!(err.to_string().contains("mapping"));
    }

    #[test]
    fn test_check_reports_unknown_rule() {
        let mut grammar = Grammar::new();
        grammar.add_rule("Start", Expr::RuleRef("Missing".to_owned()));

        let issues = grammar.check();
        assert_eq!(
            issues,
            vec![GrammarIssue::UnknownRule {
                rule: "Start".to_owned(),
                name: "Missing".to_owned(),
            }]
        );
    }

    #[test]
    fn test_check_reports_bad_pattern_and_action() {
        let mut grammar = Grammar::new();
        grammar.add_rule("Bad", Expr::Regex("[oops".to_owned()));
        grammar.add_rule(
            "Act",
            Expr::WithHandler(
                Box::new(Expr::Literal("x".to_owned())),
                Handler::Action("1 + 1".to_owned()),
            ),
        );

        let issues = grammar.check();
        assert_eq!(issues.len(), 2);
        assert!(matches!(issues[0], GrammarIssue::InvalidPattern { .. }));
        assert!(matches!(issues[1], GrammarIssue::UnsupportedAction { .. }));
    }

    #[test]
    fn test_check_clean_grammar() {
        assert!(sample().check().is_empty());
    }
}
