//! Grammar compiler
//!
//! Translates a [`Grammar`] into a standalone JavaScript parser: a text
//! artifact that bundles the runtime preamble, a driver bound to the rule
//! table, interned literal/regex declarations, one function per rule, and
//! a `module.exports` binding of `parse`. With
//! [`CompileOptions::types`] set, the artifact carries TypeScript
//! annotations instead.
//!
//! Compilation is pure: all state (the interning tables) lives in a
//! per-invocation context, so concurrent compiles are independent.
//!
//! # Example
//!
//! ```
//! use pegcore::compiler::{compile, CompileOptions};
//! use pegcore::parser_dsl::{lit, GrammarBuilder};
//!
//! let grammar = GrammarBuilder::new().rule("Start", lit("a").star()).build();
//! let artifact = compile(&grammar, &CompileOptions::default()).unwrap();
//! assert!(artifact.contains("const $L0 = $L(\"a\");"));
//! assert!(artifact.contains("module.exports = { parse };"));
//! ```

use crate::error::json_str;
use crate::grammar::{mapping_shape, walk, Expr, Grammar, Handler, Mapping, Rule};
use hashbrown::{HashMap, HashSet};

/// The runtime preamble concatenated into every artifact.
const RUNTIME_JS: &str = include_str!("runtime.js");

/// The TypeScript-annotated preamble, selected by [`CompileOptions::types`].
const RUNTIME_TS: &str = include_str!("runtime.ts");

/// Names the artifact defines itself; rules cannot shadow them.
const RESERVED_NAMES: &[&str] = &["parse", "fail", "parserState", "module"];

/// Compiler configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Emit TypeScript type annotations
    pub types: bool,
}

impl CompileOptions {
    /// Default options (no type annotations).
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle TypeScript annotations.
    pub fn with_types(mut self, types: bool) -> Self {
        self.types = types;
        self
    }
}

/// Fatal compile-time error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The grammar has no rules
    EmptyGrammar,
    /// Two rules share a name
    DuplicateRule {
        /// The duplicated name
        name: String,
    },
    /// A rule name is not usable as a function name in the artifact
    InvalidRuleName {
        /// The offending name
        name: String,
    },
    /// A rule reference does not resolve
    UnknownRule {
        /// The rule containing the reference
        rule: String,
        /// The unresolved name
        name: String,
    },
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::EmptyGrammar => write!(f, "grammar has no rules"),
            CompileError::DuplicateRule { name } => {
                write!(f, "duplicate rule name {:?}", name)
            }
            CompileError::InvalidRuleName { name } => {
                write!(f, "rule name {:?} is not a valid identifier", name)
            }
            CompileError::UnknownRule { rule, name } => {
                write!(f, "rule {:?} references unknown rule {:?}", rule, name)
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Per-invocation interning tables. Lookup is string equality; insertion
/// order determines the emitted `$L<i>` / `$R<i>` indices.
#[derive(Debug, Default)]
struct Interner {
    str_defs: Vec<String>,
    str_index: HashMap<String, usize>,
    re_defs: Vec<String>,
    re_index: HashMap<String, usize>,
}

impl Interner {
    fn new() -> Self {
        Self::default()
    }

    fn literal(&mut self, s: &str) -> usize {
        if let Some(&id) = self.str_index.get(s) {
            return id;
        }
        let id = self.str_defs.len();
        self.str_defs.push(s.to_owned());
        self.str_index.insert(s.to_owned(), id);
        id
    }

    fn pattern(&mut self, p: &str) -> usize {
        if let Some(&id) = self.re_index.get(p) {
            return id;
        }
        let id = self.re_defs.len();
        self.re_defs.push(p.to_owned());
        self.re_index.insert(p.to_owned(), id);
        id
    }
}

/// Compile a grammar to a standalone parser artifact.
pub fn compile(grammar: &Grammar, options: &CompileOptions) -> Result<String, CompileError> {
    validate(grammar)?;

    let mut interner = Interner::new();
    let mut rules_src = String::new();
    for rule in &grammar.rules {
        rules_src.push_str(&compile_rule(rule, &mut interner, options));
        rules_src.push('\n');
    }

    let mut out = String::new();
    out.push_str(if options.types { RUNTIME_TS } else { RUNTIME_JS });
    out.push('\n');

    let names: Vec<&str> = grammar.rules.iter().map(|r| r.name.as_str()).collect();
    out.push_str(&format!(
        "const {{ parse, fail }} = parserState({{ {} }});\n\n",
        names.join(", ")
    ));

    for (id, literal) in interner.str_defs.iter().enumerate() {
        out.push_str(&format!("const $L{} = $L({});\n", id, json_str(literal)));
    }
    for (id, pattern) in interner.re_defs.iter().enumerate() {
        out.push_str(&format!(
            "const $R{} = $R(new RegExp({}, \"suy\"));\n",
            id,
            json_str(pattern)
        ));
    }
    out.push('\n');

    out.push_str(&rules_src);
    out.push_str("module.exports = { parse };\n");
    Ok(out)
}

fn validate(grammar: &Grammar) -> Result<(), CompileError> {
    if grammar.rules.is_empty() {
        return Err(CompileError::EmptyGrammar);
    }

    let mut names: HashSet<&str> = HashSet::new();
    for rule in &grammar.rules {
        if !is_identifier(&rule.name) || RESERVED_NAMES.contains(&rule.name.as_str()) {
            return Err(CompileError::InvalidRuleName {
                name: rule.name.clone(),
            });
        }
        if !names.insert(rule.name.as_str()) {
            return Err(CompileError::DuplicateRule {
                name: rule.name.clone(),
            });
        }
    }

    for rule in &grammar.rules {
        let mut unknown = None;
        walk(&rule.expr, &mut |expr| {
            if let Expr::RuleRef(name) = expr {
                if unknown.is_none() && !names.contains(name.as_str()) {
                    unknown = Some(CompileError::UnknownRule {
                        rule: rule.name.clone(),
                        name: name.clone(),
                    });
                }
            }
        });
        if let Some(err) = unknown {
            return Err(err);
        }
    }
    Ok(())
}

/// Valid artifact function name: an ASCII identifier. Names starting with
/// `$` are reserved for interned declarations.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Emit the declarations and the function for one rule.
///
/// A handler-less top-level choice compiles each alternative separately
/// as `name_0, name_1, …` so the alternatives can carry their own
/// handlers; the rule function short-circuits over them. Every other
/// shape compiles to one combinator expression plus an optional handler.
fn compile_rule(rule: &Rule, interner: &mut Interner, options: &CompileOptions) -> String {
    let name = &rule.name;
    let (inner, handler) = rule.expr.split_handler();

    let state_param = if options.types { "state: ParseState" } else { "state" };
    let return_ty = if options.types {
        ": ParseResult<any> | undefined"
    } else {
        ""
    };

    let mut out = String::new();
    match (inner, handler) {
        (Expr::Choice(alternatives), None) => {
            let mut calls = Vec::new();
            for (i, alt) in alternatives.iter().enumerate() {
                let (alt_inner, alt_handler) = alt.split_handler();
                let body = compile_op(alt_inner, name, alt_handler.is_none(), interner);
                out.push_str(&format!("const {}_{} = {};\n", name, i, body));
                match alt_handler {
                    Some(h) => {
                        out.push_str(&format!(
                            "const {}_{}_handler = {};\n",
                            name,
                            i,
                            compile_handler(h, alt_inner, options)
                        ));
                        calls.push(format!("{}_{}_handler({}_{}(state))", name, i, name, i));
                    }
                    None => calls.push(format!("{}_{}(state)", name, i)),
                }
            }
            let body = if calls.is_empty() {
                "undefined".to_owned()
            } else {
                calls.join("\n      ?? ")
            };
            out.push_str(&format!(
                "function {}({}){} {{\n  return {};\n}}\n",
                name, state_param, return_ty, body
            ));
        }
        _ => {
            let body = compile_op(inner, name, handler.is_none(), interner);
            out.push_str(&format!("const {}_body = {};\n", name, body));
            match handler {
                Some(h) => {
                    out.push_str(&format!(
                        "const {}_handler = {};\n",
                        name,
                        compile_handler(h, inner, options)
                    ));
                    out.push_str(&format!(
                        "function {}({}){} {{\n  return {}_handler({}_body(state));\n}}\n",
                        name, state_param, return_ty, name, name
                    ));
                }
                None => {
                    out.push_str(&format!(
                        "function {}({}){} {{\n  return {}_body(state);\n}}\n",
                        name, state_param, return_ty, name
                    ));
                }
            }
        }
    }
    out
}

/// Emit the combinator expression for one node.
///
/// `default_handler` propagates through choice and sequence only; a bare
/// regex in such a position is wrapped so its match array collapses to
/// the full-match string.
fn compile_op(
    expr: &Expr,
    rule_name: &str,
    default_handler: bool,
    interner: &mut Interner,
) -> String {
    match expr {
        Expr::Literal(s) => {
            let id = interner.literal(s);
            format!(
                "$EXPECT($L{}, fail, {}, {})",
                id,
                json_str(s),
                json_str(rule_name)
            )
        }
        Expr::Regex(p) => {
            let id = interner.pattern(p);
            // The interned regex itself is the recorded expectation, so
            // the reporter can render it as /pattern/.
            let atom = format!("$EXPECT($R{}, fail, $R{}, {})", id, id, json_str(rule_name));
            if default_handler {
                format!("defaultRegExpTransform({})", atom)
            } else {
                atom
            }
        }
        Expr::Choice(alternatives) => format!(
            "$C({})",
            compile_children(alternatives, rule_name, default_handler, interner)
        ),
        Expr::Sequence(items) => format!(
            "$S({})",
            compile_children(items, rule_name, default_handler, interner)
        ),
        Expr::ZeroOrMore(body) => {
            format!("$Q({})", compile_op(body, rule_name, false, interner))
        }
        Expr::OneOrMore(body) => {
            format!("$P({})", compile_op(body, rule_name, false, interner))
        }
        Expr::Optional(body) => {
            format!("$E({})", compile_op(body, rule_name, false, interner))
        }
        Expr::Text(body) => {
            format!("$TEXT({})", compile_op(body, rule_name, false, interner))
        }
        Expr::Lookahead(body) => {
            format!("$Y({})", compile_op(body, rule_name, false, interner))
        }
        Expr::NegLookahead(body) => {
            format!("$N({})", compile_op(body, rule_name, false, interner))
        }
        Expr::RuleRef(name) => name.clone(),
        // Handlers bind at rule and alternative level; deeper ones are inert.
        Expr::WithHandler(wrapped, _) => {
            compile_op(wrapped, rule_name, default_handler, interner)
        }
    }
}

fn compile_children(
    children: &[Expr],
    rule_name: &str,
    default_handler: bool,
    interner: &mut Interner,
) -> String {
    children
        .iter()
        .map(|child| compile_op(child, rule_name, default_handler, interner))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Emit the handler wrapper for a rule or alternative.
fn compile_handler(handler: &Handler, node: &Expr, options: &CompileOptions) -> String {
    let return_ty = if options.types { ": any" } else { "" };
    match handler {
        Handler::Action(body) => match node {
            // ($loc, whole, elem1, …, elemN)
            Expr::Sequence(items) => format!(
                "makeResultHandler_S(({}){} => ({}))",
                action_params(items.len() + 1, options),
                return_ty,
                body
            ),
            // ($loc, full match, up to nine groups)
            Expr::Regex(_) => format!(
                "makeResultHandler_R(({}){} => ({}))",
                action_params(10, options),
                return_ty,
                body
            ),
            // ($loc, $0, $1) where both name the scalar value
            _ => format!(
                "makeResultHandler(({}){} => ({}))",
                action_params(2, options),
                return_ty,
                body
            ),
        },
        Handler::Mapping(mapping) => {
            let (single, offset) = mapping_shape(node);
            let expr = compile_structural_handler(mapping, "value", single, offset);
            let value_param = if options.types { "value: any" } else { "value" };
            format!(
                "makeStructuralHandler(({}){} => ({}))",
                value_param, return_ty, expr
            )
        }
    }
}

/// `$loc` plus `$0..$<count-1>`, annotated when types are on.
fn action_params(count: usize, options: &CompileOptions) -> String {
    let mut params = Vec::with_capacity(count + 1);
    params.push(if options.types {
        "$loc: Loc".to_owned()
    } else {
        "$loc".to_owned()
    });
    for i in 0..count {
        if options.types {
            params.push(format!("${}: any", i));
        } else {
            params.push(format!("${}", i));
        }
    }
    params.join(", ")
}

/// Translate a structural mapping into an expression over `source`.
fn compile_structural_handler(
    mapping: &Mapping,
    source: &str,
    single: bool,
    offset: i64,
) -> String {
    match mapping {
        Mapping::Str(s) => json_str(s),
        Mapping::Index(n) => {
            if single {
                source.to_owned()
            } else {
                format!("{}[{}]", source, n + offset)
            }
        }
        Mapping::List(items) => format!(
            "[{}]",
            items
                .iter()
                .map(|item| compile_structural_handler(item, source, single, offset))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser_dsl::{choice, lit, re, ref_, seq, GrammarBuilder};

    fn plain() -> CompileOptions {
        CompileOptions::default()
    }

    #[test]
    fn test_interning_dedup() {
        let mut interner = Interner::new();
        assert_eq!(interner.literal("a"), 0);
        assert_eq!(interner.literal("b"), 1);
        assert_eq!(interner.literal("a"), 0);
        assert_eq!(interner.pattern("[a-z]"), 0);
        assert_eq!(interner.pattern("[a-z]"), 0);
        assert_eq!(interner.str_defs, vec!["a", "b"]);
        assert_eq!(interner.re_defs, vec!["[a-z]"]);
    }

    #[test]
    fn test_literal_atom_emission() {
        let mut interner = Interner::new();
        let src = compile_op(&lit("ab"), "Start", true, &mut interner);
        assert_eq!(src, r#"$EXPECT($L0, fail, "ab", "Start")"#);
    }

    #[test]
    fn test_regex_atom_wraps_under_default_handler() {
        let mut interner = Interner::new();
        let with_default = compile_op(&re("[a-z]+"), "Start", true, &mut interner);
        assert_eq!(
            with_default,
            r#"defaultRegExpTransform($EXPECT($R0, fail, $R0, "Start"))"#
        );

        let without = compile_op(&re("[a-z]+"), "Start", false, &mut interner);
        assert_eq!(without, r#"$EXPECT($R0, fail, $R0, "Start")"#);
    }

    #[test]
    fn test_default_handler_stops_at_repetition() {
        let mut interner = Interner::new();
        let src = compile_op(&re("[a-z]").star(), "Start", true, &mut interner);
        assert_eq!(src, r#"$Q($EXPECT($R0, fail, $R0, "Start"))"#);
    }

    #[test]
    fn test_default_handler_flows_through_seq_and_choice() {
        let mut interner = Interner::new();
        let expr = seq([choice([re("x"), lit("y")])]);
        let src = compile_op(&expr, "Start", true, &mut interner);
        assert_eq!(
            src,
            r#"$S($C(defaultRegExpTransform($EXPECT($R0, fail, $R0, "Start")), $EXPECT($L0, fail, "y", "Start")))"#
        );
    }

    #[test]
    fn test_structural_handler_expressions() {
        assert_eq!(
            compile_structural_handler(&Mapping::indices(&[2, 1]), "value", false, -1),
            "[value[1], value[0]]"
        );
        assert_eq!(
            compile_structural_handler(&Mapping::Index(1), "value", false, 0),
            "value[1]"
        );
        assert_eq!(
            compile_structural_handler(&Mapping::Index(3), "value", true, 0),
            "value"
        );
        assert_eq!(
            compile_structural_handler(&Mapping::Str("tag".to_owned()), "value", true, 0),
            "\"tag\""
        );
    }

    #[test]
    fn test_action_handler_shapes() {
        let seq_handler = compile_handler(
            &Handler::Action("$1".to_owned()),
            &seq([lit("a"), lit("b")]),
            &plain(),
        );
        assert_eq!(seq_handler, "makeResultHandler_S(($loc, $0, $1, $2) => ($1))");

        let re_handler =
            compile_handler(&Handler::Action("$1".to_owned()), &re("(a)"), &plain());
        assert!(re_handler.starts_with("makeResultHandler_R(($loc, $0, $1,"));
        assert!(re_handler.contains("$9"));

        let scalar_handler =
            compile_handler(&Handler::Action("$0".to_owned()), &lit("a"), &plain());
        assert_eq!(scalar_handler, "makeResultHandler(($loc, $0, $1) => ($0))");
    }

    #[test]
    fn test_per_alternative_handlers() {
        let grammar = GrammarBuilder::new()
            .rule(
                "Start",
                choice([lit("a").pick(1), lit("b")]),
            )
            .build();
        let artifact = compile(&grammar, &plain()).unwrap();

        assert!(artifact.contains("const Start_0 = "));
        assert!(artifact.contains("const Start_0_handler = "));
        assert!(artifact.contains("const Start_1 = "));
        assert!(!artifact.contains("Start_1_handler"));
        assert!(artifact.contains("Start_0_handler(Start_0(state))"));
        assert!(artifact.contains("?? Start_1(state)"));
    }

    #[test]
    fn test_artifact_assembly_order() {
        let grammar = GrammarBuilder::new()
            .rule("Start", seq([lit("a"), ref_("Tail")]))
            .rule("Tail", re("[b-z]*"))
            .build();
        let artifact = compile(&grammar, &plain()).unwrap();

        let driver = artifact
            .find("const { parse, fail } = parserState({ Start, Tail });")
            .unwrap();
        let interned = artifact.find("const $L0 = $L(\"a\");").unwrap();
        let regex_def = artifact
            .find("const $R0 = $R(new RegExp(\"[b-z]*\", \"suy\"));")
            .unwrap();
        let start_fn = artifact.find("function Start(state)").unwrap();
        let tail_fn = artifact.find("function Tail(state)").unwrap();
        let exports = artifact.find("module.exports = { parse };").unwrap();

        assert!(driver < interned);
        assert!(interned < regex_def);
        assert!(regex_def < start_fn);
        assert!(start_fn < tail_fn);
        assert!(tail_fn < exports);
    }

    #[test]
    fn test_interning_shared_across_rules() {
        let grammar = GrammarBuilder::new()
            .rule("A", seq([lit("x"), lit("x")]))
            .rule("B", lit("x"))
            .build();
        let artifact = compile(&grammar, &plain()).unwrap();

        assert_eq!(artifact.matches("const $L0 = $L(\"x\");").count(), 1);
        assert!(!artifact.contains("$L1"));
    }

    #[test]
    fn test_types_option_annotates() {
        let grammar = GrammarBuilder::new()
            .rule("Start", seq([lit("a"), lit("b")]).action("$1"))
            .build();
        let artifact = compile(&grammar, &CompileOptions::new().with_types(true)).unwrap();

        assert!(artifact.contains("function Start(state: ParseState): ParseResult<any> | undefined {"));
        assert!(artifact.contains("($loc: Loc, $0: any, $1: any, $2: any): any => ($1)"));
        assert!(artifact.contains("interface ParseState"));
    }

    #[test]
    fn test_validate_errors() {
        assert_eq!(
            compile(&Grammar::new(), &plain()),
            Err(CompileError::EmptyGrammar)
        );

        let mut dup = Grammar::new();
        dup.add_rule("A", lit("x"));
        dup.add_rule("A", lit("y"));
        assert!(matches!(
            compile(&dup, &plain()),
            Err(CompileError::DuplicateRule { .. })
        ));

        let mut bad_name = Grammar::new();
        bad_name.add_rule("not a name", lit("x"));
        assert!(matches!(
            compile(&bad_name, &plain()),
            Err(CompileError::InvalidRuleName { .. })
        ));

        let mut reserved = Grammar::new();
        reserved.add_rule("parse", lit("x"));
        assert!(matches!(
            compile(&reserved, &plain()),
            Err(CompileError::InvalidRuleName { .. })
        ));

        let mut unknown = Grammar::new();
        unknown.add_rule("Start", ref_("Nope"));
        assert_eq!(
            compile(&unknown, &plain()),
            Err(CompileError::UnknownRule {
                rule: "Start".to_owned(),
                name: "Nope".to_owned(),
            })
        );
    }
}
