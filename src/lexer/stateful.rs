//! Stateful regex-driven lexer (spec component C).
//!
//! Compiles a map of state name -> ordered rule list into a pushdown
//! tokenizer: each state's rules are combined into one anchored alternation
//! (preserving which alternative matched via named capture groups), and
//! rule actions (`push`/`pop`/`return`) drive a stack of active states.
//! `include(state)` is a compile-time lexical splice, not a runtime action.

use std::collections::HashSet;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::CompileError;
use crate::position::{Position, SymbolTable, Token, ERROR};

/// What a rule does once it matches, beyond emitting a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Push(String),
    Pop,
    Return,
}

/// One lexical rule: a name, an (unanchored-as-written) regular expression,
/// and an optional state-stack action.
#[derive(Debug, Clone)]
pub struct RuleDef {
    pub name: String,
    pub pattern: String,
    pub action: Option<Action>,
}

impl RuleDef {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self { name: name.into(), pattern: pattern.into(), action: None }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }
}

/// One entry in a state's rule list: either a concrete rule, or a splice of
/// another state's rules at that position.
#[derive(Debug, Clone)]
pub enum RuleEntry {
    Rule(RuleDef),
    Include(String),
}

/// A rule set awaiting compilation: a map from state name to its ordered
/// entries, with the initial state always named `Root`.
#[derive(Debug, Clone, Default)]
pub struct LexerRules {
    states: IndexMap<String, Vec<RuleEntry>>,
}

pub const ROOT_STATE: &str = "Root";

impl LexerRules {
    pub fn new() -> Self {
        Self { states: IndexMap::new() }
    }

    pub fn state(mut self, name: impl Into<String>, rules: Vec<RuleEntry>) -> Self {
        self.states.insert(name.into(), rules);
        self
    }

    pub fn compile(self) -> Result<StatefulLexer, CompileError> {
        compile_rules(self)
    }
}

fn resolve_includes(states: &IndexMap<String, Vec<RuleEntry>>) -> Result<IndexMap<String, Vec<RuleDef>>, CompileError> {
    fn expand(
        name: &str,
        states: &IndexMap<String, Vec<RuleEntry>>,
        visiting: &mut HashSet<String>,
        cache: &mut IndexMap<String, Vec<RuleDef>>,
    ) -> Result<Vec<RuleDef>, CompileError> {
        if let Some(done) = cache.get(name) {
            return Ok(done.clone());
        }
        if !visiting.insert(name.to_string()) {
            return Err(CompileError::IncludeCycle { name: name.to_string() });
        }
        let entries = states.get(name).ok_or_else(|| CompileError::UndefinedState { name: name.to_string() })?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                RuleEntry::Rule(r) => out.push(r.clone()),
                RuleEntry::Include(other) => out.extend(expand(other, states, visiting, cache)?),
            }
        }
        visiting.remove(name);
        cache.insert(name.to_string(), out.clone());
        Ok(out)
    }

    let mut cache = IndexMap::new();
    for name in states.keys() {
        let mut visiting = HashSet::new();
        let resolved = expand(name, states, &mut visiting, &mut cache)?;
        cache.insert(name.clone(), resolved);
    }
    Ok(cache)
}

fn can_match_empty(pattern: &str) -> Result<bool, CompileError> {
    let hir = regex_syntax::Parser::new().parse(pattern).map_err(|e| CompileError::InvalidRegex {
        name: pattern.to_string(),
        source: e.to_string(),
    })?;
    Ok(matches!(hir.properties().minimum_len(), Some(0)))
}

struct CompiledRule {
    name: String,
    symbol: crate::position::Symbol,
    action: Option<Action>,
    elide: bool,
}

struct CompiledState {
    combined: Regex,
    rules: Vec<CompiledRule>,
}

/// A compiled stateful lexer: immutable and safe to reuse across parses.
pub struct StatefulLexer {
    symbols: SymbolTable,
    states: IndexMap<String, CompiledState>,
}

fn compile_rules(rules: LexerRules) -> Result<StatefulLexer, CompileError> {
    if !rules.states.contains_key(ROOT_STATE) {
        return Err(CompileError::UndefinedState { name: ROOT_STATE.to_string() });
    }
    let resolved = resolve_includes(&rules.states)?;

    let mut symbols = SymbolTable::new();
    let mut states = IndexMap::new();

    for (state_name, entries) in &resolved {
        let mut seen = HashSet::new();
        for r in entries {
            if !seen.insert(r.name.clone()) {
                return Err(CompileError::DuplicateRuleName { name: r.name.clone() });
            }
        }
        for r in entries {
            if let Some(Action::Push(target)) = &r.action {
                if !rules.states.contains_key(target) {
                    return Err(CompileError::UndefinedState { name: target.clone() });
                }
            }
            if r.pattern.contains("(?P<") {
                return Err(CompileError::NamedGroupsNotAllowed { name: r.name.clone() });
            }
            if can_match_empty(&r.pattern)? {
                return Err(CompileError::EmptyMatchRule { name: r.name.clone() });
            }
        }

        let mut parts = Vec::with_capacity(entries.len());
        let mut compiled_rules = Vec::with_capacity(entries.len());
        for (i, r) in entries.iter().enumerate() {
            let group = format!("g{i}");
            parts.push(format!("(?P<{group}>{})", r.pattern));
            let elide = r.name.chars().next().map(|c| c.is_lowercase()).unwrap_or(false);
            let symbol = symbols.intern(&r.name);
            compiled_rules.push(CompiledRule { name: r.name.clone(), symbol, action: r.action.clone(), elide });
        }
        let pattern = format!("^(?:{})", parts.join("|"));
        let combined = Regex::new(&pattern).map_err(|e| CompileError::InvalidRegex {
            name: state_name.clone(),
            source: e.to_string(),
        })?;
        states.insert(state_name.clone(), CompiledState { combined, rules: compiled_rules });
    }

    Ok(StatefulLexer { symbols, states })
}

impl StatefulLexer {
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Tokenizes `source`, attributing positions to `filename`.
    pub fn lex<'s>(&'s self, source: &'s str, filename: impl Into<std::sync::Arc<str>>) -> StatefulLexerIter<'s> {
        StatefulLexerIter {
            lexer: self,
            source,
            filename: filename.into(),
            offset: 0,
            line: 1,
            column: 1,
            stack: vec![ROOT_STATE.to_string()],
            done: false,
        }
    }
}

/// Iterator of tokens produced by running a [`StatefulLexer`] over a source
/// string. On the first unmatched byte it yields one terminal error token
/// (kind [`ERROR`]) and all subsequent calls return EOF.
pub struct StatefulLexerIter<'s> {
    lexer: &'s StatefulLexer,
    source: &'s str,
    filename: std::sync::Arc<str>,
    offset: usize,
    line: u32,
    column: u32,
    stack: Vec<String>,
    done: bool,
}

impl<'s> StatefulLexerIter<'s> {
    fn position(&self) -> Position {
        Position { file: self.filename.clone(), offset: self.offset, line: self.line, column: self.column }
    }

    fn advance(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset += text.len();
    }
}

impl<'s> Iterator for StatefulLexerIter<'s> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if self.done {
                return Some(Token::eof(self.position()));
            }
            if self.offset >= self.source.len() {
                self.done = true;
                return Some(Token::eof(self.position()));
            }

            let state_name = self.stack.last().cloned().unwrap_or_else(|| ROOT_STATE.to_string());
            let state = match self.lexer.states.get(&state_name) {
                Some(s) => s,
                None => {
                    self.done = true;
                    return Some(Token { kind: ERROR, text: std::sync::Arc::from(""), position: self.position() });
                }
            };

            let remaining = &self.source[self.offset..];
            let caps = match state.combined.captures(remaining) {
                Some(c) => c,
                None => {
                    let pos = self.position();
                    self.done = true;
                    return Some(Token { kind: ERROR, text: std::sync::Arc::from(""), position: pos });
                }
            };

            let mut matched_rule = None;
            for (i, rule) in state.rules.iter().enumerate() {
                if caps.name(&format!("g{i}")).is_some() {
                    matched_rule = Some(rule);
                    break;
                }
            }
            let rule = matched_rule.expect("combined regex matched but no named group captured");
            let matched_text = caps.get(0).expect("group 0 always present on a match").as_str();

            let changes_state = matches!(rule.action, Some(Action::Push(_)) | Some(Action::Pop) | Some(Action::Return));
            if matched_text.is_empty() && !changes_state {
                let pos = self.position();
                self.done = true;
                return Some(Token { kind: ERROR, text: std::sync::Arc::from(""), position: pos });
            }

            let start_pos = self.position();
            let text = matched_text.to_string();
            self.advance(matched_text);

            match &rule.action {
                Some(Action::Push(target)) => self.stack.push(target.clone()),
                Some(Action::Pop) | Some(Action::Return) => {
                    if self.stack.len() > 1 {
                        self.stack.pop();
                    }
                }
                None => {}
            }

            if rule.elide {
                continue;
            }

            return Some(Token::new(rule.symbol, text, start_pos));
        }
    }
}

#[cfg(test)]
mod stateful_tests {
    use super::*;

    fn rule(name: &str, pat: &str) -> RuleEntry {
        RuleEntry::Rule(RuleDef::new(name, pat))
    }

    fn rule_a(name: &str, pat: &str, action: Action) -> RuleEntry {
        RuleEntry::Rule(RuleDef::new(name, pat).with_action(action))
    }

    #[test]
    fn simple_single_state() {
        let rules = LexerRules::new().state(
            ROOT_STATE,
            vec![
                rule("ws", r"[ \t\n]+"),
                rule("Ident", r"[A-Za-z_][A-Za-z0-9_]*"),
                rule("Int", r"[0-9]+"),
            ],
        );
        let lexer = rules.compile().unwrap();
        let toks: Vec<_> = lexer.lex("foo 42", "t").collect();
        assert_eq!(toks[0].text.as_ref(), "foo");
        assert_eq!(toks[1].text.as_ref(), "42");
        assert!(toks[2].is_eof());
    }

    #[test]
    fn lowercase_rules_are_elided() {
        let rules =
            LexerRules::new().state(ROOT_STATE, vec![rule("ws", r"\s+"), rule("Ident", r"[a-z]+")]);
        let lexer = rules.compile().unwrap();
        let toks: Vec<_> = lexer.lex("a b", "t").collect();
        assert_eq!(toks.len(), 3); // Ident, Ident, EOF -- no ws tokens
        assert!(toks.iter().all(|t| lexer.symbols().name_of(t.kind) != Some("ws")));
    }

    #[test]
    fn ordering_earlier_rule_wins() {
        let rules = LexerRules::new().state(
            ROOT_STATE,
            vec![rule("KwIf", "if"), rule("Ident", r"[a-z]+")],
        );
        let lexer = rules.compile().unwrap();
        let toks: Vec<_> = lexer.lex("if", "t").collect();
        assert_eq!(lexer.symbols().name_of(toks[0].kind), Some("KwIf"));
    }

    #[test]
    fn stateful_string_interpolation() {
        let rules = LexerRules::new()
            .state(
                ROOT_STATE,
                vec![rule_a("DoubleQuote", "\"", Action::Push("String".into()))],
            )
            .state(
                "String",
                vec![
                    rule_a("StringEnd", "\"", Action::Pop),
                    rule_a("ExprStart", r"\$\{", Action::Push("Expr".into())),
                    rule("Char", r"[^\"$]"),
                ],
            )
            .state(
                "Expr",
                vec![
                    rule_a("ExprEnd", r"\}", Action::Pop),
                    rule("ws", r"\s+"),
                    rule("Ident", r"[A-Za-z_][A-Za-z0-9_]*"),
                ],
            );
        let lexer = rules.compile().unwrap();
        let toks: Vec<_> = lexer.lex(r#""hello ${name}""#, "t").collect();
        let names: Vec<_> = toks.iter().map(|t| lexer.symbols().name_of(t.kind).unwrap_or("?")).collect();
        assert_eq!(names, vec!["DoubleQuote", "Char", "Char", "Char", "Char", "Char", "Char", "ExprStart", "Ident", "ExprEnd", "StringEnd", "EOF"]);
    }

    #[test]
    fn rejects_empty_match_pattern() {
        let rules = LexerRules::new().state(ROOT_STATE, vec![rule("Bad", "a*")]);
        assert!(matches!(rules.compile(), Err(CompileError::EmptyMatchRule { .. })));
    }

    #[test]
    fn rejects_duplicate_rule_name() {
        let rules = LexerRules::new().state(ROOT_STATE, vec![rule("A", "a"), rule("A", "b")]);
        assert!(matches!(rules.compile(), Err(CompileError::DuplicateRuleName { .. })));
    }

    #[test]
    fn rejects_undefined_push_target() {
        let rules = LexerRules::new().state(ROOT_STATE, vec![rule_a("A", "a", Action::Push("Nope".into()))]);
        assert!(matches!(rules.compile(), Err(CompileError::UndefinedState { .. })));
    }

    #[test]
    fn include_splices_rules() {
        let rules = LexerRules::new()
            .state("Shared", vec![rule("Digit", "[0-9]")])
            .state(ROOT_STATE, vec![RuleEntry::Include("Shared".into()), rule("Ident", "[a-z]+")]);
        let lexer = rules.compile().unwrap();
        let toks: Vec<_> = lexer.lex("5a", "t").collect();
        assert_eq!(lexer.symbols().name_of(toks[0].kind), Some("Digit"));
        assert_eq!(lexer.symbols().name_of(toks[1].kind), Some("Ident"));
    }

    #[test]
    fn include_cycle_is_rejected() {
        let rules = LexerRules::new()
            .state("A", vec![RuleEntry::Include("B".into())])
            .state("B", vec![RuleEntry::Include("A".into())])
            .state(ROOT_STATE, vec![RuleEntry::Include("A".into())]);
        assert!(matches!(rules.compile(), Err(CompileError::IncludeCycle { .. })));
    }

    #[test]
    fn unmatched_input_is_terminal() {
        let rules = LexerRules::new().state(ROOT_STATE, vec![rule("Ident", "[a-z]+")]);
        let lexer = rules.compile().unwrap();
        let toks: Vec<_> = lexer.lex("abc!", "t").take(4).collect();
        assert_eq!(lexer.symbols().name_of(toks[0].kind), Some("Ident"));
        assert_eq!(toks[1].kind, ERROR);
        assert!(toks[2].is_eof());
        assert!(toks[3].is_eof());
    }
}
