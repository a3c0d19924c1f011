//! EBNF-grammar-driven lexer (§6's third lexer construction path): token
//! shapes described as named productions in the same tag-grammar dialect as
//! §4.E, but compiled down to plain regular expressions instead of a
//! [`crate::grammar::node::Node`] graph, then handed to
//! [`super::stateful::compile_rules`] to produce an ordinary
//! [`super::stateful::StatefulLexer`] with a single `Root` state.
//!
//! Only the subset of the tag grammar that has a regex equivalent is
//! accepted: literals, token ranges (`'a'…'z'`), named-production
//! references, grouping, alternation, and quantifiers. Capture markers
//! (`@`, `@@`), negation, and lookahead assertions have no lexer-level
//! meaning and are rejected with
//! [`crate::error::CompileError::UnsupportedLexerGrammarConstruct`].

use std::collections::HashMap;

use crate::error::CompileError;
use crate::tag::{scan, TagKind, TagToken};

use super::stateful::{LexerRules, RuleDef, RuleEntry, StatefulLexer, ROOT_STATE};

/// A named EBNF-lexer production. Productions referenced by others but
/// never added as a rule are pure fragments, inlined wherever used;
/// productions added via [`EbnfLexerRules::rule`] become emitted tokens,
/// named and ordered exactly as in [`super::stateful::LexerRules`].
#[derive(Debug, Clone, Default)]
pub struct EbnfLexerRules {
    order: Vec<String>,
    productions: HashMap<String, String>,
}

impl EbnfLexerRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a production that is emitted as a token rule named `name`,
    /// matched in the order productions are declared (earlier wins ties,
    /// exactly as in the stateful lexer it compiles to).
    pub fn rule(mut self, name: impl Into<String>, grammar: impl Into<String>) -> Self {
        let name = name.into();
        self.order.push(name.clone());
        self.productions.insert(name, grammar.into());
        self
    }

    /// Declares a fragment usable by name from other productions' grammars,
    /// but not itself emitted as a token.
    pub fn fragment(mut self, name: impl Into<String>, grammar: impl Into<String>) -> Self {
        self.productions.insert(name.into(), grammar.into());
        self
    }

    pub fn compile(self) -> Result<StatefulLexer, CompileError> {
        let mut resolved: HashMap<String, String> = HashMap::new();
        for name in self.productions.keys() {
            resolve(name, &self.productions, &mut Vec::new(), &mut resolved)?;
        }

        let entries = self
            .order
            .iter()
            .map(|name| RuleEntry::Rule(RuleDef::new(name.clone(), resolved.remove(name).expect("resolved above"))))
            .collect();
        LexerRules::new().state(ROOT_STATE, entries).compile()
    }
}

fn resolve(
    name: &str,
    productions: &HashMap<String, String>,
    path: &mut Vec<String>,
    cache: &mut HashMap<String, String>,
) -> Result<String, CompileError> {
    if let Some(done) = cache.get(name) {
        return Ok(done.clone());
    }
    if path.iter().any(|p| p == name) {
        path.push(name.to_string());
        return Err(CompileError::ProductionCycle { name: name.to_string(), rendering: path.join(" -> ") });
    }
    let grammar = productions.get(name).ok_or_else(|| CompileError::UndefinedProduction { name: name.to_string() })?;
    path.push(name.to_string());
    let pattern = compile_production(grammar, name, productions, path)?;
    path.pop();
    cache.insert(name.to_string(), pattern.clone());
    Ok(pattern)
}

/// Recursive-descent regex compiler over the tag scanner's token stream,
/// mirroring [`crate::tag::parser`]'s grammar shape but emitting regex
/// source text instead of a [`crate::grammar::node::Node`].
struct RegexCompiler<'a> {
    tokens: Vec<TagToken>,
    pos: usize,
    name: &'a str,
    productions: &'a HashMap<String, String>,
    path: &'a mut Vec<String>,
}

fn compile_production(grammar: &str, name: &str, productions: &HashMap<String, String>, path: &mut Vec<String>) -> Result<String, CompileError> {
    let tokens = scan(grammar, name)?;
    let mut compiler = RegexCompiler { tokens, pos: 0, name, productions, path };
    let pattern = compiler.disjunction()?;
    compiler.expect_eof()?;
    Ok(pattern)
}

impl<'a> RegexCompiler<'a> {
    fn peek(&self) -> &TagToken {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> TagToken {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_symbol(&self, s: &str) -> bool {
        let t = self.peek();
        t.kind == TagKind::Symbol && t.text == s
    }

    fn expect_symbol(&mut self, s: &str) -> Result<(), CompileError> {
        if self.at_symbol(s) {
            self.advance();
            Ok(())
        } else {
            let tok = self.peek().clone();
            Err(CompileError::UnexpectedTagToken { found: tok.text, expected: format!("{s:?}"), position: tok.position })
        }
    }

    fn expect_eof(&mut self) -> Result<(), CompileError> {
        if self.peek().is_eof() {
            Ok(())
        } else {
            let tok = self.peek().clone();
            Err(CompileError::UnexpectedTagToken { found: tok.text, expected: "end of production".into(), position: tok.position })
        }
    }

    fn disjunction(&mut self) -> Result<String, CompileError> {
        let mut alts = vec![self.sequence()?];
        while self.at_symbol("|") {
            self.advance();
            alts.push(self.sequence()?);
        }
        Ok(if alts.len() == 1 { alts.remove(0) } else { format!("(?:{})", alts.join("|")) })
    }

    fn sequence(&mut self) -> Result<String, CompileError> {
        let mut parts = Vec::new();
        while !self.peek().is_eof() && !self.at_symbol("|") && !self.at_symbol(")") && !self.at_symbol("]") && !self.at_symbol("}") {
            parts.push(self.term()?);
        }
        Ok(parts.join(""))
    }

    fn term(&mut self) -> Result<String, CompileError> {
        if self.at_symbol("!") || self.at_symbol("@") || self.at_symbol("@@") {
            let tok = self.peek().clone();
            return Err(CompileError::UnsupportedLexerGrammarConstruct { construct: tok.text, position: tok.position });
        }
        let atom = self.atom()?;
        Ok(self.apply_quantifier(atom))
    }

    fn apply_quantifier(&mut self, atom: String) -> String {
        if self.at_symbol("?") {
            self.advance();
            format!("{atom}?")
        } else if self.at_symbol("*") {
            self.advance();
            format!("{atom}*")
        } else if self.at_symbol("+") {
            self.advance();
            format!("{atom}+")
        } else {
            atom
        }
    }

    fn atom(&mut self) -> Result<String, CompileError> {
        let tok = self.peek().clone();
        match tok.kind {
            TagKind::String => {
                self.advance();
                if self.at_symbol("..") {
                    self.advance();
                    let hi = self.peek().clone();
                    if hi.kind != TagKind::String {
                        return Err(CompileError::UnexpectedTagToken { found: hi.text, expected: "range upper bound".into(), position: hi.position });
                    }
                    self.advance();
                    if tok.text.chars().count() != 1 || hi.text.chars().count() != 1 {
                        return Err(CompileError::InvalidRangeBounds { lo: tok.text, hi: hi.text });
                    }
                    Ok(format!("[{}-{}]", regex::escape(&tok.text), regex::escape(&hi.text)))
                } else {
                    Ok(regex::escape(&tok.text))
                }
            }
            TagKind::Ident => {
                self.advance();
                if tok.text == self.name || self.path.iter().any(|p| p == &tok.text) {
                    let mut cycle = self.path.clone();
                    cycle.push(tok.text.clone());
                    return Err(CompileError::ProductionCycle { name: tok.text, rendering: cycle.join(" -> ") });
                }
                let pattern = resolve(&tok.text, self.productions, self.path, &mut HashMap::new())?;
                Ok(format!("(?:{pattern})"))
            }
            TagKind::Symbol if tok.text == "(" => {
                self.advance();
                let inner = self.disjunction()?;
                self.expect_symbol(")")?;
                Ok(format!("(?:{inner})"))
            }
            TagKind::Symbol if tok.text == "[" => {
                self.advance();
                let inner = self.disjunction()?;
                self.expect_symbol("]")?;
                Ok(format!("(?:{inner})?"))
            }
            TagKind::Symbol if tok.text == "{" => {
                self.advance();
                let inner = self.disjunction()?;
                self.expect_symbol("}")?;
                Ok(format!("(?:{inner})*"))
            }
            TagKind::Symbol if matches!(tok.text.as_str(), "=" | "~" | "<" | ">" | ":") => {
                Err(CompileError::UnsupportedLexerGrammarConstruct { construct: tok.text, position: tok.position })
            }
            _ => Err(CompileError::UnexpectedTagToken {
                found: tok.text,
                expected: "literal, range, named production, or group".into(),
                position: tok.position,
            }),
        }
    }
}
