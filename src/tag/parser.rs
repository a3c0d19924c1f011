//! Tag grammar parser / grammar compiler (spec component E).
//!
//! Parses one field's tag string (already tokenized by [`super::scanner`])
//! into a [`Node`] fragment:
//!
//! ```text
//! disjunction = sequence ("|" sequence)*
//! sequence    = term*
//! term        = "!" term
//!             | capturable quantifier?
//! capturable  = "@" "@"
//!             | "@" atom
//!             | atom
//! atom        = STRING (":" IDENT)? | "<" IDENT ">" | IDENT
//!             | "(" "?" "=" disjunction ")" | "(" "?" "!" disjunction ")"
//!             | "(" disjunction ")" | "[" disjunction "]" | "{" disjunction "}"
//! quantifier  = "?" | "*" | "+"
//! ```
//!
//! `"@" "@"` ("capture the nested grammar here") does not parse a record
//! reference from the tag text — Rust has no field-type reflection, so the
//! grammar compiler ([`crate::grammar::compile`]) already knows, from the
//! field's declared [`crate::bind::FieldSlot`], which nested grammar to
//! substitute, and passes it in as `nested`.

use std::rc::Rc;

use super::scanner::{scan, TagKind, TagToken};
use crate::error::CompileError;
use crate::grammar::node::{is_nullable, CaptureTarget, Node};
use crate::position::SymbolTable;
use crate::recovery::RecoveryStrategy;

/// What a bare `@@` in a field's tag expands to; supplied by the grammar
/// compiler, which alone knows the field's nested record/union type.
#[derive(Clone)]
pub enum Nested {
    Node(Node),
}

/// Everything needed to compile one field's tag string into a [`Node`].
pub struct FieldCtx<'a> {
    pub field_name: &'a str,
    pub symbols: &'a SymbolTable,
    pub nested: Option<Nested>,
    pub apply: crate::bind::ApplyFn,
    pub recovery: Option<RecoveryStrategy>,
}

struct Parser<'a> {
    tokens: Vec<TagToken>,
    pos: usize,
    ctx: &'a FieldCtx<'a>,
}

/// Compiles one field's tag string, rejecting range syntax (`..`), which is
/// only meaningful inside an EBNF-lexer character class.
pub fn compile_field(tag: &str, ctx: &FieldCtx) -> Result<Node, CompileError> {
    let tokens = scan(tag, ctx.field_name)?;
    let mut parser = Parser { tokens, pos: 0, ctx };
    let node = parser.parse_disjunction()?;
    parser.expect_eof()?;
    Ok(node)
}

impl<'a> Parser<'a> {
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
            Err(CompileError::UnexpectedTagToken { found: tok.text, expected: "end of tag".into(), position: tok.position })
        }
    }

    fn parse_disjunction(&mut self) -> Result<Node, CompileError> {
        let mut alts = vec![self.parse_sequence()?];
        while self.at_symbol("|") {
            self.advance();
            alts.push(self.parse_sequence()?);
        }
        Ok(if alts.len() == 1 { alts.remove(0) } else { Node::Disjunction(alts) })
    }

    fn parse_sequence(&mut self) -> Result<Node, CompileError> {
        let mut terms = Vec::new();
        while !self.peek().is_eof() && !self.at_symbol("|") && !self.at_symbol(")") && !self.at_symbol("]") && !self.at_symbol("}") {
            terms.push(self.parse_term()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { Node::Sequence(terms) })
    }

    fn parse_term(&mut self) -> Result<Node, CompileError> {
        if self.at_symbol("!") {
            self.advance();
            let inner = self.parse_term()?;
            return Ok(Node::Negation(Box::new(inner)));
        }

        let node = self.parse_capturable()?;
        self.apply_quantifier(node)
    }

    fn apply_quantifier(&mut self, node: Node) -> Result<Node, CompileError> {
        if self.at_symbol("?") {
            self.advance();
            Ok(Node::Optional(Box::new(node)))
        } else if self.at_symbol("*") {
            let tok = self.advance();
            self.reject_if_nullable(&node, &tok)?;
            Ok(Node::Repetition { body: Box::new(node), min: 0 })
        } else if self.at_symbol("+") {
            let tok = self.advance();
            self.reject_if_nullable(&node, &tok)?;
            Ok(Node::Repetition { body: Box::new(node), min: 1 })
        } else {
            Ok(node)
        }
    }

    /// A `*`/`+`-quantified or `{...}` body that can match zero-length
    /// input would loop forever; reject it here rather than only guarding
    /// against it at parse time (§4.F).
    fn reject_if_nullable(&self, node: &Node, tok: &TagToken) -> Result<(), CompileError> {
        if is_nullable(node) {
            Err(CompileError::ZeroLengthRepetition { position: tok.position.clone() })
        } else {
            Ok(())
        }
    }

    fn parse_capturable(&mut self) -> Result<Node, CompileError> {
        if self.at_symbol("@@") {
            let tok = self.advance();
            let inner = match &self.ctx.nested {
                Some(Nested::Node(n)) => n.clone(),
                None => {
                    return Err(CompileError::MissingCaptureTarget { position: tok.position });
                }
            };
            return Ok(self.wrap_capture(inner));
        }

        if self.at_symbol("@") {
            self.advance();
            let inner = self.parse_atom()?;
            return Ok(self.wrap_capture(inner));
        }

        self.parse_atom()
    }

    fn wrap_capture(&self, inner: Node) -> Node {
        let target = Rc::new(CaptureTarget {
            field_name: self.ctx.field_name.to_string(),
            apply: Rc::clone(&self.ctx.apply),
            recovery: self.ctx.recovery.clone(),
        });
        Node::Capture { target, inner: Box::new(inner) }
    }

    fn parse_atom(&mut self) -> Result<Node, CompileError> {
        let tok = self.peek().clone();
        match tok.kind {
            TagKind::String => {
                self.advance();
                let kind = self.parse_type_constraint()?;
                Ok(Node::Literal(tok.text, kind))
            }
            TagKind::Ident => {
                self.advance();
                match self.ctx.symbols.get(&tok.text) {
                    Some(sym) => Ok(Node::TokenReference(sym)),
                    None => Err(CompileError::UnknownTokenType { name: tok.text, position: tok.position }),
                }
            }
            TagKind::Symbol if tok.text == "<" => {
                self.advance();
                let name_tok = self.peek().clone();
                if name_tok.kind != TagKind::Ident {
                    return Err(CompileError::UnexpectedTagToken {
                        found: name_tok.text,
                        expected: "token type name".into(),
                        position: name_tok.position,
                    });
                }
                self.advance();
                self.expect_symbol(">")?;
                match self.ctx.symbols.get(&name_tok.text) {
                    Some(sym) => Ok(Node::TokenReference(sym)),
                    None => Err(CompileError::UnknownTokenType { name: name_tok.text, position: name_tok.position }),
                }
            }
            TagKind::Symbol if tok.text == "(" => {
                self.advance();
                if self.at_symbol("?") {
                    self.advance();
                    if self.at_symbol("=") {
                        self.advance();
                        let inner = self.parse_disjunction()?;
                        self.expect_symbol(")")?;
                        Ok(Node::LookaheadGroup { body: Box::new(inner), negative: false })
                    } else {
                        self.expect_symbol("!")?;
                        let inner = self.parse_disjunction()?;
                        self.expect_symbol(")")?;
                        Ok(Node::LookaheadGroup { body: Box::new(inner), negative: true })
                    }
                } else {
                    let inner = self.parse_disjunction()?;
                    self.expect_symbol(")")?;
                    Ok(Node::Group(Box::new(inner)))
                }
            }
            TagKind::Symbol if tok.text == "[" => {
                self.advance();
                let inner = self.parse_disjunction()?;
                self.expect_symbol("]")?;
                Ok(Node::Optional(Box::new(inner)))
            }
            TagKind::Symbol if tok.text == "{" => {
                self.advance();
                let inner = self.parse_disjunction()?;
                self.expect_symbol("}")?;
                self.reject_if_nullable(&inner, &tok)?;
                Ok(Node::Repetition { body: Box::new(inner), min: 0 })
            }
            TagKind::Symbol if tok.text == ".." => {
                Err(CompileError::RangeInParserGrammar { lo: "?".into(), hi: "?".into() })
            }
            _ => Err(CompileError::UnexpectedTagToken {
                found: tok.text,
                expected: "literal, token reference, or group".into(),
                position: tok.position,
            }),
        }
    }

    /// Parses the optional `":" ident` suffix on a literal (§4.E), returning
    /// the named symbol the token's type must also match.
    fn parse_type_constraint(&mut self) -> Result<Option<crate::position::Symbol>, CompileError> {
        if !self.at_symbol(":") {
            return Ok(None);
        }
        self.advance();
        let tok = self.peek().clone();
        if tok.kind != TagKind::Ident {
            return Err(CompileError::UnexpectedTagToken { found: tok.text, expected: "token type name".into(), position: tok.position });
        }
        self.advance();
        match self.ctx.symbols.get(&tok.text) {
            Some(sym) => Ok(Some(sym)),
            None => Err(CompileError::UnknownTokenType { name: tok.text, position: tok.position }),
        }
    }
}
