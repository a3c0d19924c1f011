//! Canonical EBNF printer and round-trip validator (spec component J).
//!
//! [`render`] turns a compiled [`Node`] back into the same surface syntax
//! [`crate::tag::parser`] consumes, and [`parse_rendered`] feeds that text
//! back through the tag grammar parser — used by tests to assert that
//! compiling a grammar and printing it produces something that reparses to
//! an equivalent shape.

use std::rc::Rc;

use crate::bind::{into_apply_fn, ApplyFn, FieldSlot};
use crate::error::CompileError;
use crate::position::SymbolTable;
use crate::tag::{compile_field, FieldCtx, Nested};

use super::node::Node;

/// Renders `node` as canonical tag-grammar surface syntax. Token references
/// are rendered by name, so `symbols` must be the same table the grammar
/// was compiled with.
pub fn render(node: &Node, symbols: &SymbolTable) -> String {
    render_inner(node, symbols, false)
}

fn render_inner(node: &Node, symbols: &SymbolTable, parenthesize_disjunction: bool) -> String {
    match node {
        Node::Record(_) => "@@".to_string(),
        Node::Sequence(children) => children.iter().map(|c| render_inner(c, symbols, true)).collect::<Vec<_>>().join(" "),
        Node::Disjunction(alts) => {
            let body = alts.iter().map(|a| render_inner(a, symbols, false)).collect::<Vec<_>>().join(" | ");
            if parenthesize_disjunction {
                format!("({body})")
            } else {
                body
            }
        }
        Node::Capture { inner, .. } => match inner.as_ref() {
            Node::Record(_) => "@@".to_string(),
            other => format!("@{}", render_inner(other, symbols, true)),
        },
        Node::Literal(text, kind) => match kind {
            Some(sym) => format!("{text:?}:{}", symbols.name_of(*sym).unwrap_or("Unknown")),
            None => format!("{text:?}"),
        },
        Node::TokenReference(kind) => symbols.name_of(*kind).unwrap_or("Unknown").to_string(),
        Node::Optional(inner) => format!("{}?", render_inner(inner, symbols, true)),
        Node::Repetition { body, min } => {
            let quant = if *min == 0 { "*" } else { "+" };
            format!("{}{quant}", render_inner(body, symbols, true))
        }
        Node::Group(inner) => format!("({})", render_inner(inner, symbols, false)),
        Node::Negation(inner) => format!("!{}", render_inner(inner, symbols, true)),
        Node::LookaheadGroup { body, negative } => {
            let marker = if *negative { "!" } else { "=" };
            format!("(?{marker} {})", render_inner(body, symbols, false))
        }
        Node::Parseable(_) => "<external>".to_string(),
        Node::Union(members) => members.iter().map(|_| "@@").collect::<Vec<_>>().join(" | "),
    }
}

/// Parses previously-rendered text back into a [`Node`], substituting
/// `nested` for any `@@` marker (as the original field's grammar compiler
/// would have).
pub fn parse_rendered(text: &str, symbols: &SymbolTable, nested: Option<Nested>) -> Result<Node, CompileError> {
    #[derive(Default)]
    struct Sink {
        text: String,
    }
    let dummy_apply: ApplyFn = into_apply_fn(Rc::new(FieldSlot::<Sink>::string(|s| &mut s.text)));
    let ctx = FieldCtx { field_name: "<rendered>", symbols, nested, apply: dummy_apply, recovery: None };
    compile_field(text, &ctx)
}
