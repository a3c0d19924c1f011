//! Lexer infrastructure: the peeking cursor adaptor (§4.B) and the three
//! lexer construction paths from §6 (stateful, simple, EBNF-grammar-driven).

mod ebnf_lexer;
mod peek;
mod simple;
mod stateful;

use std::sync::Arc;

pub use ebnf_lexer::EbnfLexerRules;
pub use peek::{Checkpoint, PeekingLexer};
pub use simple::SimpleLexerRules;
pub use stateful::{Action, LexerRules, RuleDef, RuleEntry, StatefulLexer, StatefulLexerIter, ROOT_STATE};

use crate::position::{SymbolTable, Token};

/// A compiled lexer definition usable as a [`crate::engine::BuildOptions`]
/// lexer: exposes its symbol table and can eagerly tokenize a whole input,
/// up to and including the terminating `EOF` token. Eager rather than a
/// borrowed-iterator return so the trait stays object-safe for
/// `Box<dyn LexerDefinition>`.
pub trait LexerDefinition {
    fn symbols(&self) -> &SymbolTable;
    fn tokenize(&self, source: &str, filename: Arc<str>) -> Vec<Token>;
}

impl LexerDefinition for StatefulLexer {
    fn symbols(&self) -> &SymbolTable {
        StatefulLexer::symbols(self)
    }

    fn tokenize(&self, source: &str, filename: Arc<str>) -> Vec<Token> {
        let mut out = Vec::new();
        for tok in self.lex(source, filename) {
            let is_eof = tok.is_eof();
            out.push(tok);
            if is_eof {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod lexer_definition_tests {
    use super::*;

    #[test]
    fn stateful_lexer_implements_lexer_definition() {
        let lexer = LexerRules::new().state(ROOT_STATE, vec![RuleEntry::Rule(RuleDef::new("Ident", "[a-z]+"))]).compile().unwrap();
        let def: &dyn LexerDefinition = &lexer;
        let toks = def.tokenize("abc", "t".into());
        assert_eq!(toks.len(), 2);
        assert!(toks[1].is_eof());
    }
}
