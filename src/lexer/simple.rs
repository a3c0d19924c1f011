//! Simple lexer: syntactic sugar for a single-state stateful lexer (§6).

use crate::error::CompileError;

use super::stateful::{LexerRules, RuleDef, RuleEntry, StatefulLexer, ROOT_STATE};

/// An ordered list of `{name, regex}` rules with no state transitions.
#[derive(Debug, Clone, Default)]
pub struct SimpleLexerRules {
    rules: Vec<RuleDef>,
}

impl SimpleLexerRules {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rule(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.rules.push(RuleDef::new(name, pattern));
        self
    }

    pub fn compile(self) -> Result<StatefulLexer, CompileError> {
        LexerRules::new()
            .state(ROOT_STATE, self.rules.into_iter().map(RuleEntry::Rule).collect())
            .compile()
    }
}

#[cfg(test)]
mod simple_tests {
    use super::*;

    #[test]
    fn behaves_as_single_state_stateful_lexer() {
        let lexer = SimpleLexerRules::new()
            .rule("ws", r"\s+")
            .rule("Ident", r"[a-z]+")
            .rule("Int", r"[0-9]+")
            .compile()
            .unwrap();
        let toks: Vec<_> = lexer.lex("abc 12", "t").collect();
        assert_eq!(toks[0].text.as_ref(), "abc");
        assert_eq!(toks[1].text.as_ref(), "12");
    }
}
