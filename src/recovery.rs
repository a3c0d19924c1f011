//! Optional error-recovery layer (§7). Disabled by default; a record field
//! or a whole grammar opts in by attaching a [`RecoveryStrategy`], which
//! runs when the field's own grammar element fails to match and decides
//! how far to advance the cursor before resuming the enclosing sequence.

use crate::lexer::PeekingLexer;
use crate::position::Symbol;

/// A recovery action attached to a field or record (§7).
#[derive(Clone)]
pub enum RecoveryStrategy {
    /// Advances the cursor until (but not past) the first token of the given
    /// kind, or to EOF if none is found.
    SkipUntil(Symbol),
    /// Advances the cursor past the first token of the given kind (consuming
    /// it), or to EOF if none is found.
    SkipPast(Symbol),
    /// Skips a single balanced `open`/`close` delimited region, honoring
    /// nesting, starting from the current token (which must be `open`).
    BalancedDelimiterSkip { open: Symbol, close: Symbol },
    /// Repeatedly skips past `separator` tokens until one of `terminators` is
    /// the next token (not consumed), or EOF is reached.
    SkipThenRetryUntil { separator: Symbol, terminators: Vec<Symbol> },
    /// Tries each strategy in order, using the first whose precondition
    /// holds (only meaningful for [`RecoveryStrategy::BalancedDelimiterSkip`],
    /// whose precondition is "current token is `open`"); falls through to
    /// the next on failure.
    FirstOf(Vec<RecoveryStrategy>),
}

impl RecoveryStrategy {
    pub fn skip_until(kind: Symbol) -> Self {
        RecoveryStrategy::SkipUntil(kind)
    }

    pub fn skip_past(kind: Symbol) -> Self {
        RecoveryStrategy::SkipPast(kind)
    }

    pub fn balanced(open: Symbol, close: Symbol) -> Self {
        RecoveryStrategy::BalancedDelimiterSkip { open, close }
    }

    pub fn skip_then_retry_until(separator: Symbol, terminators: Vec<Symbol>) -> Self {
        RecoveryStrategy::SkipThenRetryUntil { separator, terminators }
    }

    pub fn first_of(strategies: Vec<RecoveryStrategy>) -> Self {
        RecoveryStrategy::FirstOf(strategies)
    }

    /// Advances `cursor` in place. Returns `true` if recovery made progress
    /// (the cursor moved), `false` if it gave up immediately (e.g. EOF was
    /// already current, or no strategy in a `FirstOf` chain applied).
    pub fn recover(&self, cursor: &mut PeekingLexer) -> bool {
        match self {
            RecoveryStrategy::SkipUntil(kind) => {
                let start = cursor.consumed();
                loop {
                    let tok = cursor.peek(0);
                    if tok.is_eof() || tok.kind == *kind {
                        break;
                    }
                    cursor.next();
                }
                cursor.consumed() != start
            }
            RecoveryStrategy::SkipPast(kind) => {
                let start = cursor.consumed();
                loop {
                    let tok = cursor.next();
                    if tok.is_eof() || tok.kind == *kind {
                        break;
                    }
                }
                cursor.consumed() != start
            }
            RecoveryStrategy::BalancedDelimiterSkip { open, close } => {
                if cursor.peek(0).kind != *open {
                    return false;
                }
                let mut depth = 0usize;
                loop {
                    let tok = cursor.next();
                    if tok.is_eof() {
                        break;
                    }
                    if tok.kind == *open {
                        depth += 1;
                    } else if tok.kind == *close {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                }
                true
            }
            RecoveryStrategy::SkipThenRetryUntil { separator, terminators } => {
                let start = cursor.consumed();
                loop {
                    let tok = cursor.peek(0);
                    if tok.is_eof() || terminators.contains(&tok.kind) {
                        break;
                    }
                    if tok.kind == *separator {
                        cursor.next();
                        continue;
                    }
                    cursor.next();
                }
                cursor.consumed() != start
            }
            RecoveryStrategy::FirstOf(strategies) => {
                for s in strategies {
                    let checkpoint = cursor.cursor();
                    if s.recover(cursor) {
                        return true;
                    }
                    cursor.restore(checkpoint);
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod recovery_tests {
    use super::*;
    use crate::position::{Position, Token};

    const SEMI: Symbol = -100;
    const LBRACE: Symbol = -101;
    const RBRACE: Symbol = -102;
    const COMMA: Symbol = -103;

    fn toks(kinds: &[Symbol]) -> PeekingLexer {
        let pos = Position::start_of("t");
        let owned: Vec<Token> = kinds.iter().map(|k| Token::new(*k, "x", pos.clone())).collect();
        PeekingLexer::new(owned.into_iter())
    }

    #[test]
    fn skip_past_consumes_through_separator() {
        let mut c = toks(&[1, 2, SEMI, 3]);
        let strategy = RecoveryStrategy::skip_past(SEMI);
        assert!(strategy.recover(&mut c));
        assert_eq!(c.peek(0).kind, 3);
    }

    #[test]
    fn skip_until_stops_before_separator() {
        let mut c = toks(&[1, 2, SEMI, 3]);
        let strategy = RecoveryStrategy::skip_until(SEMI);
        assert!(strategy.recover(&mut c));
        assert_eq!(c.peek(0).kind, SEMI);
    }

    #[test]
    fn balanced_skip_honors_nesting() {
        let mut c = toks(&[LBRACE, LBRACE, RBRACE, RBRACE, 9]);
        let strategy = RecoveryStrategy::balanced(LBRACE, RBRACE);
        assert!(strategy.recover(&mut c));
        assert_eq!(c.peek(0).kind, 9);
    }

    #[test]
    fn balanced_skip_requires_open_at_cursor() {
        let mut c = toks(&[9, LBRACE, RBRACE]);
        let strategy = RecoveryStrategy::balanced(LBRACE, RBRACE);
        assert!(!strategy.recover(&mut c));
        assert_eq!(c.peek(0).kind, 9);
    }

    #[test]
    fn skip_then_retry_until_stops_at_terminator() {
        let mut c = toks(&[1, COMMA, 2, COMMA, RBRACE]);
        let strategy = RecoveryStrategy::skip_then_retry_until(COMMA, vec![RBRACE]);
        assert!(strategy.recover(&mut c));
        assert_eq!(c.peek(0).kind, RBRACE);
    }

    #[test]
    fn first_of_falls_through_to_next_strategy() {
        let mut c = toks(&[9, SEMI, 3]);
        let strategy = RecoveryStrategy::first_of(vec![
            RecoveryStrategy::balanced(LBRACE, RBRACE),
            RecoveryStrategy::skip_past(SEMI),
        ]);
        assert!(strategy.recover(&mut c));
        assert_eq!(c.peek(0).kind, 3);
    }
}
