//! Peeking lexer adaptor (spec component B).
//!
//! Wraps any token iterator into an indexable, cloneable cursor with
//! arbitrary positive lookahead. Implemented by eagerly draining the
//! underlying iterator into a shared, monotonically growing buffer;
//! cloning shares the buffer but gives each clone an independent position.

use std::cell::RefCell;
use std::rc::Rc;

use crate::position::{Position, Token};

struct Buffer {
    source: Box<dyn Iterator<Item = Token>>,
    tokens: Vec<Token>,
    exhausted: bool,
    eof_position: Option<Position>,
}

impl Buffer {
    fn fill_to(&mut self, index: usize) {
        while self.tokens.len() <= index && !self.exhausted {
            match self.source.next() {
                Some(tok) => {
                    if tok.is_eof() {
                        self.eof_position = Some(tok.position.clone());
                        self.tokens.push(tok);
                        self.exhausted = true;
                    } else {
                        self.tokens.push(tok);
                    }
                }
                None => self.exhausted = true,
            }
        }
    }

    fn get(&mut self, index: usize) -> Token {
        self.fill_to(index);
        match self.tokens.get(index) {
            Some(t) => t.clone(),
            None => {
                let pos = self
                    .eof_position
                    .clone()
                    .or_else(|| self.tokens.last().map(|t| t.position.clone()))
                    .unwrap_or_else(|| Position::start_of(""));
                Token::eof(pos)
            }
        }
    }
}

/// An opaque, restorable checkpoint into a [`PeekingLexer`]'s position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint(pub(crate) usize);

/// A cursor over a token stream supporting arbitrary-offset peeking.
///
/// Cloning a `PeekingLexer` produces an independent cursor that shares the
/// underlying buffer: advancing one clone never affects another's position,
/// but tokens already pulled from the source are never re-lexed.
#[derive(Clone)]
pub struct PeekingLexer {
    buffer: Rc<RefCell<Buffer>>,
    pos: usize,
}

impl PeekingLexer {
    pub fn new(source: impl Iterator<Item = Token> + 'static) -> Self {
        Self {
            buffer: Rc::new(RefCell::new(Buffer {
                source: Box::new(source),
                tokens: Vec::new(),
                exhausted: false,
                eof_position: None,
            })),
            pos: 0,
        }
    }

    /// Returns the token `n` positions ahead of the cursor without consuming
    /// it. `peek(0)` is the next token that `next()` would return.
    pub fn peek(&self, n: usize) -> Token {
        self.buffer.borrow_mut().get(self.pos + n)
    }

    /// Consumes and returns the next token.
    pub fn next(&mut self) -> Token {
        let tok = self.peek(0);
        self.pos += 1;
        tok
    }

    pub fn cursor(&self) -> Checkpoint {
        Checkpoint(self.pos)
    }

    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.pos = checkpoint.0;
    }

    /// Number of tokens consumed by this cursor since stream start.
    pub fn consumed(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod peek_tests {
    use super::*;
    use crate::position::{EOF, IDENT};

    fn tok(i: i32, text: &str, offset: usize) -> Token {
        Token::new(i, text, Position { file: "t".into(), offset, line: 1, column: offset as u32 + 1 })
    }

    #[test]
    fn peek_does_not_consume() {
        let tokens = vec![tok(IDENT, "a", 0), tok(IDENT, "b", 1)];
        let lex = PeekingLexer::new(tokens.into_iter());
        assert_eq!(lex.peek(0).text.as_ref(), "a");
        assert_eq!(lex.peek(1).text.as_ref(), "b");
        assert_eq!(lex.peek(0).text.as_ref(), "a");
    }

    #[test]
    fn clone_is_independent() {
        let tokens = vec![tok(IDENT, "a", 0), tok(IDENT, "b", 1)];
        let mut lex = PeekingLexer::new(tokens.into_iter());
        let mut clone = lex.clone();
        lex.next();
        assert_eq!(clone.peek(0).text.as_ref(), "a");
        clone.next();
        clone.next();
        assert_eq!(clone.peek(0).kind, EOF);
    }

    #[test]
    fn past_end_is_eof_forever() {
        let tokens = vec![tok(IDENT, "a", 0)];
        let mut lex = PeekingLexer::new(tokens.into_iter());
        lex.next();
        assert_eq!(lex.peek(0).kind, EOF);
        assert_eq!(lex.peek(5).kind, EOF);
        let first_pos = lex.peek(0).position.clone();
        let later_pos = lex.peek(3).position.clone();
        assert_eq!(first_pos, later_pos);
    }

    #[test]
    fn positions_are_monotone() {
        let tokens = vec![tok(IDENT, "a", 0), tok(IDENT, "bb", 1), tok(IDENT, "c", 3)];
        let lex = PeekingLexer::new(tokens.into_iter());
        let mut last = 0usize;
        for n in 0..5 {
            let p = lex.peek(n).position.offset;
            assert!(p >= last);
            last = p;
        }
    }
}
