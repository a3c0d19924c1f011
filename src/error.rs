//! Error model (spec component I / §7).
//!
//! Two top-level kinds: [`CompileError`], raised while turning a grammar
//! description into a node graph, and [`ParseError`], raised while running
//! that graph against an input. [`MultiError`] aggregates recovered errors
//! when the optional recovery layer (§7) is enabled.

use std::fmt;

use thiserror::Error;

use crate::position::Position;

/// Errors raised while compiling a grammar (tag parsing, left-recursion
/// detection, symbol resolution, lexer-rule compilation).
#[derive(Debug, Error, Clone)]
pub enum CompileError {
    #[error("{position}: unknown token type {name:?}")]
    UnknownTokenType { name: String, position: Position },

    #[error("{position}: unclosed group")]
    UnclosedGroup { position: Position },

    #[error("{position}: unexpected {found:?}, expected {expected}")]
    UnexpectedTagToken { found: String, expected: String, position: Position },

    #[error("{position}: capture has no target field")]
    MissingCaptureTarget { position: Position },

    #[error("left recursion detected in `{record}`: {rendering}")]
    LeftRecursion { record: String, rendering: String },

    #[error("{position}: repetition body may match zero-length input")]
    ZeroLengthRepetition { position: Position },

    #[error("capture target is a non-string scalar pointer field but produced more than one value; refusing ambiguous merge")]
    AmbiguousScalarPointerCapture { field: String },

    #[error("lexer rule {name:?} may match the empty string")]
    EmptyMatchRule { name: String },

    #[error("lexer rule {name:?} is defined twice in the same state")]
    DuplicateRuleName { name: String },

    #[error("lexer state {name:?} is undefined")]
    UndefinedState { name: String },

    #[error("include cycle detected involving state {name:?}")]
    IncludeCycle { name: String },

    #[error("lexer rule {name:?} uses a named capture group, which is reserved for internal use")]
    NamedGroupsNotAllowed { name: String },

    #[error("invalid regular expression in rule {name:?}: {source}")]
    InvalidRegex { name: String, source: String },

    #[error("token range `{lo}`…`{hi}` is not permitted inside a parser grammar")]
    RangeInParserGrammar { lo: String, hi: String },

    #[error("token range bounds must each be a single character, got {lo:?}…{hi:?}")]
    InvalidRangeBounds { lo: String, hi: String },

    #[error("{position}: {construct} is not supported inside a lexer-grammar production")]
    UnsupportedLexerGrammarConstruct { construct: String, position: Position },

    #[error("no lexer was supplied to `BuildOptions`; call `.with_lexer(..)` before building a parser")]
    NoLexerProvided,

    #[error("build option referenced unknown token name {name:?}")]
    UnknownOptionTokenName { name: String },

    #[error("undefined production {name:?} referenced in an EBNF-lexer grammar")]
    UndefinedProduction { name: String },

    #[error("production cycle detected involving {name:?}: {rendering}")]
    ProductionCycle { name: String, rendering: String },
}

/// Errors raised while running a compiled grammar against a token stream.
#[derive(Debug, Error, Clone)]
pub enum ParseError {
    /// A required element did not match; the deepest such error across all
    /// backtracked branches is reported (the "furthest error" rule).
    #[error("{position}: expected {expected}, got {found:?}")]
    UnexpectedToken { expected: String, found: String, position: Position },

    /// The tokenizer could not match any rule at the current offset.
    #[error("{position}: no rule matched")]
    LexError { position: Position },

    /// A [`crate::bind::Parseable`] hook returned an error.
    #[error("{position}: {message}")]
    Custom { message: String, position: Position },

    /// The grammar matched but left unconsumed input at the top level.
    #[error("{position}: unexpected trailing input {found:?}")]
    TrailingInput { found: String, position: Position },

    /// `parse_bytes` was given input that is not valid UTF-8.
    #[error("{position}: input is not valid UTF-8")]
    InvalidEncoding { position: Position },
}

impl ParseError {
    pub fn position(&self) -> &Position {
        match self {
            ParseError::UnexpectedToken { position, .. } => position,
            ParseError::LexError { position } => position,
            ParseError::Custom { position, .. } => position,
            ParseError::TrailingInput { position, .. } => position,
            ParseError::InvalidEncoding { position } => position,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns whether `self` represents a syntactically "deeper" failure
    /// than `other`: a greater cursor offset, ties broken in favor of the
    /// later-recorded error (a later alternative at the same position
    /// displaces an earlier one, per §4.I's "by declaration order" and the
    /// §8 disambiguation example, where the second of two same-position
    /// alternatives is the one surfaced).
    pub fn is_further_than(&self, other: &ParseError) -> bool {
        self.position().offset >= other.position().offset
    }
}

/// A multi-error returned when the optional recovery layer resumed parsing
/// past one or more failures (§7).
#[derive(Debug, Clone, Default)]
pub struct MultiError {
    pub recovered: Vec<ParseError>,
}

impl MultiError {
    pub fn new(recovered: Vec<ParseError>) -> Self {
        Self { recovered }
    }

    pub fn is_empty(&self) -> bool {
        self.recovered.is_empty()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} recovered error(s):", self.recovered.len())?;
        for e in &self.recovered {
            writeln!(f, "  {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

/// Top-level error returned from a parse entry point.
#[derive(Debug, Error, Clone)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Multi(#[from] MultiError),
}
