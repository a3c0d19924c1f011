//! tagram: build recursive-descent parsers from declaratively annotated
//! record types, driven by small EBNF-like tag strings attached to each
//! field — without relying on a procedural macro, since Rust has no
//! runtime field reflection.
//!
//! # Example
//!
//! ```
//! use tagram::bind::{FieldSlot, FieldSpec, Grammar, RecordSpec};
//! use tagram::lexer::{LexerRules, RuleDef, RuleEntry, ROOT_STATE};
//! use tagram::{BuildOptions, Parser};
//!
//! #[derive(Default)]
//! struct Greeting {
//!     word: String,
//! }
//!
//! impl Grammar for Greeting {
//!     fn spec() -> RecordSpec<Self> {
//!         RecordSpec::new().field(FieldSpec::new("Word", "@Ident", FieldSlot::string(|g| &mut g.word)))
//!     }
//! }
//!
//! let lexer = LexerRules::new()
//!     .state(ROOT_STATE, vec![RuleEntry::Rule(RuleDef::new("Ident", r"[A-Za-z]+"))])
//!     .compile()
//!     .expect("valid lexer");
//!
//! let parser = Parser::<Greeting>::build(BuildOptions::new().with_lexer(lexer)).expect("valid grammar");
//! let greeting = parser.parse("hello").expect("matches");
//! assert_eq!(greeting.word, "hello");
//! ```

pub mod bind;
pub mod context;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod lexer;
pub mod position;
pub mod recovery;
pub mod tag;

pub use bind::{Capture, FieldSlot, FieldSpec, Grammar, Parseable, ParseableResult, RecordSpec, UnionCase};
pub use engine::{BuildOptions, Parser};
pub use error::{CompileError, Error, MultiError, ParseError};
pub use grammar::{GrammarCompiler, Node};
pub use lexer::LexerDefinition;

/// Crate-wide result alias for fallible top-level operations.
pub type Result<T> = std::result::Result<T, Error>;
