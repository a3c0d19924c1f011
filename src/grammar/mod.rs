//! Grammar compilation: turning a [`crate::bind::Grammar`] type into a node
//! graph (spec components E, F, J, plus left-recursion detection).

pub mod compile;
pub mod ebnf;
pub mod left_recursion;
pub mod node;

pub use compile::{Grammar, GrammarCompiler};
pub use node::{CaptureTarget, Node, Outcome, RecordNode, UnionMember};
