//! Parse context (spec component G): the cursor plus the branch/accept/stop
//! bookkeeping that makes backtracking and deferred field binding
//! rollback-safe, and the shared furthest-error tracker used to produce a
//! useful diagnostic when every alternative in a disjunction fails.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::bind::{ApplyFn, AnyCell, CapturedValue};
use crate::error::ParseError;
use crate::lexer::PeekingLexer;
use crate::position::Symbol;

/// One deferred "write these values into that field" step, queued while a
/// branch is still speculative and only run once the whole parse commits.
pub struct PendingBinding {
    target: AnyCell,
    apply: ApplyFn,
    values: Vec<CapturedValue>,
}

impl PendingBinding {
    pub fn new(target: AnyCell, apply: ApplyFn, values: Vec<CapturedValue>) -> Self {
        Self { target, apply, values }
    }

    fn commit(self) {
        (self.apply)(&self.target, self.values);
    }
}

/// Threaded through every [`crate::grammar::node::Node::parse`] call. Carries
/// the token cursor, accumulates bindings that have not yet been committed,
/// and shares one furthest-error tracker with every branch spawned from it.
pub struct ParseContext {
    cursor: PeekingLexer,
    pending: Vec<PendingBinding>,
    furthest: Rc<RefCell<Option<ParseError>>>,
    max_lookahead: usize,
    case_insensitive: Rc<HashSet<Symbol>>,
    unquote: Rc<HashSet<Symbol>>,
    recovered: Rc<RefCell<Vec<ParseError>>>,
}

impl ParseContext {
    pub fn new(cursor: PeekingLexer) -> Self {
        Self {
            cursor,
            pending: Vec::new(),
            furthest: Rc::new(RefCell::new(None)),
            max_lookahead: usize::MAX,
            case_insensitive: Rc::new(HashSet::new()),
            unquote: Rc::new(HashSet::new()),
            recovered: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Full constructor used by [`crate::engine::Parser`], which resolves
    /// `BuildOptions` into the token-kind sets this context consults per
    /// [`crate::grammar::node::Node::Literal`]/[`crate::grammar::node::Node::TokenReference`]
    /// match.
    pub fn with_options(cursor: PeekingLexer, max_lookahead: usize, case_insensitive: Rc<HashSet<Symbol>>, unquote: Rc<HashSet<Symbol>>) -> Self {
        Self {
            cursor,
            pending: Vec::new(),
            furthest: Rc::new(RefCell::new(None)),
            max_lookahead,
            case_insensitive,
            unquote,
            recovered: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn cursor(&self) -> &PeekingLexer {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut PeekingLexer {
        &mut self.cursor
    }

    /// The configured `useLookahead` budget (§6), consulted by
    /// [`crate::grammar::node`]'s disjunction handling to decide when a
    /// failed alternative has consumed enough input to commit the whole
    /// disjunction to it.
    pub fn lookahead(&self) -> usize {
        self.max_lookahead
    }

    pub fn is_case_insensitive(&self, kind: Symbol) -> bool {
        self.case_insensitive.contains(&kind)
    }

    pub fn should_unquote(&self, kind: Symbol) -> bool {
        self.unquote.contains(&kind)
    }

    /// Records an error recovered by the optional recovery layer (§7); the
    /// accumulated list becomes the [`crate::error::MultiError`] returned by
    /// `parse_with_recovery`.
    pub fn record_recovered(&self, err: ParseError) {
        self.recovered.borrow_mut().push(err);
    }

    pub fn take_recovered(&self) -> Vec<ParseError> {
        self.recovered.borrow().clone()
    }

    /// Spawns an independent speculative branch: same cursor position and
    /// furthest-error tracker, but its own empty pending-binding list so it
    /// can be discarded without side effects if it fails to match.
    pub fn branch(&self) -> ParseContext {
        ParseContext {
            cursor: self.cursor.clone(),
            pending: Vec::new(),
            furthest: Rc::clone(&self.furthest),
            max_lookahead: self.max_lookahead,
            case_insensitive: Rc::clone(&self.case_insensitive),
            unquote: Rc::clone(&self.unquote),
            recovered: Rc::clone(&self.recovered),
        }
    }

    /// Like [`Self::branch`], but caps how far ahead a bounded lookahead
    /// group is allowed to peek before giving up and reporting no match,
    /// bounding the cost of a pathological `(?= ...)` grammar.
    pub fn branch_with_lookahead_budget(&self, budget: usize) -> ParseContext {
        let mut b = self.branch();
        b.max_lookahead = budget;
        b
    }

    pub fn lookahead_budget_exhausted(&self, ahead: usize) -> bool {
        ahead > self.max_lookahead
    }

    /// Folds a successful branch back into `self`: its cursor position
    /// becomes the current position and its pending bindings are adopted.
    pub fn accept(&mut self, branch: ParseContext) {
        self.cursor = branch.cursor;
        self.pending.extend(branch.pending);
    }

    /// Discards a failed branch, recording its error as a candidate for the
    /// furthest-error diagnostic. The branch's cursor advance and pending
    /// bindings are dropped.
    pub fn stop(&self, err: ParseError) {
        self.record_error(err);
    }

    pub fn record_error(&self, err: ParseError) {
        let mut slot = self.furthest.borrow_mut();
        let replace = match &*slot {
            None => true,
            Some(prev) => err.is_further_than(prev),
        };
        if replace {
            *slot = Some(err);
        }
    }

    pub fn furthest_error(&self) -> Option<ParseError> {
        self.furthest.borrow().clone()
    }

    pub fn push_binding(&mut self, binding: PendingBinding) {
        self.pending.push(binding);
    }

    /// Commits every pending binding accumulated on the root context, in the
    /// order they were queued (outer-to-inner, left-to-right, matching the
    /// order fields were visited during the parse).
    pub fn commit_all(self) {
        for binding in self.pending {
            binding.commit();
        }
    }
}

#[cfg(test)]
mod context_tests {
    use super::*;
    use crate::position::{Position, Token, IDENT};

    fn ctx() -> ParseContext {
        let toks = vec![Token::new(IDENT, "a", Position::start_of("t"))];
        ParseContext::new(PeekingLexer::new(toks.into_iter()))
    }

    #[test]
    fn branch_does_not_affect_parent_until_accepted() {
        let mut parent = ctx();
        let mut branch = parent.branch();
        branch.cursor_mut().next();
        assert_eq!(parent.cursor().consumed(), 0);
        parent.accept(branch);
        assert_eq!(parent.cursor().consumed(), 1);
    }

    #[test]
    fn stopped_branch_is_discarded() {
        let parent = ctx();
        let branch = parent.branch();
        drop(branch);
        assert_eq!(parent.cursor().consumed(), 0);
    }

    #[test]
    fn furthest_error_prefers_deeper_position() {
        let parent = ctx();
        let near = ParseError::UnexpectedToken {
            expected: "x".into(),
            found: "y".into(),
            position: Position { file: "t".into(), offset: 1, line: 1, column: 2 },
        };
        let far = ParseError::UnexpectedToken {
            expected: "x".into(),
            found: "y".into(),
            position: Position { file: "t".into(), offset: 5, line: 1, column: 6 },
        };
        parent.record_error(near.clone());
        parent.record_error(far.clone());
        assert_eq!(parent.furthest_error().unwrap().position().offset, 5);
        parent.record_error(near);
        assert_eq!(parent.furthest_error().unwrap().position().offset, 5);
    }

    #[test]
    fn lookahead_budget_is_inherited_by_branch() {
        let parent = ctx();
        let bounded = parent.branch_with_lookahead_budget(2);
        assert!(!bounded.lookahead_budget_exhausted(2));
        assert!(bounded.lookahead_budget_exhausted(3));
        let nested = bounded.branch();
        assert!(nested.lookahead_budget_exhausted(3));
    }
}
