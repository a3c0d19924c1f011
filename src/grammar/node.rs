//! The grammar node graph (spec component F): the sum type every compiled
//! tag expression reduces to, and the shared parse contract every variant
//! implements.
//!
//! A node's `parse` returns one of three outcomes: it failed to match
//! (nothing consumed, nothing queued), it matched but produced no capturable
//! values (pure structure, e.g. a literal that's part of a `Group` but not
//! itself captured), or it matched and produced one or more values that
//! bubble up to the nearest enclosing [`Node::Capture`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::bind::{new_any_cell, ApplyFn, AnyCell, CapturedValue, ParseableOutcome};
use crate::context::{ParseContext, PendingBinding};
use crate::error::ParseError;
use crate::position::{Position, Symbol};

/// Result of running one node against the current cursor position.
pub enum Outcome {
    NoMatch,
    Matched(Vec<CapturedValue>),
}

impl Outcome {
    fn matched_empty() -> Self {
        Outcome::Matched(Vec::new())
    }
}

/// A compiled record type: how to allocate its in-progress instance, how to
/// inject its `Position` field (if it has one), and the node graph for its
/// body.
pub struct RecordNode {
    pub name: String,
    pub new_cell: Rc<dyn Fn() -> AnyCell>,
    pub position_setter: Option<Rc<dyn Fn(&AnyCell, Position)>>,
    /// Wrapped in a cell because a self-referential grammar (`Expr` whose
    /// body contains `Expr` again) needs the `Rc<RecordNode>` to exist
    /// before its own body can be built; [`crate::grammar::compile`]
    /// allocates the node with a placeholder body and backpatches it once
    /// the real graph is assembled.
    pub body: RefCell<Node>,
}

impl RecordNode {
    pub fn placeholder(name: impl Into<String>, new_cell: Rc<dyn Fn() -> AnyCell>, position_setter: Option<Rc<dyn Fn(&AnyCell, Position)>>) -> Self {
        Self { name: name.into(), new_cell, position_setter, body: RefCell::new(Node::Sequence(Vec::new())) }
    }

    pub fn set_body(&self, body: Node) {
        *self.body.borrow_mut() = body;
    }
}

/// One alternative of a union-typed field: a candidate record to try, and
/// how to lift its matched instance into the field's actual (enum) type.
#[derive(Clone)]
pub struct UnionMember {
    pub record: Rc<RecordNode>,
    pub wrap: Rc<dyn Fn(AnyCell) -> AnyCell>,
}

/// A field binding attached to a [`Node::Capture`]: where the value goes and
/// how to recover if the captured element fails to match.
pub struct CaptureTarget {
    pub field_name: String,
    pub apply: ApplyFn,
    pub recovery: Option<crate::recovery::RecoveryStrategy>,
}

#[derive(Clone)]
pub enum Node {
    /// A nested record type: allocates a fresh instance, parses its body
    /// against that instance, and (when wrapped in a `Capture`) yields the
    /// finished instance as a single [`CapturedValue::Nested`].
    Record(Rc<RecordNode>),
    /// An ordered conjunction: every child must match in turn.
    Sequence(Vec<Node>),
    /// Leftmost-first alternation: tries children in order, accepting the
    /// first that matches.
    Disjunction(Vec<Node>),
    /// Binds the values produced by `inner` to one field of the record
    /// currently being built.
    Capture { target: Rc<CaptureTarget>, inner: Box<Node> },
    /// Matches a single token with exactly this text (a quoted literal in
    /// the tag grammar). `kind`, when present (`"text":Ident` syntax),
    /// additionally constrains the token's lexical type; absent, only the
    /// text is compared, since the lexer may tag several distinct literal
    /// texts, e.g. every operator, with one shared rule symbol.
    Literal(String, Option<Symbol>),
    /// Matches a single token of the given kind, any text.
    TokenReference(Symbol),
    /// Zero-or-one: always succeeds; produces `inner`'s values if it
    /// matches, nothing otherwise.
    Optional(Box<Node>),
    /// Zero-or-more (`min == 0`) or one-or-more (`min == 1`) repetitions of
    /// `body`; each iteration's captures are queued independently so
    /// per-iteration field semantics (append, concatenate) compose.
    Repetition { body: Box<Node>, min: usize },
    /// A parenthesized sub-expression; transparent to matching, present so
    /// the EBNF printer can round-trip explicit grouping.
    Group(Box<Node>),
    /// Token-level negation (`!term`): matches exactly one token that would
    /// *not* match `inner`, consuming it.
    Negation(Box<Node>),
    /// Zero-width lookahead assertion (`(?= ...)` / `(?! ...)`): runs
    /// `inner` on a cloned cursor without committing. The positive flavor
    /// succeeds iff `inner` matches; the negative flavor inverts.
    LookaheadGroup { body: Box<Node>, negative: bool },
    /// A user-supplied atomic parser, escaping the built-in grammar.
    Parseable(Rc<dyn Fn(&mut ParseContext) -> ParseableOutcome>),
    /// A field whose grammar is "one of these record types"; tried in
    /// order, leftmost-first.
    Union(Vec<UnionMember>),
}

impl Node {
    pub fn parse(&self, ctx: &mut ParseContext, target: &AnyCell) -> Outcome {
        match self {
            Node::Record(record) => parse_record(record, ctx).map_or(Outcome::NoMatch, |_| Outcome::matched_empty()),
            Node::Sequence(children) => parse_sequence(children, ctx, target),
            Node::Disjunction(alts) => parse_disjunction(alts, ctx, target),
            Node::Capture { target: capture_target, inner } => parse_capture(capture_target, inner, ctx, target),
            Node::Literal(text, kind) => parse_token(*kind, Some(text.as_str()), ctx),
            Node::TokenReference(kind) => parse_token(Some(*kind), None, ctx),
            Node::Optional(inner) => parse_optional(inner, ctx, target),
            Node::Repetition { body, min } => parse_repetition(body, *min, ctx, target),
            Node::Group(inner) => inner.parse(ctx, target),
            Node::Negation(inner) => parse_negation(inner, ctx, target),
            Node::LookaheadGroup { body, negative } => parse_lookahead(body, *negative, ctx, target),
            Node::Parseable(f) => match f(ctx) {
                ParseableOutcome::Matched(cell) => Outcome::Matched(vec![CapturedValue::Nested(cell)]),
                ParseableOutcome::NoMatch => Outcome::NoMatch,
                ParseableOutcome::Err(err) => {
                    ctx.stop(err);
                    Outcome::NoMatch
                }
            },
            Node::Union(members) => parse_union(members, ctx),
        }
    }
}

/// Whether `node` can match while consuming zero tokens. Used by the tag
/// parser to reject a repetition whose body is nullable at compile time
/// (§4.F) instead of only guarding against it at runtime.
///
/// Conservative for constructs whose nullability isn't knowable from the
/// node graph alone — nested records, `Parseable` hooks, and unions are
/// treated as non-nullable rather than risking a false rejection (and, for
/// records, to avoid walking into a self-referential body).
pub fn is_nullable(node: &Node) -> bool {
    match node {
        Node::Record(_) => false,
        Node::Sequence(children) => children.iter().all(is_nullable),
        Node::Disjunction(alts) => alts.iter().any(is_nullable),
        Node::Capture { inner, .. } => is_nullable(inner),
        Node::Literal(..) => false,
        Node::TokenReference(_) => false,
        Node::Optional(_) => true,
        Node::Repetition { min, body } => *min == 0 || is_nullable(body),
        Node::Group(inner) => is_nullable(inner),
        Node::Negation(_) => false,
        Node::LookaheadGroup { .. } => true,
        Node::Parseable(_) => false,
        Node::Union(_) => false,
    }
}

/// Parses a record's body into a freshly allocated cell, returning it on
/// success. Failures are reported on `ctx` via the furthest-error tracker.
fn parse_record(record: &Rc<RecordNode>, ctx: &mut ParseContext) -> Option<AnyCell> {
    let cell = (record.new_cell)();
    if let Some(setter) = &record.position_setter {
        setter(&cell, ctx.cursor().peek(0).position);
    }
    let outcome = record.body.borrow().parse(ctx, &cell);
    match outcome {
        Outcome::Matched(_) => Some(cell),
        Outcome::NoMatch => None,
    }
}

fn parse_sequence(children: &[Node], ctx: &mut ParseContext, target: &AnyCell) -> Outcome {
    let mut branch = ctx.branch();
    let mut values = Vec::new();
    for child in children {
        match child.parse(&mut branch, target) {
            Outcome::Matched(mut v) => values.append(&mut v),
            Outcome::NoMatch => return Outcome::NoMatch,
        }
    }
    ctx.accept(branch);
    Outcome::Matched(values)
}

/// Tries each alternative in turn on a cloned cursor (§4.F, §4.G). An
/// alternative that fails having consumed more than the configured
/// `useLookahead` budget causes the disjunction to commit to it: no further
/// alternatives are tried, even if one of them would have matched. This is
/// what makes `useLookahead` a real precedence knob rather than cosmetic —
/// raising it only ever adds alternatives a grammar is willing to explore,
/// never removes one, so success at a lower setting implies success at any
/// higher one (§8 property 4).
fn parse_disjunction(alts: &[Node], ctx: &mut ParseContext, target: &AnyCell) -> Outcome {
    let start = ctx.cursor().consumed();
    for alt in alts {
        let mut branch = ctx.branch();
        match alt.parse(&mut branch, target) {
            Outcome::Matched(values) => {
                ctx.accept(branch);
                return Outcome::Matched(values);
            }
            Outcome::NoMatch => {
                if branch.cursor().consumed() - start > ctx.lookahead() {
                    return Outcome::NoMatch;
                }
            }
        }
    }
    Outcome::NoMatch
}

fn parse_capture(capture_target: &Rc<CaptureTarget>, inner: &Node, ctx: &mut ParseContext, target: &AnyCell) -> Outcome {
    let mut branch = ctx.branch();
    let outcome = if let Node::Record(record) = inner {
        parse_record(record, &mut branch).map(|cell| vec![CapturedValue::Nested(cell)])
    } else {
        match inner.parse(&mut branch, target) {
            Outcome::Matched(v) => Some(v),
            Outcome::NoMatch => None,
        }
    };

    match outcome {
        Some(values) => {
            ctx.accept(branch);
            ctx.push_binding(PendingBinding::new(target.clone(), Rc::clone(&capture_target.apply), values.clone()));
            Outcome::Matched(values)
        }
        None => {
            if let Some(strategy) = &capture_target.recovery {
                let mut recovered = ctx.branch();
                if strategy.recover(recovered.cursor_mut()) {
                    if let Some(err) = ctx.furthest_error() {
                        ctx.record_recovered(err);
                    }
                    ctx.accept(recovered);
                    return Outcome::matched_empty();
                }
            }
            Outcome::NoMatch
        }
    }
}

fn parse_token(kind: Option<Symbol>, text: Option<&str>, ctx: &mut ParseContext) -> Outcome {
    let tok = ctx.cursor().peek(0);
    let kind_matches = kind.map_or(true, |k| tok.kind == k);
    let text_matches = match text {
        None => true,
        Some(t) if ctx.is_case_insensitive(tok.kind) => tok.text.eq_ignore_ascii_case(t),
        Some(t) => tok.text.as_ref() == t,
    };
    if kind_matches && text_matches {
        ctx.cursor_mut().next();
        let tok = if ctx.should_unquote(tok.kind) {
            crate::position::Token::new(tok.kind, crate::position::unquote(&tok.text), tok.position)
        } else {
            tok
        };
        Outcome::Matched(vec![CapturedValue::Token(tok)])
    } else {
        let expected = match text {
            Some(t) => format!("{t:?}"),
            None => format!("token of kind {}", kind.unwrap_or_default()),
        };
        ctx.stop(ParseError::UnexpectedToken { expected, found: tok.text.to_string(), position: tok.position.clone() });
        Outcome::NoMatch
    }
}

fn parse_optional(inner: &Node, ctx: &mut ParseContext, target: &AnyCell) -> Outcome {
    let mut branch = ctx.branch();
    match inner.parse(&mut branch, target) {
        Outcome::Matched(values) => {
            ctx.accept(branch);
            Outcome::Matched(values)
        }
        Outcome::NoMatch => Outcome::matched_empty(),
    }
}

fn parse_repetition(body: &Node, min: usize, ctx: &mut ParseContext, target: &AnyCell) -> Outcome {
    let mut count = 0usize;
    let mut values = Vec::new();
    loop {
        let before = ctx.cursor().consumed();
        let mut branch = ctx.branch();
        match body.parse(&mut branch, target) {
            Outcome::Matched(mut v) => {
                let made_progress = branch.cursor().consumed() != before;
                ctx.accept(branch);
                values.append(&mut v);
                count += 1;
                if !made_progress {
                    // Zero-length iteration: stop to avoid looping forever.
                    // Compile-time validation rejects grammars where this is
                    // reachable, but guard defensively at runtime too.
                    break;
                }
            }
            Outcome::NoMatch => break,
        }
    }
    if count >= min {
        Outcome::Matched(values)
    } else {
        Outcome::NoMatch
    }
}

fn parse_negation(inner: &Node, ctx: &mut ParseContext, target: &AnyCell) -> Outcome {
    let mut branch = ctx.branch();
    match inner.parse(&mut branch, target) {
        Outcome::Matched(_) => Outcome::NoMatch,
        Outcome::NoMatch => {
            let tok = ctx.cursor().peek(0);
            if tok.is_eof() {
                return Outcome::NoMatch;
            }
            ctx.cursor_mut().next();
            Outcome::Matched(vec![CapturedValue::Token(tok)])
        }
    }
}

/// Caps how many tokens a lookahead assertion's trial parse may consume
/// before it is treated as a failure, bounding the cost of a pathological
/// `(?= ...)` / `(?! ...)` grammar (§9 design notes).
const LOOKAHEAD_ASSERTION_BUDGET: usize = 4096;

fn parse_lookahead(body: &Node, negative: bool, ctx: &mut ParseContext, target: &AnyCell) -> Outcome {
    let mut branch = ctx.branch_with_lookahead_budget(LOOKAHEAD_ASSERTION_BUDGET);
    let matched = matches!(body.parse(&mut branch, target), Outcome::Matched(_));
    if matched != negative {
        Outcome::matched_empty()
    } else {
        Outcome::NoMatch
    }
}

fn parse_union(members: &[UnionMember], ctx: &mut ParseContext) -> Outcome {
    let start = ctx.cursor().consumed();
    for member in members {
        let mut branch = ctx.branch();
        if let Some(cell) = parse_record(&member.record, &mut branch) {
            if branch.cursor().consumed() <= start {
                // Matched without consuming input: §4.E requires a union
                // member to consume at least one token to win, so a member
                // built entirely from optional/capture-less fields must not
                // be allowed to claim a prefix it never actually matched.
                continue;
            }
            ctx.accept(branch);
            let wrapped = (member.wrap)(cell);
            return Outcome::Matched(vec![CapturedValue::Nested(wrapped)]);
        }
    }
    Outcome::NoMatch
}
