//! Field binding and value coercion (spec component H), plus the public
//! `Grammar` / `Parseable` / `Capture` traits that user record types
//! implement (spec §6).
//!
//! Rust has no runtime struct-field reflection, so "a user-defined record
//! type annotated with EBNF-like fragments" is expressed here as a record
//! type implementing [`Grammar`], whose [`Grammar::spec`] returns a
//! [`RecordSpec`] describing each field's tag string and how matched values
//! are written into it. This is the "purely data-driven interpreter using
//! dynamic descriptors" option the design notes sanction as an alternative
//! to a procedural macro.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::position::{Position, Token};
use crate::recovery::RecoveryStrategy;

/// A type-erased, reference-counted cell holding one in-progress record
/// instance. Exactly one strong reference exists from the moment a
/// [`crate::grammar::node::Node::Record`] begins parsing until the deferred
/// binding that installs it into its parent's field runs at `apply()` time,
/// at which point it is unwrapped and downcast back to its concrete type.
pub type AnyCell = Rc<RefCell<Box<dyn Any>>>;

pub fn new_any_cell<T: Any>(value: T) -> AnyCell {
    Rc::new(RefCell::new(Box::new(value)))
}

/// Downcasts `cell` back to its concrete record type, runs `f`, and
/// reboxes the result as a fresh cell. Used to lift one member of a
/// [`crate::grammar::node::Node::Union`] into the enum type the field
/// actually holds.
pub fn rewrap<R: Any, W: Any>(cell: AnyCell, f: impl FnOnce(R) -> W) -> AnyCell {
    new_any_cell(f(unwrap_cell::<R>(cell)))
}

pub(crate) fn unwrap_cell<R: Any>(cell: AnyCell) -> R {
    let boxed = Rc::try_unwrap(cell)
        .ok()
        .expect("capture cell has outstanding references at apply time (grammar wiring bug)")
        .into_inner();
    *boxed
        .downcast::<R>()
        .ok()
        .expect("capture cell type does not match field type (grammar wiring bug)")
}

/// One value produced by a grammar node for its enclosing capture: either a
/// raw matched token, or a fully-parsed nested record/union member/
/// [`Parseable`] result.
#[derive(Clone)]
pub enum CapturedValue {
    Token(Token),
    Nested(AnyCell),
}

impl CapturedValue {
    fn as_token(&self) -> Option<&Token> {
        match self {
            CapturedValue::Token(t) => Some(t),
            CapturedValue::Nested(_) => None,
        }
    }
}

/// Parses a numeric literal, recognizing `0x`/`0b`/`0o` prefixes for
/// integers, base 10 otherwise.
fn parse_int_literal(text: &str) -> Option<i64> {
    let t = text.trim();
    let (neg, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t),
    };
    let value = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = t.strip_prefix("0b").or_else(|| t.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()
    } else if let Some(oct) = t.strip_prefix("0o").or_else(|| t.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).ok()
    } else {
        t.parse::<i64>().ok()
    }?;
    Some(if neg { -value } else { value })
}

/// A record or pointer/optional field's binding: how to obtain a fresh
/// nested instance and how to install the finished one into the parent.
type CompileNestedFn = Rc<dyn Fn(&crate::grammar::compile::GrammarCompiler) -> Result<crate::grammar::node::Node, crate::error::CompileError>>;

pub enum RecordSlotKind<T> {
    One { assign: Rc<dyn Fn(&mut T, AnyCell)>, compile_nested: CompileNestedFn },
    Vec { append: Rc<dyn Fn(&mut T, AnyCell)>, compile_nested: CompileNestedFn },
}

/// How a captured value is written into one field of `T` (spec §4.H).
pub enum FieldSlot<T> {
    String(fn(&mut T) -> &mut String),
    StringVec(fn(&mut T) -> &mut Vec<String>),
    Bool(fn(&mut T) -> &mut bool),
    Int(fn(&mut T) -> &mut i64),
    IntVec(fn(&mut T) -> &mut Vec<i64>),
    Float(fn(&mut T) -> &mut f64),
    Position(fn(&mut T) -> &mut Position),
    Record(RecordSlotKind<T>),
    Custom(Rc<dyn Fn(&mut T, &[Token])>),
}

impl<T: 'static> FieldSlot<T> {
    pub fn string(get: fn(&mut T) -> &mut String) -> Self {
        FieldSlot::String(get)
    }

    pub fn string_vec(get: fn(&mut T) -> &mut Vec<String>) -> Self {
        FieldSlot::StringVec(get)
    }

    pub fn bool_flag(get: fn(&mut T) -> &mut bool) -> Self {
        FieldSlot::Bool(get)
    }

    pub fn int(get: fn(&mut T) -> &mut i64) -> Self {
        FieldSlot::Int(get)
    }

    pub fn int_vec(get: fn(&mut T) -> &mut Vec<i64>) -> Self {
        FieldSlot::IntVec(get)
    }

    pub fn float(get: fn(&mut T) -> &mut f64) -> Self {
        FieldSlot::Float(get)
    }

    pub fn position(get: fn(&mut T) -> &mut Position) -> Self {
        FieldSlot::Position(get)
    }

    pub fn record<R: Grammar>(get: fn(&mut T) -> &mut R) -> Self {
        FieldSlot::Record(RecordSlotKind::One {
            assign: Rc::new(move |t, cell| *get(t) = unwrap_cell::<R>(cell)),
            compile_nested: Rc::new(|compiler| compiler.compile::<R>().map(crate::grammar::node::Node::Record)),
        })
    }

    pub fn option_record<R: Grammar>(get: fn(&mut T) -> &mut Option<R>) -> Self {
        FieldSlot::Record(RecordSlotKind::One {
            assign: Rc::new(move |t, cell| *get(t) = Some(unwrap_cell::<R>(cell))),
            compile_nested: Rc::new(|compiler| compiler.compile::<R>().map(crate::grammar::node::Node::Record)),
        })
    }

    pub fn record_vec<R: Grammar>(get: fn(&mut T) -> &mut Vec<R>) -> Self {
        FieldSlot::Record(RecordSlotKind::Vec {
            append: Rc::new(move |t, cell| get(t).push(unwrap_cell::<R>(cell))),
            compile_nested: Rc::new(|compiler| compiler.compile::<R>().map(crate::grammar::node::Node::Record)),
        })
    }

    /// A field whose grammar is "one of several record types" (§4.F
    /// `Union`); each case's record is tried in order and the first match
    /// is lifted into `W` via its `wrap` function.
    pub fn union<W: Grammar>(get: fn(&mut T) -> &mut W, cases: Vec<UnionCase<W>>) -> Self {
        let cases = Rc::new(cases);
        FieldSlot::Record(RecordSlotKind::One {
            assign: Rc::new(move |t, cell| *get(t) = unwrap_cell::<W>(cell)),
            compile_nested: Rc::new(move |compiler| {
                let members = cases.iter().map(|c| (c.compile)(compiler)).collect::<Result<Vec<_>, _>>()?;
                Ok(crate::grammar::node::Node::Union(members))
            }),
        })
    }

    /// A field whose type implements [`Capture`]; raw matched token texts
    /// are forwarded to its `capture` hook.
    pub fn capture_hook<F: Capture>(get: fn(&mut T) -> &mut F) -> Self {
        FieldSlot::Custom(Rc::new(move |t, toks| get(t).capture(toks)))
    }

    /// A field whose type implements [`Parseable`]; the node graph calls
    /// straight into `R::parse_atom` instead of descending through a
    /// compiled grammar (the escape hatch of §4.F/§6).
    pub fn parseable<R: Parseable>(get: fn(&mut T) -> &mut R) -> Self {
        FieldSlot::Record(RecordSlotKind::One {
            assign: Rc::new(move |t, cell| *get(t) = unwrap_cell::<R>(cell)),
            compile_nested: Rc::new(|_compiler| {
                let f: Rc<dyn Fn(&mut crate::context::ParseContext) -> ParseableOutcome> = Rc::new(|ctx| {
                    match R::parse_atom(ctx.cursor_mut()) {
                        ParseableResult::Matched(value) => ParseableOutcome::Matched(new_any_cell(value)),
                        ParseableResult::NoMatch => ParseableOutcome::NoMatch,
                        ParseableResult::Err(err) => ParseableOutcome::Err(err),
                    }
                });
                Ok(crate::grammar::node::Node::Parseable(f))
            }),
        })
    }

    /// Applies one capture's produced values to `target`. Called once per
    /// successful capture execution (so a field captured inside a
    /// repetition is applied once per iteration, which is what makes
    /// append/concatenate/increment semantics compose correctly).
    pub fn apply(&self, target: &mut T, values: Vec<CapturedValue>) {
        match self {
            FieldSlot::String(get) => {
                let field = get(target);
                for v in &values {
                    if let Some(tok) = v.as_token() {
                        field.push_str(&tok.text);
                    }
                }
            }
            FieldSlot::StringVec(get) => {
                let field = get(target);
                for v in &values {
                    if let Some(tok) = v.as_token() {
                        field.push(tok.text.to_string());
                    }
                }
            }
            FieldSlot::Bool(get) => {
                if !values.is_empty() {
                    *get(target) = true;
                }
            }
            FieldSlot::Int(get) => {
                let field = get(target);
                for v in &values {
                    if let Some(tok) = v.as_token() {
                        match parse_int_literal(&tok.text) {
                            Some(n) => *field = n,
                            None => *field += 1,
                        }
                    }
                }
            }
            FieldSlot::IntVec(get) => {
                let field = get(target);
                for v in &values {
                    if let Some(tok) = v.as_token() {
                        field.push(parse_int_literal(&tok.text).unwrap_or(1));
                    }
                }
            }
            FieldSlot::Float(get) => {
                let field = get(target);
                for v in &values {
                    if let Some(tok) = v.as_token() {
                        match tok.text.trim().parse::<f64>() {
                            Ok(n) => *field = n,
                            Err(_) => *field += 1.0,
                        }
                    }
                }
            }
            FieldSlot::Position(_) => {
                // Positions are injected directly by the record node before
                // its body runs (see grammar::compile); they are never the
                // target of a capture.
            }
            FieldSlot::Record(kind) => {
                if let Some(CapturedValue::Nested(cell)) = values.into_iter().find(|v| matches!(v, CapturedValue::Nested(_))) {
                    match kind {
                        RecordSlotKind::One { assign, .. } => assign(target, cell),
                        RecordSlotKind::Vec { append, .. } => append(target, cell),
                    }
                }
            }
            FieldSlot::Custom(f) => {
                let tokens: Vec<Token> = values.iter().filter_map(|v| v.as_token().cloned()).collect();
                f(target, &tokens);
            }
        }
    }

    /// True for fields where a multi-valued capture is ambiguous and must
    /// be rejected at compile time (§9 open question): non-string scalar
    /// pointer/optional targets.
    pub fn rejects_multi_value_capture(&self) -> bool {
        matches!(self, FieldSlot::Record(RecordSlotKind::One { .. }))
    }

    /// Compiles the nested grammar a bare `@@` in this field's tag expands
    /// to, for record/pointer/vec-of-record fields. `None` for scalar and
    /// custom fields, which have no nested grammar to substitute.
    pub fn compile_nested(
        &self,
        compiler: &crate::grammar::compile::GrammarCompiler,
    ) -> Option<Result<crate::grammar::node::Node, crate::error::CompileError>> {
        match self {
            FieldSlot::Record(RecordSlotKind::One { compile_nested, .. }) => Some(compile_nested(compiler)),
            FieldSlot::Record(RecordSlotKind::Vec { compile_nested, .. }) => Some(compile_nested(compiler)),
            _ => None,
        }
    }
}

/// One field of a record type's grammar: its name, its EBNF-variant tag
/// string, how captured values bind into it, and an optional recovery
/// strategy (§7).
pub struct FieldSpec<T> {
    pub name: &'static str,
    pub tag: &'static str,
    pub slot: FieldSlot<T>,
    pub recovery: Option<RecoveryStrategy>,
}

impl<T> FieldSpec<T> {
    pub fn new(name: &'static str, tag: &'static str, slot: FieldSlot<T>) -> Self {
        Self { name, tag, slot, recovery: None }
    }

    pub fn recover(mut self, strategy: RecoveryStrategy) -> Self {
        self.recovery = Some(strategy);
        self
    }
}

/// The full grammar of a record type: its ordered fields.
pub struct RecordSpec<T> {
    pub fields: Vec<FieldSpec<T>>,
}

impl<T> Default for RecordSpec<T> {
    fn default() -> Self {
        Self { fields: Vec::new() }
    }
}

impl<T> RecordSpec<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec<T>) -> Self {
        self.fields.push(spec);
        self
    }
}

/// A user record type that can be the target of a parse. Implemented by
/// every type reachable through `@@`, through a record field, or as the
/// top-level target of [`crate::Parser::build`].
pub trait Grammar: Any + Default + 'static {
    fn spec() -> RecordSpec<Self>
    where
        Self: Sized;
}

/// Outcome of an atomic [`Parseable`] leaf parse.
pub enum ParseableResult<T> {
    Matched(T),
    NoMatch,
    Err(crate::error::ParseError),
}

/// A user-provided atomic parser used as an escape-hatch grammar leaf.
pub trait Parseable: Any + Sized + 'static {
    fn parse_atom(cursor: &mut crate::lexer::PeekingLexer) -> ParseableResult<Self>;
}

/// Outcome of invoking a [`crate::grammar::node::Node::Parseable`] hook,
/// mirroring [`ParseableResult`] but type-erased into an [`AnyCell`] the way
/// every other nested-record match reports its result.
pub enum ParseableOutcome {
    Matched(AnyCell),
    NoMatch,
    Err(crate::error::ParseError),
}

/// A field type that receives raw matched token text directly, bypassing
/// the string/numeric/boolean coercion rules.
pub trait Capture: 'static {
    fn capture(&mut self, tokens: &[Token]);
}

/// One candidate of a [`FieldSlot::union`] field: a record type `R` to try,
/// and how to lift a match into the field's actual enum type `W`.
pub struct UnionCase<W> {
    compile: Rc<dyn Fn(&crate::grammar::compile::GrammarCompiler) -> Result<crate::grammar::node::UnionMember, crate::error::CompileError>>,
    _marker: std::marker::PhantomData<W>,
}

impl<W: Any> UnionCase<W> {
    pub fn new<R: Grammar>(wrap: fn(R) -> W) -> Self {
        Self {
            compile: Rc::new(move |compiler| {
                let record = compiler.compile::<R>()?;
                Ok(crate::grammar::node::UnionMember { record, wrap: Rc::new(move |cell| rewrap(cell, wrap)) })
            }),
            _marker: std::marker::PhantomData,
        }
    }
}

/// A type-erased, precompiled "write these values into that field" step,
/// shared by every [`crate::grammar::node::Node::Capture`] that targets the
/// same field, and invoked once per committed capture at `apply()` time.
pub type ApplyFn = Rc<dyn Fn(&AnyCell, Vec<CapturedValue>)>;

/// Closes a [`FieldSlot<T>`] over its record type, producing a type-erased
/// apply step that downcasts the record cell back to `T` before writing.
pub fn into_apply_fn<T: Any>(slot: Rc<FieldSlot<T>>) -> ApplyFn {
    Rc::new(move |cell, values| {
        let mut guard = cell.borrow_mut();
        let target = guard
            .downcast_mut::<T>()
            .expect("capture target type does not match record cell (grammar wiring bug)");
        slot.apply(target, values);
    })
}

#[cfg(test)]
mod bind_tests {
    use super::*;

    #[derive(Default)]
    struct Inner {
        text: String,
    }

    impl Grammar for Inner {
        fn spec() -> RecordSpec<Self> {
            RecordSpec::new().field(FieldSpec::new("Text", "@Ident", FieldSlot::string(|i| &mut i.text)))
        }
    }

    #[derive(Default)]
    struct Outer {
        name: String,
        count: i64,
        flag: bool,
        items: Vec<String>,
        inner: Inner,
    }

    fn tok(text: &str) -> Token {
        Token::new(crate::position::IDENT, text, Position::start_of("t"))
    }

    #[test]
    fn string_concatenates_across_values() {
        let slot = FieldSlot::<Outer>::string(|o| &mut o.name);
        let mut o = Outer::default();
        slot.apply(&mut o, vec![CapturedValue::Token(tok("foo")), CapturedValue::Token(tok("bar"))]);
        assert_eq!(o.name, "foobar");
    }

    #[test]
    fn numeric_parses_or_increments() {
        let slot = FieldSlot::<Outer>::int(|o| &mut o.count);
        let mut o = Outer::default();
        slot.apply(&mut o, vec![CapturedValue::Token(tok("41"))]);
        assert_eq!(o.count, 41);
        slot.apply(&mut o, vec![CapturedValue::Token(tok("not-a-number"))]);
        assert_eq!(o.count, 42);
    }

    #[test]
    fn hex_and_hyphen_literals_parse() {
        let slot = FieldSlot::<Outer>::int(|o| &mut o.count);
        let mut o = Outer::default();
        slot.apply(&mut o, vec![CapturedValue::Token(tok("0x2A"))]);
        assert_eq!(o.count, 42);
    }

    #[test]
    fn bool_set_true_on_any_match() {
        let slot = FieldSlot::<Outer>::bool_flag(|o| &mut o.flag);
        let mut o = Outer::default();
        assert!(!o.flag);
        slot.apply(&mut o, vec![CapturedValue::Token(tok("public"))]);
        assert!(o.flag);
    }

    #[test]
    fn vec_appends_each_token() {
        let slot = FieldSlot::<Outer>::string_vec(|o| &mut o.items);
        let mut o = Outer::default();
        slot.apply(&mut o, vec![CapturedValue::Token(tok("a"))]);
        slot.apply(&mut o, vec![CapturedValue::Token(tok("b"))]);
        assert_eq!(o.items, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn nested_record_assigns_once_unwrapped() {
        let slot = FieldSlot::<Outer>::record(|o: &mut Outer| &mut o.inner);
        let cell = new_any_cell(Inner { text: "hi".into() });
        let mut o = Outer::default();
        slot.apply(&mut o, vec![CapturedValue::Nested(cell)]);
        assert_eq!(o.inner.text, "hi");
    }
}
