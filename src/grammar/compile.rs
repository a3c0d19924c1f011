//! Grammar compiler (spec component F/§9): turns a [`Grammar`] type's
//! [`RecordSpec`] into a [`RecordNode`] graph, recursively compiling nested
//! record/union fields and caching by [`TypeId`] so self-referential and
//! shared-substructure grammars terminate and are only built once.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub use crate::bind::Grammar;
use crate::bind::{new_any_cell, into_apply_fn, FieldSlot};
use crate::error::CompileError;
use crate::position::SymbolTable;
use crate::tag::{compile_field, FieldCtx, Nested};

use super::left_recursion;
use super::node::{Node, RecordNode};

/// Compiles [`Grammar`] types into node graphs, sharing one [`SymbolTable`]
/// and a per-type cache across the whole compilation.
pub struct GrammarCompiler {
    symbols: SymbolTable,
    cache: RefCell<HashMap<TypeId, Rc<RecordNode>>>,
}

impl GrammarCompiler {
    pub fn new(symbols: SymbolTable) -> Self {
        Self { symbols, cache: RefCell::new(HashMap::new()) }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Compiles `T`, returning the cached graph if `T` was already compiled
    /// (or is still being compiled — this is what makes self-referential
    /// grammars like a binary-expression tree possible: the placeholder is
    /// cached before its own body is built, so a recursive reference picks
    /// up the same `Rc` and only has its body filled in once).
    pub fn compile<T: Grammar>(&self) -> Result<Rc<RecordNode>, CompileError> {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.cache.borrow().get(&type_id) {
            return Ok(Rc::clone(existing));
        }

        let position_setter = T::spec()
            .fields
            .iter()
            .any(|f| matches!(f.slot, FieldSlot::Position(_)))
            .then(|| position_setter_for::<T>());

        let record = Rc::new(RecordNode::placeholder(
            std::any::type_name::<T>(),
            Rc::new(|| new_any_cell(T::default())),
            position_setter,
        ));
        self.cache.borrow_mut().insert(type_id, Rc::clone(&record));

        let spec = T::spec();
        let mut field_nodes = Vec::with_capacity(spec.fields.len());
        for field in spec.fields {
            let rejects_multi = field.slot.rejects_multi_value_capture();
            let field_name = field.name;
            let nested = match field.slot.compile_nested(self) {
                Some(result) => Some(Nested::Node(result?)),
                None => None,
            };
            let apply = into_apply_fn(Rc::new(field.slot));
            let fctx = FieldCtx { field_name, symbols: &self.symbols, nested, apply, recovery: field.recovery };
            let node = compile_field(field.tag, &fctx)?;
            if rejects_multi && contains_repeated_capture(&node, field_name, false) {
                return Err(CompileError::AmbiguousScalarPointerCapture { field: field_name.to_string() });
            }
            field_nodes.push(node);
        }
        record.set_body(Node::Sequence(field_nodes));

        left_recursion::check(&record)?;
        Ok(record)
    }
}

/// Walks a freshly compiled field node looking for a capture of `field_name`
/// nested inside a [`Node::Repetition`] — the ambiguous-scalar-pointer-
/// capture case §9's open question says must be a compile error rather than
/// a silent first-or-last-wins choice.
fn contains_repeated_capture(node: &Node, field_name: &str, in_repetition: bool) -> bool {
    match node {
        Node::Record(_) => false,
        Node::Sequence(children) => children.iter().any(|c| contains_repeated_capture(c, field_name, in_repetition)),
        Node::Disjunction(alts) => alts.iter().any(|c| contains_repeated_capture(c, field_name, in_repetition)),
        Node::Capture { target, inner } => {
            (in_repetition && target.field_name == field_name) || contains_repeated_capture(inner, field_name, in_repetition)
        }
        Node::Optional(inner) => contains_repeated_capture(inner, field_name, in_repetition),
        Node::Repetition { body, .. } => contains_repeated_capture(body, field_name, true),
        Node::Group(inner) => contains_repeated_capture(inner, field_name, in_repetition),
        Node::Negation(inner) => contains_repeated_capture(inner, field_name, in_repetition),
        Node::LookaheadGroup { body, .. } => contains_repeated_capture(body, field_name, in_repetition),
        Node::Literal(..) | Node::TokenReference(_) | Node::Parseable(_) | Node::Union(_) => false,
    }
}

fn position_setter_for<T: Grammar>() -> Rc<dyn Fn(&crate::bind::AnyCell, crate::position::Position)> {
    let get = T::spec()
        .fields
        .into_iter()
        .find_map(|f| match f.slot {
            FieldSlot::Position(get) => Some(get),
            _ => None,
        })
        .expect("checked by caller: at least one Position field exists");
    Rc::new(move |cell, position| {
        let mut guard = cell.borrow_mut();
        let target = guard.downcast_mut::<T>().expect("record cell type matches T (grammar wiring bug)");
        *get(target) = position;
    })
}
