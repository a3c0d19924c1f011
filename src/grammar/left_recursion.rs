//! Static left-recursion detection (§4.F / §9 open question resolution).
//!
//! Walks the leftmost-descent children of a record's body and rejects any
//! cycle back to a record already on the current path, since the
//! recursive-descent engine has no mechanism to make progress in that case
//! (it would recurse until the stack overflows instead of failing cleanly).

use std::rc::Rc;

use super::node::{is_nullable, Node, RecordNode};
use crate::error::CompileError;

/// Checks `root` (and every record transitively reachable from it) for left
/// recursion, returning the first cycle found.
pub fn check(root: &Rc<RecordNode>) -> Result<(), CompileError> {
    let mut path: Vec<*const RecordNode> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    walk_record(root, &mut path, &mut names)
}

fn walk_record(record: &Rc<RecordNode>, path: &mut Vec<*const RecordNode>, names: &mut Vec<String>) -> Result<(), CompileError> {
    let ptr = Rc::as_ptr(record);
    if path.contains(&ptr) {
        names.push(record.name.clone());
        return Err(CompileError::LeftRecursion { record: record.name.clone(), rendering: names.join(" -> ") });
    }
    path.push(ptr);
    names.push(record.name.clone());
    let result = walk_node(&record.body.borrow(), path, names);
    path.pop();
    names.pop();
    result
}

fn walk_node(node: &Node, path: &mut Vec<*const RecordNode>, names: &mut Vec<String>) -> Result<(), CompileError> {
    match node {
        Node::Record(record) => walk_record(record, path, names),
        // A later element is just as "leftmost" as the first whenever every
        // element before it is nullable (can match without consuming a
        // token), so the walk must keep descending past a nullable prefix
        // instead of stopping at the literal first child.
        Node::Sequence(children) => {
            for child in children {
                walk_node(child, path, names)?;
                if !is_nullable(child) {
                    break;
                }
            }
            Ok(())
        }
        Node::Disjunction(alts) => {
            for alt in alts {
                walk_node(alt, path, names)?;
            }
            Ok(())
        }
        Node::Capture { inner, .. } => walk_node(inner, path, names),
        Node::Optional(inner) => walk_node(inner, path, names),
        Node::Repetition { body, .. } => walk_node(body, path, names),
        Node::Group(inner) => walk_node(inner, path, names),
        Node::Union(members) => {
            for member in members {
                walk_record(&member.record, path, names)?;
            }
            Ok(())
        }
        // Negation and lookahead consult but never commit to consuming
        // input at this position, and leaf nodes either consume a token or
        // escape to user code: neither continues the leftmost-descent walk.
        Node::Negation(_) | Node::LookaheadGroup { .. } | Node::Literal(..) | Node::TokenReference(_) | Node::Parseable(_) => Ok(()),
    }
}

#[cfg(test)]
mod left_recursion_tests {
    use super::*;
    use crate::bind::new_any_cell;
    use crate::position::IDENT;

    fn leaf_record(name: &str) -> Rc<RecordNode> {
        let r = Rc::new(RecordNode::placeholder(name, Rc::new(|| new_any_cell(())), None));
        r.set_body(Node::TokenReference(IDENT));
        r
    }

    #[test]
    fn accepts_non_recursive_grammar() {
        let root = leaf_record("Root");
        assert!(check(&root).is_ok());
    }

    #[test]
    fn rejects_direct_left_recursion() {
        let root = Rc::new(RecordNode::placeholder("Expr", Rc::new(|| new_any_cell(())), None));
        let self_ref = Rc::clone(&root);
        root.set_body(Node::Sequence(vec![Node::Record(self_ref), Node::TokenReference(IDENT)]));
        assert!(matches!(check(&root), Err(CompileError::LeftRecursion { .. })));
    }

    #[test]
    fn rejects_left_recursion_through_a_nullable_prefix() {
        // `[Ws] Expr` is left-recursive through its second element: `Ws` is
        // optional, so `Expr` is still the effective leftmost position.
        let root = Rc::new(RecordNode::placeholder("Expr", Rc::new(|| new_any_cell(())), None));
        let self_ref = Rc::clone(&root);
        root.set_body(Node::Sequence(vec![Node::Optional(Box::new(Node::TokenReference(IDENT))), Node::Record(self_ref)]));
        assert!(matches!(check(&root), Err(CompileError::LeftRecursion { .. })));
    }

    #[test]
    fn right_recursion_is_fine() {
        let root = Rc::new(RecordNode::placeholder("Expr", Rc::new(|| new_any_cell(())), None));
        let self_ref = Rc::clone(&root);
        root.set_body(Node::Sequence(vec![Node::TokenReference(IDENT), Node::Optional(Box::new(Node::Record(self_ref)))]));
        assert!(check(&root).is_ok());
    }
}
