//! Structural merge of per-source trees.
//!
//! Sources are listed highest precedence first. Maps merge key by key, every
//! other defined value from a higher-precedence source replaces the lower one
//! whole (lists are never concatenated).

use stillwater::Validation;

use crate::error::ConfigValidation;
use crate::node::Node;

/// Merge two trees, `a` taking precedence over `b`.
///
/// - `Undefined` on either side yields the other side.
/// - An explicit null in `a` acts as a placeholder and yields a defined `b`.
/// - Two maps merge recursively over the union of keys; the own value is
///   merged the same way and the result keeps `a`'s position and path.
/// - A map in `a` facing a scalar in `b` adopts the scalar as its own value
///   when it has none.
/// - Otherwise `a` wins outright.
pub fn merge(a: Node, b: Node) -> Node {
    match (a, b) {
        (Node::Undefined, b) => b,
        (a, Node::Undefined) => a,
        (Node::Null { .. }, b) if !b.is_null() => b,
        (
            Node::Map {
                entries: mut ea,
                value: va,
                info,
            },
            Node::Map {
                entries: eb,
                value: vb,
                ..
            },
        ) => {
            for (key, child_b) in eb {
                let merged = match ea.remove(&key) {
                    Some(child_a) => merge(child_a, child_b),
                    None => child_b,
                };
                ea.insert(key, merged);
            }
            Node::Map {
                entries: ea,
                value: Box::new(merge(*va, *vb)),
                info,
            }
        }
        (
            Node::Map {
                entries,
                value,
                info,
            },
            b,
        ) if !value.is_defined() && !b.is_null() && !matches!(b, Node::List { .. }) => Node::Map {
            entries,
            value: Box::new(b),
            info,
        },
        (a, _) => a,
    }
}

/// Fold every source result into one tree.
///
/// Failures from all sources are accumulated; if any source failed, no merge
/// happens. Optional sources that were absent contribute `Undefined` and are
/// absorbed by the fold. With no defined input the result is `Undefined`.
pub fn merge_all(results: Vec<ConfigValidation<Node>>) -> ConfigValidation<Node> {
    match Validation::all_vec(results) {
        Validation::Success(nodes) => {
            Validation::Success(nodes.into_iter().fold(Node::Undefined, merge))
        }
        Validation::Failure(errors) => Validation::Failure(errors),
    }
}
