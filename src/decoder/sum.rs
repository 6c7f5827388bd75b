//! Sum types: enums whose variants carry data.
//!
//! Output uses serde's externally tagged form: `"Unit"`, `{"Newtype": v}`,
//! `{"Struct": {...}}`.

use std::collections::BTreeMap;

use serde_json::Value;
use stillwater::Validation;

use super::record::{decode_record, find_field};
use super::{mismatch, Decoder, DecoderContext};
use crate::describe::{RecordDesc, SumDesc, TypeDesc, VariantDesc, VariantShape};
use crate::error::{ConfigError, ConfigValidation, ConfigValidationExt};
use crate::node::{DotPath, Node};

pub struct SumDecoder;

impl Decoder for SumDecoder {
    fn name(&self) -> &str {
        "sum"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::Sum(_))
    }

    fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath, ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        let TypeDesc::Sum(sum) = desc else {
            return ConfigValidation::fail_with(mismatch(node, desc, path, "not a sum type"));
        };
        if let Some(key) = sum.discriminator.as_deref() {
            return decode_tagged(sum, key, node, path, ctx);
        }
        // A builder-wide discriminator only applies where the key is present.
        if let Some(key) = ctx.discriminator {
            if let Node::Map { entries, .. } = node {
                if entries.get(key).is_some_and(Node::is_defined) {
                    return decode_tagged(sum, key, node, path, ctx);
                }
            }
        }

        match node {
            Node::String { value, .. } => match find_unit(sum, value) {
                Some(variant) => Validation::Success(Value::String(variant.name.clone())),
                None => no_match(sum, node, path, format!("'{}' is not a unit variant", value)),
            },
            Node::Map { entries, .. } => {
                if let Some((name, child)) = single_entry(entries) {
                    if let Some(variant) = sum.find(name) {
                        return decode_variant(variant, child, &path.child(name.clone()), ctx);
                    }
                }
                decode_structural(sum, entries, node, path, ctx)
            }
            other => no_match(sum, other, path, format!("cannot select a variant from a {}", other.type_name())),
        }
    }
}

fn find_unit<'s>(sum: &'s SumDesc, name: &str) -> Option<&'s VariantDesc> {
    let units = || sum.variants.iter().filter(|v| matches!(v.shape, VariantShape::Unit));
    let name = name.trim();
    units()
        .find(|v| v.name == name)
        .or_else(|| units().find(|v| v.name.eq_ignore_ascii_case(name)))
}

fn single_entry(entries: &BTreeMap<String, Node>) -> Option<(&String, &Node)> {
    let mut defined = entries.iter().filter(|(_, n)| n.is_defined());
    match (defined.next(), defined.next()) {
        (Some(entry), None) => Some(entry),
        _ => None,
    }
}

fn no_match(sum: &SumDesc, node: &Node, path: &DotPath, message: String) -> ConfigValidation<Value> {
    ConfigValidation::fail_with(ConfigError::NoMatchingVariant {
        path: path.to_string(),
        type_name: sum.name.clone(),
        tried: sum.variant_names(),
        source_location: node.pos().cloned(),
        message,
    })
}

fn tagged(name: &str, value: Value) -> Value {
    let mut object = serde_json::Map::new();
    object.insert(name.to_string(), value);
    Value::Object(object)
}

fn decode_variant(
    variant: &VariantDesc,
    node: &Node,
    path: &DotPath,
    ctx: &DecoderContext<'_>,
) -> ConfigValidation<Value> {
    match &variant.shape {
        VariantShape::Unit => Validation::Success(Value::String(variant.name.clone())),
        VariantShape::Newtype(inner) => ctx
            .decode(node, inner, path)
            .map(|value| tagged(&variant.name, value)),
        VariantShape::Struct(record) => decode_record(record, node, path, ctx)
            .map(|value| tagged(&variant.name, value)),
    }
}

/// The discriminator key is mandatory, matched exactly and never normalised.
fn decode_tagged(
    sum: &SumDesc,
    key: &str,
    node: &Node,
    path: &DotPath,
    ctx: &DecoderContext<'_>,
) -> ConfigValidation<Value> {
    let Node::Map { entries, value, info } = node else {
        return no_match(sum, node, path, format!("expected a map with a '{}' key", key));
    };
    let tag_node = entries.get(key).filter(|n| n.is_defined());
    let Some(tag) = tag_node.and_then(Node::scalar_text) else {
        return ConfigValidation::fail_with(ConfigError::MissingValue {
            path: path.child(key).to_string(),
            expected_type: format!("{} discriminator", sum.name),
            searched_keys: vec![key.to_string()],
            source_location: node.pos().cloned(),
        });
    };
    ctx.reporter.mark_used(&path.child(key));

    let Some(variant) = sum.find(tag.trim()) else {
        return no_match(
            sum,
            node,
            path,
            format!("discriminator '{}' is '{}'", key, tag),
        );
    };

    let mut rest = entries.clone();
    rest.remove(key);
    let stripped = Node::Map {
        entries: rest,
        value: value.clone(),
        info: info.clone(),
    };
    decode_variant(variant, &stripped, path, ctx)
}

/// Picks the struct variant whose required fields are all present and which
/// matches the most keys; ties go to the variant with fewer fields.
fn decode_structural(
    sum: &SumDesc,
    entries: &BTreeMap<String, Node>,
    node: &Node,
    path: &DotPath,
    ctx: &DecoderContext<'_>,
) -> ConfigValidation<Value> {
    let viable: Vec<(&VariantDesc, &RecordDesc, usize)> = sum
        .variants
        .iter()
        .filter_map(|variant| match &variant.shape {
            VariantShape::Struct(record) => score(record, entries, ctx).map(|s| (variant, record, s)),
            _ => None,
        })
        .collect();

    let Some(best_score) = viable.iter().map(|(_, _, s)| *s).max() else {
        let newtypes: Vec<&VariantDesc> = sum
            .variants
            .iter()
            .filter(|v| matches!(v.shape, VariantShape::Newtype(_)))
            .collect();
        if let [only] = newtypes.as_slice() {
            return decode_variant(only, node, path, ctx);
        }
        return no_match(sum, node, path, "no variant has all of its required fields".to_string());
    };

    let top: Vec<_> = viable.iter().filter(|(_, _, s)| *s == best_score).collect();
    let fewest = top.iter().map(|(_, r, _)| r.fields.len()).min().unwrap_or(0);
    let finalists: Vec<_> = top.into_iter().filter(|(_, r, _)| r.fields.len() == fewest).collect();

    match finalists.as_slice() {
        [(variant, _, _)] => decode_variant(variant, node, path, ctx),
        many => ConfigValidation::fail_with(ConfigError::AmbiguousVariant {
            path: path.to_string(),
            type_name: sum.name.clone(),
            candidates: many.iter().map(|(v, _, _)| v.name.clone()).collect(),
            source_location: node.pos().cloned(),
        }),
    }
}

/// Number of fields found, or `None` when a required field is missing.
fn score(record: &RecordDesc, entries: &BTreeMap<String, Node>, ctx: &DecoderContext<'_>) -> Option<usize> {
    let mut matched = 0;
    for field in &record.fields {
        if find_field(field, entries, ctx).is_some() {
            matched += 1;
        } else if !field.may_be_absent() {
            return None;
        }
    }
    Some(matched)
}
