//! Records: structs with named fields.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use stillwater::Validation;

use super::{mismatch, Decoder, DecoderContext};
use crate::describe::{FieldDesc, RecordDesc, TypeDesc};
use crate::error::{ConfigError, ConfigValidation, ConfigValidationExt};
use crate::mapper::{candidate_keys, normalize_key};
use crate::node::{DotPath, Node};

pub struct RecordDecoder;

impl Decoder for RecordDecoder {
    fn name(&self) -> &str {
        "record"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::Record(_))
    }

    fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath, ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        match desc {
            TypeDesc::Record(record) => decode_record(record, node, path, ctx),
            _ => ConfigValidation::fail_with(mismatch(node, desc, path, "not a record type")),
        }
    }
}

/// Decode every field of `record` from `node`, accumulating failures in
/// declaration order. `node` may be `Undefined` when every field has a default.
pub(crate) fn decode_record(
    record: &RecordDesc,
    node: &Node,
    path: &DotPath,
    ctx: &DecoderContext<'_>,
) -> ConfigValidation<Value> {
    let empty = BTreeMap::new();
    let entries = match node {
        Node::Map { entries, .. } => entries,
        Node::Undefined => &empty,
        other => {
            return ConfigValidation::fail_with(mismatch(
                other,
                &TypeDesc::Record(record.clone()),
                path,
                "expected a map of fields",
            ))
        }
    };

    let fields: Vec<ConfigValidation<Option<(String, Value)>>> = record
        .fields
        .iter()
        .map(|field| decode_one(field, entries, node, path, ctx))
        .collect();

    Validation::all_vec(fields)
        .map(|pairs| Value::Object(pairs.into_iter().flatten().collect::<Map<_, _>>()))
}

fn decode_one(
    field: &FieldDesc,
    entries: &BTreeMap<String, Node>,
    parent: &Node,
    path: &DotPath,
    ctx: &DecoderContext<'_>,
) -> ConfigValidation<Option<(String, Value)>> {
    match find_field(field, entries, ctx) {
        Some((key, child)) => {
            let child = if field.secret {
                child.clone().with_meta("secret", "true")
            } else {
                child.clone()
            };
            ctx.decode_field(Some(&field.name), &child, &field.desc, &path.child(key.clone()))
                .map(|value| Some((field.key.clone(), value)))
        }
        None if field.has_default => Validation::Success(None),
        None if field.desc.accepts_absence() => ctx
            .decode_field(Some(&field.name), &Node::Undefined, &field.desc, &path.child(field.key.clone()))
            .map(|value| Some((field.key.clone(), value))),
        None => ConfigValidation::fail_with(ConfigError::MissingValue {
            path: path.child(field.key.clone()).to_string(),
            expected_type: field.desc.type_name(),
            searched_keys: searched_keys(field, ctx),
            source_location: parent.pos().cloned(),
        }),
    }
}

fn searched_keys(field: &FieldDesc, ctx: &DecoderContext<'_>) -> Vec<String> {
    candidate_keys(&[field.key.as_str(), field.name.as_str()], &field.aliases, ctx.mappers)
}

/// The source key and node for `field`: aliases and mapped names first, then
/// (with normalisation on) any key equal after folding case and separators.
pub(crate) fn find_field<'n>(
    field: &FieldDesc,
    entries: &'n BTreeMap<String, Node>,
    ctx: &DecoderContext<'_>,
) -> Option<(&'n String, &'n Node)> {
    let defined = |key: &str| entries.get_key_value(key).filter(|(_, n)| n.is_defined());

    for candidate in searched_keys(field, ctx) {
        if let Some(found) = defined(&candidate) {
            return Some(found);
        }
    }

    if ctx.normalize_keys {
        let wanted: Vec<String> = std::iter::once(&field.name)
            .chain(std::iter::once(&field.key))
            .chain(field.aliases.iter())
            .map(|k| normalize_key(k))
            .collect();
        return entries
            .iter()
            .find(|(k, n)| n.is_defined() && wanted.contains(&normalize_key(k)));
    }
    None
}
