//! Lists, sets and maps.

use serde_json::{Map, Value};
use stillwater::Validation;

use super::{mismatch, Decoder, DecoderContext};
use crate::describe::TypeDesc;
use crate::error::{ConfigValidation, ConfigValidationExt};
use crate::node::{DotPath, Node, NodeInfo};

/// `Vec`, `VecDeque` and the set types.
///
/// Accepts a list node, a comma-delimited string (for scalar elements), or a
/// map whose keys are all indices, as produced by `APP_HOSTS_0`-style
/// environment variables.
pub struct ListDecoder;

impl Decoder for ListDecoder {
    fn name(&self) -> &str {
        "list"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::List(_) | TypeDesc::Set(_))
    }

    fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath, ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        let element = match desc {
            TypeDesc::List(inner) | TypeDesc::Set(inner) => inner.as_ref(),
            _ => return ConfigValidation::fail_with(mismatch(node, desc, path, "not a collection type")),
        };

        let items: Vec<ConfigValidation<Value>> = match node {
            Node::List { elements, .. } => elements
                .iter()
                .enumerate()
                .map(|(i, el)| ctx.decode(el, element, &path.index(i)))
                .collect(),
            Node::String { value, info } if element.is_scalar() => value
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .enumerate()
                .map(|(i, token)| {
                    let token_info = NodeInfo {
                        pos: info.pos.clone(),
                        path: path.index(i),
                        meta: info.meta.clone(),
                    };
                    ctx.decode(&Node::string(token, token_info), element, &path.index(i))
                })
                .collect(),
            Node::Map { entries, .. } => match indexed_entries(entries) {
                Some(indexed) => indexed
                    .into_iter()
                    .map(|(key, el)| ctx.decode(el, element, &path.child(key)))
                    .collect(),
                None => {
                    return ConfigValidation::fail_with(mismatch(
                        node,
                        desc,
                        path,
                        "expected a list, got a map with non-numeric keys",
                    ))
                }
            },
            _ => return ConfigValidation::fail_with(mismatch(node, desc, path, "expected a list")),
        };

        Validation::all_vec(items).map(Value::Array)
    }
}

/// Entries sorted by numeric key, or `None` if any key is not an index.
fn indexed_entries(entries: &std::collections::BTreeMap<String, Node>) -> Option<Vec<(&String, &Node)>> {
    let mut indexed = Vec::with_capacity(entries.len());
    for (key, node) in entries {
        let index: usize = key.parse().ok()?;
        if node.is_defined() {
            indexed.push((index, key, node));
        }
    }
    indexed.sort_by_key(|(index, _, _)| *index);
    Some(indexed.into_iter().map(|(_, key, node)| (key, node)).collect())
}

/// `HashMap` and `BTreeMap`. Keys are decoded through the key descriptor and
/// rendered back to text, which serde parses again for non-string keys.
pub struct MapDecoder;

impl Decoder for MapDecoder {
    fn name(&self) -> &str {
        "map"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::Map { .. })
    }

    fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath, ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        let TypeDesc::Map { key, value } = desc else {
            return ConfigValidation::fail_with(mismatch(node, desc, path, "not a map type"));
        };
        let Node::Map { entries, .. } = node else {
            return ConfigValidation::fail_with(mismatch(node, desc, path, "expected a map"));
        };

        let pairs: Vec<ConfigValidation<(String, Value)>> = entries
            .iter()
            .filter(|(_, child)| child.is_defined())
            .map(|(k, child)| {
                let child_path = path.child(k.clone());
                let key_node = Node::string(k.clone(), NodeInfo {
                    pos: child.pos().cloned(),
                    path: child_path.clone(),
                    meta: Default::default(),
                });
                let decoded_key = match ctx.registry.find(key) {
                    Some(decoder) => decoder.decode(&key_node, key, &child_path, ctx),
                    None => Validation::Success(Value::String(k.clone())),
                };
                let decoded_value = ctx.decode(child, value, &child_path);
                ConfigValidation::<()>::all((decoded_key, decoded_value)).map(|(k, v)| (key_text(k), v))
            })
            .collect();

        Validation::all_vec(pairs).map(|pairs| Value::Object(pairs.into_iter().collect::<Map<_, _>>()))
    }
}

fn key_text(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::describe::Describe;
    use crate::error::ConfigError;
    use serde_json::json;
    use std::collections::{BTreeSet, HashMap};

    #[test]
    fn test_list_from_list_node() {
        let value = ok(decode_json(&<Vec<u16>>::describe(), json!([80, "443"])));
        assert_eq!(value, json!([80, 443]));
    }

    #[test]
    fn test_list_from_delimited_string() {
        let value = ok(decode_json(&<Vec<String>>::describe(), json!("a, b,c")));
        assert_eq!(value, json!(["a", "b", "c"]));
        let value = ok(decode_json(&<Vec<u8>>::describe(), json!("")));
        assert_eq!(value, json!([]));
    }

    #[test]
    fn test_list_from_indexed_map() {
        let input = json!({"10": "c", "2": "b", "0": "a"});
        let value = ok(decode_json(&<Vec<String>>::describe(), input));
        assert_eq!(value, json!(["a", "b", "c"]));

        let errs = errors(decode_json(&<Vec<String>>::describe(), json!({"x": "a"})));
        assert!(matches!(errs[0], ConfigError::TypeMismatch { .. }));
    }

    #[test]
    fn test_element_errors_carry_index() {
        let errs = errors(decode_json(&<Vec<u8>>::describe(), json!([1, "x", 300])));
        let paths: Vec<_> = errs.iter().filter_map(|e| e.path()).collect();
        assert_eq!(paths, vec!["[1]", "[2]"]);
    }

    #[test]
    fn test_set_decoding() {
        let value = ok(decode_json(&<BTreeSet<String>>::describe(), json!("x,y,x")));
        let set: BTreeSet<String> = serde_json::from_value(value).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_map_with_numeric_keys() {
        let value = ok(decode_json(
            &<HashMap<u16, String>>::describe(),
            json!({"80": "http", "443": "https"}),
        ));
        let map: HashMap<u16, String> = serde_json::from_value(value).unwrap();
        assert_eq!(map.get(&443).map(String::as_str), Some("https"));
    }

    #[test]
    fn test_map_accumulates_key_and_value_errors() {
        let errs = errors(decode_json(
            &<HashMap<u8, u8>>::describe(),
            json!({"1": 1, "x": 2, "3": "y"}),
        ));
        assert_eq!(errs.len(), 2);
    }
}
