//! YAML parser on `serde_yaml`.
//!
//! `serde_yaml::Value` carries no spans, so lines are recovered by searching
//! for `key:` in the text. The search walks forward from the parent's line,
//! which keeps repeated key names (`host:` under two sections) apart.

use std::collections::BTreeMap;

use stillwater::Validation;

use crate::error::{ConfigError, ConfigValidation, ConfigValidationExt, SourceErrorKind, SourceLocation};
use crate::node::{DotPath, Node, NodeInfo};
use crate::parsers::{line_from_offset, Parser};

/// Parser for `.yaml` and `.yml` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlParser;

impl Parser for YamlParser {
    fn load(&self, content: &str, source: &str) -> ConfigValidation<Node> {
        let document: serde_yaml::Value = match serde_yaml::from_str(content) {
            Ok(doc) => doc,
            Err(e) => {
                let (line, column) = e.location().map_or((None, None), |loc| {
                    (Some(loc.line() as u32), Some(loc.column() as u32))
                });
                return ConfigValidation::fail_with(ConfigError::SourceError {
                    source_name: source.to_string(),
                    kind: SourceErrorKind::ParseError {
                        message: e.to_string(),
                        line,
                        column,
                    },
                });
            }
        };

        let builder = TreeBuilder { content, source };
        Validation::Success(builder.node(&document, DotPath::root(), 0))
    }

    fn default_extensions(&self) -> Vec<&'static str> {
        vec!["yaml", "yml"]
    }
}

struct TreeBuilder<'a> {
    content: &'a str,
    source: &'a str,
}

impl TreeBuilder<'_> {
    fn info(&self, path: DotPath, offset: Option<usize>) -> NodeInfo {
        let mut pos = SourceLocation::new(self.source);
        if let Some(offset) = offset {
            pos = pos.with_line(line_from_offset(self.content, offset));
        }
        NodeInfo::at(path, pos)
    }

    /// Byte offset of `key:` at or after `from`.
    fn find_key(&self, key: &str, from: usize) -> Option<usize> {
        let pattern = format!("{}:", key);
        self.content
            .get(from..)
            .and_then(|rest| rest.find(&pattern))
            .map(|offset| from + offset)
    }

    fn node(&self, value: &serde_yaml::Value, path: DotPath, from: usize) -> Node {
        let offset = path
            .last_key()
            .and_then(|key| self.find_key(key, from));
        let info = self.info(path.clone(), offset);
        let next_from = offset.unwrap_or(from);

        match value {
            serde_yaml::Value::Null => Node::null(info),
            serde_yaml::Value::Bool(b) => Node::boolean(*b, info),
            serde_yaml::Value::Number(n) => match n.as_i64() {
                Some(i) => Node::long(i, info),
                None => match n.as_f64() {
                    Some(f) => Node::double(f, info),
                    None => Node::string(n.to_string(), info),
                },
            },
            serde_yaml::Value::String(s) => Node::string(s.clone(), info),
            serde_yaml::Value::Sequence(items) => Node::list(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.node(v, path.index(i), next_from))
                    .collect(),
                info,
            ),
            serde_yaml::Value::Mapping(map) => {
                let entries: BTreeMap<String, Node> = map
                    .iter()
                    .filter_map(|(k, v)| {
                        let key = match k {
                            serde_yaml::Value::String(s) => s.clone(),
                            serde_yaml::Value::Number(n) => n.to_string(),
                            serde_yaml::Value::Bool(b) => b.to_string(),
                            _ => return None,
                        };
                        let child = self.node(v, path.child(key.clone()), next_from);
                        Some((key, child))
                    })
                    .collect();
                Node::map(entries, info)
            }
            serde_yaml::Value::Tagged(tagged) => self.node(&tagged.value, path, from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_yaml_document_with_lines() {
        let content = "server:\n  host: a\ndatabase:\n  host: b\n  port: 5432\n";
        let node = YamlParser.load(content, "app.yaml").into_result().unwrap();
        assert_eq!(
            node.to_json(),
            json!({"server": {"host": "a"}, "database": {"host": "b", "port": 5432}})
        );
        assert_eq!(node.lookup("server.host").pos().and_then(|p| p.line), Some(2));
        assert_eq!(node.lookup("database.host").pos().and_then(|p| p.line), Some(4));
        assert_eq!(node.lookup("database.port").pos().and_then(|p| p.line), Some(5));
    }

    #[test]
    fn test_yaml_sequences() {
        let content = "servers:\n  - host: a\n  - host: b\n";
        let node = YamlParser.load(content, "app.yaml").into_result().unwrap();
        assert_eq!(node.lookup("servers[1].host").as_str(), Some("b"));
        assert_eq!(
            node.lookup("servers[1].host").path().to_string(),
            "servers[1].host"
        );
    }

    #[test]
    fn test_yaml_parse_error() {
        let result = YamlParser.load("a: [1, 2\nb: 3", "bad.yaml");
        assert!(result.is_failure());
    }
}
