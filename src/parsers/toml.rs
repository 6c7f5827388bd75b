//! TOML parser built on `toml_edit`, which keeps byte spans for every value.

use std::collections::BTreeMap;

use stillwater::Validation;
use toml_edit::{ImDocument, Item, Table};

use crate::error::{ConfigError, ConfigValidation, ConfigValidationExt, SourceErrorKind, SourceLocation};
use crate::node::{DotPath, Node, NodeInfo};
use crate::parsers::{line_col_from_offset, Parser};

/// Parser for `.toml` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlParser;

impl Parser for TomlParser {
    fn load(&self, content: &str, source: &str) -> ConfigValidation<Node> {
        // ImDocument keeps spans; DocumentMut drops them.
        let document: ImDocument<&str> = match ImDocument::parse(content) {
            Ok(doc) => doc,
            Err(e) => {
                let (line, column) = e
                    .span()
                    .map(|s| {
                        let (l, c) = line_col_from_offset(content, s.start);
                        (Some(l), Some(c))
                    })
                    .unwrap_or((None, None));
                return ConfigValidation::fail_with(ConfigError::SourceError {
                    source_name: source.to_string(),
                    kind: SourceErrorKind::ParseError {
                        message: e.message().to_string(),
                        line,
                        column,
                    },
                });
            }
        };

        let builder = TreeBuilder { content, source };
        Validation::Success(builder.table(document.as_table(), DotPath::root()))
    }

    fn default_extensions(&self) -> Vec<&'static str> {
        vec!["toml"]
    }
}

struct TreeBuilder<'a> {
    content: &'a str,
    source: &'a str,
}

impl TreeBuilder<'_> {
    fn info(&self, path: DotPath, span: Option<std::ops::Range<usize>>) -> NodeInfo {
        let mut pos = SourceLocation::new(self.source);
        if let Some(span) = span {
            let (line, column) = line_col_from_offset(self.content, span.start);
            pos = pos.with_line(line).with_column(column);
        }
        NodeInfo::at(path, pos)
    }

    fn table(&self, table: &Table, path: DotPath) -> Node {
        let entries: BTreeMap<String, Node> = table
            .iter()
            .filter_map(|(key, item)| {
                let child = self.item(item, path.child(key));
                child.is_defined().then(|| (key.to_string(), child))
            })
            .collect();
        Node::map(entries, self.info(path, table.span()))
    }

    fn item(&self, item: &Item, path: DotPath) -> Node {
        match item {
            Item::Table(table) => self.table(table, path),
            Item::ArrayOfTables(array) => {
                let elements = array
                    .iter()
                    .enumerate()
                    .map(|(i, table)| self.table(table, path.index(i)))
                    .collect();
                let span = array.iter().next().and_then(Table::span);
                Node::list(elements, self.info(path, span))
            }
            Item::Value(value) => self.value(value, path),
            Item::None => Node::Undefined,
        }
    }

    fn value(&self, value: &toml_edit::Value, path: DotPath) -> Node {
        let info = self.info(path.clone(), value.span());
        match value {
            toml_edit::Value::String(s) => Node::string(s.value().clone(), info),
            toml_edit::Value::Integer(i) => Node::long(*i.value(), info),
            toml_edit::Value::Float(f) => Node::double(*f.value(), info),
            toml_edit::Value::Boolean(b) => Node::boolean(*b.value(), info),
            toml_edit::Value::Datetime(dt) => Node::string(dt.value().to_string(), info),
            toml_edit::Value::Array(array) => Node::list(
                array
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.value(v, path.index(i)))
                    .collect(),
                info,
            ),
            toml_edit::Value::InlineTable(table) => Node::map(
                table
                    .iter()
                    .map(|(k, v)| (k.to_string(), self.value(v, path.child(k))))
                    .collect(),
                info,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(content: &str) -> Node {
        match TomlParser.load(content, "app.toml") {
            Validation::Success(node) => node,
            Validation::Failure(e) => panic!("parse failed: {}", e),
        }
    }

    #[test]
    fn test_scalars_and_tables() {
        let node = parse(
            r#"
name = "svc"
ratio = 0.5
debug = true

[database]
host = "localhost"
port = 5432
"#,
        );
        assert_eq!(
            node.to_json(),
            json!({
                "name": "svc",
                "ratio": 0.5,
                "debug": true,
                "database": {"host": "localhost", "port": 5432}
            })
        );
    }

    #[test]
    fn test_positions() {
        let node = parse("title = \"x\"\n\n[server]\nport = 8080\n");
        let port = node.lookup("server.port");
        let pos = port.pos().unwrap();
        assert_eq!(pos.source, "app.toml");
        assert_eq!(pos.line, Some(4));
        assert_eq!(pos.column, Some(8));
        assert_eq!(port.path().to_string(), "server.port");
    }

    #[test]
    fn test_arrays_and_array_of_tables() {
        let node = parse(
            r#"
ports = [80, 443]
inline = { a = 1 }

[[servers]]
host = "a"

[[servers]]
host = "b"
"#,
        );
        assert_eq!(node.lookup("ports[1]").to_json(), json!(443));
        assert_eq!(node.lookup("inline.a").to_json(), json!(1));
        let host = node.lookup("servers[1].host");
        assert_eq!(host.as_str(), Some("b"));
        assert_eq!(host.path().to_string(), "servers[1].host");
    }

    #[test]
    fn test_parse_error_has_location() {
        let result = TomlParser.load("a = 1\nb = = 2\n", "bad.toml");
        let errors = result.into_result().unwrap_err();
        match errors.first() {
            ConfigError::SourceError {
                source_name,
                kind: SourceErrorKind::ParseError { line, .. },
            } => {
                assert_eq!(source_name, "bad.toml");
                assert_eq!(*line, Some(2));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
