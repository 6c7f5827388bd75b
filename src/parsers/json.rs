//! JSON parser. `serde_json` reports error positions but not value spans,
//! so parsed nodes name the source without a line.

use stillwater::Validation;

use crate::error::{ConfigError, ConfigValidation, ConfigValidationExt, SourceErrorKind};
use crate::node::{DotPath, Node};
use crate::parsers::Parser;

/// Parser for `.json` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn load(&self, content: &str, source: &str) -> ConfigValidation<Node> {
        match serde_json::from_str::<serde_json::Value>(content) {
            Ok(document) => Validation::Success(Node::from_json(&document, source, DotPath::root())),
            Err(e) => ConfigValidation::fail_with(ConfigError::SourceError {
                source_name: source.to_string(),
                kind: SourceErrorKind::ParseError {
                    message: e.to_string(),
                    line: Some(e.line() as u32),
                    column: Some(e.column() as u32),
                },
            }),
        }
    }

    fn default_extensions(&self) -> Vec<&'static str> {
        vec!["json"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigValidationExt;
    use serde_json::json;

    #[test]
    fn test_json_document() {
        let node = JsonParser
            .load(r#"{"db": {"hosts": ["a", "b"], "port": 5432}}"#, "app.json")
            .into_result()
            .unwrap();
        assert_eq!(node.lookup("db.hosts[1]").as_str(), Some("b"));
        assert_eq!(node.lookup("db.port").to_json(), json!(5432));
        assert_eq!(
            node.lookup("db.port").pos().map(|p| p.source.as_str()),
            Some("app.json")
        );
    }

    #[test]
    fn test_json_parse_error() {
        let errors = JsonParser
            .load("{\n  \"a\": ,\n}", "bad.json")
            .into_result()
            .unwrap_err();
        match errors.first() {
            ConfigError::SourceError {
                kind: SourceErrorKind::ParseError { line, .. },
                ..
            } => assert_eq!(*line, Some(2)),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
