//! Java-style `.properties` parser.
//!
//! Dotted keys become nested maps. A key that is both a value and a prefix
//! (`a=1` and `a.b=2`) yields a map whose own value is `1`. All values are
//! strings; decoders convert them on demand.

use stillwater::Validation;

use crate::error::{ConfigError, ConfigValidation, ConfigValidationExt, SourceErrorKind, SourceLocation};
use crate::node::{DotPath, Node, NodeInfo};
use crate::parsers::Parser;

/// Parser for `.properties` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertiesParser;

impl Parser for PropertiesParser {
    fn load(&self, content: &str, source: &str) -> ConfigValidation<Node> {
        let mut root = Node::map(
            Default::default(),
            NodeInfo::at(DotPath::root(), SourceLocation::new(source)),
        );

        for (line_no, logical) in logical_lines(content) {
            let (raw_key, raw_value) = split_pair(&logical);
            let key = match unescape(raw_key) {
                Ok(k) => k,
                Err(message) => return parse_error(source, line_no, message),
            };
            let value = match unescape(raw_value) {
                Ok(v) => v,
                Err(message) => return parse_error(source, line_no, message),
            };
            let keys: Vec<String> = key
                .split('.')
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
            if keys.is_empty() {
                continue;
            }
            let pos = SourceLocation::new(source).with_line(line_no).with_column(1);
            let leaf = Node::string(value, NodeInfo::at(DotPath::root(), pos));
            root.insert_at(&keys, leaf, &DotPath::root());
        }

        Validation::Success(root)
    }

    fn default_extensions(&self) -> Vec<&'static str> {
        vec!["properties"]
    }
}

fn parse_error(source: &str, line: u32, message: String) -> ConfigValidation<Node> {
    ConfigValidation::fail_with(ConfigError::SourceError {
        source_name: source.to_string(),
        kind: SourceErrorKind::ParseError {
            message,
            line: Some(line),
            column: None,
        },
    })
}

/// Join continuation lines and drop blanks and comments.
///
/// Yields the 1-indexed line where each logical line starts.
fn logical_lines(content: &str) -> Vec<(u32, String)> {
    let mut out = Vec::new();
    let mut current: Option<(u32, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx as u32 + 1;
        let trimmed = raw.trim_start();

        let (start, mut text) = match current.take() {
            Some((start, text)) => (start, text),
            None => {
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                (line_no, String::new())
            }
        };

        if ends_with_continuation(trimmed) {
            text.push_str(&trimmed[..trimmed.len() - 1]);
            current = Some((start, text));
        } else {
            text.push_str(trimmed);
            out.push((start, text));
        }
    }
    if let Some(pending) = current {
        out.push(pending);
    }
    out
}

/// An odd number of trailing backslashes continues the line.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

/// Split at the first unescaped `=`, `:` or whitespace.
fn split_pair(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (line[..i].trim_end(), line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (&line[..i], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(text: &str) -> Result<String, String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid unicode escape '\\u{}'", hex))?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(content: &str) -> Node {
        PropertiesParser
            .load(content, "app.properties")
            .into_result()
            .unwrap()
    }

    #[test]
    fn test_dotted_keys_nest() {
        let node = parse("# comment\ndb.host=localhost\ndb.port = 5432\n\nname: svc\n");
        assert_eq!(
            node.to_json(),
            json!({"db": {"host": "localhost", "port": "5432"}, "name": "svc"})
        );
        let port = node.lookup("db.port");
        assert_eq!(port.pos().and_then(|p| p.line), Some(3));
        assert_eq!(port.path().to_string(), "db.port");
    }

    #[test]
    fn test_value_and_children_share_a_key() {
        let node = parse("a=1\na.b=2\n");
        let a = node.get("a");
        assert_eq!(a.own_value().as_str(), Some("1"));
        assert_eq!(a.get("b").as_str(), Some("2"));
    }

    #[test]
    fn test_continuation_and_escapes() {
        let node = parse("list = a,\\\n    b,\\\n    c\npath = C:\\\\tmp\nkey\\ with\\ space = x\nsnow = \\u2603\n");
        assert_eq!(node.get("list").as_str(), Some("a,b,c"));
        assert_eq!(node.get("path").as_str(), Some("C:\\tmp"));
        assert_eq!(node.get("key with space").as_str(), Some("x"));
        assert_eq!(node.get("snow").as_str(), Some("\u{2603}"));
    }

    #[test]
    fn test_whitespace_separator_and_empty_value() {
        let node = parse("greeting hello world\nempty=\n");
        assert_eq!(node.get("greeting").as_str(), Some("hello world"));
        assert_eq!(node.get("empty").as_str(), Some(""));
    }

    #[test]
    fn test_bad_unicode_escape_is_parse_error() {
        let result = PropertiesParser.load("a=\\uZZZZ\n", "bad.properties");
        assert!(result.is_failure());
    }
}
