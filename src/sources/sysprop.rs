//! System property source.
//!
//! Reads the [`ConfigEnv`](crate::env::ConfigEnv) property table. Only keys
//! under the prefix (default `config.override.`) contribute, with the prefix
//! stripped: `config.override.db.port=6543` overrides `db.port`.

use stillwater::Validation;

use crate::error::{ConfigValidation, SourceLocation};
use crate::node::{DotPath, Node, NodeInfo};
use crate::source::{PropertySource, SourceContext};

/// Prefix used when none is configured.
pub const DEFAULT_PROPERTY_PREFIX: &str = "config.override.";

/// Configuration overrides from system properties.
#[derive(Debug, Clone)]
pub struct SystemProperties {
    prefix: String,
}

impl SystemProperties {
    /// Properties under [`DEFAULT_PROPERTY_PREFIX`].
    pub fn new() -> Self {
        Self::prefix(DEFAULT_PROPERTY_PREFIX)
    }

    /// Properties under a custom prefix. An empty prefix takes every property.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for SystemProperties {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertySource for SystemProperties {
    fn node(&self, ctx: &SourceContext<'_>) -> ConfigValidation<Node> {
        let mut root = Node::Undefined;
        for (name, value) in ctx.env.system_properties() {
            let Some(rest) = name.strip_prefix(&self.prefix) else {
                continue;
            };
            let keys: Vec<String> = rest
                .split('.')
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
            if keys.is_empty() {
                continue;
            }
            let leaf = Node::string(value, NodeInfo::at(DotPath::root(), SourceLocation::property(&name)));
            root.insert_at(&keys, leaf, &DotPath::root());
        }
        Validation::Success(root)
    }

    fn source(&self) -> String {
        format!("system properties ({}*)", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MockEnv;
    use crate::error::ConfigValidationExt;
    use crate::parsers::ParserRegistry;
    use serde_json::json;

    #[test]
    fn test_prefixed_properties_become_overrides() {
        let env = MockEnv::new()
            .with_property("config.override.db.port", "6543")
            .with_property("config.override.name", "svc")
            .with_property("user.home", "/home/ada");
        let parsers = ParserRegistry::empty();
        let node = SystemProperties::new()
            .node(&SourceContext::new(&parsers, &env))
            .into_result()
            .unwrap();
        assert_eq!(node.to_json(), json!({"db": {"port": "6543"}, "name": "svc"}));
        assert_eq!(
            node.lookup("db.port").pos().map(|p| p.source.as_str()),
            Some("sysprop:config.override.db.port")
        );
    }

    #[test]
    fn test_custom_prefix() {
        let env = MockEnv::new().with_property("app.mode", "dev");
        let parsers = ParserRegistry::empty();
        let node = SystemProperties::prefix("app.")
            .node(&SourceContext::new(&parsers, &env))
            .into_result()
            .unwrap();
        assert_eq!(node.get("mode").as_str(), Some("dev"));
    }
}
