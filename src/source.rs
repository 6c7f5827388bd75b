//! The property source abstraction.
//!
//! A source wraps one origin of configuration (a file, the environment, a
//! property table, in-memory defaults) and turns it into a [`Node`]. Sources
//! perform I/O only through the [`ConfigEnv`] in their [`SourceContext`], so
//! every source is testable against a `MockEnv`.

#[cfg(feature = "watch")]
use std::path::PathBuf;

use crate::env::ConfigEnv;
use crate::error::ConfigValidation;
use crate::node::Node;
use crate::parsers::ParserRegistry;

/// What a source may use while loading.
pub struct SourceContext<'a> {
    pub parsers: &'a ParserRegistry,
    pub env: &'a dyn ConfigEnv,
}

impl<'a> SourceContext<'a> {
    pub fn new(parsers: &'a ParserRegistry, env: &'a dyn ConfigEnv) -> Self {
        Self { parsers, env }
    }
}

/// An origin of configuration data.
///
/// # Example Implementation
///
/// ```ignore
/// impl PropertySource for MySource {
///     fn node(&self, ctx: &SourceContext<'_>) -> ConfigValidation<Node> {
///         let content = match ctx.env.read_file(&self.path) {
///             Ok(content) => content,
///             Err(e) => return ConfigValidation::fail_with(ConfigError::SourceError {
///                 source_name: self.source(),
///                 kind: SourceErrorKind::IoError { message: e.to_string() },
///             }),
///         };
///         PropertiesParser.load(&content, &self.source())
///     }
///
///     fn source(&self) -> String {
///         "my-source".to_string()
///     }
/// }
/// ```
pub trait PropertySource: Send + Sync {
    /// Produce this source's tree.
    ///
    /// An optional source whose backing resource is absent returns
    /// `Success(Node::Undefined)`, never a failure.
    fn node(&self, ctx: &SourceContext<'_>) -> ConfigValidation<Node>;

    /// Human-readable description for diagnostics and reports.
    fn source(&self) -> String;

    /// Path to watch for hot reload, if applicable.
    #[cfg(feature = "watch")]
    fn watch_path(&self) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MockEnv;
    use crate::error::{ConfigError, ConfigValidationExt, SourceErrorKind};
    use crate::node::{DotPath, NodeInfo};
    use crate::parsers::Parser;
    use stillwater::Validation;

    struct InlineProperties(&'static str);

    impl PropertySource for InlineProperties {
        fn node(&self, ctx: &SourceContext<'_>) -> ConfigValidation<Node> {
            match ctx.parsers.locate("properties") {
                Some(parser) => parser.load(self.0, &self.source()),
                None => ConfigValidation::fail_with(ConfigError::SourceError {
                    source_name: self.source(),
                    kind: SourceErrorKind::UnsupportedFormat {
                        extension: "properties".to_string(),
                    },
                }),
            }
        }

        fn source(&self) -> String {
            "inline".to_string()
        }
    }

    struct Fixed;

    impl PropertySource for Fixed {
        fn node(&self, _ctx: &SourceContext<'_>) -> ConfigValidation<Node> {
            Validation::Success(Node::string("x", NodeInfo::new(DotPath::root())))
        }

        fn source(&self) -> String {
            "fixed".to_string()
        }
    }

    #[test]
    fn test_custom_source_uses_context_parsers() {
        let parsers = ParserRegistry::with_defaults();
        let env = MockEnv::new();
        let ctx = SourceContext::new(&parsers, &env);
        let node = InlineProperties("a.b=1").node(&ctx).into_result().unwrap();
        assert_eq!(node.lookup("a.b").as_str(), Some("1"));
    }

    #[test]
    fn test_missing_parser_is_reported() {
        let parsers = ParserRegistry::empty();
        let env = MockEnv::new();
        let ctx = SourceContext::new(&parsers, &env);
        assert!(InlineProperties("a=1").node(&ctx).is_failure());
        assert!(Fixed.node(&ctx).is_success());
    }
}
