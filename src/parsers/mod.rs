//! Format parsers: raw text in, positioned [`Node`] tree out.
//!
//! A [`Parser`] knows one format and the file extensions it claims. The
//! [`ParserRegistry`] maps extensions to parsers and is handed to every
//! property source through the [`SourceContext`](crate::source::SourceContext).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ConfigValidation;
use crate::node::Node;

#[cfg(feature = "json")]
mod json;
mod properties;
#[cfg(feature = "toml")]
mod toml;
#[cfg(feature = "yaml")]
mod yaml;

#[cfg(feature = "json")]
pub use json::JsonParser;
pub use properties::PropertiesParser;
#[cfg(feature = "toml")]
pub use toml::TomlParser;
#[cfg(feature = "yaml")]
pub use yaml::YamlParser;

/// Turns the text of one document into a node tree.
///
/// Every produced node must carry a position naming `source`, with line and
/// column where the format makes them available.
pub trait Parser: Send + Sync {
    /// Parse `content`, attributing positions to `source`.
    fn load(&self, content: &str, source: &str) -> ConfigValidation<Node>;

    /// Extensions (without the dot) this parser handles by default.
    fn default_extensions(&self) -> Vec<&'static str>;
}

/// Extension-keyed set of parsers.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: BTreeMap<String, Arc<dyn Parser>>,
}

impl ParserRegistry {
    /// A registry with no parsers.
    pub fn empty() -> Self {
        Self {
            parsers: BTreeMap::new(),
        }
    }

    /// A registry with every parser enabled by crate features.
    pub fn with_defaults() -> Self {
        let registry = Self::empty().register(PropertiesParser);
        #[cfg(feature = "toml")]
        let registry = registry.register(TomlParser);
        #[cfg(feature = "json")]
        let registry = registry.register(JsonParser);
        #[cfg(feature = "yaml")]
        let registry = registry.register(YamlParser);
        registry
    }

    /// Register a parser under each of its default extensions.
    ///
    /// A later registration for the same extension replaces the earlier one.
    pub fn register<P: Parser + 'static>(mut self, parser: P) -> Self {
        let parser: Arc<dyn Parser> = Arc::new(parser);
        for ext in parser.default_extensions() {
            self.parsers.insert(ext.to_ascii_lowercase(), Arc::clone(&parser));
        }
        self
    }

    /// Register a parser for one explicit extension.
    pub fn register_for<P: Parser + 'static>(mut self, extension: &str, parser: P) -> Self {
        self.parsers
            .insert(extension.trim_start_matches('.').to_ascii_lowercase(), Arc::new(parser));
        self
    }

    /// Find the parser for an extension (case-insensitive, leading dot optional).
    pub fn locate(&self, extension: &str) -> Option<&dyn Parser> {
        self.parsers
            .get(&extension.trim_start_matches('.').to_ascii_lowercase())
            .map(|p| p.as_ref())
    }

    /// Every registered extension.
    pub fn extensions(&self) -> Vec<&str> {
        self.parsers.keys().map(String::as_str).collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("extensions", &self.extensions())
            .finish()
    }
}

/// 1-indexed line containing byte `offset`.
pub fn line_from_offset(content: &str, offset: usize) -> u32 {
    let end = offset.min(content.len());
    content.as_bytes()[..end]
        .iter()
        .filter(|&&b| b == b'\n')
        .count() as u32
        + 1
}

/// 1-indexed (line, column) of byte `offset`.
pub fn line_col_from_offset(content: &str, offset: usize) -> (u32, u32) {
    let end = offset.min(content.len());
    let line_start = content.as_bytes()[..end]
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0);
    (line_from_offset(content, end), (end - line_start) as u32 + 1)
}
