//! Defaults configuration source.
//!
//! Defaults are usually listed last so every other source overrides them.
//!
//! # Example
//!
//! ```ignore
//! use cairn::{Config, Defaults, File};
//!
//! let config = Config::<AppConfig>::builder()
//!     .source(File::new("config.toml"))
//!     .source(Defaults::from(AppConfig::default()))
//!     .build()?;
//!
//! // Specific paths only
//! let config = Config::<AppConfig>::builder()
//!     .source(File::new("config.toml"))
//!     .source(Defaults::partial().set("host", "localhost").set("port", 8080))
//!     .build()?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use stillwater::Validation;

use crate::error::{ConfigError, ConfigValidation, ConfigValidationExt, SourceErrorKind, SourceLocation};
use crate::node::{DotPath, Node, NodeInfo, PathSegment};
use crate::source::{PropertySource, SourceContext};

enum DefaultsSource<T> {
    Value(T),
    Fn(Arc<dyn Fn() -> T + Send + Sync>),
}

/// Default values taken from a whole serializable value.
pub struct Defaults<T> {
    source: DefaultsSource<T>,
}

impl<T: Serialize + Send + Sync + 'static> Defaults<T> {
    /// Create defaults from a value.
    pub fn from(value: T) -> Self {
        Self {
            source: DefaultsSource::Value(value),
        }
    }

    /// Create defaults from a closure, called on every load.
    ///
    /// ```ignore
    /// let source = Defaults::from_fn(|| AppConfig {
    ///     host: "localhost".to_string(),
    ///     port: if cfg!(debug_assertions) { 3000 } else { 8080 },
    /// });
    /// ```
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            source: DefaultsSource::Fn(Arc::new(f)),
        }
    }
}

impl Defaults<()> {
    /// Start a set of defaults for individual paths.
    pub fn partial() -> PartialDefaults {
        PartialDefaults::new()
    }
}

impl<T: Serialize + Send + Sync + 'static> PropertySource for Defaults<T> {
    fn node(&self, _ctx: &SourceContext<'_>) -> ConfigValidation<Node> {
        let json = match &self.source {
            DefaultsSource::Value(v) => serde_json::to_value(v),
            DefaultsSource::Fn(f) => serde_json::to_value(f()),
        };
        match json {
            Ok(json) => Validation::Success(Node::from_json(&json, "defaults", DotPath::root())),
            Err(e) => ConfigValidation::fail_with(ConfigError::SourceError {
                source_name: "defaults".to_string(),
                kind: SourceErrorKind::Other {
                    message: format!("failed to serialize defaults: {}", e),
                },
            }),
        }
    }

    fn source(&self) -> String {
        "defaults".to_string()
    }
}

/// Defaults for specific paths.
///
/// ```ignore
/// let source = Defaults::partial()
///     .set("server.port", 8080)
///     .set("server.hosts", vec!["a", "b"])
///     .set("database.pool_size", 10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PartialDefaults {
    values: BTreeMap<String, serde_json::Value>,
}

impl PartialDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a default value for a dotted path.
    pub fn set<V: Into<serde_json::Value>>(mut self, path: impl Into<String>, value: V) -> Self {
        self.values.insert(path.into(), value.into());
        self
    }

    /// Set several defaults at once.
    pub fn set_many<I, K, V>(mut self, iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        for (path, value) in iter {
            self.values.insert(path.into(), value.into());
        }
        self
    }
}

impl PropertySource for PartialDefaults {
    fn node(&self, _ctx: &SourceContext<'_>) -> ConfigValidation<Node> {
        let mut root = Node::Undefined;
        for (path, value) in &self.values {
            let parsed = DotPath::parse(path);
            let keys: Vec<String> = parsed
                .segments()
                .iter()
                .map(|segment| match segment {
                    PathSegment::Key(k) => k.clone(),
                    PathSegment::Index(i) => i.to_string(),
                })
                .collect();
            if keys.is_empty() {
                continue;
            }
            let source = format!("defaults:{}", path);
            let leaf = Node::from_json(value, &source, parsed);
            root.insert_at(&keys, leaf, &DotPath::root());
        }
        if let Some(info) = root.info_mut() {
            *info = NodeInfo::at(DotPath::root(), SourceLocation::new("defaults"));
        }
        Validation::Success(root)
    }

    fn source(&self) -> String {
        "defaults".to_string()
    }
}
