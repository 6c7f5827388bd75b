//! File source: one document, parser picked by extension.
//!
//! # Example
//!
//! ```ignore
//! use cairn::{Config, File};
//!
//! let config = Config::<AppConfig>::builder()
//!     .source(File::new("config.local.toml").optional())
//!     .source(File::new("config.toml"))
//!     .build()?;
//!
//! let config = Config::<AppConfig>::builder()
//!     .source(File::string("host = \"localhost\"", "toml"))
//!     .build()?;
//! ```

use std::path::{Path, PathBuf};

use stillwater::Validation;

use crate::error::{ConfigError, ConfigValidation, ConfigValidationExt, SourceErrorKind};
use crate::node::Node;
use crate::parsers::Parser;
use crate::source::{PropertySource, SourceContext};

#[derive(Debug, Clone)]
enum FileOrigin {
    Path(PathBuf),
    Inline { content: String, extension: String },
}

/// A configuration document on disk or inline.
#[derive(Debug, Clone)]
pub struct File {
    origin: FileOrigin,
    required: bool,
    name: Option<String>,
}

impl File {
    /// Load from a file path (required by default).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            origin: FileOrigin::Path(path.into()),
            required: true,
            name: None,
        }
    }

    /// Load from inline text, parsed with the parser for `extension`.
    pub fn string(content: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            origin: FileOrigin::Inline {
                content: content.into(),
                extension: extension.into(),
            },
            required: true,
            name: None,
        }
    }

    /// A missing file contributes nothing instead of failing.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Mark this source as required (default).
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set a custom name for this source in error messages.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn extension(&self) -> String {
        match &self.origin {
            FileOrigin::Path(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_string(),
            FileOrigin::Inline { extension, .. } => extension.clone(),
        }
    }

    fn read(&self, ctx: &SourceContext<'_>, path: &Path) -> Result<Option<String>, ConfigError> {
        match ctx.env.read_file(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.required {
                    Err(ConfigError::SourceError {
                        source_name: self.source(),
                        kind: SourceErrorKind::NotFound {
                            path: path.display().to_string(),
                        },
                    })
                } else {
                    Ok(None)
                }
            }
            Err(e) => Err(ConfigError::SourceError {
                source_name: self.source(),
                kind: SourceErrorKind::IoError {
                    message: e.to_string(),
                },
            }),
        }
    }
}

impl PropertySource for File {
    fn node(&self, ctx: &SourceContext<'_>) -> ConfigValidation<Node> {
        let content = match &self.origin {
            FileOrigin::Path(path) => match self.read(ctx, path) {
                Ok(Some(content)) => content,
                Ok(None) => {
                    tracing::debug!(source = %self.source(), "optional file not found");
                    return Validation::Success(Node::Undefined);
                }
                Err(e) => return ConfigValidation::fail_with(e),
            },
            FileOrigin::Inline { content, .. } => content.clone(),
        };

        let extension = self.extension();
        match ctx.parsers.locate(&extension) {
            Some(parser) => parser.load(&content, &self.source()),
            None => ConfigValidation::fail_with(ConfigError::SourceError {
                source_name: self.source(),
                kind: SourceErrorKind::UnsupportedFormat { extension },
            }),
        }
    }

    fn source(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.origin {
            FileOrigin::Path(path) => path.display().to_string(),
            FileOrigin::Inline { extension, .. } => format!("<string.{}>", extension),
        }
    }

    #[cfg(feature = "watch")]
    fn watch_path(&self) -> Option<PathBuf> {
        match &self.origin {
            FileOrigin::Path(path) => Some(path.clone()),
            FileOrigin::Inline { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MockEnv;
    use crate::parsers::ParserRegistry;

    fn load(file: &File, env: &MockEnv) -> ConfigValidation<Node> {
        let parsers = ParserRegistry::with_defaults();
        file.node(&SourceContext::new(&parsers, env))
    }

    #[test]
    fn test_file_load_by_extension() {
        let env = MockEnv::new().with_file("app.properties", "db.host=localhost\n");
        let node = load(&File::new("app.properties"), &env).into_result().unwrap();
        assert_eq!(node.lookup("db.host").as_str(), Some("localhost"));
        assert_eq!(
            node.lookup("db.host").pos().map(|p| p.source.as_str()),
            Some("app.properties")
        );
    }

    #[test]
    fn test_missing_required_file() {
        let env = MockEnv::new();
        let errors = load(&File::new("missing.properties"), &env)
            .into_result()
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors.first(),
            ConfigError::SourceError {
                kind: SourceErrorKind::NotFound { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_missing_optional_file_is_undefined() {
        let env = MockEnv::new().with_missing_file("local.properties");
        let node = load(&File::new("local.properties").optional(), &env)
            .into_result()
            .unwrap();
        assert!(!node.is_defined());
    }

    #[test]
    fn test_unreadable_file_fails_even_if_optional() {
        let env = MockEnv::new().with_unreadable_file("secret.properties");
        let result = load(&File::new("secret.properties").optional(), &env);
        assert!(matches!(
            result.into_result().unwrap_err().first(),
            ConfigError::SourceError {
                kind: SourceErrorKind::IoError { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_extension() {
        let env = MockEnv::new().with_file("app.ini", "a=1");
        let errors = load(&File::new("app.ini"), &env).into_result().unwrap_err();
        assert!(matches!(
            errors.first(),
            ConfigError::SourceError {
                kind: SourceErrorKind::UnsupportedFormat { extension },
                ..
            } if extension == "ini"
        ));
    }

    #[test]
    fn test_inline_and_named() {
        let env = MockEnv::new();
        let file = File::string("a=1", "properties").named("inline defaults");
        assert_eq!(file.source(), "inline defaults");
        let node = load(&file, &env).into_result().unwrap();
        assert_eq!(node.get("a").as_str(), Some("1"));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml_file_with_real_fs() {
        use std::io::Write;
        let mut tmp = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(tmp, "[server]\nport = 8080").unwrap();
        let parsers = ParserRegistry::with_defaults();
        let env = crate::env::RealEnv::new();
        let node = File::new(tmp.path())
            .node(&SourceContext::new(&parsers, &env))
            .into_result()
            .unwrap();
        assert_eq!(node.lookup("server.port").to_json(), serde_json::json!(8080));
    }
}
