//! Error types for the cairn configuration library.
//!
//! Every failure the loader can detect is a [`ConfigError`] value. Failures are
//! accumulated in [`ConfigErrors`] (a `NonEmptyVec` that implements stillwater's
//! `Semigroup`) and threaded through [`ConfigValidation`], so a single load
//! reports every problem at once instead of stopping at the first.

use std::fmt;

use stillwater::{NonEmptyVec, Semigroup, Validation};

/// Location where a configuration value originated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceLocation {
    /// Name of the source (e.g., "config.toml", "env:APP_HOST")
    pub source: String,
    /// Line number in the source (1-indexed), if applicable
    pub line: Option<u32>,
    /// Column number in the source (1-indexed), if applicable
    pub column: Option<u32>,
}

impl SourceLocation {
    /// Create a new source location with just a source name.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            line: None,
            column: None,
        }
    }

    /// Add a line number to this location.
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Add a column number to this location.
    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    /// Create a location for an environment variable.
    pub fn env(var_name: &str) -> Self {
        Self::new(format!("env:{}", var_name))
    }

    /// Create a location for a system property.
    pub fn property(name: &str) -> Self {
        Self::new(format!("sysprop:{}", name))
    }

    /// Create a location for a file with optional position.
    pub fn file(path: &str, line: Option<u32>, column: Option<u32>) -> Self {
        Self {
            source: path.to_string(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => write!(f, "{}:{}:{}", self.source, line, col),
            (Some(line), None) => write!(f, "{}:{}", self.source, line),
            _ => write!(f, "{}", self.source),
        }
    }
}

/// Kinds of source loading errors.
#[derive(Debug, Clone)]
pub enum SourceErrorKind {
    /// Source file was not found
    NotFound { path: String },
    /// Source file could not be read
    IoError { message: String },
    /// Source content could not be parsed
    ParseError {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
    },
    /// Remote source failed to connect
    ConnectionError { message: String },
    /// No parser is registered for the file extension
    UnsupportedFormat { extension: String },
    /// Other source-specific error
    Other { message: String },
}

impl SourceErrorKind {
    /// Add context to this error kind.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            SourceErrorKind::Other { message } => SourceErrorKind::Other {
                message: format!("{} -> {}", context, message),
            },
            other => other,
        }
    }
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceErrorKind::NotFound { path } => write!(f, "file not found: {}", path),
            SourceErrorKind::IoError { message } => write!(f, "I/O error: {}", message),
            SourceErrorKind::ParseError {
                message,
                line,
                column,
            } => {
                write!(f, "parse error: {}", message)?;
                if let Some(l) = line {
                    write!(f, " at line {}", l)?;
                    if let Some(c) = column {
                        write!(f, ", column {}", c)?;
                    }
                }
                Ok(())
            }
            SourceErrorKind::ConnectionError { message } => {
                write!(f, "connection error: {}", message)
            }
            SourceErrorKind::UnsupportedFormat { extension } => {
                write!(f, "no parser registered for extension '{}'", extension)
            }
            SourceErrorKind::Other { message } => write!(f, "{}", message),
        }
    }
}

/// Errors that can occur while loading, preprocessing and decoding configuration.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// A configuration source failed to load
    SourceError {
        source_name: String,
        kind: SourceErrorKind,
    },

    /// No sources were provided to the builder
    NoSources,

    /// A node's shape or content is incompatible with the target type
    TypeMismatch {
        path: String,
        source_location: Option<SourceLocation>,
        expected_type: String,
        actual_value: String,
        message: String,
    },

    /// A required value is absent from every source
    MissingValue {
        path: String,
        expected_type: String,
        searched_keys: Vec<String>,
        source_location: Option<SourceLocation>,
    },

    /// An explicit null was provided for a non-optional value
    NullValue {
        path: String,
        expected_type: String,
        source_location: Option<SourceLocation>,
    },

    /// No registered decoder supports the target type
    UnsupportedType { path: String, type_name: String },

    /// More than one sum-type variant fits the node equally well
    AmbiguousVariant {
        path: String,
        type_name: String,
        candidates: Vec<String>,
        source_location: Option<SourceLocation>,
    },

    /// No sum-type variant fits the node
    NoMatchingVariant {
        path: String,
        type_name: String,
        tried: Vec<String>,
        source_location: Option<SourceLocation>,
        message: String,
    },

    /// The decoded tree could not be turned into the target value
    Instantiation { type_name: String, message: String },

    /// A contextual placeholder could not be resolved
    Unresolved {
        path: String,
        source_location: Option<SourceLocation>,
        placeholder: String,
    },

    /// A resolver failed while answering a lookup
    ResolverError {
        path: String,
        source_location: Option<SourceLocation>,
        resolver: String,
        message: String,
    },

    /// A preprocessor rejected a node
    PreprocessorError {
        preprocessor: String,
        path: String,
        message: String,
    },

    /// A secret value failed the strength check
    WeakSecret {
        path: String,
        source_location: Option<SourceLocation>,
        reason: String,
    },

    /// A validation rule failed
    ValidationError {
        path: String,
        source_location: Option<SourceLocation>,
        value: Option<String>, // None if sensitive
        message: String,
    },

    /// A source key was not consumed by any field (strict mode)
    UnknownField {
        path: String,
        source_location: Option<SourceLocation>,
        did_you_mean: Option<String>,
    },
}

impl ConfigError {
    /// Get the configuration path that this error relates to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            ConfigError::TypeMismatch { path, .. }
            | ConfigError::MissingValue { path, .. }
            | ConfigError::NullValue { path, .. }
            | ConfigError::UnsupportedType { path, .. }
            | ConfigError::AmbiguousVariant { path, .. }
            | ConfigError::NoMatchingVariant { path, .. }
            | ConfigError::Unresolved { path, .. }
            | ConfigError::ResolverError { path, .. }
            | ConfigError::PreprocessorError { path, .. }
            | ConfigError::WeakSecret { path, .. }
            | ConfigError::ValidationError { path, .. }
            | ConfigError::UnknownField { path, .. } => Some(path),
            ConfigError::SourceError { .. }
            | ConfigError::NoSources
            | ConfigError::Instantiation { .. } => None,
        }
    }

    /// Get the source location of this error, if any.
    pub fn source_location(&self) -> Option<&SourceLocation> {
        match self {
            ConfigError::TypeMismatch {
                source_location, ..
            }
            | ConfigError::MissingValue {
                source_location, ..
            }
            | ConfigError::NullValue {
                source_location, ..
            }
            | ConfigError::AmbiguousVariant {
                source_location, ..
            }
            | ConfigError::NoMatchingVariant {
                source_location, ..
            }
            | ConfigError::Unresolved {
                source_location, ..
            }
            | ConfigError::ResolverError {
                source_location, ..
            }
            | ConfigError::WeakSecret {
                source_location, ..
            }
            | ConfigError::ValidationError {
                source_location, ..
            }
            | ConfigError::UnknownField {
                source_location, ..
            } => source_location.as_ref(),
            _ => None,
        }
    }

    /// Check if this is a validation error.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            ConfigError::ValidationError { .. } | ConfigError::WeakSecret { .. }
        )
    }

    /// Check if this error was raised while preprocessing.
    pub fn is_preprocessing_error(&self) -> bool {
        matches!(
            self,
            ConfigError::Unresolved { .. }
                | ConfigError::ResolverError { .. }
                | ConfigError::PreprocessorError { .. }
        )
    }

    /// Get a suggestion for fixing this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ConfigError::UnknownField {
                did_you_mean: Some(s),
                path,
                ..
            } => Some(format!("Change '{}' to '{}'", path, s)),
            ConfigError::MissingValue { path, .. } => {
                Some(format!("Add '{}' to your configuration", path))
            }
            ConfigError::NullValue { path, expected_type, .. } => Some(format!(
                "Provide a {} for '{}' or make the field optional",
                expected_type, path
            )),
            _ => None,
        }
    }

    /// Add context to this error for better debugging.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            ConfigError::ValidationError {
                path,
                source_location,
                value,
                message,
            } => ConfigError::ValidationError {
                path,
                source_location,
                value,
                message: format!("{} -> {}", context, message),
            },
            ConfigError::SourceError { source_name, kind } => ConfigError::SourceError {
                source_name,
                kind: kind.with_context(context),
            },
            other => other,
        }
    }
}

fn at(location: &Option<SourceLocation>) -> String {
    location
        .as_ref()
        .map(|loc| format!(" ({})", loc))
        .unwrap_or_default()
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::SourceError { source_name, kind } => {
                write!(f, "{}: {}", source_name, kind)
            }
            ConfigError::NoSources => write!(f, "no configuration sources provided"),
            ConfigError::TypeMismatch {
                path,
                source_location,
                expected_type,
                actual_value,
                message,
            } => write!(
                f,
                "'{}': expected {}, got \"{}\": {}{}",
                path,
                expected_type,
                actual_value,
                message,
                at(source_location)
            ),
            ConfigError::MissingValue {
                path,
                expected_type,
                searched_keys,
                source_location,
            } => {
                write!(f, "'{}': missing {} value", path, expected_type)?;
                if !searched_keys.is_empty() {
                    write!(f, " (tried keys: {})", searched_keys.join(", "))?;
                }
                write!(f, "{}", at(source_location))
            }
            ConfigError::NullValue {
                path,
                expected_type,
                source_location,
            } => write!(
                f,
                "'{}': null provided for non-null {}{}",
                path,
                expected_type,
                at(source_location)
            ),
            ConfigError::UnsupportedType { path, type_name } => {
                write!(f, "'{}': no decoder registered for {}", path, type_name)
            }
            ConfigError::AmbiguousVariant {
                path,
                type_name,
                candidates,
                source_location,
            } => write!(
                f,
                "'{}': ambiguous {}, candidates match equally: {}{}",
                path,
                type_name,
                candidates.join(", "),
                at(source_location)
            ),
            ConfigError::NoMatchingVariant {
                path,
                type_name,
                tried,
                source_location,
                message,
            } => write!(
                f,
                "'{}': no variant of {} matches ({}); tried {}{}",
                path,
                type_name,
                message,
                tried.join(", "),
                at(source_location)
            ),
            ConfigError::Instantiation { type_name, message } => {
                write!(f, "could not instantiate {}: {}", type_name, message)
            }
            ConfigError::Unresolved {
                path,
                source_location,
                placeholder,
            } => write!(
                f,
                "'{}': could not resolve '${{{{ {} }}}}'{}",
                path,
                placeholder,
                at(source_location)
            ),
            ConfigError::ResolverError {
                path,
                source_location,
                resolver,
                message,
            } => write!(
                f,
                "'{}': resolver '{}' failed: {}{}",
                path,
                resolver,
                message,
                at(source_location)
            ),
            ConfigError::PreprocessorError {
                preprocessor,
                path,
                message,
            } => write!(f, "'{}': preprocessor '{}' failed: {}", path, preprocessor, message),
            ConfigError::WeakSecret {
                path,
                source_location,
                reason,
            } => write!(f, "'{}': weak secret: {}{}", path, reason, at(source_location)),
            ConfigError::ValidationError {
                path,
                source_location,
                message,
                ..
            } => match source_location {
                Some(loc) => write!(f, "[{}] '{}': {}", loc, path, message),
                None => write!(f, "'{}': {}", path, message),
            },
            ConfigError::UnknownField {
                path,
                source_location,
                did_you_mean,
            } => {
                write!(f, "'{}': unknown key{}", path, at(source_location))?;
                if let Some(suggestion) = did_you_mean {
                    write!(f, "; did you mean '{}'?", suggestion)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// A non-empty collection of configuration errors.
///
/// Uses `NonEmptyVec` from stillwater to guarantee at least one error exists.
#[derive(Debug, Clone)]
pub struct ConfigErrors(pub NonEmptyVec<ConfigError>);

impl ConfigErrors {
    /// Create from a single error.
    pub fn single(error: ConfigError) -> Self {
        Self(NonEmptyVec::singleton(error))
    }

    /// Create from a non-empty vec.
    pub fn from_nonempty(errors: NonEmptyVec<ConfigError>) -> Self {
        Self(errors)
    }

    /// Try to create from a vec, returning None if empty.
    pub fn from_vec(errors: Vec<ConfigError>) -> Option<Self> {
        NonEmptyVec::from_vec(errors).map(Self)
    }

    /// Get the first error (always exists).
    pub fn first(&self) -> &ConfigError {
        self.0.head()
    }

    /// Get all errors as a slice.
    pub fn as_slice(&self) -> Vec<&ConfigError> {
        self.0.iter().collect()
    }

    /// Number of errors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty (always false, but required for API consistency).
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate over errors.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigError> {
        self.0.iter()
    }

    /// Add context to all errors.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        Self(self.0.map(|e| e.with_context(&context)))
    }

    /// Render every error grouped by the parent of its path.
    ///
    /// Errors without a path come first, then one block per parent path in
    /// order of first appearance.
    pub fn render(&self, type_name: &str) -> String {
        let mut out = format!("Could not instantiate '{}' because:\n", type_name);
        let mut groups: Vec<(String, Vec<&ConfigError>)> = Vec::new();

        for error in self.iter() {
            let parent = error.path().map(parent_path).unwrap_or_default();
            match groups.iter_mut().find(|(p, _)| *p == parent) {
                Some((_, errs)) => errs.push(error),
                None => groups.push((parent, vec![error])),
            }
        }

        for (parent, errs) in groups {
            if parent.is_empty() {
                for error in errs {
                    out.push_str(&format!("  - {}\n", error));
                }
            } else {
                out.push_str(&format!("  - '{}':\n", parent));
                for error in errs {
                    out.push_str(&format!("      - {}\n", error));
                }
            }
        }
        out
    }
}

/// Strip the last segment (`.key` or `[index]`) from a rendered path.
pub(crate) fn parent_path(path: &str) -> String {
    match path.rfind(['.', '[']) {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

impl Semigroup for ConfigErrors {
    fn combine(self, other: Self) -> Self {
        Self(self.0.combine(other.0))
    }
}

impl From<ConfigError> for ConfigErrors {
    fn from(error: ConfigError) -> Self {
        Self::single(error)
    }
}

impl IntoIterator for ConfigErrors {
    type Item = ConfigError;
    type IntoIter = std::vec::IntoIter<ConfigError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_vec().into_iter()
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration errors ({}):", self.len())?;
        for error in self.iter() {
            writeln!(f, "  {}", error)?;
        }
        Ok(())
    }
}

/// The standard validation result type for cairn.
pub type ConfigValidation<T> = Validation<T, ConfigErrors>;

/// Extension trait for creating failing validations easily.
pub trait ConfigValidationExt<T> {
    /// Create a failing validation with a single error.
    fn fail_with(error: ConfigError) -> ConfigValidation<T>;

    /// Convert into a `Result`, keeping every accumulated error.
    fn into_result(self) -> Result<T, ConfigErrors>;
}

impl<T> ConfigValidationExt<T> for ConfigValidation<T> {
    fn fail_with(error: ConfigError) -> ConfigValidation<T> {
        Validation::Failure(ConfigErrors::single(error))
    }

    fn into_result(self) -> Result<T, ConfigErrors> {
        match self {
            Validation::Success(value) => Ok(value),
            Validation::Failure(errors) => Err(errors),
        }
    }
}

/// The "load or throw" failure: every accumulated error for one target type.
#[derive(Debug, Clone)]
pub struct LoadError {
    type_name: String,
    errors: ConfigErrors,
}

impl LoadError {
    /// Wrap the accumulated errors of a failed load of `type_name`.
    pub fn new(type_name: impl Into<String>, errors: ConfigErrors) -> Self {
        Self {
            type_name: type_name.into(),
            errors,
        }
    }

    /// Name of the type that failed to load.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The accumulated errors.
    pub fn errors(&self) -> &ConfigErrors {
        &self.errors
    }

    /// Consume and return the accumulated errors.
    pub fn into_errors(self) -> ConfigErrors {
        self.errors
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.errors.render(&self.type_name))
    }
}

impl std::error::Error for LoadError {}
