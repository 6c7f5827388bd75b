//! Convenient re-exports for common cairn usage.
//!
//! ```ignore
//! use cairn::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize, Describe)]
//! struct AppConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! let config = Config::<AppConfig>::builder()
//!     .source(Env::prefix("APP_"))
//!     .source(File::new("config.toml").optional())
//!     .validator(|c: &AppConfig| {
//!         if c.port > 0 {
//!             Validation::Success(())
//!         } else {
//!             ConfigValidation::fail_with(ConfigError::ValidationError {
//!                 path: "port".to_string(),
//!                 source_location: None,
//!                 value: Some(c.port.to_string()),
//!                 message: "port must be positive".to_string(),
//!             })
//!         }
//!     })
//!     .build()?;
//! ```

// ============================================================================
// Stillwater re-exports
// ============================================================================

/// Result type with error accumulation. Use `Validation::all()` to combine
/// multiple validations and collect ALL errors.
pub use stillwater::Validation;

/// `ConfigErrors` implements this for error accumulation.
pub use stillwater::Semigroup;

/// Underlying type for `ConfigErrors`.
pub use stillwater::NonEmptyVec;

// ============================================================================
// Errors
// ============================================================================

pub use crate::error::{
    ConfigError, ConfigErrors, ConfigValidation, ConfigValidationExt, LoadError, SourceErrorKind,
    SourceLocation,
};

// ============================================================================
// Loading
// ============================================================================

pub use crate::config::{Config, ConfigBuilder};
pub use crate::report::{ConfigReport, ReportedConfig};

/// Hot-reloadable configuration (requires `watch` feature).
#[cfg(feature = "watch")]
pub use crate::watch::{ConfigEvent, ConfigWatcher, WatchedConfig};

// ============================================================================
// Sources
// ============================================================================

pub use crate::source::{PropertySource, SourceContext};
pub use crate::sources::{Defaults, Env, File, PartialDefaults, SystemProperties};

// ============================================================================
// Environment abstractions
// ============================================================================

pub use crate::env::{ConfigEnv, MockEnv, RealEnv};

// ============================================================================
// Extension points
// ============================================================================

pub use crate::decoder::{Decoder, DecoderContext};
pub use crate::describe::{Describe, TypeDesc};
pub use crate::mapper::ParameterMapper;
pub use crate::node::{DotPath, Node};
pub use crate::preprocess::{
    ContextResolver, ContextResolverMode, InMemorySecretStore, SecretStore, SecretStoreResolver,
};
pub use crate::resolver::Resolver;
pub use crate::secret::{Obfuscator, Secret, SecretPolicy};

// ============================================================================
// Pretty printing
// ============================================================================

/// Provides `unwrap_or_exit()` for CLI applications.
pub use crate::pretty::{ColorChoice, Grouping, PrettyOptions, UnwrapOrExit};

/// Derive macro for [`Describe`] (requires `derive` feature).
#[cfg(feature = "derive")]
pub use cairn_derive::Describe;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_validation_all_vec_accumulates_errors() {
        let v1: ConfigValidation<i32> = Validation::Failure(ConfigErrors::single(ConfigError::NoSources));
        let v2: ConfigValidation<i32> = Validation::Failure(ConfigErrors::single(ConfigError::NullValue {
            path: "host".to_string(),
            expected_type: "String".to_string(),
            source_location: None,
        }));

        match Validation::all_vec(vec![v1, v2]) {
            Validation::Failure(errors) => assert_eq!(errors.len(), 2),
            Validation::Success(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn test_prelude_semigroup_combine() {
        let e1 = ConfigErrors::single(ConfigError::NoSources);
        let e2 = ConfigErrors::single(ConfigError::NoSources);
        assert_eq!(e1.combine(e2).len(), 2);
    }

    #[test]
    fn test_prelude_source_location_available() {
        let loc = SourceLocation::new("config.toml");
        assert_eq!(loc.source, "config.toml");
    }
}
