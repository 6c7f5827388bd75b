// Allow large error types - detailed config errors are expected
#![allow(clippy::result_large_err)]

//! Cairn: typed configuration loading.
//!
//! Cairn reads configuration from layered sources, resolves placeholders and
//! decodes the merged tree into your types. Every problem is reported at once:
//! a missing key, a bad port and an unresolvable `${{ vault:... }}` in the
//! same run all surface together, each with its path and source position.
//!
//! # Quick Start
//!
//! ```ignore
//! use cairn::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize, Describe)]
//! struct AppConfig {
//!     host: String,
//!     #[serde(default)]
//!     port: u16,
//!     #[config(secret)]
//!     api_key: Secret,
//! }
//!
//! fn main() -> Result<(), LoadError> {
//!     let config = Config::<AppConfig>::builder()
//!         .source(Env::prefix("APP_"))
//!         .source(File::new("config.toml"))
//!         .build()?;
//!
//!     println!("Running on {}:{}", config.host, config.port);
//!     Ok(())
//! }
//! ```
//!
//! # Pipeline
//!
//! 1. Every [`PropertySource`] produces a positioned [`Node`] tree.
//! 2. The trees are merged, earlier sources taking precedence key by key.
//! 3. Preprocessors rewrite string leaves (`${VAR:-default}`,
//!    `${random.uuid}`, `${{ env:HOME }}`) until nothing changes.
//! 4. Decoders walk the tree against the target's [`TypeDesc`], collecting
//!    every failure.
//! 5. The decoded value is instantiated with serde and checked by any
//!    registered validators.
//!
//! # Module Structure
//!
//! - [`prelude`]: Convenient re-exports for common usage
//! - [`config`]: `Config` and `ConfigBuilder`
//! - [`error`]: `ConfigError`, `ConfigErrors`, `ConfigValidation`, `LoadError`
//! - [`node`]: the intermediate tree and its paths
//! - [`source`] / [`sources`]: property sources
//! - [`parsers`]: file formats
//! - [`preprocess`]: placeholder and context resolution
//! - [`decoder`] / [`describe`]: typed decoding
//! - [`secret`] / [`report`]: secrets and the audit report
//! - [`mod@env`]: `ConfigEnv` and `MockEnv` for testing

// Lets `#[derive(Describe)]` expand to `::cairn::...` paths inside this crate.
extern crate self as cairn;

pub mod config;
pub mod decoder;
pub mod describe;
pub mod env;
pub mod error;
pub mod mapper;
pub mod merge;
pub mod node;
pub mod parsers;
pub mod prelude;
pub mod preprocess;
pub mod pretty;
pub mod report;
pub mod resolver;
pub mod secret;
pub mod source;
pub mod sources;
#[cfg(feature = "watch")]
pub mod watch;

pub use config::{Config, ConfigBuilder};
pub use decoder::{Decoder, DecoderContext, DecoderRegistry};
pub use describe::{Describe, FieldDesc, RecordDesc, SumDesc, TypeDesc, VariantDesc, VariantShape};
pub use env::{ConfigEnv, MockEnv, RealEnv};
pub use error::{
    ConfigError, ConfigErrors, ConfigValidation, ConfigValidationExt, LoadError, SourceErrorKind,
    SourceLocation,
};
pub use mapper::ParameterMapper;
pub use node::{DotPath, Node, NodeInfo};
pub use preprocess::{ContextResolver, ContextResolverMode, Preprocessor};
pub use pretty::{ColorChoice, Grouping, PrettyOptions, UnwrapOrExit};
pub use report::{ConfigReport, ReportedConfig};
pub use resolver::Resolver;
pub use secret::Secret;
pub use source::{PropertySource, SourceContext};
pub use sources::{Defaults, Env, File, PartialDefaults, SystemProperties};

#[cfg(feature = "watch")]
pub use watch::{ConfigEvent, ConfigWatcher, WatchedConfig};

pub use stillwater::{NonEmptyVec, Semigroup, Validation};

#[cfg(feature = "derive")]
pub use cairn_derive::Describe;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let _: ConfigValidation<()> = Validation::Success(());
        let _ = DotPath::root();
    }
}
