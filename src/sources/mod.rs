//! Built-in property sources.

mod defaults;
mod env_source;
mod file;
mod sysprop;

pub use defaults::{Defaults, PartialDefaults};
pub use env_source::Env;
pub use file::File;
pub use sysprop::{SystemProperties, DEFAULT_PROPERTY_PREFIX};
