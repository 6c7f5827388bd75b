//! Derive macro for cairn type descriptors.
//!
//! `#[derive(Describe)]` generates `cairn::describe::Describe` so a type can
//! be loaded with `Config::<T>::builder()`. The generated descriptor follows
//! the type's serde attributes, so decoding produces exactly the shape the
//! `Deserialize` impl expects.
//!
//! # Basic Usage
//!
//! ```ignore
//! use cairn::Describe;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, Describe)]
//! #[serde(rename_all = "kebab-case")]
//! struct Database {
//!     host: String,
//!     #[serde(default = "default_port")]
//!     port: u16,
//!     #[config(alias = "pwd", secret)]
//!     password: cairn::Secret,
//! }
//! ```
//!
//! # Attributes
//!
//! ## Fields
//! - `#[config(alias = "name")]` - extra source key, repeatable
//! - `#[config(secret)]` - treat the value as a secret in reports
//! - `#[serde(rename = "..")]`, `#[serde(alias = "..")]`
//! - `#[serde(default)]` / `#[serde(default = "path")]` - the field may be absent
//! - `#[serde(skip)]` / `#[serde(skip_deserializing)]` - not read from sources
//!
//! ## Containers
//! - `#[serde(rename_all = "..")]`, `#[serde(rename = "..")]`, `#[serde(default)]`
//! - `#[serde(transparent)]` on single-field structs
//! - `#[config(discriminator = "type")]` on enums - pick the variant by key
//!
//! Enums whose variants carry no data become plain enums; any other enum is a
//! sum type, externally tagged the way serde reads it.

extern crate proc_macro;

mod codegen;
mod parse;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derive `cairn::describe::Describe` for a struct or enum.
#[proc_macro_derive(Describe, attributes(config))]
pub fn derive_describe(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match codegen::derive_describe(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
