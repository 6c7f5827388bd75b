//! Legacy `${key}` / `${key:-default}` placeholders.

use std::sync::OnceLock;

use regex::Regex;
use stillwater::Validation;

use super::{map_strings, rewritten, PreprocessContext, Preprocessor};
use crate::error::ConfigValidation;
use crate::node::Node;

fn pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$\{([^{}]+)\}").ok())
        .as_ref()
}

/// Where a placeholder key is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Environment variable, as written and then as `UPPER_SNAKE`.
    Env,
    SystemProperty,
    /// Another path of the same tree.
    Document,
}

/// Replaces `${key}` with the first lookup that answers, `${key:-fallback}`
/// with the fallback when none does, and leaves anything else untouched.
///
/// `${random.*}` is left to [`RandomPreprocessor`](super::RandomPreprocessor).
#[derive(Debug, Clone)]
pub struct PlaceholderPreprocessor {
    lookups: Vec<Lookup>,
}

impl PlaceholderPreprocessor {
    pub fn new() -> Self {
        Self::with_lookups(vec![Lookup::Env, Lookup::SystemProperty, Lookup::Document])
    }

    pub fn with_lookups(lookups: Vec<Lookup>) -> Self {
        Self { lookups }
    }

    fn lookup(&self, key: &str, ctx: &PreprocessContext<'_>) -> Option<String> {
        self.lookups.iter().find_map(|lookup| match lookup {
            Lookup::Env => ctx
                .env
                .get_env(key)
                .or_else(|| ctx.env.get_env(&key.replace(['.', '-'], "_").to_uppercase())),
            Lookup::SystemProperty => ctx.env.system_property(key),
            Lookup::Document => ctx.root.lookup(key).scalar_text(),
        })
    }

    fn substitute(&self, text: &str, ctx: &PreprocessContext<'_>) -> String {
        let Some(pattern) = pattern() else {
            return text.to_string();
        };
        pattern
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let whole = caps[0].to_string();
                let inner = caps[1].trim();
                if inner.starts_with("random.") {
                    return whole;
                }
                let (key, default) = match inner.split_once(":-") {
                    Some((key, default)) => (key.trim(), Some(default)),
                    None => (inner, None),
                };
                self.lookup(key, ctx)
                    .or_else(|| default.map(String::from))
                    .unwrap_or(whole)
            })
            .into_owned()
    }
}

impl Default for PlaceholderPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for PlaceholderPreprocessor {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn process(&self, node: &Node, ctx: &PreprocessContext<'_>) -> ConfigValidation<Node> {
        map_strings(node, &|text, leaf| {
            if !text.contains("${") {
                return Validation::Success(None);
            }
            let replaced = self.substitute(text, ctx);
            if replaced == text {
                Validation::Success(None)
            } else {
                Validation::Success(Some(rewritten(leaf, replaced)))
            }
        })
    }
}
