//! Built-in context resolvers.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use stillwater::Validation;

use super::context::ContextResolver;
use super::random::random_value;
use super::PreprocessContext;
use crate::error::ConfigValidation;
use crate::node::Node;

/// `env`, `sysprop`, `ref`, `random` and `system`.
pub fn default_context_resolvers() -> Vec<Arc<dyn ContextResolver>> {
    vec![
        Arc::new(EnvContextResolver),
        Arc::new(SysPropContextResolver),
        Arc::new(RefContextResolver),
        Arc::new(RandomContextResolver),
        Arc::new(SystemContextResolver),
    ]
}

/// `${{ env:NAME }}`
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvContextResolver;

impl ContextResolver for EnvContextResolver {
    fn context_key(&self) -> &str {
        "env"
    }

    fn lookup(&self, path: &str, _node: &Node, ctx: &PreprocessContext<'_>) -> ConfigValidation<Option<String>> {
        Validation::Success(ctx.env.get_env(path))
    }
}

/// `${{ sysprop:name }}`
#[derive(Debug, Clone, Copy, Default)]
pub struct SysPropContextResolver;

impl ContextResolver for SysPropContextResolver {
    fn context_key(&self) -> &str {
        "sysprop"
    }

    fn lookup(&self, path: &str, _node: &Node, ctx: &PreprocessContext<'_>) -> ConfigValidation<Option<String>> {
        Validation::Success(ctx.env.system_property(path))
    }
}

/// `${{ ref:other.path }}`: the text of another leaf in the same tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefContextResolver;

impl ContextResolver for RefContextResolver {
    fn context_key(&self) -> &str {
        "ref"
    }

    fn lookup(&self, path: &str, _node: &Node, ctx: &PreprocessContext<'_>) -> ConfigValidation<Option<String>> {
        let path = path.trim_start_matches('.');
        Validation::Success(ctx.root.lookup(path).scalar_text())
    }
}

/// `${{ random:int }}`, `${{ random:string(8) }}` and the other
/// `${random.*}` kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomContextResolver;

impl ContextResolver for RandomContextResolver {
    fn context_key(&self) -> &str {
        "random"
    }

    fn lookup(&self, path: &str, _node: &Node, _ctx: &PreprocessContext<'_>) -> ConfigValidation<Option<String>> {
        let (kind, arg) = match path.split_once('(') {
            Some((kind, rest)) => (kind, rest.trim_end_matches(')').trim().parse().ok()),
            None => (path, None),
        };
        Validation::Success(random_value(kind.trim(), arg))
    }
}

/// Facts about the running host: `hostname`, `user`, `os`, `arch`,
/// `family`, `processors`, `pid`, `cwd`, `timestamp` (epoch millis).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemContextResolver;

impl ContextResolver for SystemContextResolver {
    fn context_key(&self) -> &str {
        "system"
    }

    fn lookup(&self, path: &str, _node: &Node, ctx: &PreprocessContext<'_>) -> ConfigValidation<Option<String>> {
        let value = match path {
            "hostname" => ctx
                .env
                .get_env("HOSTNAME")
                .or_else(|| ctx.env.get_env("COMPUTERNAME"))
                .or_else(|| {
                    ctx.env
                        .read_file(Path::new("/etc/hostname"))
                        .ok()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                }),
            "user" => ctx.env.get_env("USER").or_else(|| ctx.env.get_env("USERNAME")),
            "os" => Some(std::env::consts::OS.to_string()),
            "arch" => Some(std::env::consts::ARCH.to_string()),
            "family" => Some(std::env::consts::FAMILY.to_string()),
            "processors" => std::thread::available_parallelism()
                .ok()
                .map(|n| n.to_string()),
            "pid" => Some(std::process::id().to_string()),
            "cwd" => std::env::current_dir()
                .ok()
                .map(|p| p.display().to_string()),
            "timestamp" => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_millis().to_string()),
            _ => None,
        };
        Validation::Success(value)
    }
}

/// `${{ manifest:version }}` and friends, from package metadata.
///
/// Not active by default. Build one with [`manifest_resolver!`](crate::manifest_resolver)
/// to capture the calling crate's `Cargo.toml` fields at compile time.
#[derive(Debug, Clone, Default)]
pub struct ManifestResolver {
    entries: BTreeMap<String, String>,
}

impl ManifestResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; empty values are skipped.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.entries.insert(key.into(), value);
        }
        self
    }
}

impl ContextResolver for ManifestResolver {
    fn context_key(&self) -> &str {
        "manifest"
    }

    fn is_default(&self) -> bool {
        false
    }

    fn lookup(&self, path: &str, _node: &Node, _ctx: &PreprocessContext<'_>) -> ConfigValidation<Option<String>> {
        Validation::Success(self.entries.get(path).cloned())
    }
}

/// A [`ManifestResolver`] for the crate this macro is expanded in.
///
/// ```
/// let resolver = cairn::manifest_resolver!();
/// ```
#[macro_export]
macro_rules! manifest_resolver {
    () => {
        $crate::preprocess::ManifestResolver::new()
            .with("name", env!("CARGO_PKG_NAME"))
            .with("version", env!("CARGO_PKG_VERSION"))
            .with("description", env!("CARGO_PKG_DESCRIPTION"))
            .with("authors", env!("CARGO_PKG_AUTHORS"))
            .with("repository", env!("CARGO_PKG_REPOSITORY"))
            .with("homepage", env!("CARGO_PKG_HOMEPAGE"))
            .with("license", env!("CARGO_PKG_LICENSE"))
    };
}
