//! Environment variable source.
//!
//! # Example
//!
//! ```ignore
//! use cairn::{Config, Env};
//!
//! // APP_DATABASE_HOST -> database.host
//! let config = Config::<AppConfig>::builder()
//!     .source(Env::prefix("APP_"))
//!     .build()?;
//!
//! // APP__DATABASE__POOL_SIZE -> database.pool_size
//! let config = Config::<AppConfig>::builder()
//!     .source(Env::prefix("APP__").separator("__"))
//!     .build()?;
//! ```

use std::collections::{BTreeMap, BTreeSet};

use stillwater::Validation;

use crate::error::{ConfigError, ConfigErrors, ConfigValidation, SourceLocation};
use crate::node::{DotPath, Node, NodeInfo};
use crate::source::{PropertySource, SourceContext};

/// Environment variable configuration source.
///
/// Values stay strings; decoders convert them to the target type, so
/// `APP_PORT=8080` works for both `u16` and `String` fields.
#[derive(Debug, Clone)]
pub struct Env {
    prefix: String,
    separator: String,
    list_separator: Option<String>,
    custom_mappings: BTreeMap<String, String>,
    excluded: BTreeSet<String>,
    required: Vec<String>,
}

impl Env {
    /// Create env source with given prefix.
    ///
    /// Variables matching the prefix are included and the prefix is stripped
    /// before mapping to a config path.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: "_".to_string(),
            list_separator: None,
            custom_mappings: BTreeMap::new(),
            excluded: BTreeSet::new(),
            required: Vec::new(),
        }
    }

    /// Create env source without prefix (every variable).
    pub fn all() -> Self {
        Self::prefix("")
    }

    /// Set the separator that splits variable names into path segments.
    ///
    /// Default is `_`.
    pub fn separator(mut self, sep: impl Into<String>) -> Self {
        self.separator = sep.into();
        self
    }

    /// Map a variable suffix (the part after the prefix) to an explicit path.
    ///
    /// ```ignore
    /// let source = Env::prefix("APP_").map("DB_HOST", "database.host");
    /// // APP_DB_HOST -> database.host (instead of db.host)
    /// ```
    pub fn map(mut self, env_suffix: impl Into<String>, path: impl Into<String>) -> Self {
        self.custom_mappings.insert(env_suffix.into(), path.into());
        self
    }

    /// Exclude a variable by its full name.
    pub fn exclude(mut self, var: impl Into<String>) -> Self {
        self.excluded.insert(var.into());
        self
    }

    /// Split values containing this separator into lists.
    ///
    /// ```ignore
    /// let source = Env::prefix("APP_").list_separator(",");
    /// // APP_ALLOWED_HOSTS=a.com,b.com -> ["a.com", "b.com"]
    /// ```
    pub fn list_separator(mut self, sep: impl Into<String>) -> Self {
        self.list_separator = Some(sep.into());
        self
    }

    /// Require a variable (suffix after the prefix) to be set.
    ///
    /// Every missing required variable is reported, not only the first.
    pub fn require(mut self, suffix: impl Into<String>) -> Self {
        self.required.push(suffix.into());
        self
    }

    /// Require several variables at once.
    pub fn require_all(mut self, suffixes: &[&str]) -> Self {
        self.required.extend(suffixes.iter().map(|s| s.to_string()));
        self
    }

    fn path_for(&self, suffix: &str) -> Vec<String> {
        match self.custom_mappings.get(suffix) {
            Some(mapped) => mapped.split('.').map(String::from).collect(),
            None => suffix_to_path(suffix, &self.separator),
        }
    }

    fn leaf(&self, var: &str, value: &str) -> Node {
        let info = NodeInfo::at(DotPath::root(), SourceLocation::env(var));
        match &self.list_separator {
            Some(sep) if value.contains(sep.as_str()) => {
                let items = value
                    .split(sep.as_str())
                    .map(|item| Node::string(item.trim(), info.clone()))
                    .collect();
                Node::list(items, info)
            }
            _ => Node::string(value, info),
        }
    }
}

impl PropertySource for Env {
    fn node(&self, ctx: &SourceContext<'_>) -> ConfigValidation<Node> {
        let vars = if self.prefix.is_empty() {
            ctx.env.all_env_vars()
        } else {
            ctx.env.env_vars_with_prefix(&self.prefix)
        };

        let missing: Vec<ConfigError> = self
            .required
            .iter()
            .filter(|suffix| {
                let full = format!("{}{}", self.prefix, suffix);
                !vars.iter().any(|(k, _)| *k == full)
            })
            .map(|suffix| {
                let full = format!("{}{}", self.prefix, suffix);
                ConfigError::MissingValue {
                    path: DotPath::parse(&self.path_for(suffix).join(".")).to_string(),
                    expected_type: "environment variable".to_string(),
                    searched_keys: vec![full.clone()],
                    source_location: Some(SourceLocation::env(&full)),
                }
            })
            .collect();
        if let Some(errors) = ConfigErrors::from_vec(missing) {
            return Validation::Failure(errors);
        }

        let mut root = Node::Undefined;
        for (var, value) in vars {
            if self.excluded.contains(&var) {
                continue;
            }
            let Some(suffix) = var.strip_prefix(&self.prefix) else {
                continue;
            };
            let keys = self.path_for(suffix);
            if keys.is_empty() {
                continue;
            }
            root.insert_at(&keys, self.leaf(&var, &value), &DotPath::root());
        }
        Validation::Success(root)
    }

    fn source(&self) -> String {
        if self.prefix.is_empty() {
            "environment".to_string()
        } else {
            format!("environment ({}*)", self.prefix)
        }
    }
}

/// Convert a variable suffix to path keys: `DATABASE_HOST` -> `[database, host]`.
///
/// Empty segments are dropped.
fn suffix_to_path(suffix: &str, separator: &str) -> Vec<String> {
    suffix
        .split(separator)
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MockEnv;
    use crate::error::ConfigValidationExt;
    use crate::parsers::ParserRegistry;
    use serde_json::json;

    fn load(source: &Env, env: &MockEnv) -> ConfigValidation<Node> {
        let parsers = ParserRegistry::empty();
        source.node(&SourceContext::new(&parsers, env))
    }

    #[test]
    fn test_env_basic_prefix() {
        let env = MockEnv::new()
            .with_env("APP_HOST", "localhost")
            .with_env("APP_PORT", "8080")
            .with_env("OTHER_VAR", "ignored");

        let node = load(&Env::prefix("APP_"), &env).into_result().unwrap();
        assert_eq!(node.to_json(), json!({"host": "localhost", "port": "8080"}));
        assert_eq!(
            node.get("port").pos().map(|p| p.source.as_str()),
            Some("env:APP_PORT")
        );
    }

    #[test]
    fn test_env_nested_paths() {
        let env = MockEnv::new()
            .with_env("APP_DATABASE_HOST", "localhost")
            .with_env("APP_DATABASE_POOL_SIZE", "10");

        let node = load(&Env::prefix("APP_"), &env).into_result().unwrap();
        assert_eq!(node.lookup("database.host").as_str(), Some("localhost"));
        assert_eq!(node.lookup("database.pool.size").as_str(), Some("10"));
        assert_eq!(
            node.lookup("database.pool.size").path().to_string(),
            "database.pool.size"
        );
    }

    #[test]
    fn test_env_custom_separator_keeps_single_underscores() {
        let env = MockEnv::new().with_env("APP__DATABASE__POOL_SIZE", "10");
        let node = load(&Env::prefix("APP__").separator("__"), &env)
            .into_result()
            .unwrap();
        assert_eq!(node.lookup("database.pool_size").as_str(), Some("10"));
    }

    #[test]
    fn test_env_custom_mapping_and_exclusion() {
        let env = MockEnv::new()
            .with_env("APP_DB_HOST", "db.internal")
            .with_env("APP_SECRET", "hidden");

        let source = Env::prefix("APP_")
            .map("DB_HOST", "database.host")
            .exclude("APP_SECRET");
        let node = load(&source, &env).into_result().unwrap();
        assert_eq!(node.to_json(), json!({"database": {"host": "db.internal"}}));
    }

    #[test]
    fn test_env_list_separator() {
        let env = MockEnv::new().with_env("APP_HOSTS", "a.com, b.com");
        let node = load(&Env::prefix("APP_").list_separator(","), &env)
            .into_result()
            .unwrap();
        assert_eq!(node.get("hosts").to_json(), json!(["a.com", "b.com"]));
    }

    #[test]
    fn test_env_no_matches_is_undefined() {
        let env = MockEnv::new().with_env("OTHER", "x");
        let node = load(&Env::prefix("APP_"), &env).into_result().unwrap();
        assert!(!node.is_defined());
    }

    #[test]
    fn test_env_required_accumulates() {
        let env = MockEnv::new().with_env("APP_PORT", "5432");
        let source = Env::prefix("APP_").require_all(&["APIKEY", "DATABASE_URL", "PORT"]);
        let errors = load(&source, &env).into_result().unwrap_err();
        assert_eq!(errors.len(), 2);
        let paths: Vec<_> = errors.iter().filter_map(|e| e.path()).collect();
        assert_eq!(paths, vec!["apikey", "database.url"]);
        assert!(matches!(
            errors.first(),
            ConfigError::MissingValue { source_location: Some(loc), .. } if loc.source == "env:APP_APIKEY"
        ));
    }
}
