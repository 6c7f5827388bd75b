//! Contextual `${{ namespace:path }}` placeholders.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use stillwater::Validation;

use super::{map_strings, rewritten, PreprocessContext, Preprocessor};
use crate::error::{ConfigError, ConfigErrors, ConfigValidation};
use crate::node::Node;

fn pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$\{\{\s*([^}]*?)\s*\}\}").ok())
        .as_ref()
}

/// What happens to a placeholder nobody can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextResolverMode {
    /// Keep the literal text and record a warning.
    #[default]
    SkipUnresolved,
    /// Fail the load, naming the placeholder.
    ErrorOnUnresolved,
}

/// Answers lookups for one namespace.
///
/// `Ok(None)` means "not found", which the mode decides about; a failure is
/// always a hard error.
pub trait ContextResolver: Send + Sync {
    /// The namespace before the first `:`.
    fn context_key(&self) -> &str;

    /// Active without being registered explicitly.
    fn is_default(&self) -> bool {
        true
    }

    /// Values from this resolver are secrets.
    fn marks_secret(&self) -> bool {
        false
    }

    fn lookup(&self, path: &str, node: &Node, ctx: &PreprocessContext<'_>) -> ConfigValidation<Option<String>>;
}

/// Dispatches `${{ ns:path }}` to the resolver registered for `ns`.
pub struct ContextResolverPreprocessor {
    resolvers: Vec<Arc<dyn ContextResolver>>,
    mode: ContextResolverMode,
}

impl ContextResolverPreprocessor {
    pub fn new(resolvers: Vec<Arc<dyn ContextResolver>>, mode: ContextResolverMode) -> Self {
        Self { resolvers, mode }
    }

    pub fn mode(&self) -> ContextResolverMode {
        self.mode
    }

    fn resolver(&self, key: &str) -> Option<&Arc<dyn ContextResolver>> {
        // Later registrations override earlier ones.
        self.resolvers.iter().rev().find(|r| r.context_key() == key)
    }

    fn rewrite(&self, pattern: &Regex, text: &str, leaf: &Node, ctx: &PreprocessContext<'_>) -> ConfigValidation<Option<Node>> {
        let path = leaf.path().to_string();
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut errors = Vec::new();
        let mut secret = false;
        let mut used: Vec<String> = Vec::new();

        for caps in pattern.captures_iter(text) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            last = whole.end();

            let inner = inner.as_str();
            let (namespace, key) = match inner.split_once(':') {
                Some((ns, key)) => (ns.trim(), key.trim()),
                None => (inner.trim(), ""),
            };
            let answer = match self.resolver(namespace) {
                Some(resolver) => match resolver.lookup(key, leaf, ctx) {
                    Validation::Success(Some(value)) => {
                        secret |= resolver.marks_secret();
                        Some(value)
                    }
                    Validation::Success(None) => None,
                    Validation::Failure(failures) => {
                        errors.extend(failures);
                        out.push_str(whole.as_str());
                        continue;
                    }
                },
                None => None,
            };

            match answer {
                Some(value) => {
                    ctx.reporter.record(&path, namespace, format!("resolved '{}'", inner));
                    if !used.iter().any(|u| u == namespace) {
                        used.push(namespace.to_string());
                    }
                    out.push_str(&value);
                }
                None => {
                    match self.mode {
                        ContextResolverMode::SkipUnresolved => {
                            tracing::warn!(path = %path, placeholder = inner, "could not resolve placeholder, keeping it");
                            ctx.reporter.warn(&path, namespace, format!("could not resolve '{}'", inner));
                        }
                        ContextResolverMode::ErrorOnUnresolved => errors.push(ConfigError::Unresolved {
                            path: path.clone(),
                            source_location: leaf.pos().cloned(),
                            placeholder: inner.to_string(),
                        }),
                    }
                    out.push_str(whole.as_str());
                }
            }
        }
        out.push_str(&text[last..]);

        if let Some(errors) = ConfigErrors::from_vec(errors) {
            return Validation::Failure(errors);
        }
        if out == text {
            return Validation::Success(None);
        }
        let mut node = rewritten(leaf, out);
        if !used.is_empty() {
            node = node.with_meta("resolver", used.join(","));
        }
        if secret {
            ctx.reporter.mark_secret(&path);
            node = node.with_meta("secret", "true");
        }
        Validation::Success(Some(node))
    }
}

impl Preprocessor for ContextResolverPreprocessor {
    fn name(&self) -> &str {
        "context-resolver"
    }

    fn process(&self, node: &Node, ctx: &PreprocessContext<'_>) -> ConfigValidation<Node> {
        let Some(pattern) = pattern() else {
            return Validation::Success(node.clone());
        };
        map_strings(node, &|text, leaf| {
            if !text.contains("${{") {
                return Validation::Success(None);
            }
            self.rewrite(pattern, text, leaf, ctx)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MockEnv;
    use crate::node::DotPath;
    use crate::preprocess::{EnvContextResolver, RefContextResolver};
    use crate::report::Reporter;
    use serde_json::json;

    #[test]
    fn test_pattern_compiles() {
        assert!(pattern().is_some());
    }

    fn preprocessor(mode: ContextResolverMode) -> ContextResolverPreprocessor {
        ContextResolverPreprocessor::new(
            vec![Arc::new(EnvContextResolver), Arc::new(RefContextResolver)],
            mode,
        )
    }

    fn run(mode: ContextResolverMode, env: &MockEnv, value: serde_json::Value) -> (ConfigValidation<Node>, Reporter) {
        let root = Node::from_json(&value, "test", DotPath::root());
        let reporter = Reporter::new();
        let result = {
            let ctx = PreprocessContext {
                root: &root,
                env,
                reporter: &reporter,
            };
            preprocessor(mode).process(&root, &ctx)
        };
        (result, reporter)
    }

    #[test]
    fn test_resolves_env_and_ref() {
        let env = MockEnv::new().with_env("HOST", "db.local");
        let (result, reporter) = run(
            ContextResolverMode::ErrorOnUnresolved,
            &env,
            json!({"url": "pg://${{ env:HOST }}:${{ref:port}}", "port": 5432}),
        );
        let node = match result {
            Validation::Success(node) => node,
            Validation::Failure(e) => panic!("{}", e),
        };
        assert_eq!(node.lookup("url").as_str(), Some("pg://db.local:5432"));
        assert_eq!(node.lookup("url").meta("resolver"), Some("env,ref"));
        assert_eq!(reporter.events().len(), 2);
    }

    #[test]
    fn test_skip_mode_keeps_literal() {
        let env = MockEnv::new();
        let (result, reporter) = run(
            ContextResolverMode::SkipUnresolved,
            &env,
            json!({"a": "${{ ref:missing }}", "b": "${{ vault:x }}"}),
        );
        match result {
            Validation::Success(node) => {
                assert_eq!(node.lookup("a").as_str(), Some("${{ ref:missing }}"));
                assert_eq!(node.lookup("b").as_str(), Some("${{ vault:x }}"));
            }
            Validation::Failure(e) => panic!("{}", e),
        }
        assert_eq!(reporter.warnings().len(), 2);
    }

    #[test]
    fn test_error_mode_collects_every_placeholder() {
        let env = MockEnv::new();
        let (result, _) = run(
            ContextResolverMode::ErrorOnUnresolved,
            &env,
            json!({"a": "${{ ref:missing }}", "b": ["${{ env:NOPE }}"]}),
        );
        match result {
            Validation::Failure(errors) => {
                assert_eq!(errors.len(), 2);
                let text = errors.to_string();
                assert!(text.contains("ref:missing"));
                assert!(text.contains("env:NOPE"));
            }
            Validation::Success(_) => panic!("expected failure"),
        }
    }
}
