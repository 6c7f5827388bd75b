//! Preprocessing: string rewriting between merge and decode.
//!
//! Each [`Preprocessor`] receives the whole merged tree and returns a new one.
//! [`run`] applies the configured preprocessors in order, repeating the
//! sequence until a pass changes nothing or the iteration bound is reached.
//! The bound is part of the contract: a chain of references deeper than the
//! bound leaves its innermost placeholder as literal text.

mod context;
mod placeholder;
mod random;
mod resolvers;
mod secrets;

use std::sync::Arc;

use stillwater::{Semigroup, Validation};

use crate::env::ConfigEnv;
use crate::error::{ConfigErrors, ConfigValidation};
use crate::node::Node;
use crate::report::Reporter;

pub use context::{ContextResolver, ContextResolverMode, ContextResolverPreprocessor};
pub use placeholder::{Lookup, PlaceholderPreprocessor};
pub use random::{random_value, RandomPreprocessor};
pub use resolvers::{
    default_context_resolvers, EnvContextResolver, ManifestResolver, RandomContextResolver,
    RefContextResolver, SysPropContextResolver, SystemContextResolver,
};
pub use secrets::{InMemorySecretStore, SecretStore, SecretStoreResolver, StoreError};

/// Default number of preprocessing passes.
pub const DEFAULT_ITERATIONS: usize = 5;

/// What a preprocessor can see besides the node itself.
pub struct PreprocessContext<'a> {
    /// The tree as it stood when this preprocessor was invoked.
    pub root: &'a Node,
    pub env: &'a dyn ConfigEnv,
    pub reporter: &'a Reporter,
}

/// A whole-tree rewriting pass.
pub trait Preprocessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, node: &Node, ctx: &PreprocessContext<'_>) -> ConfigValidation<Node>;
}

/// Apply `preprocessors` to `tree` at most `iterations` times.
pub fn run(
    tree: Node,
    preprocessors: &[Arc<dyn Preprocessor>],
    iterations: usize,
    env: &dyn ConfigEnv,
    reporter: &Reporter,
) -> ConfigValidation<Node> {
    let mut current = tree;
    for pass in 1..=iterations {
        let mut next = current.clone();
        let mut failed: Option<ConfigErrors> = None;
        for preprocessor in preprocessors {
            let processed = {
                let ctx = PreprocessContext {
                    root: &next,
                    env,
                    reporter,
                };
                preprocessor.process(&next, &ctx)
            };
            match processed {
                Validation::Success(node) => next = node,
                // the rest of the chain still runs on the last good tree
                Validation::Failure(errors) => {
                    tracing::debug!(pass, preprocessor = preprocessor.name(), errors = errors.len(), "preprocessing failed");
                    failed = Some(match failed {
                        Some(earlier) => earlier.combine(errors),
                        None => errors,
                    });
                }
            }
        }
        if let Some(errors) = failed {
            return Validation::Failure(errors);
        }
        if next == current {
            tracing::debug!(pass, "preprocessing reached a fixed point");
            return Validation::Success(next);
        }
        tracing::debug!(pass, "preprocessing pass rewrote values");
        current = next;
    }
    Validation::Success(current)
}

/// Rebuild `node`, passing every string leaf (map own values included) to
/// `f`. `f` returns `None` to keep a leaf as it is. Failures from all leaves
/// are accumulated.
pub fn map_strings<F>(node: &Node, f: &F) -> ConfigValidation<Node>
where
    F: Fn(&str, &Node) -> ConfigValidation<Option<Node>>,
{
    match node {
        Node::String { value, .. } => match f(value, node) {
            Validation::Success(Some(rewritten)) => Validation::Success(rewritten),
            Validation::Success(None) => Validation::Success(node.clone()),
            Validation::Failure(errors) => Validation::Failure(errors),
        },
        Node::Map {
            entries,
            value,
            info,
        } => {
            let children: Vec<ConfigValidation<(String, Node)>> = entries
                .iter()
                .map(|(k, child)| map_strings(child, f).map(|n| (k.clone(), n)))
                .collect();
            let own = map_strings(value, f);
            ConfigValidation::<()>::all((Validation::all_vec(children), own)).map(|(children, own)| Node::Map {
                entries: children.into_iter().collect(),
                value: Box::new(own),
                info: info.clone(),
            })
        }
        Node::List { elements, info } => {
            let items: Vec<ConfigValidation<Node>> =
                elements.iter().map(|el| map_strings(el, f)).collect();
            Validation::all_vec(items).map(|items| Node::list(items, info.clone()))
        }
        other => Validation::Success(other.clone()),
    }
}

/// A copy of the string leaf `node` holding `text`. The first original text
/// is kept under the `unprocessed` metadata key.
pub fn rewritten(node: &Node, text: String) -> Node {
    let Node::String { value, info } = node else {
        return node.clone();
    };
    let out = Node::string(text, info.clone());
    if out.meta("unprocessed").is_some() {
        out
    } else {
        out.with_meta("unprocessed", value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MockEnv;
    use crate::error::{ConfigError, ConfigValidationExt};
    use crate::node::DotPath;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> Node {
        Node::from_json(&value, "test", DotPath::root())
    }

    struct Suffix;

    impl Preprocessor for Suffix {
        fn name(&self) -> &str {
            "suffix"
        }

        fn process(&self, node: &Node, _ctx: &PreprocessContext<'_>) -> ConfigValidation<Node> {
            map_strings(node, &|text, leaf| {
                if text.len() < 4 {
                    Validation::Success(Some(rewritten(leaf, format!("{}!", text))))
                } else {
                    Validation::Success(None)
                }
            })
        }
    }

    #[test]
    fn test_run_stops_at_fixed_point() {
        let env = MockEnv::new();
        let reporter = Reporter::new();
        let preprocessors: Vec<Arc<dyn Preprocessor>> = vec![Arc::new(Suffix)];
        let out = run(tree(json!({"a": "x", "b": [1, "yy"]})), &preprocessors, 10, &env, &reporter);
        match out {
            Validation::Success(node) => {
                assert_eq!(node.to_json(), json!({"a": "x!!!", "b": [1, "yy!!"]}));
                assert_eq!(node.lookup("a").meta("unprocessed"), Some("x"));
            }
            Validation::Failure(e) => panic!("{}", e),
        }
    }

    #[test]
    fn test_run_respects_iteration_bound() {
        let env = MockEnv::new();
        let reporter = Reporter::new();
        let preprocessors: Vec<Arc<dyn Preprocessor>> = vec![Arc::new(Suffix)];
        let out = run(tree(json!({"a": "x"})), &preprocessors, 1, &env, &reporter);
        match out {
            Validation::Success(node) => assert_eq!(node.to_json(), json!({"a": "x!"})),
            Validation::Failure(e) => panic!("{}", e),
        }

        let out = run(tree(json!({"a": "x"})), &preprocessors, 0, &env, &reporter);
        match out {
            Validation::Success(node) => assert_eq!(node.to_json(), json!({"a": "x"})),
            Validation::Failure(e) => panic!("{}", e),
        }
    }

    struct Reject(&'static str);

    impl Preprocessor for Reject {
        fn name(&self) -> &str {
            self.0
        }

        fn process(&self, _node: &Node, _ctx: &PreprocessContext<'_>) -> ConfigValidation<Node> {
            ConfigValidation::fail_with(ConfigError::PreprocessorError {
                path: String::new(),
                preprocessor: self.0.to_string(),
                message: "rejected".to_string(),
            })
        }
    }

    #[test]
    fn test_run_reports_every_failing_preprocessor() {
        let env = MockEnv::new();
        let reporter = Reporter::new();
        let preprocessors: Vec<Arc<dyn Preprocessor>> =
            vec![Arc::new(Reject("first")), Arc::new(Suffix), Arc::new(Reject("second"))];
        match run(tree(json!({"a": "x"})), &preprocessors, 5, &env, &reporter) {
            Validation::Failure(errors) => {
                let names: Vec<String> = errors
                    .iter()
                    .map(|e| match e {
                        ConfigError::PreprocessorError { preprocessor, .. } => preprocessor.clone(),
                        other => panic!("unexpected {:?}", other),
                    })
                    .collect();
                assert_eq!(names, vec!["first", "second"]);
            }
            Validation::Success(node) => panic!("expected failure, got {:?}", node),
        }
    }
}
