//! `${random.*}` values.

use std::sync::OnceLock;

use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use stillwater::Validation;

use super::{map_strings, rewritten, PreprocessContext, Preprocessor};
use crate::error::ConfigValidation;
use crate::node::Node;

fn pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"\$\{random\.(int|long|double|boolean|uuid|string)(?:\((\d+)\))?\}").ok()
        })
        .as_ref()
}

/// A random value of `kind`, bounded or sized by `arg` where that applies.
///
/// `int(n)` and `long(n)` are in `0..n`; `string(n)` has `n` alphanumeric
/// characters (default 16). Unknown kinds yield `None`.
pub fn random_value(kind: &str, arg: Option<u64>) -> Option<String> {
    let mut rng = rand::thread_rng();
    let value = match (kind, arg) {
        ("int", Some(n)) if n > 0 => rng.gen_range(0..n.min(i32::MAX as u64)).to_string(),
        ("int", _) => rng.gen::<i32>().to_string(),
        ("long", Some(n)) if n > 0 => rng.gen_range(0..n).to_string(),
        ("long", _) => rng.gen::<i64>().to_string(),
        ("double", _) => rng.gen::<f64>().to_string(),
        ("boolean", _) => rng.gen::<bool>().to_string(),
        ("uuid", _) => uuid::Uuid::new_v4().to_string(),
        ("string", n) => {
            let len = n.unwrap_or(16) as usize;
            (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(len)
                .map(char::from)
                .collect()
        }
        _ => return None,
    };
    Some(value)
}

/// Replaces `${random.int}`, `${random.int(10)}`, `${random.long}`,
/// `${random.double}`, `${random.boolean}`, `${random.uuid}` and
/// `${random.string(12)}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPreprocessor;

impl Preprocessor for RandomPreprocessor {
    fn name(&self) -> &str {
        "random"
    }

    fn process(&self, node: &Node, _ctx: &PreprocessContext<'_>) -> ConfigValidation<Node> {
        map_strings(node, &|text, leaf| {
            let Some(pattern) = pattern().filter(|p| p.is_match(text)) else {
                return Validation::Success(None);
            };
            let replaced = pattern.replace_all(text, |caps: &regex::Captures<'_>| {
                let arg = caps.get(2).and_then(|m| m.as_str().parse().ok());
                random_value(&caps[1], arg).unwrap_or_else(|| caps[0].to_string())
            });
            Validation::Success(Some(rewritten(leaf, replaced.into_owned())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MockEnv;
    use crate::node::DotPath;
    use crate::report::Reporter;
    use serde_json::json;

    #[test]
    fn test_pattern_compiles() {
        assert!(pattern().is_some());
    }

    #[test]
    fn test_random_values() {
        let n: u64 = random_value("int", Some(10)).unwrap().parse().unwrap();
        assert!(n < 10);
        assert_eq!(random_value("string", Some(8)).unwrap().len(), 8);
        assert!(uuid::Uuid::parse_str(&random_value("uuid", None).unwrap()).is_ok());
        assert!(random_value("boolean", None).unwrap().parse::<bool>().is_ok());
        assert!(random_value("dice", None).is_none());
    }

    #[test]
    fn test_preprocessor_rewrites_tokens() {
        let root = Node::from_json(
            &json!({"port": "${random.int(100)}", "id": "node-${random.uuid}", "plain": "x"}),
            "test",
            DotPath::root(),
        );
        let env = MockEnv::new();
        let reporter = Reporter::new();
        let ctx = PreprocessContext {
            root: &root,
            env: &env,
            reporter: &reporter,
        };
        let out = match RandomPreprocessor.process(&root, &ctx) {
            Validation::Success(node) => node,
            Validation::Failure(e) => panic!("{}", e),
        };
        let port: u64 = out.lookup("port").as_str().unwrap().parse().unwrap();
        assert!(port < 100);
        assert!(out.lookup("id").as_str().unwrap().starts_with("node-"));
        assert_eq!(out.lookup("id").meta("unprocessed"), Some("node-${random.uuid}"));
        assert_eq!(out.lookup("plain").as_str(), Some("x"));
    }
}
