//! Parameter-name mappers.
//!
//! A record field named `fooBar` is looked up under every name the active
//! mappers produce from it. The defaults cover identity, `foo_bar`,
//! `foo-bar` and `fooBar`; `FOO_BAR` needs [`UpperSnakeCaseMapper`].

/// Produces candidate source keys for a declared field name.
pub trait ParameterMapper: Send + Sync {
    fn map(&self, name: &str) -> Vec<String>;
}

/// The name as declared.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl ParameterMapper for IdentityMapper {
    fn map(&self, name: &str) -> Vec<String> {
        vec![name.to_string()]
    }
}

/// `fooBar` / `foo-bar` -> `foo_bar`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeCaseMapper;

impl ParameterMapper for SnakeCaseMapper {
    fn map(&self, name: &str) -> Vec<String> {
        vec![words(name).join("_")]
    }
}

/// `fooBar` / `foo_bar` -> `foo-bar`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KebabCaseMapper;

impl ParameterMapper for KebabCaseMapper {
    fn map(&self, name: &str) -> Vec<String> {
        vec![words(name).join("-")]
    }
}

/// `foo_bar` / `foo-bar` -> `fooBar`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CamelCaseMapper;

impl ParameterMapper for CamelCaseMapper {
    fn map(&self, name: &str) -> Vec<String> {
        let mut out = String::new();
        for (i, word) in words(name).iter().enumerate() {
            if i == 0 {
                out.push_str(word);
            } else {
                let mut chars = word.chars();
                if let Some(first) = chars.next() {
                    out.extend(first.to_uppercase());
                    out.push_str(chars.as_str());
                }
            }
        }
        vec![out]
    }
}

/// `fooBar` -> `FOO_BAR`. Not active unless registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpperSnakeCaseMapper;

impl ParameterMapper for UpperSnakeCaseMapper {
    fn map(&self, name: &str) -> Vec<String> {
        vec![words(name).join("_").to_uppercase()]
    }
}

/// Split an identifier into lowercase words at `_`, `-` and case changes.
fn words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in name.chars() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Identity, snake_case, kebab-case and camelCase, in that order.
pub fn default_mappers() -> Vec<std::sync::Arc<dyn ParameterMapper>> {
    vec![
        std::sync::Arc::new(IdentityMapper),
        std::sync::Arc::new(SnakeCaseMapper),
        std::sync::Arc::new(KebabCaseMapper),
        std::sync::Arc::new(CamelCaseMapper),
    ]
}

/// Fold a key for the optional normalized comparison: lowercase, no `_`/`-`.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Candidate keys for a field, aliases first, in order and without repeats.
pub fn candidate_keys(
    names: &[&str],
    aliases: &[String],
    mappers: &[std::sync::Arc<dyn ParameterMapper>],
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |key: String| {
        if !out.contains(&key) {
            out.push(key);
        }
    };
    for alias in aliases {
        push(alias.clone());
    }
    for name in names {
        for mapper in mappers {
            for key in mapper.map(name) {
                push(key);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<std::sync::Arc<dyn ParameterMapper>> {
        default_mappers()
    }

    #[test]
    fn test_word_splitting() {
        assert_eq!(words("fooBar"), vec!["foo", "bar"]);
        assert_eq!(words("foo_bar"), vec!["foo", "bar"]);
        assert_eq!(words("foo-bar-baz"), vec!["foo", "bar", "baz"]);
        assert_eq!(words("http2Port"), vec!["http2", "port"]);
        assert_eq!(words("URL"), vec!["url"]);
    }

    #[test]
    fn test_mappers() {
        assert_eq!(SnakeCaseMapper.map("fooBar"), vec!["foo_bar"]);
        assert_eq!(KebabCaseMapper.map("fooBar"), vec!["foo-bar"]);
        assert_eq!(CamelCaseMapper.map("foo_bar"), vec!["fooBar"]);
        assert_eq!(UpperSnakeCaseMapper.map("fooBar"), vec!["FOO_BAR"]);
    }

    #[test]
    fn test_candidates_for_camel_field() {
        let keys = candidate_keys(&["fooBar"], &[], &defaults());
        assert_eq!(keys, vec!["fooBar", "foo_bar", "foo-bar"]);
        assert!(!keys.contains(&"FOOBAR".to_string()));
    }

    #[test]
    fn test_aliases_come_first() {
        let keys = candidate_keys(&["pool_size"], &["size".to_string()], &defaults());
        assert_eq!(keys, vec!["size", "pool_size", "pool-size", "poolSize"]);
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Foo_Bar"), "foobar");
        assert_eq!(normalize_key("foo-bar"), "foobar");
        assert_eq!(normalize_key("FOOBAR"), "foobar");
    }
}
