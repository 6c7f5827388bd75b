//! Secret values: the [`Secret`] wrapper, detection policies, obfuscation
//! for reports and an optional strength check.

use std::fmt;

use serde::{Deserialize, Serialize};
use stillwater::Validation;

use crate::decoder::DecoderContext;
use crate::describe::TypeDesc;
use crate::error::{ConfigError, ConfigValidation, ConfigValidationExt};
use crate::node::Node;
use crate::resolver::Resolver;

/// A string that never prints its content.
///
/// ```
/// use cairn::Secret;
///
/// let password = Secret::new("hunter2");
/// assert_eq!(format!("{:?}", password), "Secret(*****)");
/// assert_eq!(password.expose(), "hunter2");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The wrapped value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(*****)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*****")
    }
}

/// Decides which configuration paths hold secrets.
pub trait SecretPolicy: Send + Sync {
    fn is_secret(&self, path: &str) -> bool;
}

/// Treats a path as secret when its last key contains a well-known word.
#[derive(Debug, Clone)]
pub struct DefaultSecretPolicy {
    patterns: Vec<String>,
}

impl Default for DefaultSecretPolicy {
    fn default() -> Self {
        Self {
            patterns: [
                "password",
                "passwd",
                "secret",
                "token",
                "credential",
                "apikey",
                "api_key",
                "api-key",
                "private_key",
                "privatekey",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

impl SecretPolicy for DefaultSecretPolicy {
    fn is_secret(&self, path: &str) -> bool {
        let last = path
            .rsplit(['.', '['])
            .next()
            .unwrap_or(path)
            .to_lowercase();
        self.patterns.iter().any(|p| last.contains(p.as_str()))
    }
}

/// Treats exactly the listed paths (or last keys) as secret.
#[derive(Debug, Clone, Default)]
pub struct NamedSecretPolicy {
    names: Vec<String>,
}

impl NamedSecretPolicy {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl SecretPolicy for NamedSecretPolicy {
    fn is_secret(&self, path: &str) -> bool {
        let last = path.rsplit('.').next().unwrap_or(path);
        self.names.iter().any(|n| n == path || n == last)
    }
}

/// Masks secret values in reports.
pub trait Obfuscator: Send + Sync {
    fn obfuscate(&self, value: &str) -> String;
}

/// Shows the first few characters, masks the rest.
///
/// Values no longer than twice the visible prefix are fully masked.
#[derive(Debug, Clone)]
pub struct PrefixObfuscator {
    visible: usize,
}

impl PrefixObfuscator {
    pub fn new(visible: usize) -> Self {
        Self { visible }
    }
}

impl Default for PrefixObfuscator {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Obfuscator for PrefixObfuscator {
    fn obfuscate(&self, value: &str) -> String {
        if value.chars().count() <= self.visible * 2 {
            return "*****".to_string();
        }
        let prefix: String = value.chars().take(self.visible).collect();
        format!("{}*****", prefix)
    }
}

/// Masks everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictObfuscator;

impl Obfuscator for StrictObfuscator {
    fn obfuscate(&self, _value: &str) -> String {
        "*****".to_string()
    }
}

/// Outcome of a strength check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretStrength {
    Strong,
    Weak { reason: String },
}

/// Judges whether a secret is strong enough.
pub trait SecretStrengthAnalyzer: Send + Sync {
    fn analyze(&self, value: &str) -> SecretStrength;
}

/// Requires a minimum length and a mix of character classes
/// (lower, upper, digit, other).
#[derive(Debug, Clone)]
pub struct DefaultStrengthAnalyzer {
    pub min_length: usize,
    pub min_classes: usize,
}

impl Default for DefaultStrengthAnalyzer {
    fn default() -> Self {
        Self {
            min_length: 12,
            min_classes: 3,
        }
    }
}

impl SecretStrengthAnalyzer for DefaultStrengthAnalyzer {
    fn analyze(&self, value: &str) -> SecretStrength {
        let length = value.chars().count();
        if length < self.min_length {
            return SecretStrength::Weak {
                reason: format!(
                    "{} characters, at least {} required",
                    length, self.min_length
                ),
            };
        }
        let classes = [
            value.chars().any(|c| c.is_lowercase()),
            value.chars().any(|c| c.is_uppercase()),
            value.chars().any(|c| c.is_ascii_digit()),
            value.chars().any(|c| !c.is_alphanumeric()),
        ]
        .iter()
        .filter(|&&present| present)
        .count();
        if classes < self.min_classes {
            return SecretStrength::Weak {
                reason: format!(
                    "uses {} character classes, at least {} required",
                    classes, self.min_classes
                ),
            };
        }
        SecretStrength::Strong
    }
}

/// Rejects weak secrets before decoding.
///
/// A value counts as a secret when its target type is [`Secret`], the node was
/// tagged secret during preprocessing, or the secret policy matches its path.
pub struct WeakSecretResolver {
    analyzer: Box<dyn SecretStrengthAnalyzer>,
}

impl WeakSecretResolver {
    pub fn new(analyzer: impl SecretStrengthAnalyzer + 'static) -> Self {
        Self {
            analyzer: Box::new(analyzer),
        }
    }
}

impl Default for WeakSecretResolver {
    fn default() -> Self {
        Self::new(DefaultStrengthAnalyzer::default())
    }
}

impl Resolver for WeakSecretResolver {
    fn resolve(
        &self,
        _param_name: Option<&str>,
        desc: &TypeDesc,
        node: &Node,
        path: &str,
        ctx: &DecoderContext<'_>,
    ) -> ConfigValidation<Node> {
        let secret = desc.is_secret()
            || node.meta("secret").is_some()
            || (desc.is_scalar() && ctx.secret_policy.is_secret(path));
        let text = match node.scalar_text() {
            Some(text) if secret => text,
            _ => return Validation::Success(node.clone()),
        };
        match self.analyzer.analyze(&text) {
            SecretStrength::Strong => Validation::Success(node.clone()),
            SecretStrength::Weak { reason } => ConfigValidation::fail_with(ConfigError::WeakSecret {
                path: path.to_string(),
                source_location: node.pos().cloned(),
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_never_prints() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{}", secret), "*****");
        assert_eq!(format!("{:?}", secret), "Secret(*****)");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_secret_is_transparent_for_serde() {
        let secret: Secret = serde_json::from_value(serde_json::json!("pw")).unwrap();
        assert_eq!(secret.expose(), "pw");
        assert_eq!(serde_json::to_value(&secret).unwrap(), serde_json::json!("pw"));
    }

    #[test]
    fn test_default_policy() {
        let policy = DefaultSecretPolicy::default();
        assert!(policy.is_secret("database.password"));
        assert!(policy.is_secret("stripe.api_key"));
        assert!(policy.is_secret("auth.token"));
        assert!(!policy.is_secret("database.host"));
        assert!(!policy.is_secret("secrets_dir.path"));
    }

    #[test]
    fn test_named_policy() {
        let policy = NamedSecretPolicy::new(["db.dsn", "pin"]);
        assert!(policy.is_secret("db.dsn"));
        assert!(policy.is_secret("card.pin"));
        assert!(!policy.is_secret("db.host"));
    }

    #[test]
    fn test_obfuscators() {
        assert_eq!(PrefixObfuscator::default().obfuscate("supersecretvalue"), "sup*****");
        assert_eq!(PrefixObfuscator::default().obfuscate("short"), "*****");
        assert_eq!(StrictObfuscator.obfuscate("supersecretvalue"), "*****");
    }

    #[test]
    fn test_strength_analyzer() {
        let analyzer = DefaultStrengthAnalyzer::default();
        assert!(matches!(analyzer.analyze("short"), SecretStrength::Weak { .. }));
        assert!(matches!(
            analyzer.analyze("alllowercaseletters"),
            SecretStrength::Weak { .. }
        ));
        assert_eq!(analyzer.analyze("Tr0ub4dor&3-horse"), SecretStrength::Strong);
    }
}
