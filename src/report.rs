//! Audit reporting.
//!
//! While a load runs, preprocessors and decoders write to a [`Reporter`]:
//! which paths were consumed, which are secrets, which placeholders a
//! resolver answered or skipped. Afterwards [`ConfigReport`] combines that
//! with the final tree into one row per leaf, secrets obfuscated.
//!
//! ```ignore
//! let reported = Config::<AppConfig>::builder()
//!     .source(Env::prefix("APP_"))
//!     .source(File::new("config.toml"))
//!     .build_reported()?;
//!
//! for entry in reported.report().unused() {
//!     println!("unused key: {}", entry.path);
//! }
//! println!("{}", reported.report());
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::Config;
use crate::error::SourceLocation;
use crate::node::{DotPath, Node};
use crate::secret::{Obfuscator, SecretPolicy};

/// Something a resolver did (or failed to do) during preprocessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEvent {
    pub path: String,
    pub resolver: String,
    pub message: String,
    pub warning: bool,
}

#[derive(Debug, Default)]
struct ReporterState {
    used: BTreeSet<DotPath>,
    secrets: BTreeSet<String>,
    events: Vec<ReportEvent>,
}

/// Thread-safe sink shared by one load.
#[derive(Debug, Default)]
pub struct Reporter {
    state: Mutex<ReporterState>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that decoding consumed the node at `path`.
    pub fn mark_used(&self, path: &DotPath) {
        self.lock().used.insert(path.clone());
    }

    /// Record that the value at `path` is a secret.
    pub fn mark_secret(&self, path: &str) {
        self.lock().secrets.insert(path.to_string());
    }

    /// Record a resolver outcome.
    pub fn record(&self, path: &str, resolver: &str, message: impl Into<String>) {
        self.push(path, resolver, message.into(), false);
    }

    /// Record a soft failure (skipped placeholder and the like).
    pub fn warn(&self, path: &str, resolver: &str, message: impl Into<String>) {
        self.push(path, resolver, message.into(), true);
    }

    fn push(&self, path: &str, resolver: &str, message: String, warning: bool) {
        self.lock().events.push(ReportEvent {
            path: path.to_string(),
            resolver: resolver.to_string(),
            message,
            warning,
        });
    }

    /// A leaf counts as used when decoding consumed it, something under it
    /// (list elements) or something above it (an `Any` subtree).
    pub fn is_used(&self, leaf: &DotPath) -> bool {
        self.lock()
            .used
            .iter()
            .any(|u| u.starts_with(leaf) || leaf.starts_with(u))
    }

    pub fn is_secret(&self, path: &str) -> bool {
        self.lock().secrets.contains(path)
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.lock().events.clone()
    }

    pub fn warnings(&self) -> Vec<ReportEvent> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.warning)
            .cloned()
            .collect()
    }
}

/// One leaf of the final configuration.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub path: String,
    /// Display value, obfuscated for secrets.
    pub value: String,
    pub location: Option<SourceLocation>,
    pub used: bool,
    pub secret: bool,
    /// Resolver that produced the value, if any.
    pub resolver: Option<String>,
    /// Lower-precedence sources that also defined this path.
    pub overridden: Vec<String>,
}

/// Audit output of one load.
#[derive(Debug, Clone, Default)]
pub struct ConfigReport {
    pub sources: Vec<String>,
    pub entries: Vec<ReportEntry>,
    pub events: Vec<ReportEvent>,
}

impl ConfigReport {
    /// Build the report for `tree`.
    ///
    /// `per_source` holds each source's own tree in precedence order,
    /// paired with its description.
    pub fn build(
        per_source: &[(String, Node)],
        tree: &Node,
        reporter: &Reporter,
        policy: &dyn SecretPolicy,
        obfuscator: &dyn Obfuscator,
    ) -> Self {
        let entries = tree
            .leaves()
            .into_iter()
            .map(|(path, node)| {
                let rendered = path.to_string();
                let secret = reporter.is_secret(&rendered)
                    || node.meta("secret").is_some()
                    || policy.is_secret(&rendered);
                let raw = match node {
                    Node::List { .. } => node.to_json().to_string(),
                    other => other.to_string(),
                };
                let defined_in: Vec<&String> = per_source
                    .iter()
                    .filter(|(_, source_tree)| source_tree.at_path(&path).is_defined())
                    .map(|(name, _)| name)
                    .collect();
                ReportEntry {
                    value: if secret { obfuscator.obfuscate(&raw) } else { raw },
                    location: node.pos().cloned(),
                    used: reporter.is_used(&path),
                    secret,
                    resolver: node.meta("resolver").map(String::from),
                    overridden: defined_in.iter().skip(1).map(|s| s.to_string()).collect(),
                    path: rendered,
                }
            })
            .collect();

        Self {
            sources: per_source.iter().map(|(name, _)| name.clone()).collect(),
            entries,
            events: reporter.events(),
        }
    }

    pub fn entry(&self, path: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Leaves no field consumed.
    pub fn unused(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| !e.used)
    }

    /// Leaves also defined by a lower-precedence source.
    pub fn overridden(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| !e.overridden.is_empty())
    }
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration report")?;
        writeln!(f, "Sources (highest precedence first):")?;
        for (i, source) in self.sources.iter().enumerate() {
            writeln!(f, "  {}. {}", i + 1, source)?;
        }

        let path_width = self
            .entries
            .iter()
            .map(|e| e.path.len())
            .max()
            .unwrap_or(4)
            .max(4);
        let value_width = self
            .entries
            .iter()
            .map(|e| e.value.chars().count().min(40))
            .max()
            .unwrap_or(5)
            .max(5);

        writeln!(f)?;
        writeln!(
            f,
            "{:<pw$}  {:<vw$}  {:<6}  source",
            "path",
            "value",
            "used",
            pw = path_width,
            vw = value_width
        )?;
        for entry in &self.entries {
            let value: String = entry.value.chars().take(40).collect();
            let mut source = entry
                .location
                .as_ref()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "-".to_string());
            if let Some(resolver) = &entry.resolver {
                source.push_str(&format!(" via {}", resolver));
            }
            if !entry.overridden.is_empty() {
                source.push_str(&format!(" (overrides {})", entry.overridden.join(", ")));
            }
            writeln!(
                f,
                "{:<pw$}  {:<vw$}  {:<6}  {}",
                entry.path,
                value,
                if entry.used { "yes" } else { "no" },
                source,
                pw = path_width,
                vw = value_width
            )?;
        }

        if !self.events.is_empty() {
            writeln!(f)?;
            writeln!(f, "Resolver events:")?;
            for event in &self.events {
                let marker = if event.warning { "!" } else { "-" };
                writeln!(
                    f,
                    "  {} [{}] {}: {}",
                    marker, event.resolver, event.path, event.message
                )?;
            }
        }
        Ok(())
    }
}

/// A loaded configuration together with its report.
#[derive(Debug)]
pub struct ReportedConfig<T> {
    config: Config<T>,
    report: ConfigReport,
}

impl<T> ReportedConfig<T> {
    pub fn new(config: Config<T>, report: ConfigReport) -> Self {
        Self { config, report }
    }

    pub fn value(&self) -> &T {
        self.config.get()
    }

    pub fn config(&self) -> &Config<T> {
        &self.config
    }

    pub fn report(&self) -> &ConfigReport {
        &self.report
    }

    pub fn into_inner(self) -> T {
        self.config.into_inner()
    }

    pub fn into_parts(self) -> (Config<T>, ConfigReport) {
        (self.config, self.report)
    }
}

impl<T> std::ops::Deref for ReportedConfig<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.config.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::{DefaultSecretPolicy, PrefixObfuscator};
    use serde_json::json;

    fn tree(value: serde_json::Value, source: &str) -> Node {
        Node::from_json(&value, source, DotPath::root())
    }

    #[test]
    fn test_reporter_usage_tracking() {
        let reporter = Reporter::new();
        reporter.mark_used(&DotPath::parse("servers[0].host"));
        reporter.mark_used(&DotPath::parse("extra"));
        assert!(reporter.is_used(&DotPath::parse("servers")));
        assert!(reporter.is_used(&DotPath::parse("extra.nested")));
        assert!(!reporter.is_used(&DotPath::parse("db.port")));
    }

    #[test]
    fn test_reporter_events() {
        let reporter = Reporter::new();
        reporter.record("db.password", "vault", "resolved");
        reporter.warn("db.user", "ref", "could not resolve 'missing'");
        assert_eq!(reporter.events().len(), 2);
        assert_eq!(reporter.warnings().len(), 1);
        assert_eq!(reporter.warnings()[0].path, "db.user");
    }

    #[test]
    fn test_report_entries() {
        let high = tree(json!({"db": {"host": "prod", "password": "supersecretvalue"}}), "env");
        let low = tree(json!({"db": {"host": "local", "port": 5432}}), "defaults");
        let merged = crate::merge::merge(high.clone(), low.clone());

        let reporter = Reporter::new();
        reporter.mark_used(&DotPath::parse("db.host"));
        let report = ConfigReport::build(
            &[("env".to_string(), high), ("defaults".to_string(), low)],
            &merged,
            &reporter,
            &DefaultSecretPolicy::default(),
            &PrefixObfuscator::default(),
        );

        let host = report.entry("db.host").unwrap();
        assert_eq!(host.value, "prod");
        assert!(host.used);
        assert_eq!(host.overridden, vec!["defaults".to_string()]);

        let password = report.entry("db.password").unwrap();
        assert!(password.secret);
        assert_eq!(password.value, "sup*****");

        let unused: Vec<_> = report.unused().map(|e| e.path.as_str()).collect();
        assert_eq!(unused, vec!["db.password", "db.port"]);

        let text = report.to_string();
        assert!(text.contains("1. env"));
        assert!(text.contains("(overrides defaults)"));
        assert!(!text.contains("supersecretvalue"));
    }
}
