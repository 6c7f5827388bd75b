//! Terminal rendering of accumulated configuration errors.
//!
//! Every [`ConfigError`] becomes one diagnostic: the path it concerns, where
//! the offending value came from (`source:line:col`), what went wrong and,
//! when one is known, a hint. Diagnostics are grouped by source, or by the
//! parent of their path the way [`LoadError`] groups its message.
//!
//! ```text
//! error: 2 configuration problems
//!
//! app.toml
//!   database.port (app.toml:4:8)
//!     expected u16, got "eighty": invalid digit found in string
//!   database.host (app.toml)
//!     missing String value, tried host
//!     help: Add 'database.host' to your configuration
//! ```

use std::io::{IsTerminal, Write};
use std::sync::Arc;

use stillwater::Validation;

use crate::error::{parent_path, ConfigError, ConfigErrors, ConfigValidation, LoadError, SourceLocation};
use crate::secret::{DefaultSecretPolicy, Obfuscator, SecretPolicy, StrictObfuscator};

/// How diagnostics are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grouping {
    /// By the source that produced the offending value.
    #[default]
    Source,
    /// By the parent of the error's path.
    Parent,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Colour when stderr is a terminal.
    #[default]
    Auto,
    Always,
    Never,
}

/// Rendering options.
#[derive(Clone)]
pub struct PrettyOptions {
    pub color: ColorChoice,
    pub grouping: Grouping,
    pub hints: bool,
    /// Diagnostics shown before the rest are summarised in one line.
    pub limit: Option<usize>,
    pub secrets: Arc<dyn SecretPolicy>,
    /// `None` prints secret values as they are.
    pub obfuscator: Option<Arc<dyn Obfuscator>>,
}

impl Default for PrettyOptions {
    fn default() -> Self {
        Self {
            color: ColorChoice::Auto,
            grouping: Grouping::Source,
            hints: true,
            limit: Some(20),
            secrets: Arc::new(DefaultSecretPolicy::default()),
            obfuscator: Some(Arc::new(StrictObfuscator)),
        }
    }
}

impl PrettyOptions {
    /// No colour, whatever the terminal.
    pub fn plain() -> Self {
        Self {
            color: ColorChoice::Never,
            ..Self::default()
        }
    }

    pub fn color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    pub fn grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn hints(mut self, hints: bool) -> Self {
        self.hints = hints;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Decide which paths hold secrets, usually the policy the builder used.
    pub fn secret_policy<P: SecretPolicy + 'static>(mut self, policy: P) -> Self {
        self.secrets = Arc::new(policy);
        self
    }

    pub fn obfuscator<O: Obfuscator + 'static>(mut self, obfuscator: O) -> Self {
        self.obfuscator = Some(Arc::new(obfuscator));
        self
    }

    /// Print secret values in clear text.
    pub fn reveal_secrets(mut self) -> Self {
        self.obfuscator = None;
        self
    }

    fn shown(&self, path: &str, value: &str) -> String {
        match &self.obfuscator {
            Some(obfuscator) if self.secrets.is_secret(path) => obfuscator.obfuscate(value),
            _ => value.to_string(),
        }
    }
}

#[derive(Clone, Copy)]
enum Role {
    Title,
    Group,
    Subject,
    Location,
    Help,
}

#[derive(Clone, Copy)]
struct Painter {
    enabled: bool,
}

impl Painter {
    fn paint(self, role: Role, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }
        let code = match role {
            Role::Title => "1;31",
            Role::Group => "1;36",
            Role::Subject => "1",
            Role::Location => "2",
            Role::Help => "32",
        };
        format!("\x1b[{}m{}\x1b[0m", code, text)
    }
}

struct Diagnostic<'e> {
    subject: String,
    location: Option<&'e SourceLocation>,
    detail: String,
    hint: Option<String>,
}

fn diagnose<'e>(error: &'e ConfigError, options: &PrettyOptions) -> Diagnostic<'e> {
    let subject = error.path().map(str::to_string);
    let (subject, detail, hint) = match error {
        ConfigError::SourceError { source_name, kind } => (Some(source_name.clone()), kind.to_string(), None),
        ConfigError::NoSources => (
            Some("(builder)".to_string()),
            "no configuration sources provided".to_string(),
            Some("add one with ConfigBuilder::source".to_string()),
        ),
        ConfigError::TypeMismatch {
            path,
            expected_type,
            actual_value,
            message,
            ..
        } => (
            subject,
            format!(
                "expected {}, got \"{}\": {}",
                expected_type,
                options.shown(path, actual_value),
                message
            ),
            None,
        ),
        ConfigError::MissingValue {
            expected_type,
            searched_keys,
            ..
        } => {
            let mut detail = format!("missing {} value", expected_type);
            if !searched_keys.is_empty() {
                detail.push_str(&format!(", tried {}", searched_keys.join(", ")));
            }
            (subject, detail, None)
        }
        ConfigError::NullValue { expected_type, .. } => {
            (subject, format!("null where {} is required", expected_type), None)
        }
        ConfigError::UnsupportedType { type_name, .. } => (
            subject,
            format!("no decoder registered for {}", type_name),
            Some("register one with ConfigBuilder::decoder".to_string()),
        ),
        ConfigError::AmbiguousVariant {
            type_name,
            candidates,
            ..
        } => (
            subject,
            format!("{} variants {} match equally", type_name, candidates.join(", ")),
            Some("nest the value under the variant name or set a discriminator".to_string()),
        ),
        ConfigError::NoMatchingVariant {
            type_name,
            tried,
            message,
            ..
        } => (
            subject,
            format!("no variant of {} matches: {}; tried {}", type_name, message, tried.join(", ")),
            None,
        ),
        ConfigError::Instantiation { type_name, message } => (Some(type_name.clone()), message.clone(), None),
        ConfigError::Unresolved { placeholder, .. } => {
            let namespace = placeholder.split(':').next().unwrap_or_default().trim();
            (
                subject,
                format!("could not resolve ${{{{ {} }}}}", placeholder),
                Some(format!("is a context resolver registered for '{}'?", namespace)),
            )
        }
        ConfigError::ResolverError { resolver, message, .. } => {
            (subject, format!("resolver '{}' failed: {}", resolver, message), None)
        }
        ConfigError::PreprocessorError {
            preprocessor,
            message,
            ..
        } => (subject, format!("preprocessor '{}' failed: {}", preprocessor, message), None),
        ConfigError::WeakSecret { reason, .. } => (subject, format!("weak secret: {}", reason), None),
        ConfigError::ValidationError {
            path,
            value,
            message,
            ..
        } => {
            let detail = match value {
                Some(value) => format!("{} = {}: {}", path, options.shown(path, value), message),
                None => message.clone(),
            };
            (subject, detail, None)
        }
        ConfigError::UnknownField { .. } => (subject, "not read by any field".to_string(), None),
    };

    Diagnostic {
        subject: subject.unwrap_or_default(),
        location: error.source_location(),
        detail,
        hint: hint.or_else(|| error.suggestion()),
    }
}

fn group_key(error: &ConfigError, grouping: Grouping) -> Option<String> {
    match grouping {
        Grouping::Flat => None,
        Grouping::Source => Some(match error {
            ConfigError::SourceError { source_name, .. } => source_name.clone(),
            _ => error
                .source_location()
                .map(|loc| loc.source.clone())
                .unwrap_or_else(|| "(no source)".to_string()),
        }),
        Grouping::Parent => Some(
            error
                .path()
                .map(parent_path)
                .filter(|parent| !parent.is_empty())
                .unwrap_or_else(|| "(root)".to_string()),
        ),
    }
}

fn render(errors: &ConfigErrors, type_name: Option<&str>, options: &PrettyOptions, painter: Painter) -> String {
    let count = errors.len();
    let noun = if count == 1 { "problem" } else { "problems" };
    let mut out = match type_name {
        Some(name) => format!(
            "{}: could not load '{}', {} configuration {}\n",
            painter.paint(Role::Title, "error"),
            name,
            count,
            noun
        ),
        None => format!("{}: {} configuration {}\n", painter.paint(Role::Title, "error"), count, noun),
    };

    // groups keep the order in which they first appear
    let mut groups: Vec<(Option<String>, Vec<&ConfigError>)> = Vec::new();
    for error in errors.iter() {
        let key = group_key(error, options.grouping);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(error),
            None => groups.push((key, vec![error])),
        }
    }

    let mut shown = 0;
    for (key, members) in groups {
        out.push('\n');
        if let Some(key) = key {
            out.push_str(&painter.paint(Role::Group, &key));
            out.push('\n');
        }
        for error in members {
            if options.limit.is_some_and(|limit| shown >= limit) {
                out.push_str(&format!("  ... {} more not shown\n", count - shown));
                return out;
            }
            let diagnostic = diagnose(error, options);
            out.push_str("  ");
            out.push_str(&painter.paint(Role::Subject, &diagnostic.subject));
            if let Some(location) = diagnostic.location {
                out.push(' ');
                out.push_str(&painter.paint(Role::Location, &format!("({})", location)));
            }
            out.push_str(&format!("\n    {}\n", diagnostic.detail));
            if let Some(hint) = diagnostic.hint.filter(|_| options.hints) {
                out.push_str(&format!("    {}: {}\n", painter.paint(Role::Help, "help"), hint));
            }
            shown += 1;
        }
    }
    out
}

impl ConfigErrors {
    /// Render for display. Colour is used only with [`ColorChoice::Always`].
    pub fn pretty(&self, options: &PrettyOptions) -> String {
        let painter = Painter {
            enabled: options.color == ColorChoice::Always,
        };
        render(self, None, options, painter)
    }

    /// Render to stderr, colouring when it is a terminal.
    pub fn eprint(&self, options: &PrettyOptions) {
        eprint_rendered(self, None, options);
    }
}

impl LoadError {
    /// Like [`ConfigErrors::pretty`], naming the target type in the header.
    pub fn pretty(&self, options: &PrettyOptions) -> String {
        let painter = Painter {
            enabled: options.color == ColorChoice::Always,
        };
        render(self.errors(), Some(self.type_name()), options, painter)
    }
}

fn eprint_rendered(errors: &ConfigErrors, type_name: Option<&str>, options: &PrettyOptions) {
    let mut stderr = std::io::stderr();
    let painter = Painter {
        enabled: match options.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => stderr.is_terminal(),
        },
    };
    let _ = stderr.write_all(render(errors, type_name, options, painter).as_bytes());
}

/// Exit the process with a rendered error report instead of returning one.
///
/// ```ignore
/// let config = Config::<AppConfig>::builder()
///     .source(File::new("config.toml"))
///     .build()
///     .unwrap_or_exit();
/// ```
pub trait UnwrapOrExit<T> {
    fn unwrap_or_exit(self) -> T;

    fn unwrap_or_exit_with(self, options: &PrettyOptions) -> T;
}

impl<T> UnwrapOrExit<T> for ConfigValidation<T> {
    fn unwrap_or_exit(self) -> T {
        self.unwrap_or_exit_with(&PrettyOptions::default())
    }

    fn unwrap_or_exit_with(self, options: &PrettyOptions) -> T {
        match self {
            Validation::Success(value) => value,
            Validation::Failure(errors) => {
                eprint_rendered(&errors, None, options);
                std::process::exit(1)
            }
        }
    }
}

impl<T> UnwrapOrExit<T> for Result<T, LoadError> {
    fn unwrap_or_exit(self) -> T {
        self.unwrap_or_exit_with(&PrettyOptions::default())
    }

    fn unwrap_or_exit_with(self, options: &PrettyOptions) -> T {
        match self {
            Ok(value) => value,
            Err(error) => {
                eprint_rendered(error.errors(), Some(error.type_name()), options);
                std::process::exit(1)
            }
        }
    }
}
