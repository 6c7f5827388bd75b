//! ConfigEnv trait for testable I/O.
//!
//! Sources and resolvers never touch the file system, the process environment
//! or the system property table directly. They go through a [`ConfigEnv`], so
//! tests can swap in a [`MockEnv`] and every lookup becomes deterministic.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Environment trait for configuration I/O operations.
///
/// # Example
///
/// ```ignore
/// // Production
/// let config = Config::<App>::builder()
///     .source(File::new("config.toml"))
///     .build()?;  // Uses RealEnv
///
/// // Testing
/// let env = MockEnv::new()
///     .with_file("config.toml", "[server]\nport = 8080");
/// let config = Config::<App>::builder()
///     .source(File::new("config.toml"))
///     .build_with_env(&env)?;
/// ```
pub trait ConfigEnv: Send + Sync {
    /// Read a file's contents as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if:
    /// - File does not exist (`ErrorKind::NotFound`)
    /// - File is not valid UTF-8
    /// - Permission denied
    fn read_file(&self, path: &Path) -> io::Result<String>;

    /// Check if a file exists.
    fn file_exists(&self, path: &Path) -> bool;

    /// Get an environment variable by name.
    fn get_env(&self, name: &str) -> Option<String>;

    /// Get all environment variables matching a prefix.
    ///
    /// Returns tuples of (full_name, value).
    fn env_vars_with_prefix(&self, prefix: &str) -> Vec<(String, String)>;

    /// Get all environment variables.
    fn all_env_vars(&self) -> Vec<(String, String)>;

    /// Get a system property by name.
    ///
    /// System properties are an in-process key/value table, separate from the
    /// OS environment. Hosts populate it from command-line flags or
    /// programmatic overrides.
    fn system_property(&self, name: &str) -> Option<String>;

    /// Get all system properties.
    fn system_properties(&self) -> Vec<(String, String)>;
}

/// Production environment using standard library I/O.
///
/// File and environment access wrap `std`. The system property table is
/// owned by the value and filled with [`RealEnv::with_property`].
#[derive(Debug, Clone, Default)]
pub struct RealEnv {
    properties: BTreeMap<String, String>,
}

impl RealEnv {
    /// Create a new real environment with an empty property table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a system property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Parse `-Dkey=value` / `--key=value` style arguments into system properties.
    ///
    /// Arguments that do not match either form are ignored.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            let arg = arg.as_ref();
            let body = arg
                .strip_prefix("-D")
                .or_else(|| arg.strip_prefix("--"));
            if let Some((key, value)) = body.and_then(|b| b.split_once('=')) {
                if !key.is_empty() {
                    self.properties.insert(key.to_string(), value.to_string());
                }
            }
        }
        self
    }
}

impl ConfigEnv for RealEnv {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn get_env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn env_vars_with_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        std::env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect()
    }

    fn all_env_vars(&self) -> Vec<(String, String)> {
        std::env::vars().collect()
    }

    fn system_property(&self, name: &str) -> Option<String> {
        self.properties.get(name).cloned()
    }

    fn system_properties(&self) -> Vec<(String, String)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Mock file state for testing.
#[derive(Debug, Clone)]
enum MockFile {
    Content(String),
    NotFound,
    PermissionDenied,
}

/// Mock environment for testing configuration loading.
///
/// # Example
///
/// ```
/// use cairn::env::MockEnv;
///
/// let env = MockEnv::new()
///     .with_file("config.toml", r#"
///         [database]
///         host = "localhost"
///         port = 5432
///     "#)
///     .with_env("APP_DATABASE_HOST", "prod-db.example.com")
///     .with_property("config.override.database.port", "6543");
/// ```
#[derive(Debug, Default)]
pub struct MockEnv {
    files: RwLock<HashMap<PathBuf, MockFile>>,
    env_vars: RwLock<BTreeMap<String, String>>,
    properties: RwLock<BTreeMap<String, String>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MockEnv {
    /// Create a new empty mock environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file with content.
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.set_file(path, content);
        self
    }

    /// Add a file that will return "not found" error.
    pub fn with_missing_file(self, path: impl Into<PathBuf>) -> Self {
        write(&self.files).insert(path.into(), MockFile::NotFound);
        self
    }

    /// Add a file that will return "permission denied" error.
    pub fn with_unreadable_file(self, path: impl Into<PathBuf>) -> Self {
        write(&self.files).insert(path.into(), MockFile::PermissionDenied);
        self
    }

    /// Set an environment variable.
    pub fn with_env(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_env(name, value);
        self
    }

    /// Set multiple environment variables from an iterator.
    pub fn with_envs<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        {
            let mut env_vars = write(&self.env_vars);
            for (k, v) in vars {
                env_vars.insert(k.into(), v.into());
            }
        }
        self
    }

    /// Set a system property.
    pub fn with_property(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_property(name, value);
        self
    }

    /// Replace a file's content after creation.
    pub fn set_file(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        write(&self.files).insert(path.into(), MockFile::Content(content.into()));
    }

    /// Remove a file from the mock environment.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        write(&self.files).remove(path.as_ref());
    }

    /// Update an environment variable.
    pub fn set_env(&self, name: impl Into<String>, value: impl Into<String>) {
        write(&self.env_vars).insert(name.into(), value.into());
    }

    /// Remove an environment variable.
    pub fn remove_env(&self, name: &str) {
        write(&self.env_vars).remove(name);
    }

    /// Update a system property.
    pub fn set_property(&self, name: impl Into<String>, value: impl Into<String>) {
        write(&self.properties).insert(name.into(), value.into());
    }
}

impl ConfigEnv for MockEnv {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        match read(&self.files).get(path) {
            Some(MockFile::Content(content)) => Ok(content.clone()),
            Some(MockFile::NotFound) | None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("mock file not found: {}", path.display()),
            )),
            Some(MockFile::PermissionDenied) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("mock permission denied: {}", path.display()),
            )),
        }
    }

    fn file_exists(&self, path: &Path) -> bool {
        matches!(read(&self.files).get(path), Some(MockFile::Content(_)))
    }

    fn get_env(&self, name: &str) -> Option<String> {
        read(&self.env_vars).get(name).cloned()
    }

    fn env_vars_with_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        read(&self.env_vars)
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn all_env_vars(&self) -> Vec<(String, String)> {
        read(&self.env_vars)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn system_property(&self, name: &str) -> Option<String> {
        read(&self.properties).get(name).cloned()
    }

    fn system_properties(&self) -> Vec<(String, String)> {
        read(&self.properties)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
