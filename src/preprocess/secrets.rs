//! Secret-store lookups: `${{ vault:db/password }}` and the like.
//!
//! Concrete backends implement [`SecretStore`]. A [`SecretStoreResolver`]
//! builds its client on first use through an injected factory and keeps it
//! for the rest of its life, so tests can hand in an [`InMemorySecretStore`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use stillwater::Validation;
use thiserror::Error;

use super::context::ContextResolver;
use super::PreprocessContext;
use crate::error::{ConfigError, ConfigValidation, ConfigValidationExt};
use crate::node::Node;

/// Failures reported by a secret-store client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("could not connect: {0}")]
    Connection(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("{0}")]
    Other(String),
}

/// A key/value secret backend.
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` when the key does not exist.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

type StoreFactory = dyn Fn() -> Result<Arc<dyn SecretStore>, StoreError> + Send + Sync;

/// Serves one namespace from a lazily created [`SecretStore`].
///
/// Resolved values are marked secret. A factory failure is not memoized, so
/// the next lookup tries again.
pub struct SecretStoreResolver {
    key: String,
    factory: Box<StoreFactory>,
    client: Mutex<Option<Arc<dyn SecretStore>>>,
}

impl SecretStoreResolver {
    pub fn new<F>(key: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn SecretStore>, StoreError> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            factory: Box::new(factory),
            client: Mutex::new(None),
        }
    }

    /// A resolver around an already constructed client.
    pub fn with_store(key: impl Into<String>, store: Arc<dyn SecretStore>) -> Self {
        let shared = Arc::clone(&store);
        let resolver = Self::new(key, move || Ok(Arc::clone(&shared)));
        *resolver.client.lock().unwrap_or_else(PoisonError::into_inner) = Some(store);
        resolver
    }

    fn client(&self) -> Result<Arc<dyn SecretStore>, StoreError> {
        let mut slot = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }
        tracing::debug!(namespace = %self.key, "creating secret store client");
        let client = (self.factory)()?;
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }
}

impl fmt::Debug for SecretStoreResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStoreResolver")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl ContextResolver for SecretStoreResolver {
    fn context_key(&self) -> &str {
        &self.key
    }

    fn is_default(&self) -> bool {
        false
    }

    fn marks_secret(&self) -> bool {
        true
    }

    fn lookup(&self, path: &str, node: &Node, _ctx: &PreprocessContext<'_>) -> ConfigValidation<Option<String>> {
        let fetched = self.client().and_then(|client| client.get(path));
        match fetched {
            Ok(value) => Validation::Success(value),
            Err(e) => ConfigValidation::fail_with(ConfigError::ResolverError {
                path: node.path().to_string(),
                source_location: node.pos().cloned(),
                resolver: self.key.clone(),
                message: format!("lookup of '{}' failed: {}", path, e),
            }),
        }
    }
}

/// In-process [`SecretStore`] for tests and local development.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    values: RwLock<BTreeMap<String, String>>,
    failure: Option<StoreError>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// A store whose every lookup fails with `error`.
    pub fn failing(error: StoreError) -> Self {
        Self {
            values: RwLock::default(),
            failure: Some(error),
        }
    }
}

impl SecretStore for InMemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }
}
