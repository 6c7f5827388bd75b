//! Core Config type and ConfigBuilder.
//!
//! The builder collects sources and the pieces of the load pipeline; a load
//! runs: sources → merge → preprocess → decode → instantiate → validate.
//! Every stage accumulates its failures, and the first stage that fails ends
//! the load with all of them.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use stillwater::Validation;

use crate::decoder::{Decoder, DecoderContext, DecoderRegistry};
use crate::describe::{Describe, TypeDesc, VariantShape};
use crate::env::{ConfigEnv, RealEnv};
use crate::error::{ConfigError, ConfigErrors, ConfigValidation, ConfigValidationExt, LoadError};
use crate::mapper::{default_mappers, normalize_key, ParameterMapper};
use crate::merge::merge_all;
use crate::node::{DotPath, Node, PathSegment};
use crate::parsers::{Parser, ParserRegistry};
use crate::preprocess::{
    self, default_context_resolvers, ContextResolver, ContextResolverMode,
    ContextResolverPreprocessor, PlaceholderPreprocessor, Preprocessor, RandomPreprocessor,
    DEFAULT_ITERATIONS,
};
use crate::report::{ConfigReport, ReportedConfig, Reporter};
use crate::resolver::Resolver;
use crate::secret::{
    DefaultSecretPolicy, Obfuscator, PrefixObfuscator, SecretPolicy, WeakSecretResolver,
};
use crate::source::{PropertySource, SourceContext};

/// Wrapper around a loaded and validated configuration value.
///
/// It implements `Deref` to provide transparent access to the inner type.
#[derive(Debug, Clone)]
pub struct Config<T> {
    inner: T,
}

impl<T> Config<T> {
    /// Wrap an already loaded value.
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    pub fn get(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Create a builder for this configuration type.
    pub fn builder() -> ConfigBuilder<T> {
        ConfigBuilder::new()
    }
}

impl<T> std::ops::Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> AsRef<T> for Config<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}

type ValueValidator<T> = dyn Fn(&T) -> ConfigValidation<()> + Send + Sync;

/// Builder for loading configuration.
///
/// Sources are listed highest precedence first: a key defined by an earlier
/// source wins over the same key from a later one.
///
/// # Example
///
/// ```ignore
/// use cairn::prelude::*;
///
/// let config = Config::<AppConfig>::builder()
///     .source(Env::prefix("APP_"))
///     .source(File::new("config.toml").optional())
///     .source(Defaults::from(AppConfig::default()))
///     .build()?;
/// ```
pub struct ConfigBuilder<T> {
    sources: Vec<Arc<dyn PropertySource>>,
    parsers: ParserRegistry,
    preprocessors: Vec<Arc<dyn Preprocessor>>,
    default_preprocessors: bool,
    context_resolvers: Vec<Arc<dyn ContextResolver>>,
    default_context_resolvers: bool,
    context_mode: ContextResolverMode,
    resolvers: Vec<Arc<dyn Resolver>>,
    decoders: DecoderRegistry,
    mappers: Vec<Arc<dyn ParameterMapper>>,
    iterations: usize,
    strict: bool,
    normalize_keys: bool,
    discriminator: Option<String>,
    secret_policy: Arc<dyn SecretPolicy>,
    obfuscator: Arc<dyn Obfuscator>,
    fail_on_weak_secrets: bool,
    report: bool,
    validators: Vec<Arc<ValueValidator<T>>>,
    #[cfg(feature = "watch")]
    poll_interval: Option<std::time::Duration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for ConfigBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ConfigBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            sources: self.sources.clone(),
            parsers: self.parsers.clone(),
            preprocessors: self.preprocessors.clone(),
            default_preprocessors: self.default_preprocessors,
            context_resolvers: self.context_resolvers.clone(),
            default_context_resolvers: self.default_context_resolvers,
            context_mode: self.context_mode,
            resolvers: self.resolvers.clone(),
            decoders: self.decoders.clone(),
            mappers: self.mappers.clone(),
            iterations: self.iterations,
            strict: self.strict,
            normalize_keys: self.normalize_keys,
            discriminator: self.discriminator.clone(),
            secret_policy: Arc::clone(&self.secret_policy),
            obfuscator: Arc::clone(&self.obfuscator),
            fail_on_weak_secrets: self.fail_on_weak_secrets,
            report: self.report,
            validators: self.validators.clone(),
            #[cfg(feature = "watch")]
            poll_interval: self.poll_interval,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ConfigBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigBuilder")
            .field("sources", &self.sources.iter().map(|s| s.source()).collect::<Vec<_>>())
            .field("decoders", &self.decoders)
            .field("iterations", &self.iterations)
            .field("strict", &self.strict)
            .field("context_mode", &self.context_mode)
            .finish_non_exhaustive()
    }
}

impl<T> ConfigBuilder<T> {
    /// Create a builder with the default parsers, preprocessors, context
    /// resolvers, decoders and parameter mappers.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            parsers: ParserRegistry::with_defaults(),
            preprocessors: Vec::new(),
            default_preprocessors: true,
            context_resolvers: Vec::new(),
            default_context_resolvers: true,
            context_mode: ContextResolverMode::default(),
            resolvers: Vec::new(),
            decoders: DecoderRegistry::with_defaults(),
            mappers: default_mappers(),
            iterations: DEFAULT_ITERATIONS,
            strict: false,
            normalize_keys: false,
            discriminator: None,
            secret_policy: Arc::new(DefaultSecretPolicy::default()),
            obfuscator: Arc::new(PrefixObfuscator::default()),
            fail_on_weak_secrets: false,
            report: false,
            validators: Vec::new(),
            #[cfg(feature = "watch")]
            poll_interval: None,
            _marker: PhantomData,
        }
    }

    /// Add a configuration source, below every source added before it.
    pub fn source<S: PropertySource + 'static>(mut self, source: S) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Register a parser for its default extensions, replacing any existing
    /// parser for the same extension.
    pub fn parser<P: Parser + 'static>(mut self, parser: P) -> Self {
        self.parsers = self.parsers.register(parser);
        self
    }

    /// Add a preprocessor; it runs after the built-in ones.
    pub fn preprocessor<P: Preprocessor + 'static>(mut self, preprocessor: P) -> Self {
        self.preprocessors.push(Arc::new(preprocessor));
        self
    }

    /// Drop the built-in placeholder, random and context preprocessors.
    pub fn without_default_preprocessors(mut self) -> Self {
        self.default_preprocessors = false;
        self
    }

    /// Register a context resolver. A resolver for an already served
    /// namespace takes over that namespace.
    pub fn context_resolver<R: ContextResolver + 'static>(mut self, resolver: R) -> Self {
        self.context_resolvers.push(Arc::new(resolver));
        self
    }

    /// Only explicitly registered context resolvers answer `${{ ... }}`.
    pub fn without_default_context_resolvers(mut self) -> Self {
        self.default_context_resolvers = false;
        self
    }

    pub fn context_resolver_mode(mut self, mode: ContextResolverMode) -> Self {
        self.context_mode = mode;
        self
    }

    /// Add a type-aware resolver, run on every value before it is decoded.
    pub fn resolver<R: Resolver + 'static>(mut self, resolver: R) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    /// Register a decoder. Give it a higher priority than the built-ins to
    /// override them.
    pub fn decoder<D: Decoder + 'static>(mut self, decoder: D) -> Self {
        self.decoders.register(decoder);
        self
    }

    /// Add a parameter mapper after the current ones.
    pub fn parameter_mapper<M: ParameterMapper + 'static>(mut self, mapper: M) -> Self {
        self.mappers.push(Arc::new(mapper));
        self
    }

    /// Replace the parameter mappers.
    pub fn parameter_mappers(mut self, mappers: Vec<Arc<dyn ParameterMapper>>) -> Self {
        self.mappers = mappers;
        self
    }

    /// Upper bound on preprocessing passes. Zero disables preprocessing.
    pub fn preprocessing_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Fail on source keys that no field consumes.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Fall back to case- and separator-insensitive key matching.
    pub fn normalize_keys(mut self, normalize: bool) -> Self {
        self.normalize_keys = normalize;
        self
    }

    /// Discriminator key for sum types that do not declare one. It selects
    /// the variant only where a map carries the key.
    pub fn discriminator(mut self, key: impl Into<String>) -> Self {
        self.discriminator = Some(key.into());
        self
    }

    pub fn secret_policy<P: SecretPolicy + 'static>(mut self, policy: P) -> Self {
        self.secret_policy = Arc::new(policy);
        self
    }

    pub fn obfuscator<O: Obfuscator + 'static>(mut self, obfuscator: O) -> Self {
        self.obfuscator = Arc::new(obfuscator);
        self
    }

    /// Reject secrets that the default strength analyzer rates weak.
    pub fn fail_on_weak_secrets(mut self) -> Self {
        self.fail_on_weak_secrets = true;
        self
    }

    /// Log the audit report at `info` after every successful load.
    pub fn report(mut self, report: bool) -> Self {
        self.report = report;
        self
    }

    /// Add a check on the loaded value. All validators run; their failures
    /// are accumulated.
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> ConfigValidation<()> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    /// With [`build_watched`](Self::build_watched), also reload every
    /// `interval`, picking up changes no file event reports (environment,
    /// secret stores).
    #[cfg(feature = "watch")]
    pub fn poll_interval(mut self, interval: std::time::Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    #[cfg(feature = "watch")]
    pub(crate) fn watch_paths(&self) -> Vec<std::path::PathBuf> {
        self.sources.iter().filter_map(|s| s.watch_path()).collect()
    }

    #[cfg(feature = "watch")]
    pub(crate) fn polling(&self) -> Option<std::time::Duration> {
        self.poll_interval
    }

    fn preprocessor_chain(&self) -> Vec<Arc<dyn Preprocessor>> {
        let mut chain: Vec<Arc<dyn Preprocessor>> = Vec::new();
        if self.default_preprocessors {
            let mut resolvers = if self.default_context_resolvers {
                default_context_resolvers()
            } else {
                Vec::new()
            };
            resolvers.extend(self.context_resolvers.iter().cloned());
            chain.push(Arc::new(PlaceholderPreprocessor::new()));
            chain.push(Arc::new(RandomPreprocessor));
            chain.push(Arc::new(ContextResolverPreprocessor::new(resolvers, self.context_mode)));
        }
        chain.extend(self.preprocessors.iter().cloned());
        chain
    }

    fn decode_resolvers(&self) -> Vec<Arc<dyn Resolver>> {
        let mut resolvers = self.resolvers.clone();
        if self.fail_on_weak_secrets {
            resolvers.push(Arc::new(WeakSecretResolver::default()));
        }
        resolvers
    }
}

impl<T> ConfigBuilder<T>
where
    T: DeserializeOwned + Describe,
{
    /// Load against the real environment, returning every failure as data.
    pub fn load(&self) -> ConfigValidation<T> {
        self.load_with_env(&RealEnv::new())
    }

    /// Load against `env`, returning every failure as data.
    pub fn load_with_env(&self, env: &dyn ConfigEnv) -> ConfigValidation<T> {
        self.run(env).map(|(value, _)| value)
    }

    /// Build the configuration using the real environment.
    ///
    /// This is the main entry point for production use.
    pub fn build(self) -> Result<Config<T>, LoadError> {
        self.build_with_env(&RealEnv::new())
    }

    /// Build the configuration with a custom environment.
    pub fn build_with_env(self, env: &dyn ConfigEnv) -> Result<Config<T>, LoadError> {
        self.load_with_env(env)
            .into_result()
            .map(Config::new)
            .map_err(|errors| LoadError::new(T::describe().type_name(), errors))
    }

    /// Build the configuration together with its audit report.
    pub fn build_reported(self) -> Result<ReportedConfig<T>, LoadError> {
        self.build_reported_with_env(&RealEnv::new())
    }

    pub fn build_reported_with_env(self, env: &dyn ConfigEnv) -> Result<ReportedConfig<T>, LoadError> {
        match self.run(env) {
            Validation::Success((value, report)) => Ok(ReportedConfig::new(Config::new(value), report)),
            Validation::Failure(errors) => Err(LoadError::new(T::describe().type_name(), errors)),
        }
    }

    /// Build the configuration and keep it current as its files change.
    ///
    /// Only available with the `watch` feature.
    #[cfg(feature = "watch")]
    pub fn build_watched(
        self,
    ) -> Result<(crate::watch::WatchedConfig<T>, crate::watch::ConfigWatcher), LoadError>
    where
        T: Send + Sync + 'static,
    {
        self.build_watched_with_env(Arc::new(RealEnv::new()))
    }

    /// [`build_watched`](Self::build_watched) against `env`, which every
    /// reload reuses.
    #[cfg(feature = "watch")]
    pub fn build_watched_with_env(
        self,
        env: Arc<dyn ConfigEnv>,
    ) -> Result<(crate::watch::WatchedConfig<T>, crate::watch::ConfigWatcher), LoadError>
    where
        T: Send + Sync + 'static,
    {
        crate::watch::build_watched(self, env)
    }

    fn run(&self, env: &dyn ConfigEnv) -> ConfigValidation<(T, ConfigReport)> {
        if self.sources.is_empty() {
            return ConfigValidation::fail_with(ConfigError::NoSources);
        }

        let ctx = SourceContext::new(&self.parsers, env);
        let mut per_source = Vec::with_capacity(self.sources.len());
        let results: Vec<ConfigValidation<Node>> = self
            .sources
            .iter()
            .map(|source| {
                let name = source.source();
                tracing::debug!(source = %name, "loading property source");
                let result = source.node(&ctx);
                if let Validation::Success(node) = &result {
                    per_source.push((name, node.clone()));
                }
                result
            })
            .collect();

        let merged = match merge_all(results) {
            Validation::Success(node) => node,
            Validation::Failure(errors) => return Validation::Failure(errors),
        };

        let reporter = Reporter::new();
        let tree = match preprocess::run(
            merged,
            &self.preprocessor_chain(),
            self.iterations,
            env,
            &reporter,
        ) {
            Validation::Success(node) => node,
            Validation::Failure(errors) => return Validation::Failure(errors),
        };

        let desc = T::describe();
        let decoded = self.decode(&tree, &desc, &reporter);
        let unknown = if self.strict {
            unknown_fields(&tree, &desc, &reporter)
        } else {
            Validation::Success(())
        };
        let json = match ConfigValidation::<()>::all((decoded, unknown)) {
            Validation::Success((json, ())) => json,
            Validation::Failure(errors) => return Validation::Failure(errors),
        };

        let value: T = match serde_json::from_value(json) {
            Ok(value) => value,
            Err(e) => {
                return ConfigValidation::fail_with(ConfigError::Instantiation {
                    type_name: desc.type_name(),
                    message: e.to_string(),
                })
            }
        };

        let checks: Vec<ConfigValidation<()>> = self.validators.iter().map(|check| check(&value)).collect();
        if let Validation::Failure(errors) = Validation::all_vec(checks) {
            return Validation::Failure(errors);
        }

        let report = ConfigReport::build(
            &per_source,
            &tree,
            &reporter,
            self.secret_policy.as_ref(),
            self.obfuscator.as_ref(),
        );
        if self.report {
            tracing::info!("configuration loaded\n{}", report);
        }
        Validation::Success((value, report))
    }

    fn decode(&self, tree: &Node, desc: &TypeDesc, reporter: &Reporter) -> ConfigValidation<serde_json::Value> {
        let resolvers = self.decode_resolvers();
        let ctx = DecoderContext {
            registry: &self.decoders,
            resolvers: &resolvers,
            mappers: &self.mappers,
            normalize_keys: self.normalize_keys,
            discriminator: self.discriminator.as_deref(),
            root: tree,
            secret_policy: self.secret_policy.as_ref(),
            reporter,
        };
        ctx.decode(tree, desc, &DotPath::root())
    }
}

/// Every leaf decoding left untouched, as an `UnknownField`.
fn unknown_fields(tree: &Node, desc: &TypeDesc, reporter: &Reporter) -> ConfigValidation<()> {
    let errors: Vec<ConfigError> = tree
        .leaves()
        .into_iter()
        .filter(|(path, _)| !path.is_root() && !reporter.is_used(path))
        .map(|(path, node)| {
            let did_you_mean = path
                .last_key()
                .and_then(|key| closest(key, &expected_keys(desc, &path.parent())));
            ConfigError::UnknownField {
                path: path.to_string(),
                source_location: node.pos().cloned(),
                did_you_mean,
            }
        })
        .collect();
    match ConfigErrors::from_vec(errors) {
        Some(errors) => Validation::Failure(errors),
        None => Validation::Success(()),
    }
}

/// Field keys a record at `path` would accept.
fn expected_keys(desc: &TypeDesc, path: &DotPath) -> Vec<String> {
    let mut current = vec![desc];
    for segment in path.segments() {
        current = current
            .into_iter()
            .flat_map(|desc| step(desc, segment))
            .collect();
    }
    current
        .into_iter()
        .flat_map(record_fields)
        .collect()
}

fn step<'a>(desc: &'a TypeDesc, segment: &PathSegment) -> Vec<&'a TypeDesc> {
    match desc {
        TypeDesc::Optional(inner) => step(inner, segment),
        TypeDesc::List(element) | TypeDesc::Set(element) => vec![element],
        TypeDesc::Map { value, .. } => vec![value],
        TypeDesc::Record(record) => match segment {
            PathSegment::Key(key) => {
                let wanted = normalize_key(key);
                record
                    .fields
                    .iter()
                    .filter(|field| {
                        normalize_key(&field.key) == wanted
                            || normalize_key(&field.name) == wanted
                            || field.aliases.iter().any(|a| normalize_key(a) == wanted)
                    })
                    .map(|field| &field.desc)
                    .collect()
            }
            PathSegment::Index(_) => Vec::new(),
        },
        TypeDesc::Sum(sum) => match segment {
            PathSegment::Key(key) => match sum.find(key) {
                Some(variant) => match &variant.shape {
                    VariantShape::Newtype(inner) => vec![inner.as_ref()],
                    VariantShape::Struct(_) | VariantShape::Unit => Vec::new(),
                },
                None => sum
                    .variants
                    .iter()
                    .filter_map(|variant| match &variant.shape {
                        VariantShape::Struct(record) => record
                            .fields
                            .iter()
                            .find(|f| f.key == *key)
                            .map(|f| &f.desc),
                        _ => None,
                    })
                    .collect(),
            },
            PathSegment::Index(_) => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn record_fields(desc: &TypeDesc) -> Vec<String> {
    match desc {
        TypeDesc::Optional(inner) => record_fields(inner),
        TypeDesc::Record(record) => record.fields.iter().map(|f| f.key.clone()).collect(),
        TypeDesc::Sum(sum) => sum
            .variants
            .iter()
            .flat_map(|variant| match &variant.shape {
                VariantShape::Struct(record) => record.fields.iter().map(|f| f.key.clone()).collect(),
                VariantShape::Newtype(inner) => record_fields(inner),
                VariantShape::Unit => Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// The candidate within a small edit distance of `key`, if any.
fn closest(key: &str, candidates: &[String]) -> Option<String> {
    let limit = (key.chars().count() / 3).max(2);
    candidates
        .iter()
        .map(|candidate| (edit_distance(&key.to_lowercase(), &candidate.to_lowercase()), candidate))
        .filter(|(distance, _)| *distance <= limit)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate.clone())
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == *cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}
