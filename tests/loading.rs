//! End-to-end loading: layered sources, preprocessing, decoding and reporting.

#![cfg(all(feature = "derive", feature = "toml"))]

use std::sync::Arc;

use cairn::preprocess::StoreError;
use cairn::prelude::*;
use serde::Deserialize;

#[derive(Debug, Deserialize, Describe)]
struct Database {
    host: String,
    port: u16,
    #[serde(default)]
    password: Option<Secret>,
}

#[derive(Debug, Deserialize, Describe)]
struct AppConfig {
    name: String,
    #[serde(default)]
    hosts: Vec<String>,
    database: Database,
}

const BASE: &str = r#"
name = "orders"

[database]
host = "localhost"
port = 5432
"#;

fn success<T: std::fmt::Debug>(result: ConfigValidation<T>) -> T {
    match result {
        Validation::Success(value) => value,
        Validation::Failure(errors) => panic!("expected success, got {}", errors),
    }
}

fn failures<T: std::fmt::Debug>(result: ConfigValidation<T>) -> Vec<ConfigError> {
    match result {
        Validation::Failure(errors) => errors.into_iter().collect(),
        Validation::Success(value) => panic!("expected failure, got {:?}", value),
    }
}

// ============================================================================
// Layering
// ============================================================================

#[test]
fn test_earlier_sources_take_precedence_per_key() {
    let env = MockEnv::new()
        .with_env("APP_DATABASE_HOST", "db.prod")
        .with_env("OTHER_NAME", "ignored");

    let config = success(
        Config::<AppConfig>::builder()
            .source(Env::prefix("APP_"))
            .source(File::string(BASE, "toml"))
            .source(Defaults::partial().set("database.port", 1).set("name", "fallback"))
            .load_with_env(&env),
    );

    assert_eq!(config.name, "orders");
    assert_eq!(config.database.host, "db.prod");
    assert_eq!(config.database.port, 5432);
}

#[test]
fn test_system_properties_are_a_source() {
    let env = MockEnv::new().with_property("app.database.port", "6543");
    let config = success(
        Config::<AppConfig>::builder()
            .source(SystemProperties::prefix("app."))
            .source(File::string(BASE, "toml"))
            .load_with_env(&env),
    );
    assert_eq!(config.database.port, 6543);
}

#[test]
fn test_optional_file_may_be_absent() {
    let env = MockEnv::new().with_missing_file("local.toml");
    let config = success(
        Config::<AppConfig>::builder()
            .source(File::new("local.toml").optional())
            .source(File::string(BASE, "toml"))
            .load_with_env(&env),
    );
    assert_eq!(config.database.host, "localhost");
}

#[test]
fn test_source_failures_accumulate_across_sources() {
    let env = MockEnv::new().with_missing_file("app.toml");
    let errors = failures(
        Config::<AppConfig>::builder()
            .source(File::new("app.toml"))
            .source(Env::prefix("APP_").require_all(&["TOKEN", "REGION"]))
            .load_with_env(&env),
    );
    assert_eq!(errors.len(), 3);
    assert!(matches!(
        &errors[0],
        ConfigError::SourceError {
            kind: SourceErrorKind::NotFound { .. },
            ..
        }
    ));
    assert!(errors[1..]
        .iter()
        .all(|e| matches!(e, ConfigError::MissingValue { .. })));
}

#[test]
fn test_explicit_null_does_not_hide_lower_value() {
    let config = success(
        Config::<AppConfig>::builder()
            .source(Defaults::partial().set("database.port", serde_json::Value::Null))
            .source(File::string(BASE, "toml"))
            .load_with_env(&MockEnv::new()),
    );
    assert_eq!(config.database.port, 5432);
}

#[test]
fn test_null_for_required_value_is_reported() {
    let errors = failures(
        Config::<AppConfig>::builder()
            .source(
                Defaults::partial()
                    .set("name", "orders")
                    .set("database.host", serde_json::Value::Null)
                    .set("database.port", 1),
            )
            .load_with_env(&MockEnv::new()),
    );
    assert!(matches!(&errors[0], ConfigError::NullValue { path, .. } if path == "database.host"));
}

// ============================================================================
// Lists from flat sources
// ============================================================================

#[test]
fn test_list_from_indexed_env_keys() {
    let env = MockEnv::new()
        .with_env("APP_HOSTS_1", "b.example")
        .with_env("APP_HOSTS_0", "a.example");
    let config = success(
        Config::<AppConfig>::builder()
            .source(Env::prefix("APP_"))
            .source(File::string(BASE, "toml"))
            .load_with_env(&env),
    );
    assert_eq!(config.hosts, vec!["a.example", "b.example"]);
}

#[test]
fn test_list_from_delimited_string() {
    let env = MockEnv::new().with_env("APP_HOSTS", "a.example, b.example,,c.example");
    let config = success(
        Config::<AppConfig>::builder()
            .source(Env::prefix("APP_"))
            .source(File::string(BASE, "toml"))
            .load_with_env(&env),
    );
    assert_eq!(config.hosts, vec!["a.example", "b.example", "c.example"]);
}

// ============================================================================
// Preprocessing
// ============================================================================

#[test]
fn test_placeholder_fallback_and_document_references() {
    let toml = r#"
        name = "${SERVICE_NAME:-orders}"
        hosts = "${database.host}"

        [database]
        host = "${DB_HOST}"
        port = "${DB_PORT:-5432}"
    "#;
    let env = MockEnv::new().with_env("DB_HOST", "db.internal");
    let config = success(
        Config::<AppConfig>::builder()
            .source(File::string(toml, "toml"))
            .load_with_env(&env),
    );
    assert_eq!(config.name, "orders");
    assert_eq!(config.database.host, "db.internal");
    assert_eq!(config.database.port, 5432);
    assert_eq!(config.hosts, vec!["db.internal"]);
}

#[test]
fn test_random_placeholders() {
    let toml = r#"
        name = "worker-${random.uuid}"

        [database]
        host = "localhost"
        port = "${random.int(100)}"
    "#;
    let config = success(
        Config::<AppConfig>::builder()
            .source(File::string(toml, "toml"))
            .load_with_env(&MockEnv::new()),
    );
    assert_eq!(config.name.len(), "worker-".len() + 36);
    assert!(config.database.port < 100);
}

#[derive(Debug, Deserialize, Describe)]
struct Chain {
    a: String,
    b: String,
    c: String,
}

#[test]
fn test_reference_chains_resolve_within_iteration_bound() {
    let toml = r#"
        a = "${{ ref:b }}"
        b = "${{ ref:c }}"
        c = "end"
    "#;
    let chain = success(
        Config::<Chain>::builder()
            .source(File::string(toml, "toml"))
            .load_with_env(&MockEnv::new()),
    );
    assert_eq!((chain.a.as_str(), chain.b.as_str(), chain.c.as_str()), ("end", "end", "end"));

    let chain = success(
        Config::<Chain>::builder()
            .preprocessing_iterations(1)
            .source(File::string(toml, "toml"))
            .load_with_env(&MockEnv::new()),
    );
    assert_eq!(chain.a, "${{ ref:c }}");
    assert_eq!(chain.b, "end");
}

#[test]
fn test_context_resolvers_and_secret_store() {
    let store = InMemorySecretStore::new().with("db/password", "Corr3ct-Horse-Battery");
    let toml = r#"
        name = "${{ env:SERVICE }}"

        [database]
        host = "${{ sysprop:db.host }}"
        port = 5432
        password = "${{ vault:db/password }}"
    "#;
    let env = MockEnv::new()
        .with_env("SERVICE", "billing")
        .with_property("db.host", "db.billing");

    let reported = Config::<AppConfig>::builder()
        .source(File::string(toml, "toml"))
        .context_resolver(SecretStoreResolver::with_store("vault", Arc::new(store)))
        .context_resolver_mode(ContextResolverMode::ErrorOnUnresolved)
        .build_reported_with_env(&env)
        .expect("config loads");

    let config = reported.value();
    assert_eq!(config.name, "billing");
    assert_eq!(config.database.host, "db.billing");
    assert_eq!(
        config.database.password.as_ref().map(Secret::expose),
        Some("Corr3ct-Horse-Battery")
    );

    let entry = reported.report().entry("database.password").expect("reported");
    assert!(entry.secret);
    assert_eq!(entry.resolver.as_deref(), Some("vault"));
    assert!(!entry.value.contains("Horse"));
}

#[test]
fn test_unknown_namespace_is_an_error_in_strict_mode() {
    let toml = r#"
        name = "${{ consul:service/name }}"

        [database]
        host = "${{ env:MISSING_HOST }}"
        port = 1
    "#;
    let errors = failures(
        Config::<AppConfig>::builder()
            .source(File::string(toml, "toml"))
            .context_resolver_mode(ContextResolverMode::ErrorOnUnresolved)
            .load_with_env(&MockEnv::new()),
    );
    let mut placeholders: Vec<&str> = errors
        .iter()
        .filter_map(|e| match e {
            ConfigError::Unresolved { placeholder, .. } => Some(placeholder.as_str()),
            _ => None,
        })
        .collect();
    placeholders.sort();
    assert_eq!(placeholders, vec!["consul:service/name", "env:MISSING_HOST"]);
}

#[test]
fn test_unresolved_placeholder_is_kept_and_reported() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let toml = r#"
        name = "${{ env:SERVICE }}"

        [database]
        host = "localhost"
        port = 5432
    "#;
    let reported = Config::<AppConfig>::builder()
        .source(File::string(toml, "toml"))
        .build_reported_with_env(&MockEnv::new())
        .expect("config loads");

    assert_eq!(reported.value().name, "${{ env:SERVICE }}");
    let warnings: Vec<_> = reported.report().events.iter().filter(|e| e.warning).collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].path, "name");
    assert_eq!(warnings[0].resolver, "env");
}

#[test]
fn test_failing_secret_store_is_a_resolver_error() {
    let toml = r#"
        name = "orders"

        [database]
        host = "localhost"
        port = 1
        password = "${{ vault:db/password }}"
    "#;
    let errors = failures(
        Config::<AppConfig>::builder()
            .source(File::string(toml, "toml"))
            .context_resolver(SecretStoreResolver::new("vault", || {
                Err(StoreError::Connection("vault is sealed".to_string()))
            }))
            .load_with_env(&MockEnv::new()),
    );
    match &errors[0] {
        ConfigError::ResolverError {
            path,
            resolver,
            message,
            ..
        } => {
            assert_eq!(path, "database.password");
            assert_eq!(resolver, "vault");
            assert!(message.contains("sealed"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

// ============================================================================
// Decoding failures
// ============================================================================

#[test]
fn test_all_decode_errors_are_reported_together() {
    let toml = r#"
        [database]
        port = "not-a-port"
    "#;
    let errors = failures(
        Config::<AppConfig>::builder()
            .source(File::string(toml, "toml").named("app.toml"))
            .load_with_env(&MockEnv::new()),
    );
    let mut paths: Vec<&str> = errors.iter().filter_map(|e| e.path()).collect();
    paths.sort();
    assert_eq!(paths, vec!["database.host", "database.port", "name"]);

    let mismatch = errors
        .iter()
        .find(|e| matches!(e, ConfigError::TypeMismatch { .. }))
        .expect("type mismatch");
    let location = mismatch.source_location().expect("position");
    assert_eq!(location.source, "app.toml");
    assert_eq!(location.line, Some(3));
}

#[test]
fn test_build_error_names_the_target_type() {
    let err = Config::<AppConfig>::builder()
        .source(File::string("name = 'x'", "toml"))
        .build_with_env(&MockEnv::new())
        .unwrap_err();
    assert_eq!(err.type_name(), "AppConfig");
    assert!(err.errors().iter().any(|e| e.path() == Some("database")));
}

#[test]
fn test_strict_mode_suggests_known_keys() {
    let toml = r#"
        name = "orders"

        [database]
        host = "localhost"
        port = 5432
        pasword = "x"
    "#;
    let errors = failures(
        Config::<AppConfig>::builder()
            .strict(true)
            .source(File::string(toml, "toml"))
            .load_with_env(&MockEnv::new()),
    );
    match &errors[0] {
        ConfigError::UnknownField { path, did_you_mean, .. } => {
            assert_eq!(path, "database.pasword");
            assert_eq!(did_you_mean.as_deref(), Some("password"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_weak_secrets_fail_when_enabled() {
    let toml = r#"
        name = "orders"

        [database]
        host = "localhost"
        port = 5432
        password = "hunter2"
    "#;
    let builder = Config::<AppConfig>::builder().source(File::string(toml, "toml"));

    assert!(builder.load_with_env(&MockEnv::new()).is_success());

    let errors = failures(builder.fail_on_weak_secrets().load_with_env(&MockEnv::new()));
    assert!(matches!(&errors[0], ConfigError::WeakSecret { path, .. } if path == "database.password"));
}

#[test]
fn test_validators_see_the_decoded_value() {
    let errors = failures(
        Config::<AppConfig>::builder()
            .source(File::string(BASE, "toml"))
            .validator(|c: &AppConfig| {
                if c.database.port < 10_000 {
                    ConfigValidation::fail_with(ConfigError::ValidationError {
                        path: "database.port".to_string(),
                        source_location: None,
                        value: Some(c.database.port.to_string()),
                        message: "must be an ephemeral port".to_string(),
                    })
                } else {
                    Validation::Success(())
                }
            })
            .load_with_env(&MockEnv::new()),
    );
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path(), Some("database.port"));
}

// ============================================================================
// Reporting
// ============================================================================

#[test]
fn test_report_tracks_origin_and_unused_keys() {
    let env = MockEnv::new().with_env("APP_DATABASE_HOST", "db.prod");
    let toml = r#"
        name = "orders"
        legacy = true

        [database]
        host = "localhost"
        port = 5432
    "#;
    let reported = Config::<AppConfig>::builder()
        .source(Env::prefix("APP_"))
        .source(File::string(toml, "toml"))
        .build_reported_with_env(&env)
        .expect("config loads");
    let report = reported.report();

    assert_eq!(report.sources, vec!["environment (APP_*)", "<string.toml>"]);

    let host = report.entry("database.host").expect("host entry");
    assert_eq!(host.value, "db.prod");
    assert_eq!(
        host.location.as_ref().map(|l| l.source.as_str()),
        Some("env:APP_DATABASE_HOST")
    );
    assert_eq!(host.overridden, vec!["<string.toml>"]);

    let unused: Vec<&str> = report.unused().map(|e| e.path.as_str()).collect();
    assert_eq!(unused, vec!["legacy"]);
}
