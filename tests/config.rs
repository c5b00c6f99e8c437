mod common;

use std::env;
use std::time::Duration;

use common::{journal, widget, Fixture};
use ferrous_metro::{
    ActivationPolicy, CollectionPolicy, ComponentDirective, ConfigProvider, ConfigValue, ControlError, Controller,
    JsonConfigSource, MapConfigSource, RuntimeConfig,
};
use serial_test::serial;

const VARIABLES: [&str; 4] = [
    "METRO_PARTITION",
    "METRO_COLLECTION_NESTED",
    "METRO_COMMISSION_TIMEOUT_MS",
    "METRO_ACTIVATION_DEFAULT",
];

fn clear_environment() {
    for variable in VARIABLES {
        env::remove_var(variable);
    }
}

// ===== Environment =====

#[test]
#[serial]
fn test_environment_overrides_defaults() {
    clear_environment();
    env::set_var("METRO_PARTITION", "/env");
    env::set_var("METRO_COLLECTION_NESTED", "weak");
    env::set_var("METRO_COMMISSION_TIMEOUT_MS", "1500");

    let config = RuntimeConfig::from_env().unwrap();
    clear_environment();

    assert_eq!(config.partition, "/env/");
    assert_eq!(config.nested_collection, CollectionPolicy::Weak);
    assert_eq!(config.commission_timeout, Some(Duration::from_millis(1500)));
    assert_eq!(config.root_collection, CollectionPolicy::Hard);
}

#[test]
#[serial]
fn test_bad_environment_value_is_an_error() {
    clear_environment();
    env::set_var("METRO_ACTIVATION_DEFAULT", "eventually");
    let result = RuntimeConfig::from_env();
    clear_environment();

    match result {
        Err(ControlError::Config(message)) => assert!(message.contains("eventually")),
        other => panic!("expected a configuration error, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_builder_reads_config_provider() {
    clear_environment();
    env::set_var("METRO_ACTIVATION_DEFAULT", "startup");
    let builder = Controller::builder().config_provider(&ConfigProvider::default());
    clear_environment();

    let controller = builder.unwrap().build();
    assert_eq!(controller.runtime().config().default_activation, ActivationPolicy::Startup);
}

// ===== Documents and maps =====

#[test]
fn test_partition_prefixes_component_paths() {
    let source = JsonConfigSource::from_document(r#"{ "partition": "/tenant", "collection": { "root": "soft" } }"#).unwrap();
    let mut provider = ConfigProvider::new();
    provider.add_source(Box::new(source));
    let config = RuntimeConfig::load(&provider).unwrap();

    let journal = journal();
    let controller = Fixture::new()
        .with_type(widget("acme.App", &journal).build())
        .with_type(widget("acme.Part", &journal).build())
        .config(config)
        .build();
    let directive =
        ComponentDirective::new("app", "acme.App").part("part", ComponentDirective::new("part", "acme.Part"));
    let app = controller.create_component_from(&directive).unwrap();

    assert_eq!(app.path(), "/tenant/app");
    assert_eq!(app.collection_policy(), CollectionPolicy::Soft);
    assert_eq!(app.symbols()["uri"], "component:/tenant/app");
    let part = app.parts_manager().handler("part").unwrap();
    assert_eq!(part.path(), "/tenant/app/part");
    assert_eq!(part.logger().category(), "tenant.app.part");
}

#[test]
fn test_system_activation_follows_configured_default() {
    let mut provider = ConfigProvider::new();
    provider.add_source(Box::new(
        MapConfigSource::new().with("activation.default", ConfigValue::String("startup".into())),
    ));
    let config = RuntimeConfig::load(&provider).unwrap();

    let journal = journal();
    let controller = Fixture::new()
        .with_type(widget("acme.App", &journal).build())
        .config(config)
        .build();
    let app = controller
        .create_component_from(&ComponentDirective::new("app", "acme.App"))
        .unwrap();
    assert_eq!(app.activation_policy(), ActivationPolicy::Startup);

    app.commission().unwrap();
    assert_eq!(app.size(), 1);
    assert_eq!(common::count(&journal, "create:acme.App"), 1);
}

#[test]
fn test_work_and_temp_symbols_follow_config() {
    let config = RuntimeConfig {
        work_dir: "/srv/work".into(),
        temp_dir: "/srv/tmp".into(),
        ..RuntimeConfig::default()
    };
    let journal = journal();
    let controller = Fixture::new()
        .with_type(widget("acme.App", &journal).build())
        .config(config)
        .build();
    let app = controller
        .create_component_from(&ComponentDirective::new("app", "acme.App"))
        .unwrap();

    assert_eq!(app.symbols()["work"], "/srv/work");
    assert_eq!(app.symbols()["temp"], "/srv/tmp");
    assert_eq!(app.symbols()["name"], "app");
}
