mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{count, journal, widget, Fixture, Widget};
use ferrous_metro::{
    ActivationPolicy, CollectionPolicy, ComponentDirective, RecordingObserver, RuntimeConfig, ServiceDescriptor,
};

trait Shelf: Send + Sync {
    fn label(&self) -> String;
}

impl Shelf for Widget {
    fn label(&self) -> String {
        self.classname.clone()
    }
}

fn shelved(component: &ferrous_metro::ComponentHandler) -> ferrous_metro::ComponentValue {
    component.get_provider().unwrap().get_value(true).unwrap()
}

fn serial(component: &ferrous_metro::ComponentHandler) -> usize {
    component.get_provider().unwrap().instance::<Widget>().unwrap().serial
}

// ===== Reference strength =====

#[test]
fn test_hard_singleton_survives_collection() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.Cache", &journal).build()).build();
    let component = controller
        .create_component_from(&ComponentDirective::new("cache", "acme.Cache").collection(CollectionPolicy::Hard))
        .unwrap();

    let before = serial(&component);
    assert_eq!(controller.collect(), 0);
    assert_eq!(serial(&component), before);
    assert_eq!(count(&journal, "create:acme.Cache"), 1);
}

#[test]
fn test_root_and_nested_system_collection() {
    let journal = journal();
    let controller = Fixture::new()
        .with_type(widget("acme.App", &journal).build())
        .with_type(widget("acme.Part", &journal).build())
        .build();
    let directive =
        ComponentDirective::new("app", "acme.App").part("part", ComponentDirective::new("part", "acme.Part"));
    let component = controller.create_component_from(&directive).unwrap();

    assert_eq!(component.collection_policy(), CollectionPolicy::Hard);
    let part = component.parts_manager().handler("part").unwrap();
    assert_eq!(part.collection_policy(), CollectionPolicy::Soft);
}

#[test]
fn test_soft_singleton_recreated_after_collection() {
    let journal = journal();
    let recorder = Arc::new(RecordingObserver::new());
    let controller = Fixture::new()
        .with_type(widget("acme.Cache", &journal).build())
        .observer(recorder.clone())
        .build();
    let directive = ComponentDirective::new("cache", "acme.Cache")
        .activation(ActivationPolicy::Startup)
        .collection(CollectionPolicy::Soft);
    let component = controller.create_component_from(&directive).unwrap();
    component.commission().unwrap();

    let before = serial(&component);
    assert_eq!(controller.collect(), 1);
    assert_eq!(count(&journal, "stop:acme.Cache"), 1);
    assert_eq!(component.size(), 0);

    let after = serial(&component);
    assert_ne!(before, after);
    assert_eq!(count(&journal, "create:acme.Cache"), 2);
    // the handler stays active; startup work is not repeated
    assert!(component.is_active());
    assert_eq!(recorder.paths("commissioned"), vec!["/cache"]);
}

#[test]
fn test_soft_singleton_in_use_is_kept() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.Cache", &journal).build()).build();
    let component = controller
        .create_component_from(&ComponentDirective::new("cache", "acme.Cache").collection(CollectionPolicy::Soft))
        .unwrap();

    let held = component.get_provider().unwrap();
    let before = held.instance::<Widget>().unwrap().serial;
    assert_eq!(controller.collect(), 1);

    // still reachable through the caller's handle, so it is handed out again
    assert_eq!(serial(&component), before);
    assert_eq!(count(&journal, "create:acme.Cache"), 1);
}

#[test]
fn test_weak_singleton_lives_while_referenced() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.Cache", &journal).build()).build();
    let component = controller
        .create_component_from(&ComponentDirective::new("cache", "acme.Cache").collection(CollectionPolicy::Weak))
        .unwrap();

    let held = component.get_provider().unwrap();
    let first = held.instance::<Widget>().unwrap().serial;
    assert_eq!(serial(&component), first);

    drop(held);
    assert_eq!(count(&journal, "stop:acme.Cache"), 1);
    assert_eq!(component.size(), 0);
    assert_ne!(serial(&component), first);
}

#[test]
fn test_idle_collection_honours_ttl() {
    let journal = journal();
    let config = RuntimeConfig {
        soft_reference_ttl: Some(Duration::ZERO),
        ..RuntimeConfig::default()
    };
    let controller = Fixture::new()
        .with_type(widget("acme.Cache", &journal).build())
        .config(config)
        .build();
    let component = controller
        .create_component_from(&ComponentDirective::new("cache", "acme.Cache").collection(CollectionPolicy::Soft))
        .unwrap();
    component.get_provider().unwrap();
    assert_eq!(controller.runtime().collect_idle(), 1);
    assert_eq!(component.size(), 0);

    let journal = common::journal();
    let config = RuntimeConfig {
        soft_reference_ttl: Some(Duration::from_secs(3600)),
        ..RuntimeConfig::default()
    };
    let controller = Fixture::new()
        .with_type(widget("acme.Cache", &journal).build())
        .config(config)
        .build();
    let component = controller
        .create_component_from(&ComponentDirective::new("cache", "acme.Cache").collection(CollectionPolicy::Soft))
        .unwrap();
    component.get_provider().unwrap();
    assert_eq!(controller.runtime().collect_idle(), 0);
    assert_eq!(component.size(), 1);
}

// ===== Isolated values =====

fn shelf_controller(journal: &common::Journal) -> ferrous_metro::Controller {
    let ty = widget("acme.Cache", journal)
        .service(ServiceDescriptor::new("acme.Shelf").view(|w: Arc<Widget>| w as Arc<dyn Shelf>))
        .build();
    Fixture::new().with_type(ty).build()
}

#[test]
fn test_held_proxy_keeps_weak_singleton_alive() {
    let journal = journal();
    let controller = shelf_controller(&journal);
    let component = controller
        .create_component_from(&ComponentDirective::new("cache", "acme.Cache").collection(CollectionPolicy::Weak))
        .unwrap();

    let held = shelved(&component);
    assert!(held.is_proxy());
    assert_eq!(count(&journal, "stop:acme.Cache"), 0);
    assert_eq!(component.size(), 1);

    let again = shelved(&component);
    assert_eq!(count(&journal, "create:acme.Cache"), 1);
    assert_eq!(held.service::<dyn Shelf>("acme.Shelf").unwrap().label(), "acme.Cache");

    drop(again);
    drop(held);
    assert_eq!(count(&journal, "stop:acme.Cache"), 1);
    assert_eq!(component.size(), 0);
}

#[test]
fn test_held_proxy_survives_soft_collection() {
    let journal = journal();
    let controller = shelf_controller(&journal);
    let component = controller
        .create_component_from(&ComponentDirective::new("cache", "acme.Cache").collection(CollectionPolicy::Soft))
        .unwrap();

    let held = shelved(&component);
    assert_eq!(controller.collect(), 1);
    assert_eq!(count(&journal, "stop:acme.Cache"), 0);

    shelved(&component);
    assert_eq!(count(&journal, "create:acme.Cache"), 1);
    assert!(held.service::<dyn Shelf>("acme.Shelf").is_some());
}

#[test]
fn test_proxy_goes_dark_after_decommission() {
    let journal = journal();
    let controller = shelf_controller(&journal);
    let component = controller
        .create_component_from(&ComponentDirective::new("cache", "acme.Cache"))
        .unwrap();

    let held = shelved(&component);
    component.decommission();
    assert_eq!(count(&journal, "stop:acme.Cache"), 1);
    assert!(held.service::<dyn Shelf>("acme.Shelf").is_none());
}
