mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::{broken, count, journal, widget, Fixture, Journal, Widget};
use ferrous_metro::{
    ActivationPolicy, Arguments, ComponentDirective, ControlError, RuntimeConfig, Type,
};

fn startup(name: &str, classname: &str) -> ComponentDirective {
    ComponentDirective::new(name, classname).activation(ActivationPolicy::Startup)
}

/// Widget whose constructor blocks for `delay`, ignoring cancellation
fn sluggish(classname: &str, delay: Duration, journal: &Journal) -> Type {
    let recorder = journal.clone();
    let name = classname.to_string();
    Type::builder(classname)
        .constructor(vec![], move |_args: Arguments| {
            thread::sleep(delay);
            recorder.lock().unwrap().push(format!("create:{}", name));
            Ok(name.clone())
        })
        .build()
}

fn timed(timeout: Duration, grace: Duration) -> RuntimeConfig {
    RuntimeConfig {
        commission_timeout: Some(timeout),
        commission_grace: grace,
        ..RuntimeConfig::default()
    }
}

fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

// ===== Timed commissioning =====

#[test]
fn test_parts_commission_within_timeout() {
    let journal = journal();
    let controller = Fixture::new()
        .with_type(widget("acme.App", &journal).build())
        .with_type(widget("acme.Fast", &journal).build())
        .config(timed(Duration::from_secs(5), Duration::from_millis(250)))
        .build();
    let directive = ComponentDirective::new("app", "acme.App").part("fast", startup("fast", "acme.Fast"));
    let app = controller.create_component_from(&directive).unwrap();

    app.commission().unwrap();
    let fast = app.parts_manager().handler("fast").unwrap();
    assert!(fast.is_active());
    assert_eq!(count(&journal, "start:acme.Fast"), 1);
}

#[test]
fn test_slow_part_is_interrupted_and_rolled_back() {
    let journal = journal();
    let controller = Fixture::new()
        .with_type(widget("acme.App", &journal).build())
        .with_type(sluggish("acme.Slow", Duration::from_millis(300), &journal))
        .config(timed(Duration::from_millis(50), Duration::from_secs(5)))
        .build();
    let directive = ComponentDirective::new("app", "acme.App").part("slow", startup("slow", "acme.Slow"));
    let app = controller.create_component_from(&directive).unwrap();

    let error = app.commission().unwrap_err();
    assert!(error.is_timeout());
    assert!(matches!(error.root_cause(), ControlError::Timeout { ref name, .. } if name == "/app/slow"));
    assert!(error.to_string().contains("[slow]"));

    // the worker finished within the grace period, so the part was rolled back
    let slow = app.parts_manager().handler("slow").unwrap();
    assert!(!slow.is_active());
    assert_eq!(count(&journal, "create:acme.Slow"), 1);
    assert!(!app.is_active());
}

#[test]
fn test_stuck_part_is_abandoned() {
    let journal = journal();
    let controller = Fixture::new()
        .with_type(widget("acme.App", &journal).build())
        .with_type(sluggish("acme.Stuck", Duration::from_millis(300), &journal))
        .config(timed(Duration::from_millis(20), Duration::from_millis(20)))
        .build();
    let directive = ComponentDirective::new("app", "acme.App").part("stuck", startup("stuck", "acme.Stuck"));
    let app = controller.create_component_from(&directive).unwrap();

    let error = app.commission().unwrap_err();
    assert!(error.is_timeout());
    assert!(matches!(error.root_cause(), ControlError::Terminated { .. }));

    // the abandoned worker still completes on its own
    assert!(wait_until(Duration::from_secs(5), || count(&journal, "create:acme.Stuck") == 1));
}

// ===== Failure policy =====

#[test]
fn test_failures_absorbed_without_fail_fast() {
    let journal = journal();
    let config = RuntimeConfig {
        fail_fast: false,
        ..RuntimeConfig::default()
    };
    let controller = Fixture::new()
        .with_type(widget("acme.App", &journal).build())
        .with_type(broken("acme.Bad", &journal).build())
        .with_type(widget("acme.Good", &journal).build())
        .config(config)
        .build();
    let directive = ComponentDirective::new("app", "acme.App")
        .part("bad", startup("bad", "acme.Bad"))
        .part("good", startup("good", "acme.Good"));
    let app = controller.create_component_from(&directive).unwrap();

    app.commission().unwrap();
    assert!(app.is_active());
    assert!(!app.parts_manager().handler("bad").unwrap().is_active());
    assert!(app.parts_manager().handler("good").unwrap().is_active());
    assert_eq!(count(&journal, "fail:acme.Bad"), 1);
    assert_eq!(count(&journal, "start:acme.Good"), 1);
}

#[test]
fn test_part_instances_are_reachable_after_timed_commission() {
    let journal = journal();
    let controller = Fixture::new()
        .with_type(widget("acme.App", &journal).build())
        .with_type(widget("acme.Worker", &journal).build())
        .config(timed(Duration::from_secs(5), Duration::from_millis(250)))
        .build();
    let directive = ComponentDirective::new("app", "acme.App").part("worker", startup("worker", "acme.Worker"));
    let app = controller.create_component_from(&directive).unwrap();
    app.commission().unwrap();

    // created on the commissioning thread, handed out on this one
    let worker = app.parts_manager().handler("worker").unwrap();
    assert_eq!(worker.size(), 1);
    let instance = worker.get_provider().unwrap().instance::<Widget>().unwrap();
    assert_eq!(instance.classname, "acme.Worker");
    assert_eq!(count(&journal, "create:acme.Worker"), 1);
}
