mod common;

use std::sync::{Arc, Mutex};

use common::{journal, widget, Fixture};
use ferrous_metro::{
    ActivationPolicy, CollectionPolicy, ComponentDirective, Event, EventListener, LifestylePolicy, Status,
};

#[derive(Default)]
struct Collector {
    events: Mutex<Vec<Event>>,
}

impl EventListener for Collector {
    fn notify(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl Collector {
    fn statuses(&self) -> Vec<(Status, Status)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Status(s) => Some((s.old_status, s.new_status)),
                _ => None,
            })
            .collect()
    }

    fn states(&self) -> Vec<(String, String)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::State(s) => Some((s.old_state.clone(), s.new_state.clone())),
                _ => None,
            })
            .collect()
    }

    fn features(&self) -> Vec<(String, String, String)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Model(m) => Some((m.feature.clone(), m.old_value.clone(), m.new_value.clone())),
                _ => None,
            })
            .collect()
    }
}

// ===== Provider events =====

#[test]
fn test_provider_status_and_state_sequence() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.App", &journal).build()).build();
    let component = controller
        .create_component_from(&ComponentDirective::new("app", "acme.App"))
        .unwrap();
    let collector = Arc::new(Collector::default());
    component.add_listener(collector.clone());

    let provider = component.get_provider().unwrap();
    component.decommission();
    controller.runtime().flush_events();

    assert_eq!(
        collector.statuses(),
        vec![
            (Status::Instantiated, Status::Commissioning),
            (Status::Commissioning, Status::Available),
            (Status::Available, Status::Decommissioning),
            (Status::Decommissioning, Status::Disposed),
        ]
    );
    assert_eq!(
        collector.states(),
        vec![
            ("/".to_string(), "/started".to_string()),
            ("/started".to_string(), "/stopped".to_string()),
        ]
    );
    assert_eq!(provider.status(), Status::Disposed);
    assert!(collector
        .events
        .lock()
        .unwrap()
        .iter()
        .all(|e| e.path() == "/app"));
}

#[test]
fn test_provider_listener_and_removal() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.App", &journal).build()).build();
    let component = controller
        .create_component_from(&ComponentDirective::new("app", "acme.App"))
        .unwrap();
    let provider = component.get_provider().unwrap();

    let collector = Arc::new(Collector::default());
    let listener: Arc<dyn EventListener> = collector.clone();
    provider.add_listener(listener.clone());
    provider.apply("stop").unwrap();
    controller.runtime().flush_events();
    assert_eq!(collector.states(), vec![("/started".to_string(), "/stopped".to_string())]);

    provider.remove_listener(&listener);
    component.decommission();
    controller.runtime().flush_events();
    assert!(collector.statuses().is_empty());
}

#[test]
fn test_status_is_monotonic() {
    assert!(Status::Instantiated < Status::Commissioning);
    assert!(Status::Available < Status::Decommissioning);
    assert!(Status::Decommissioning < Status::Disposed);
    assert_eq!(Status::Available.to_string(), "available");
}

// ===== Model events =====

#[test]
fn test_model_policy_changes_are_published() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.App", &journal).build()).build();
    let model = controller
        .create_model_from(&ComponentDirective::new("app", "acme.App"))
        .unwrap();
    let collector = Arc::new(Collector::default());
    model.add_listener(collector.clone());

    model.set_activation_policy(ActivationPolicy::Startup);
    model.set_lifestyle_policy(LifestylePolicy::Transient);
    model.set_collection_policy(CollectionPolicy::Weak);
    // unchanged values are not reported
    model.set_collection_policy(CollectionPolicy::Weak);
    controller.runtime().flush_events();

    assert_eq!(
        collector.features(),
        vec![
            ("activation.policy".to_string(), "system".to_string(), "startup".to_string()),
            ("lifestyle.policy".to_string(), "singleton".to_string(), "transient".to_string()),
            ("collection.policy".to_string(), "system".to_string(), "weak".to_string()),
        ]
    );
    assert_eq!(model.activation_policy(), ActivationPolicy::Startup);
}

#[test]
fn test_panicking_listener_does_not_block_others() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.App", &journal).build()).build();
    let component = controller
        .create_component_from(&ComponentDirective::new("app", "acme.App"))
        .unwrap();
    component.add_listener(Arc::new(|_: &Event| panic!("listener failure")));
    let collector = Arc::new(Collector::default());
    component.add_listener(collector.clone());

    component.get_provider().unwrap();
    controller.runtime().flush_events();
    assert_eq!(collector.statuses().len(), 2);
    assert!(controller.runtime().events().delivered() >= 2);
}
