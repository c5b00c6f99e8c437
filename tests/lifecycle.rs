mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{count, entries, journal, widget, Fixture, Widget};
use ferrous_metro::{
    ActivationPolicy, Arguments, ComponentDirective, ControlError, Disposable, EntryDescriptor, HandlerState,
    ParameterKind, Type,
};

// ===== Commission / decommission pairing =====

#[test]
fn test_startup_component_instantiated_on_commission() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.App", &journal).build()).build();
    let directive = ComponentDirective::new("app", "acme.App").activation(ActivationPolicy::Startup);

    let component = controller.create_component_from(&directive).unwrap();
    assert_eq!(component.state(), HandlerState::Inactive);
    assert!(entries(&journal).is_empty());

    component.commission().unwrap();
    assert!(component.is_active());
    assert_eq!(component.size(), 1);
    assert_eq!(entries(&journal), vec!["create:acme.App", "start:acme.App"]);

    component.decommission();
    assert_eq!(component.state(), HandlerState::Inactive);
    assert_eq!(component.size(), 0);
    assert_eq!(entries(&journal), vec!["create:acme.App", "start:acme.App", "stop:acme.App"]);
}

#[test]
fn test_demand_component_waits_for_first_request() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.App", &journal).build()).build();
    let component = controller
        .create_component_from(&ComponentDirective::new("app", "acme.App"))
        .unwrap();

    component.commission().unwrap();
    assert_eq!(component.activation_policy(), ActivationPolicy::Demand);
    assert_eq!(component.size(), 0);
    assert!(entries(&journal).is_empty());

    let provider = component.get_provider().unwrap();
    assert_eq!(provider.path(), "/app");
    assert_eq!(count(&journal, "create:acme.App"), 1);
}

#[test]
fn test_commission_and_decommission_are_idempotent() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.App", &journal).build()).build();
    let directive = ComponentDirective::new("app", "acme.App").activation(ActivationPolicy::Startup);
    let component = controller.create_component_from(&directive).unwrap();

    component.commission().unwrap();
    component.commission().unwrap();
    assert_eq!(count(&journal, "create:acme.App"), 1);

    component.decommission();
    component.decommission();
    assert_eq!(count(&journal, "stop:acme.App"), 1);

    // a second cycle creates a fresh instance
    component.commission().unwrap();
    assert_eq!(count(&journal, "create:acme.App"), 2);
}

#[test]
fn test_get_provider_commissions_inactive_handler() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.App", &journal).build()).build();
    let component = controller
        .create_component_from(&ComponentDirective::new("app", "acme.App"))
        .unwrap();

    let widget = component.get_provider().unwrap().instance::<Widget>().unwrap();
    assert!(component.is_active());
    assert_eq!(widget.classname, "acme.App");
}

// ===== Validation and construction =====

fn named_type() -> Type {
    Type::builder("acme.Named")
        .entry(EntryDescriptor::required("name", "string"))
        .constructor(vec![ParameterKind::Context], |mut args: Arguments| {
            let context = args.take_context()?;
            Ok(context.get_string("name")?)
        })
        .build()
}

#[test]
fn test_missing_required_entry_fails_validation() {
    let controller = Fixture::new().with_type(named_type()).build();
    let directive = ComponentDirective::new("c", "acme.Named");

    let error = controller.create_model_from(&directive).unwrap_err();
    match &error {
        ControlError::Validation { path, issues } => {
            assert_eq!(path, "/c");
            assert!(issues.iter().any(|issue| issue.contains("[name]")));
        }
        other => panic!("expected a validation error, got {:?}", other),
    }
    assert!(error.is_configuration());
}

#[test]
fn test_literal_entry_resolves_after_commission() {
    let controller = Fixture::new().with_type(named_type()).build();
    let directive = ComponentDirective::new("c", "acme.Named").value("name", "demo");

    let component = controller.create_component_from(&directive).unwrap();
    component.commission().unwrap();
    let provider = component.get_provider().unwrap();

    let value = controller
        .component_controller()
        .get_context_value(&provider, "name")
        .unwrap()
        .unwrap();
    assert_eq!(value.downcast_ref::<String>().unwrap(), "demo");
    assert_eq!(*provider.instance::<String>().unwrap(), "demo");
}

#[test]
fn test_unsupported_constructor_parameter() {
    let ty = Type::builder("acme.Needy")
        .constructor(vec![ParameterKind::Logger, ParameterKind::Other("Database".into())], |_| Ok(()))
        .build();
    let controller = Fixture::new().with_type(ty).build();
    let component = controller
        .create_component_from(&ComponentDirective::new("needy", "acme.Needy"))
        .unwrap();

    match component.get_provider().unwrap_err().root_cause() {
        ControlError::UnresolvedParameter {
            parameter,
            position,
            component,
            ..
        } => {
            assert_eq!(parameter, "Database");
            assert_eq!(*position, 1);
            assert_eq!(component, "/needy");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_type_without_single_constructor_rejected() {
    let controller = Fixture::new().with_type(Type::builder("acme.Abstract").build()).build();
    let error = controller
        .create_model_from(&ComponentDirective::new("a", "acme.Abstract"))
        .unwrap_err();
    assert!(matches!(error, ControlError::NoConstructor(_)));
}

#[test]
fn test_failed_construction_can_be_retried() {
    let ready = Arc::new(AtomicBool::new(false));
    let gate = ready.clone();
    let ty = Type::builder("acme.Flaky")
        .constructor(vec![], move |_| {
            if gate.load(Ordering::SeqCst) {
                Ok(42u32)
            } else {
                Err("not yet".into())
            }
        })
        .build();
    let controller = Fixture::new().with_type(ty).build();
    let directive = ComponentDirective::new("flaky", "acme.Flaky").activation(ActivationPolicy::Startup);
    let component = controller.create_component_from(&directive).unwrap();

    let error = component.commission().unwrap_err();
    assert!(matches!(error, ControlError::Invocation { .. }));
    assert_eq!(component.state(), HandlerState::Inactive);
    assert_eq!(component.size(), 0);

    ready.store(true, Ordering::SeqCst);
    component.commission().unwrap();
    assert_eq!(*component.get_provider().unwrap().instance::<u32>().unwrap(), 42);
}

// ===== Disposal =====

#[test]
fn test_dispose_releases_managed_model() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.App", &journal).build()).build();
    let component = controller
        .create_component_from(&ComponentDirective::new("app", "acme.App"))
        .unwrap();
    let _provider = component.get_provider().unwrap();

    component.dispose();
    assert!(component.is_disposed());
    assert!(component.model().is_disposed());
    assert_eq!(count(&journal, "stop:acme.App"), 1);
    assert!(matches!(component.get_provider(), Err(ControlError::IllegalState(_))));
    assert!(component.commission().is_err());
}

#[test]
fn test_unmanaged_model_survives_handler() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.App", &journal).build()).build();
    let model = controller
        .create_model_from(&ComponentDirective::new("app", "acme.App"))
        .unwrap();

    let first = controller.create_component_from_model(&model).unwrap();
    first.get_provider().unwrap();
    first.dispose();
    assert!(!model.is_disposed());

    let second = controller.create_component_from_model(&model).unwrap();
    second.get_provider().unwrap();
    assert_eq!(count(&journal, "create:acme.App"), 2);
}

#[test]
fn test_duplicate_root_path_is_rejected() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.App", &journal).build()).build();
    let directive = ComponentDirective::new("app", "acme.App");

    let first = controller.create_component_from(&directive).unwrap();
    let error = controller.create_component_from(&directive).unwrap_err();
    assert!(matches!(error, ControlError::DuplicatePath(ref path) if path == "/app"));
    assert!(error.is_configuration());
    assert_eq!(controller.components().len(), 1);

    // the path frees up once the first root is gone
    first.dispose();
    let second = controller.create_component_from(&directive).unwrap();
    assert_eq!(second.path(), "/app");
}

#[test]
fn test_provider_status_after_decommission() {
    let journal = journal();
    let controller = Fixture::new().with_type(widget("acme.App", &journal).build()).build();
    let component = controller
        .create_component_from(&ComponentDirective::new("app", "acme.App"))
        .unwrap();
    let provider = component.get_provider().unwrap();
    assert_eq!(provider.status(), ferrous_metro::Status::Available);

    component.decommission();
    assert_eq!(provider.status(), ferrous_metro::Status::Disposed);
    assert!(provider.get_value(false).is_err());
}
