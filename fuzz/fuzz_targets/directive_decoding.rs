#![no_main]

use ferrous_metro::{Arguments, Artifact, ClassLoader, ComponentDirective, Controller, EntryDescriptor, MemoryRepository, ParameterKind, Type};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fn controller() -> Controller {
    let repository = Arc::new(MemoryRepository::new());
    let ty = Type::builder("fuzz.Target")
        .entry(EntryDescriptor::optional("value", "string"))
        .entry(EntryDescriptor::optional("count", "int"))
        .constructor(vec![ParameterKind::Context], |mut args: Arguments| {
            let context = args.take_context()?;
            let _ = context.get("value")?;
            let _ = context.get("count")?;
            Ok(())
        })
        .build();
    let artifact = repository.add_artifact(Artifact::new("artifact:fuzz").with_type(ty));
    Controller::builder()
        .repository(repository)
        .anchor(ClassLoader::new("fuzz", None, vec![artifact]))
        .build()
}

fuzz_target!(|data: &[u8]| {
    let Ok(directive) = serde_json::from_slice::<ComponentDirective>(data) else {
        return;
    };

    // Decoding must round-trip
    let encoded = serde_json::to_string(&directive).expect("directive encodes");
    let decoded: ComponentDirective = serde_json::from_str(&encoded).expect("encoded directive decodes");
    assert_eq!(decoded, directive);

    // Arbitrary directives may fail, but never panic
    let controller = controller();
    if let Ok(component) = controller.create_component_from(&directive) {
        if let Ok(provider) = component.get_provider() {
            let _ = provider.get_value(true);
        }
        component.decommission();
    }
});
