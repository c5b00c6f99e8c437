#![no_main]

use ferrous_metro::{Service, Version};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(service) = text.parse::<Service>() {
        // Display form re-parses to the same request
        let reparsed: Service = service.to_string().parse().expect("display form parses");
        assert_eq!(reparsed, service);

        if let Some(version) = service.version {
            assert!(version.complies(&version));
            let newer = Version::new(version.major, version.minor, version.micro.saturating_add(1));
            assert!(service.matches(&service.classname, Some(&newer)) || newer == version);
        }
    }
});
