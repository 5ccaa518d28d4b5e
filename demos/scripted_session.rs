//! Drive one blink session from a scripted EAR trace

use std::sync::Arc;

use blinktalk::{EngineConfig, ManualClock, Sample, SessionRegistry};
use chrono::Utc;

fn main() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let registry = match SessionRegistry::with_clock(EngineConfig::default(), clock.clone()) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {e}");
            return;
        }
    };

    // (seconds since previous frame, sample)
    let script = [
        (0.0, Sample::ear(0.31)),
        (0.2, Sample::ear(0.12)),
        (0.3, Sample::ear(0.30)),
        (0.5, Sample::ear(0.10)),
        (1.4, Sample::ear(0.29)),
        (0.4, Sample::ear(0.11)),
        (0.3, Sample::no_face()),
        (0.2, Sample::ear(0.32)),
        (0.3, Sample::ear(0.09)),
        (2.5, Sample::ear(0.33)),
    ];

    let result = registry.start_session().and_then(|id| {
        for (delay, sample) in script {
            clock.advance_secs(delay);
            registry.submit(&id, sample)?;
        }
        registry.end_session(&id)
    });

    match result.and_then(|summary| Ok(serde_json::to_string_pretty(&summary)?)) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: {e:?}"),
    }
}
