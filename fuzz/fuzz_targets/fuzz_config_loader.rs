#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse or validation errors are fine; panics are not.
    if let Ok(cfg) = feeder_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A valid config must survive a serialize/parse cycle.
            let text = cfg.to_toml_string().expect("serialize valid config");
            let again = feeder_config::load_toml(&text).expect("reparse serialized config");
            assert_eq!(again.schedule.feed_times, cfg.schedule.feed_times);
        }
    }
});
