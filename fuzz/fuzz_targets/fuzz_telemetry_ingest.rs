#![no_main]
use libfuzzer_sys::fuzz_target;
use voltaic::config::TopicsConfig;
use voltaic::controls::clamp_round;
use voltaic::telemetry::{TelemetryChannel, TelemetryStore};

fuzz_target!(|data: &[u8]| {
    let topics = TopicsConfig::default();
    let store = TelemetryStore::with_topics(10, &topics);

    // First byte picks the channel, the rest is the raw payload
    let Some((selector, payload)) = data.split_first() else {
        return;
    };
    let channel = TelemetryChannel::ALL[*selector as usize % TelemetryChannel::ALL.len()];
    let _ = store.ingest(channel.topic(&topics), payload);

    assert!(store.sample_count(channel) <= 10);
    let avg = store.average(channel);
    assert!(avg.is_finite());
    let amps = clamp_round(avg / 230.0);
    assert!(amps == 0 || (6..=16).contains(&amps));
});
