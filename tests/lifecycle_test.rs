mod common;

use common::Harness;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use voltaic::lifecycle::Lifecycle;
use voltaic::telemetry::TelemetryChannel;

#[tokio::test]
async fn run_settles_ticks_and_stops_on_shutdown() {
    let mut h = Harness::new("Max Charge");
    h.telemetry.record(TelemetryChannel::WallboxState, 5.0);
    let status = h.regulator.subscribe_status();

    // Settle plus two tick waits, then request shutdown
    let stop = Arc::new(Notify::new());
    h.clock.notify_after(3, stop.clone());
    let shutdown = {
        let stop = stop.clone();
        async move { stop.notified().await }
    };

    h.regulator.run(shutdown).await.unwrap();

    let sent = h.actuator.sent();
    assert_eq!(sent.first(), Some(&0));
    assert!(sent[1..].iter().all(|a| *a == 16));
    assert!(h.regulator.ticks() >= 2);

    let sleeps = h.clock.sleeps();
    assert_eq!(sleeps[0], Duration::from_secs(5));
    assert!(sleeps[1..].iter().all(|d| *d == Duration::from_secs(30)));
    assert_eq!(status.borrow().ticks, h.regulator.ticks());
}

#[tokio::test]
async fn release_after_run_leaves_wallbox_at_zero() {
    let mut h = Harness::new("Max Charge");
    h.telemetry.record(TelemetryChannel::WallboxState, 7.0);
    let lifecycle = Lifecycle::new(h.actuator.clone());

    let stop = Arc::new(Notify::new());
    h.clock.notify_after(2, stop.clone());
    h.regulator
        .run(async move { stop.notified().await })
        .await
        .unwrap();

    assert!(lifecycle.release().await);
    assert!(!lifecycle.release().await);
    assert_eq!(h.actuator.sent().last(), Some(&0));
    assert_eq!(*h.actuator.disconnects.lock().unwrap(), 1);
}

#[tokio::test]
async fn release_runs_after_regulator_panic() {
    let h = Harness::new("Max Charge");
    let lifecycle = Lifecycle::new(h.actuator.clone());

    let outcome = tokio::spawn(async {
        panic!("regulator fault");
    })
    .await;
    assert!(outcome.is_err());

    assert!(lifecycle.release().await);
    assert_eq!(h.actuator.sent(), vec![0]);
}
