use std::sync::mpsc;
use std::time::Duration;

use liftlog::clock::ManualClock;
use liftlog::config::Config;
use liftlog::persistence::MemorySnapshotStore;
use liftlog::runtime::{ChannelEventSource, Runner, Step, TrackerEvent};
use liftlog::Tracker;

// Headless event loop: the tracker's tick task feeds a Runner the way the
// `watch` command consumes it, without a terminal.

fn fast_config() -> Config {
    Config {
        tick_interval_ms: 50,
        ..Config::default()
    }
}

#[test]
fn live_clock_updates_on_each_tick() {
    let clock = ManualClock::at_millis(0);
    let (tx, rx) = mpsc::channel();
    let mut tracker = Tracker::new(clock.clone(), MemorySnapshotStore::new(), &fast_config(), tx);
    let runner = Runner::new(ChannelEventSource::new(rx), Duration::from_secs(2));

    tracker.start();

    let mut displays = Vec::new();
    for _ in 0..3u32 {
        clock.advance(chrono::Duration::seconds(1));
        match runner.step() {
            Step::Event(TrackerEvent::Tick) => displays.push(tracker.on_tick()),
            other => panic!("expected a tick, got {other:?}"),
        }
    }

    assert_eq!(displays, vec!["00:01", "00:02", "00:03"]);
}

#[test]
fn no_ticks_after_finish() {
    let (tx, rx) = mpsc::channel();
    let mut tracker = Tracker::new(
        ManualClock::at_millis(0),
        MemorySnapshotStore::new(),
        &fast_config(),
        tx,
    );
    let runner = Runner::new(ChannelEventSource::new(rx), Duration::from_millis(200));

    tracker.start();
    assert_eq!(runner.step(), Step::Event(TrackerEvent::Tick));

    tracker.finish();
    // drain anything sent before cancellation
    while let Step::Event(TrackerEvent::Tick) = runner.step() {}

    assert_eq!(runner.step(), Step::Idle);
    assert_eq!(tracker.on_tick(), "00:00");
}

#[test]
fn dropping_the_tracker_closes_the_loop() {
    let (tx, rx) = mpsc::channel();
    let mut tracker = Tracker::new(
        ManualClock::at_millis(0),
        MemorySnapshotStore::new(),
        &fast_config(),
        tx,
    );
    let runner = Runner::new(ChannelEventSource::new(rx), Duration::from_millis(500));
    tracker.start();
    drop(tracker);

    let mut steps = 0;
    loop {
        match runner.step() {
            Step::Closed => break,
            Step::Event(TrackerEvent::Tick) => steps += 1,
            other => panic!("unexpected {other:?}"),
        }
        assert!(steps < 1000, "ticker kept running after drop");
    }
}

#[test]
fn navigation_request_reaches_the_loop() {
    let (tx, rx) = mpsc::channel();
    let mut tracker = Tracker::new(
        ManualClock::at_millis(0),
        MemorySnapshotStore::new(),
        &fast_config(),
        tx,
    );
    let runner = Runner::new(ChannelEventSource::new(rx), Duration::from_secs(2));

    assert!(!tracker.request_recording_view());
    tracker.start();
    assert!(tracker.request_recording_view());

    let mut navigated = false;
    for _ in 0..50u32 {
        if let Step::Event(TrackerEvent::NavigateToRecording) = runner.step() {
            navigated = true;
            break;
        }
    }
    assert!(navigated);
}
