//! Snapshot and run log tests.
//!
//! A snapshot is written every 60 forward ticks. Restoring one and
//! replaying must land on the same state as never having left, and
//! acting on a rewound state forgets the snapshots ahead of it.

use wiregrid_core::{
    command::{PlayerCommand, TopologyEdit},
    config::LevelDescriptor,
    engine::SimEngine,
    geometry::Point,
    snapshot::SimSnapshot,
};

fn build(run_id: &str) -> SimEngine {
    let mut engine = SimEngine::build_test(run_id, 42, LevelDescriptor::default_test())
        .expect("build test engine");
    engine.connect("A", 0, "C", 0).expect("wire A-C");
    engine
}

fn summary(engine: &SimEngine) -> (u32, u32, usize, u64) {
    let world = engine.world();
    (world.progress.emitted, world.progress.delivered, world.packet_count(), world.purse.coins)
}

#[test]
fn restore_latest_then_replay_matches_uninterrupted_run() {
    let mut reference = build("snap-ref");
    reference.run_ticks(130).unwrap();

    let mut engine = build("snap-restore");
    engine.run_ticks(130).unwrap();
    let restored = engine.restore_latest(125).unwrap();
    assert_eq!(restored, Some(120), "Newest snapshot at or before 125 is tick 120");
    assert_eq!(engine.clock.current_tick, 120);

    engine.run_ticks(10).unwrap();
    assert_eq!(engine.clock.current_tick, 130);
    assert_eq!(summary(&engine), summary(&reference));
}

#[test]
fn no_snapshot_before_first_interval() {
    let mut engine = build("snap-none");
    engine.run_ticks(30).unwrap();

    assert_eq!(engine.restore_latest(30).unwrap(), None);
    assert_eq!(engine.clock.current_tick, 30, "A missed restore leaves the engine alone");
}

#[test]
fn snapshot_round_trips_through_json() {
    let mut engine = build("snap-json");
    engine.run_ticks(45).unwrap();

    let snapshot = engine.snapshot();
    let json = serde_json::to_string(&snapshot).expect("serialize snapshot");
    let back: SimSnapshot = serde_json::from_str(&json).expect("deserialize snapshot");

    assert_eq!(back.tick, 45);
    assert_eq!(back.clock, snapshot.clock);
    assert_eq!(back.world, snapshot.world);
}

#[test]
fn every_tick_survives_json_exactly() {
    let mut engine = SimEngine::build_test("snap-exact", 42, LevelDescriptor::default_test())
        .unwrap();
    for (port, x) in [(0, 250.0), (1, 350.0)] {
        let wire = engine.connect("A", port, "C", port).unwrap();
        engine
            .apply_edit(TopologyEdit::AddWaypoint { connection: wire, at: Point::new(x, 300.0) })
            .unwrap();
    }

    for _ in 0..300 {
        engine.run_ticks(1).unwrap();
        let snapshot = engine.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: SimSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.world, snapshot.world, "Tick {} changed on the way through JSON", snapshot.tick);
    }
}

#[test]
fn every_tick_is_logged() {
    let mut engine = build("snap-log");
    engine.run_ticks(20).unwrap();

    let emitted = engine.count_events("packet_emitted").unwrap();
    assert_eq!(emitted, u64::from(engine.world().progress.emitted));
    assert_eq!(engine.count_events("run_initialized").unwrap(), 1);
    assert!(!engine.store_events_for_tick("snap-log", 1).unwrap().is_empty());
}

#[test]
fn acting_after_a_rewind_discards_future_snapshots() {
    let mut engine = build("snap-fork");
    engine.run_ticks(130).unwrap();
    engine.rewind_ticks(30).unwrap();

    // Rewinding alone keeps the snapshots: replay would reproduce them.
    engine.apply_command(PlayerCommand::Shockwave { at: Point::new(300.0, 300.0) }).unwrap();

    let restored = engine.restore_latest(125).unwrap();
    assert_eq!(restored, Some(60), "The tick-120 snapshot belonged to the abandoned future");
}
