//! THE MOST IMPORTANT TEST IN THE PROJECT.
//!
//! Two engines, same seed, same layout, same operations.
//! They must produce byte-identical event logs.
//! Any divergence is a blocker.

use wiregrid_core::{
    config::{LevelDescriptor, NodeSpec},
    engine::SimEngine,
    network::Behavior,
    packet::PacketKind,
    types::NodeId,
};

fn node(id: &str, x: f64, y: f64, behavior: Behavior) -> NodeSpec {
    let shapes = vec![PacketKind::Square, PacketKind::Triangle];
    NodeSpec {
        id: NodeId::from(id),
        x,
        y,
        inputs: shapes.clone(),
        outputs: shapes,
        behavior,
    }
}

/// Origin feeds a sabotage node on both ports, which feeds the sink.
/// Sabotage rolls the trojan dice, so the seed is exercised every pass.
fn sabotage_level() -> LevelDescriptor {
    LevelDescriptor {
        number: 9,
        name: "determinism".into(),
        nodes: vec![
            node("O", 100.0, 100.0, Behavior::Plain),
            node("S", 300.0, 300.0, Behavior::Sabotage),
            node("K", 500.0, 100.0, Behavior::Plain),
        ],
        origin: NodeId::from("O"),
        sink: NodeId::from("K"),
        wire_ceiling: 2000.0,
        packet_quota: 40,
        max_packet_loss: 20,
        starting_coins: 0,
    }
}

fn build_engine(seed: u64) -> SimEngine {
    let run_id = format!("det-test-{seed}");
    let mut engine =
        SimEngine::build_test(&run_id, seed, sabotage_level()).expect("build test engine");
    engine.connect("O", 0, "S", 0).expect("wire O0-S0");
    engine.connect("O", 1, "S", 1).expect("wire O1-S1");
    engine.connect("S", 0, "K", 0).expect("wire S0-K0");
    engine.connect("S", 1, "K", 1).expect("wire S1-K1");
    engine
}

fn collect_event_log(engine: &SimEngine) -> Vec<String> {
    engine
        .store_events()
        .expect("read events")
        .into_iter()
        .map(|e| format!("{}|{}|{}|{}", e.tick, e.subsystem, e.event_type, e.payload))
        .collect()
}

#[test]
fn same_seed_produces_identical_event_logs() {
    const SEED: u64 = 0xDEAD_BEEF_CAFE_1234;
    const TICKS: u64 = 900;

    let mut engine_a = build_engine(SEED);
    let mut engine_b = build_engine(SEED);

    engine_a.run_ticks(TICKS).expect("engine_a run");
    engine_b.run_ticks(TICKS).expect("engine_b run");

    let log_a = collect_event_log(&engine_a);
    let log_b = collect_event_log(&engine_b);

    assert!(
        engine_a.count_events("packet_arrived").unwrap() > 0,
        "No packet reached the sabotage node; the run exercised nothing"
    );
    assert_eq!(
        log_a.len(), log_b.len(),
        "Event log lengths differ: {} vs {}",
        log_a.len(), log_b.len()
    );

    for (i, (a, b)) in log_a.iter().zip(log_b.iter()).enumerate() {
        assert_eq!(
            a, b,
            "Event log diverged at entry {i}:\n  A: {a}\n  B: {b}"
        );
    }
}

#[test]
fn rewind_then_replay_is_deterministic() {
    let mut engine_a = build_engine(7);
    let mut engine_b = build_engine(7);

    engine_a.run_ticks(200).unwrap();
    engine_a.rewind_ticks(40).unwrap();
    engine_a.run_ticks(40).unwrap();

    engine_b.run_ticks(200).unwrap();
    engine_b.rewind_ticks(40).unwrap();
    engine_b.run_ticks(40).unwrap();

    assert_eq!(engine_a.clock.current_tick, 200);
    assert_eq!(collect_event_log(&engine_a), collect_event_log(&engine_b));
}

#[test]
fn different_seeds_produce_different_logs() {
    let mut engine_a = build_engine(42);
    let mut engine_b = build_engine(99);

    engine_a.run_ticks(90).expect("run a");
    engine_b.run_ticks(90).expect("run b");

    let log_a = collect_event_log(&engine_a);
    let log_b = collect_event_log(&engine_b);

    let any_different = log_a.iter().zip(log_b.iter()).any(|(a, b)| a != b);
    assert!(any_different, "Different seeds produced identical logs; seed is not being used");
}
