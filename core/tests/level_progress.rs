//! Level progress tests.
//!
//! Tests cover: emission up to the quota, the success condition, coin
//! income from deliveries, the shipped level catalogue, and that a
//! finished level stays finished.

use wiregrid_core::{
    config::{LevelDescriptor, SimConfig},
    engine::SimEngine,
    network::Behavior,
    packet::PacketKind,
    store::SimStore,
    types::NodeId,
    world::LevelOutcome,
};

fn build(run_id: &str) -> SimEngine {
    let mut engine = SimEngine::build_test(run_id, 42, LevelDescriptor::default_test())
        .expect("build test engine");
    engine.connect("A", 0, "C", 0).expect("wire A-C");
    engine
}

#[test]
fn level_one_succeeds_after_quota_is_emitted() {
    let mut engine = build("level-one");

    engine.run_ticks(1000).unwrap();

    let progress = &engine.world().progress;
    assert_eq!(engine.outcome(), LevelOutcome::Succeeded);
    assert_eq!(progress.emitted, progress.quota, "Emission stops at the quota");
    assert_eq!(progress.emitted_by_kind.get(&PacketKind::Square), Some(&20));
    assert_eq!(progress.delivered, 20);
    assert_eq!(progress.lost, 0);
    assert_eq!(engine.world().purse.coins, 40, "Twenty squares at 2 coins each");
    assert_eq!(engine.count_events("level_succeeded").unwrap(), 1);
}

#[test]
fn emission_follows_the_output_port_shape() {
    let mut engine = SimEngine::build_test("port-shape", 42, LevelDescriptor::default_test())
        .unwrap();
    engine.connect("A", 1, "C", 1).unwrap();

    engine.run_ticks(1).unwrap();

    let packet = engine.world().packets().next().expect("one emitted packet");
    assert_eq!(packet.kind, PacketKind::Triangle);
}

#[test]
fn circles_do_not_count_toward_the_quota() {
    let mut level = LevelDescriptor::default_test();
    level.packet_quota = 3;
    level.nodes[0].outputs = vec![PacketKind::Circle];
    let mut engine = SimEngine::build_test("circle-quota", 42, level).unwrap();
    engine.connect("A", 0, "C", 0).unwrap();

    engine.run_ticks(400).unwrap();

    let progress = &engine.world().progress;
    assert_eq!(engine.outcome(), LevelOutcome::InProgress);
    assert!(progress.emitted > 3, "Circles keep flowing past the quota: {}", progress.emitted);
    assert_eq!(progress.emitted_by_kind.get(&PacketKind::Circle), Some(&progress.emitted));
    assert_eq!(progress.counted(), 0);
    assert_eq!(engine.count_events("level_succeeded").unwrap(), 0);
}

#[test]
fn nothing_is_emitted_without_wires() {
    let mut engine = SimEngine::build_test("no-wires", 42, LevelDescriptor::default_test())
        .unwrap();
    engine.run_ticks(100).unwrap();

    assert_eq!(engine.world().progress.emitted, 0);
    assert_eq!(engine.outcome(), LevelOutcome::InProgress);
}

#[test]
fn shipped_catalogue_loads() {
    let config = SimConfig::load("../data").expect("load shipped config");

    assert_eq!(config.levels.len(), 5);
    let expected = SimConfig::default_test();
    assert_eq!(config.physics.geometry, expected.physics.geometry);
    assert_eq!(config.physics.tick_ms, expected.physics.tick_ms);
    assert!((config.physics.noise_loss_threshold - 1.0 / 11.0).abs() < 1e-12);
    assert_eq!(config.shop, expected.shop);
    assert_eq!(config.level(1), Some(&LevelDescriptor::default_test()));

    let finale = config.level(5).expect("level 5");
    assert_eq!(finale.packet_quota, 60);
    let behavior_of = |id: &str| {
        finale
            .nodes
            .iter()
            .find(|n| n.id == NodeId::from(id))
            .map(|n| n.behavior)
    };
    assert_eq!(behavior_of("G"), Some(Behavior::Spy));
    assert_eq!(behavior_of("H"), Some(Behavior::Malicious));
    assert_eq!(behavior_of("E"), Some(Behavior::AntiTrojan));
}

#[test]
fn engine_builds_every_shipped_level() {
    let config = SimConfig::load("../data").unwrap();
    for number in 1..=5 {
        let store = SimStore::in_memory().unwrap();
        store.migrate().unwrap();
        let run_id = format!("catalogue-{number}");
        store.insert_run(&run_id, 1, number, "test").unwrap();
        let mut engine = SimEngine::build(run_id, 1, config.clone(), number, store)
            .unwrap_or_else(|e| panic!("level {number} failed to build: {e}"));
        engine.run_ticks(10).unwrap();
        assert_eq!(engine.world().progress.level, number);
        let quota = engine.config().level(number).map(|l| l.packet_quota);
        assert_eq!(Some(engine.world().progress.quota), quota);
    }
}
