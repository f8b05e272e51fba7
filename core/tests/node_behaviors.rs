//! Node behaviour tests.
//!
//! Tests cover: distribute splitting a bulky packet into bits, merge
//! reassembling only once every fragment has arrived, VPN protection, its
//! confidential answer and its failure once damaged, spy destruction and
//! teleport, sabotage noise and port choice, anti-trojan sweeps, circles
//! turning back, and bulky traffic wearing out a wire.

use wiregrid_core::{
    command::{PlayerCommand, ShopItem, TopologyEdit},
    config::{LevelDescriptor, NodeSpec, SimConfig},
    engine::SimEngine,
    error::SimError,
    event::{Conversion, DropReason, ReturnReason, SimEvent},
    geometry::Point,
    network::Behavior,
    packet::{Owner, PacketKind},
    store::SimStore,
    types::NodeId,
};

fn node(id: &str, x: f64, y: f64, inputs: &[PacketKind], outputs: &[PacketKind], behavior: Behavior) -> NodeSpec {
    NodeSpec {
        id: NodeId::from(id),
        x,
        y,
        inputs: inputs.to_vec(),
        outputs: outputs.to_vec(),
        behavior,
    }
}

fn plain(id: &str, x: f64, y: f64, shape: PacketKind) -> NodeSpec {
    node(id, x, y, &[shape], &[shape], Behavior::Plain)
}

/// Origin O is parked out of the way with no wires; the packets under
/// test are injected.
fn level(nodes: Vec<NodeSpec>, starting_coins: u64) -> LevelDescriptor {
    let mut all = vec![plain("O", 100.0, 600.0, PacketKind::Square)];
    all.extend(nodes);
    LevelDescriptor {
        number: 1,
        name: "behaviours".into(),
        nodes: all,
        origin: NodeId::from("O"),
        sink: NodeId::from("K"),
        wire_ceiling: 2000.0,
        packet_quota: 10,
        max_packet_loss: 5,
        starting_coins,
    }
}

fn events_of(engine: &SimEngine, event_type: &str) -> Vec<SimEvent> {
    engine
        .store_events()
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == event_type)
        .map(|e| serde_json::from_str(&e.payload).expect("stored payload parses"))
        .collect()
}

/// X feeds a distributor D, which has `lanes` wires to merger M, which
/// feeds the sink K. The lanes start 50/9 apart, so collision immunity
/// is bought before anything moves.
fn split_merge_engine(run_id: &str, lanes: usize) -> SimEngine {
    let bits = [PacketKind::Square; 8];
    let nodes = vec![
        plain("X", 100.0, 100.0, PacketKind::Bulky8),
        node("D", 300.0, 100.0, &[PacketKind::Bulky8], &bits, Behavior::Distribute),
        node("M", 500.0, 100.0, &bits, &[PacketKind::Bulky8], Behavior::Merge),
        plain("K", 700.0, 100.0, PacketKind::Bulky8),
    ];
    let mut engine = SimEngine::build_test(run_id, 42, level(nodes, 4)).unwrap();
    let feed = engine.connect("X", 0, "D", 0).unwrap();
    for lane in 0..lanes {
        engine.connect("D", lane, "M", lane).unwrap();
    }
    engine.connect("M", 0, "K", 0).unwrap();
    engine
        .apply_command(PlayerCommand::Purchase { item: ShopItem::CollisionImmunity })
        .unwrap();
    engine.inject(feed, PacketKind::Bulky8, Owner::Player).unwrap();
    engine
}

#[test]
fn distribute_splits_and_merge_reassembles() {
    let mut engine = split_merge_engine("split-merge", 8);

    engine.run_ticks(200).unwrap();

    let spawned = events_of(&engine, "packet_spawned");
    let fragments = spawned
        .iter()
        .filter(|e| matches!(e, SimEvent::PacketSpawned { kind: PacketKind::Bit, .. }))
        .count();
    assert_eq!(fragments, 8, "A bulky_8 packet splits into 8 bits");
    assert_eq!(engine.count_events("fragment_buffered").unwrap(), 7);

    let delivered = events_of(&engine, "packet_delivered");
    assert_eq!(delivered.len(), 1, "Exactly the reassembled packet reaches the sink");
    assert!(matches!(delivered[0], SimEvent::PacketDelivered { kind: PacketKind::Bulky8, .. }));
    assert_eq!(engine.world().progress.lost, 0);
}

#[test]
fn short_split_fragments_are_dropped_at_merge() {
    let mut engine = split_merge_engine("split-short", 7);

    engine.run_ticks(200).unwrap();

    assert_eq!(engine.count_events("fragment_buffered").unwrap(), 0);
    let incomplete = events_of(&engine, "packet_dropped")
        .into_iter()
        .filter(|e| matches!(e, SimEvent::PacketDropped { reason: DropReason::IncompleteSplit, .. }))
        .count();
    assert_eq!(incomplete, 7, "Every bit of a seven-of-eight split is dropped at the merger");
    assert_eq!(engine.world().progress.delivered, 0, "Seven of eight bits must not merge");
    let merge = engine.world().network.node(&NodeId::from("M")).unwrap();
    assert!(merge.merge_buffer.is_empty());
}

#[test]
fn vpn_protects_and_answers_confidential_traffic() {
    let conf = [PacketKind::Confidential4, PacketKind::Confidential6];
    let nodes = vec![
        plain("X", 100.0, 100.0, PacketKind::Confidential4),
        node("V", 300.0, 100.0, &[PacketKind::Confidential4], &conf, Behavior::Vpn),
        node("K", 500.0, 100.0, &conf, &[PacketKind::Square], Behavior::Plain),
    ];
    let mut engine = SimEngine::build_test("vpn", 42, level(nodes, 0)).unwrap();
    let feed = engine.connect("X", 0, "V", 0).unwrap();
    engine.connect("V", 0, "K", 0).unwrap();
    engine.connect("V", 1, "K", 1).unwrap();
    engine.inject(feed, PacketKind::Confidential4, Owner::Player).unwrap();

    engine.run_ticks(60).unwrap();

    let answered = events_of(&engine, "packet_spawned")
        .into_iter()
        .filter(|e| matches!(e, SimEvent::PacketSpawned { kind: PacketKind::Confidential6, .. }))
        .count();
    assert_eq!(answered, 1, "A confidential_4 arrival spawns one confidential_6");

    let protected: Vec<_> = engine.world().packets().filter(|p| p.is_protected()).collect();
    assert_eq!(protected.len(), 1);
    assert_eq!(protected[0].protector, Some(NodeId::from("V")));
    assert_eq!(protected[0].original_kind, PacketKind::Confidential4);

    engine.run_ticks(500).unwrap();
    assert_eq!(engine.world().progress.delivered, 2);
}

#[test]
fn spy_destroys_confidential_packets() {
    let nodes = vec![
        plain("X", 100.0, 100.0, PacketKind::Square),
        node("Y", 300.0, 100.0, &[PacketKind::Square], &[PacketKind::Square], Behavior::Spy),
        plain("K", 500.0, 100.0, PacketKind::Square),
    ];
    let mut engine = SimEngine::build_test("spy-destroy", 42, level(nodes, 0)).unwrap();
    let feed = engine.connect("X", 0, "Y", 0).unwrap();
    engine.connect("Y", 0, "K", 0).unwrap();
    engine.inject(feed, PacketKind::Confidential4, Owner::Player).unwrap();

    engine.run_ticks(120).unwrap();

    assert_eq!(engine.world().packet_count(), 0);
    assert_eq!(engine.world().progress.delivered, 0);
    assert_eq!(engine.world().progress.lost, 0, "Spy destruction is not collision loss");
    assert_eq!(engine.count_events("packet_dropped").unwrap(), 1);
}

#[test]
fn spy_teleports_to_another_spy() {
    let nodes = vec![
        plain("X", 100.0, 100.0, PacketKind::Square),
        node("Y", 300.0, 100.0, &[PacketKind::Square], &[PacketKind::Square], Behavior::Spy),
        node("Z", 300.0, 300.0, &[PacketKind::Square], &[PacketKind::Square], Behavior::Spy),
        plain("K", 500.0, 300.0, PacketKind::Square),
    ];
    let mut engine = SimEngine::build_test("spy-teleport", 42, level(nodes, 0)).unwrap();
    let feed = engine.connect("X", 0, "Y", 0).unwrap();
    engine.connect("Z", 0, "K", 0).unwrap();
    engine.inject(feed, PacketKind::Square, Owner::Player).unwrap();

    engine.run_ticks(120).unwrap();

    let teleports = events_of(&engine, "packet_teleported");
    assert_eq!(teleports.len(), 1);
    assert!(matches!(
        &teleports[0],
        SimEvent::PacketTeleported { to, .. } if *to == NodeId::from("Z")
    ));
    assert_eq!(engine.world().progress.delivered, 1);
}

#[test]
fn sabotage_adds_noise() {
    let nodes = vec![
        plain("X", 100.0, 100.0, PacketKind::Square),
        node("B", 300.0, 100.0, &[PacketKind::Square], &[PacketKind::Square], Behavior::Sabotage),
        plain("K", 500.0, 100.0, PacketKind::Square),
    ];
    let mut engine = SimEngine::build_test("sabotage", 42, level(nodes, 0)).unwrap();
    let feed = engine.connect("X", 0, "B", 0).unwrap();
    engine.connect("B", 0, "K", 0).unwrap();
    engine.inject(feed, PacketKind::Square, Owner::Player).unwrap();

    engine.run_ticks(55).unwrap();

    let packet = engine.world().packets().next().expect("packet past the sabotage node");
    assert_eq!(packet.noise, 1.0);
    assert!(
        matches!(packet.kind, PacketKind::Square | PacketKind::Confidential4),
        "Sabotage may only infect into the counterpart kind, got {:?}",
        packet.kind
    );
    assert_eq!(packet.infected, packet.kind != PacketKind::Square);
}

#[test]
fn bulky_traffic_wears_out_a_wire() {
    let nodes = vec![
        plain("X", 100.0, 100.0, PacketKind::Bulky8),
        plain("N", 300.0, 100.0, PacketKind::Bulky8),
        plain("K", 500.0, 100.0, PacketKind::Bulky8),
    ];
    let mut engine = SimEngine::build_test("bulky-wear", 42, level(nodes, 0)).unwrap();
    let feed = engine.connect("X", 0, "N", 0).unwrap();
    engine.connect("N", 0, "K", 0).unwrap();

    for _ in 0..3 {
        engine.inject(feed, PacketKind::Bulky8, Owner::Player).unwrap();
        engine.run_ticks(60).unwrap();
    }

    assert_eq!(engine.count_events("wire_destroyed").unwrap(), 1);
    assert!(engine.world().network.connection(feed).unwrap().destroyed);
    assert!(matches!(
        engine.inject(feed, PacketKind::Bulky8, Owner::Player),
        Err(SimError::ConnectionOccupied(_))
    ));
}

#[test]
fn damaged_vpn_drops_its_protection() {
    let nodes = vec![
        plain("X", 100.0, 100.0, PacketKind::Square),
        node("V", 400.0, 100.0, &[PacketKind::Square; 2], &[PacketKind::Square], Behavior::Vpn),
        plain("K", 700.0, 100.0, PacketKind::Square),
        plain("W", 100.0, 400.0, PacketKind::Square),
    ];
    let mut engine = SimEngine::build_test("vpn-damaged", 42, level(nodes, 0)).unwrap();
    let feed = engine.connect("X", 0, "V", 0).unwrap();
    engine.connect("V", 0, "K", 0).unwrap();
    // A long detour makes anything on it fast enough to damage V.
    let detour = engine.connect("W", 0, "V", 1).unwrap();
    engine
        .apply_edit(TopologyEdit::AddWaypoint { connection: detour, at: Point::new(250.0, 900.0) })
        .unwrap();
    let id = engine.inject(feed, PacketKind::Square, Owner::Player).unwrap();

    engine.run_ticks(60).unwrap();
    let packet = engine.world().packet(id).expect("protected packet on V-K");
    assert!(packet.is_protected());
    assert_eq!(packet.protector, Some(NodeId::from("V")));

    engine.inject(detour, PacketKind::Square, Owner::Player).unwrap();
    engine.run_ticks(5).unwrap();

    let vpn = engine.world().network.node(&NodeId::from("V")).unwrap();
    assert!(vpn.is_damaged(engine.clock.now, 5_000), "Speeding packet should damage V");
    let packet = engine.world().packet(id).unwrap();
    assert_eq!(packet.kind, PacketKind::Square);
    assert_eq!(packet.protector, None);
    let reverted = events_of(&engine, "packet_converted")
        .into_iter()
        .filter(|e| matches!(e, SimEvent::PacketConverted { conversion: Conversion::Reverted, .. }))
        .count();
    assert_eq!(reverted, 1);
}

#[test]
fn anti_trojan_cleans_one_packet_per_cooldown() {
    let nodes = vec![
        node("E", 400.0, 300.0, &[PacketKind::Square], &[PacketKind::Square], Behavior::AntiTrojan),
        plain("P", 300.0, 250.0, PacketKind::Square),
        plain("Q", 300.0, 350.0, PacketKind::Square),
        plain("S", 100.0, 250.0, PacketKind::Square),
        plain("T", 100.0, 350.0, PacketKind::Square),
        plain("K", 700.0, 100.0, PacketKind::Square),
    ];
    let mut engine = SimEngine::build_test("anti-trojan", 42, level(nodes, 20)).unwrap();
    let upper = engine.connect("P", 0, "S", 0).unwrap();
    let lower = engine.connect("Q", 0, "T", 0).unwrap();
    let first = engine.inject(upper, PacketKind::Square, Owner::Player).unwrap();
    let second = engine.inject(lower, PacketKind::Square, Owner::Player).unwrap();
    // Both packets wait inside E's radius.
    for wire in [upper, lower] {
        engine.apply_command(PlayerCommand::FreezeWire { connection: wire }).unwrap();
    }

    let mut snapshot = engine.snapshot();
    for id in [first, second] {
        snapshot.world.packet_mut(id).unwrap().infect();
    }
    engine.restore(snapshot);

    engine.run_ticks(1).unwrap();
    assert!(!engine.world().packet(first).unwrap().infected);
    assert_eq!(engine.world().packet(first).unwrap().kind, PacketKind::Square);
    assert!(engine.world().packet(second).unwrap().infected, "One packet per sweep");

    // Cooldown is 3 s: 187.5 ticks.
    engine.run_ticks(150).unwrap();
    assert!(engine.world().packet(second).unwrap().infected);

    engine.run_ticks(50).unwrap();
    assert!(!engine.world().packet(second).unwrap().infected);
    assert_eq!(engine.count_events("packet_converted").unwrap(), 2);
}

#[test]
fn sabotage_prefers_the_mismatched_port() {
    let shapes = [PacketKind::Square, PacketKind::Triangle];
    let level = level(
        vec![
            plain("X", 100.0, 100.0, PacketKind::Square),
            node("B", 300.0, 100.0, &[PacketKind::Square], &shapes, Behavior::Sabotage),
            node("K", 500.0, 100.0, &shapes, &[PacketKind::Square], Behavior::Plain),
        ],
        0,
    );
    let store = SimStore::in_memory().unwrap();
    store.migrate().unwrap();
    store.insert_run("sabotage-port", 42, 1, "test").unwrap();
    let mut config = SimConfig::default_test();
    config.physics.trojan_probability = 0.0;
    config.levels = vec![level];
    let mut engine = SimEngine::build("sabotage-port".into(), 42, config, 1, store).unwrap();

    let feed = engine.connect("X", 0, "B", 0).unwrap();
    engine.connect("B", 0, "K", 0).unwrap();
    let mismatched = engine.connect("B", 1, "K", 1).unwrap();
    let id = engine.inject(feed, PacketKind::Square, Owner::Player).unwrap();

    engine.run_ticks(55).unwrap();

    let packet = engine.world().packet(id).expect("packet past the sabotage node");
    assert_eq!(packet.kind, PacketKind::Square, "No trojans at probability 0");
    assert_eq!(packet.connection, mismatched, "Square should leave through the triangle port");
}

#[test]
fn circle_turns_back_when_something_sits_on_the_port() {
    // S's output port and N's input port share the point (365, 400).
    let nodes = vec![
        plain("X", 300.0, 100.0, PacketKind::Circle),
        plain("N", 400.0, 400.0, PacketKind::Circle),
        plain("S", 330.0, 400.0, PacketKind::Square),
        plain("T", 330.0, 600.0, PacketKind::Square),
        plain("K", 700.0, 100.0, PacketKind::Square),
    ];
    let mut engine = SimEngine::build_test("circle-return", 42, level(nodes, 14)).unwrap();
    let feed = engine.connect("X", 0, "N", 0).unwrap();
    let parked = engine.connect("S", 0, "T", 0).unwrap();
    engine
        .apply_command(PlayerCommand::Purchase { item: ShopItem::CollisionImmunity })
        .unwrap();
    engine.inject(parked, PacketKind::Square, Owner::Player).unwrap();
    engine.apply_command(PlayerCommand::FreezeWire { connection: parked }).unwrap();
    let circle = engine.inject(feed, PacketKind::Circle, Owner::Player).unwrap();

    engine.run_ticks(60).unwrap();

    let returns = events_of(&engine, "packet_returning");
    assert_eq!(returns.len(), 1);
    assert!(matches!(
        returns[0],
        SimEvent::PacketReturning { packet, reason: ReturnReason::CircleCollision } if packet == circle
    ));
    let packet = engine.world().packet(circle).expect("circle travelling back");
    assert!(packet.returning);
    assert_eq!(packet.connection, feed);
}
