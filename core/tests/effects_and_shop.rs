//! Timed effects and shop tests.
//!
//! Tests cover: purchases debit the purse, insufficient funds, effects
//! expiring on the virtual clock and coming back on rewind, noise purge,
//! shockwave displacement and the restore scroll pulling it back, and
//! pause/resume holding the clock.

use wiregrid_core::{
    command::{PlayerCommand, QueuedCommand, ShopItem},
    config::LevelDescriptor,
    effects::GlobalEffect,
    engine::SimEngine,
    error::SimError,
    geometry::Point,
    packet::{Owner, PacketKind},
};

fn build(run_id: &str, starting_coins: u64) -> SimEngine {
    let mut level = LevelDescriptor::default_test();
    level.starting_coins = starting_coins;
    SimEngine::build_test(run_id, 42, level).expect("build test engine")
}

#[test]
fn purchase_without_coins_is_refused() {
    let mut engine = build("shop-broke", 0);
    let result = engine.apply_command(PlayerCommand::Purchase { item: ShopItem::NoiseImmunity });

    assert!(
        matches!(result, Err(SimError::InsufficientCoins { needed: 3, available: 0 })),
        "Expected an insufficient-coins error, got {result:?}"
    );
    assert!(!engine.world().effects.is_active(GlobalEffect::NoiseImmunity, engine.clock.now));
}

#[test]
fn effect_expires_and_rewind_restores_it() {
    let mut engine = build("effect-rewind", 6);
    engine
        .apply_command(PlayerCommand::Purchase { item: ShopItem::SpeedBooster })
        .expect("6 coins buy a booster");
    assert_eq!(engine.world().purse.coins, 0);

    // The booster lasts 8 s: 500 ticks of 16 ms.
    engine.run_ticks(499).unwrap();
    assert!(engine.world().effects.is_active(GlobalEffect::SpeedBooster, engine.clock.now));

    engine.run_ticks(11).unwrap();
    assert!(!engine.world().effects.is_active(GlobalEffect::SpeedBooster, engine.clock.now));
    assert_eq!(engine.count_events("effect_expired").unwrap(), 1);

    engine.rewind_ticks(20).unwrap();
    assert!(
        engine.world().effects.is_active(GlobalEffect::SpeedBooster, engine.clock.now),
        "Rewinding into the window must bring the booster back"
    );
    assert_eq!(engine.count_events("effect_restored").unwrap(), 1);

    engine.run_ticks(20).unwrap();
    assert!(!engine.world().effects.is_active(GlobalEffect::SpeedBooster, engine.clock.now));
    assert_eq!(engine.count_events("effect_expired").unwrap(), 2);
}

#[test]
fn booster_speeds_packets_up() {
    let mut engine = build("booster", 6);
    let wire = engine.connect("A", 0, "C", 0).unwrap();
    engine.run_ticks(2).unwrap();
    let before = engine.world().packets().next().unwrap().speed;

    engine
        .apply_command(PlayerCommand::Purchase { item: ShopItem::SpeedBooster })
        .unwrap();
    engine.run_ticks(1).unwrap();
    let packet = engine.world().packets().find(|p| p.connection == wire).unwrap();

    assert!((packet.speed - before * 1.5).abs() < 1e-12, "Booster multiplies speed by 1.5");
}

#[test]
fn noise_purge_clears_every_packet() {
    let mut engine = build("purge", 5);
    let wire = engine.connect("A", 0, "C", 0).unwrap();
    engine.run_ticks(1).unwrap();
    let id = engine.world().occupant(wire).unwrap();

    let events = engine
        .apply_command(PlayerCommand::Purchase { item: ShopItem::NoisePurge })
        .unwrap();

    assert_eq!(events.len(), 2, "Coins spent, then noise purged");
    assert_eq!(engine.world().packet(id).unwrap().noise, 0.0);
    assert_eq!(engine.world().purse.coins, 0);
}

#[test]
fn shockwave_displaces_nearby_packets() {
    let mut engine = build("shockwave", 0);
    let wire = engine.connect("A", 0, "C", 0).unwrap();
    engine.run_ticks(1).unwrap();
    let id = engine.world().occupant(wire).unwrap();
    let at = engine.world().position_of(id).unwrap();

    engine
        .apply_command(PlayerCommand::Shockwave { at: Point::new(at.x - 3.0, at.y) })
        .unwrap();
    engine.run_ticks(3).unwrap();

    let packet = engine.world().packet(id).unwrap();
    assert!(packet.displacement.x > 0.0, "Packet should be pushed away from the centre");
    assert!(packet.displacement.length() <= 5.0 + 1e-9, "Displacement is capped");
}

#[test]
fn restore_scroll_pulls_displacement_straight_back() {
    let mut engine = build("restore-scroll", 30);
    let wire = engine.connect("A", 0, "C", 0).unwrap();
    engine.run_ticks(1).unwrap();
    let id = engine.world().occupant(wire).unwrap();
    let at = engine.world().position_of(id).unwrap();

    // Freeze the packet in place and knock it off the wire diagonally.
    engine.apply_command(PlayerCommand::FreezeWire { connection: wire }).unwrap();
    engine
        .apply_command(PlayerCommand::Shockwave { at: Point::new(at.x - 4.0, at.y - 2.0) })
        .unwrap();
    engine.run_ticks(40).unwrap();
    let pushed = engine.world().packet(id).unwrap().displacement;
    assert!(pushed.x > 0.0 && pushed.y > 0.0, "Expected a diagonal push, got {pushed:?}");

    engine.apply_command(PlayerCommand::RestoreWire { connection: wire }).unwrap();
    engine.run_ticks(1).unwrap();
    let settled = engine.world().packet(id).unwrap().displacement;

    assert!((pushed.length() - settled.length() - 0.05).abs() < 1e-9);
    let cross = pushed.x * settled.y - pushed.y * settled.x;
    assert!(cross.abs() < 1e-9, "Displacement turned: {pushed:?} -> {settled:?}");

    engine.run_ticks(200).unwrap();
    assert_eq!(engine.world().packet(id).unwrap().displacement, Point::ORIGIN);
}

#[test]
fn pause_holds_the_clock_until_resume() {
    let mut engine = build("pause", 0);
    engine.run_ticks(5).unwrap();

    engine
        .submit(QueuedCommand {
            run_id:     engine.run_id.clone(),
            queued_at:  engine.clock.current_tick,
            command_id: "cmd-1".into(),
            command:    PlayerCommand::Pause,
        })
        .unwrap();
    engine.run_ticks(10).unwrap();
    assert!(engine.is_held());
    assert_eq!(engine.clock.current_tick, 5);

    engine.apply_command(PlayerCommand::Resume).unwrap();
    engine.run_ticks(10).unwrap();
    assert_eq!(engine.clock.current_tick, 15);
    assert_eq!(engine.count_events("player_command_received").unwrap(), 1);
}

#[test]
fn unknown_wire_scroll_is_refused_without_charge() {
    let mut engine = build("scroll-unknown", 20);
    engine.connect("A", 0, "C", 0).unwrap();
    let missing = wiregrid_core::types::ConnectionId(99);

    let result = engine.apply_command(PlayerCommand::RestoreWire { connection: missing });
    assert!(matches!(result, Err(SimError::UnknownConnection(_))));
    assert_eq!(engine.world().purse.coins, 20);

    let result = engine.inject(missing, PacketKind::Square, Owner::Player);
    assert!(matches!(result, Err(SimError::UnknownConnection(_))));
}
