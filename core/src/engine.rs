//! The simulation engine: one level of the network, stepped tick by tick.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Effects    timed-effect expiry / restoration, shockwave physics
//!   2. Collision  timeouts, collisions, noise, loss, failure check
//!   3. Mechanics  anti-trojan sweep, VPN failure, overspeed damage
//!   4. Motion     per-packet step, arrivals, node behaviour
//!   5. Level      origin emission, success check
//!
//! RULES:
//!   - Subsystems execute in registration order, every tick.
//!   - A backward tick runs the same order; phases that only make sense
//!     forward do nothing.
//!   - All randomness flows through the RngBank.
//!   - All state changes are recorded in the event log.

use crate::{
    clock::SimClock,
    collision_subsystem::CollisionSubsystem,
    command::{PlayerCommand, QueuedCommand, TopologyEdit},
    config::{LevelDescriptor, SimConfig},
    effect_subsystem::EffectSubsystem,
    effects::{EffectSlot, WireEffect},
    error::{SimError, SimResult},
    event::{EventLogEntry, SimEvent, SpawnOrigin},
    frame::RenderFrame,
    level_subsystem::LevelSubsystem,
    mechanics_subsystem::MechanicsSubsystem,
    motion_subsystem::MotionSubsystem,
    packet::{Owner, PacketKind},
    rng::{RngBank, SubsystemSlot},
    snapshot::{SimSnapshot, SNAPSHOT_INTERVAL},
    store::SimStore,
    subsystem::{SimSubsystem, TickContext},
    types::{ConnectionId, NodeId, PacketId, RunId, StepDirection, Tick},
    world::{LevelOutcome, World},
};

pub struct SimEngine {
    pub run_id:     RunId,
    pub clock:      SimClock,
    pub rng_bank:   RngBank,
    seed:           u64,
    config:         SimConfig,
    world:          World,
    subsystems:     Vec<(SubsystemSlot, Box<dyn SimSubsystem>)>,
    store:          SimStore,
    initialized:    bool,
    held:           bool,
}

impl SimEngine {
    pub fn new(run_id: RunId, seed: u64, config: SimConfig, level: &LevelDescriptor, store: SimStore) -> Self {
        let world = World::from_level(level, &config.physics);
        Self {
            clock:       SimClock::new(run_id.clone(), config.physics.tick_ms),
            rng_bank:    RngBank::new(seed),
            seed,
            config,
            world,
            subsystems:  Vec::new(),
            store,
            initialized: false,
            held:        false,
            run_id,
        }
    }

    /// Build a fully wired engine for level `level` of the config, with
    /// all subsystems registered. Call this instead of new() + manual
    /// register() calls.
    pub fn build(run_id: RunId, seed: u64, config: SimConfig, level: u32, store: SimStore) -> SimResult<Self> {
        let descriptor = config.level(level).cloned().ok_or(SimError::UnknownLevel(level))?;
        let mut engine = SimEngine::new(run_id, seed, config, &descriptor, store);

        // EXECUTION ORDER: fixed, documented, never reordered.
        engine.register(SubsystemSlot::Effects, Box::new(EffectSubsystem::new()));
        engine.register(SubsystemSlot::Collision, Box::new(CollisionSubsystem::new()));
        engine.register(SubsystemSlot::Mechanics, Box::new(MechanicsSubsystem::new()));
        engine.register(SubsystemSlot::Motion, Box::new(MotionSubsystem::new()));
        engine.register(SubsystemSlot::Level, Box::new(LevelSubsystem::new()));
        Ok(engine)
    }

    /// In-memory engine on the given level with the test physics.
    pub fn build_test(run_id: &str, seed: u64, level: LevelDescriptor) -> SimResult<Self> {
        let store = SimStore::in_memory()?;
        store.migrate()?;
        store.insert_run(run_id, seed, level.number, "test")?;
        let mut config = SimConfig::default_test();
        let number = level.number;
        config.levels = vec![level];
        Self::build(run_id.to_string(), seed, config, number, store)
    }

    /// Register a subsystem. Call in the documented execution order.
    pub fn register(&mut self, slot: SubsystemSlot, subsystem: Box<dyn SimSubsystem>) {
        self.subsystems.push((slot, subsystem));
    }

    // ── Ticking ────────────────────────────────────────────────

    /// One tick in `direction`. This is the core simulation step.
    fn step(&mut self, direction: StepDirection) -> SimResult<Vec<SimEvent>> {
        assert!(!self.clock.paused, "tick() called on paused engine");

        let tick = self.clock.step(direction);
        let now = self.clock.now;
        let mut tick_events: Vec<SimEvent> = vec![
            SimEvent::TickStarted { tick, direction }
        ];

        // Each subsystem sees all events emitted so far this tick.
        for (slot, subsystem) in &mut self.subsystems {
            let mut rng = self.rng_bank.for_tick(*slot, tick);
            let mut ctx = TickContext {
                tick,
                now,
                direction,
                world:   &mut self.world,
                physics: &self.config.physics,
            };
            let new_events = subsystem.update(&mut ctx, &tick_events, &mut rng)?;

            for event in &new_events {
                let entry = EventLogEntry {
                    id:         None,
                    run_id:     self.run_id.clone(),
                    tick,
                    subsystem:  subsystem.name().to_string(),
                    event_type: event_type_name(event).to_string(),
                    payload:    serde_json::to_string(event)?,
                };
                self.store.append_event(&entry)?;
            }

            tick_events.extend(new_events);
        }

        tick_events.push(SimEvent::TickCompleted { tick, direction });

        if direction == StepDirection::Forward && tick > 0 && tick % SNAPSHOT_INTERVAL == 0 {
            self.save_snapshot()?;
        }

        Ok(tick_events)
    }

    /// Run n ticks forward. Used for testing and fast-forward.
    pub fn run_ticks(&mut self, n: u64) -> SimResult<()> {
        self.run(n, StepDirection::Forward)
    }

    /// Rewind n ticks.
    pub fn rewind_ticks(&mut self, n: u64) -> SimResult<()> {
        self.run(n, StepDirection::Backward)
    }

    fn run(&mut self, n: u64, direction: StepDirection) -> SimResult<()> {
        self.initialize()?;
        if self.held {
            log::debug!("run {} is held; skipping {n} ticks", self.run_id);
            return Ok(());
        }
        self.clock.resume();
        for _ in 0..n {
            if let Err(e) = self.step(direction) {
                self.clock.pause();
                return Err(e);
            }
        }
        self.clock.pause();
        Ok(())
    }

    /// Emit RunInitialized and LevelStarted once, so seed differences are
    /// observable in the log.
    fn initialize(&mut self) -> SimResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;
        let progress = &self.world.progress;
        let events = vec![
            SimEvent::RunInitialized { run_id: self.run_id.clone(), seed: self.seed },
            SimEvent::LevelStarted { level: progress.level, quota: progress.quota },
        ];
        log::info!(
            "run {} started level {} (quota {}, seed {})",
            self.run_id, progress.level, progress.quota, self.seed
        );
        self.record("engine", &events)
    }

    fn record(&self, subsystem: &str, events: &[SimEvent]) -> SimResult<()> {
        for event in events {
            let entry = EventLogEntry {
                id:         None,
                run_id:     self.run_id.clone(),
                tick:       self.clock.current_tick,
                subsystem:  subsystem.to_string(),
                event_type: event_type_name(event).to_string(),
                payload:    serde_json::to_string(event)?,
            };
            self.store.append_event(&entry)?;
        }
        Ok(())
    }

    /// Drop every packet and shockwave in flight.
    pub fn reset(&mut self) -> SimResult<()> {
        self.world.clear_in_flight();
        let event = SimEvent::SimulationReset { tick: self.clock.current_tick };
        self.record("engine", &[event])
    }

    // ── Player input ───────────────────────────────────────────

    /// Apply a queued command, logging its receipt first.
    pub fn submit(&mut self, queued: QueuedCommand) -> SimResult<Vec<SimEvent>> {
        let received = SimEvent::PlayerCommandReceived {
            tick:         self.clock.current_tick,
            command_id:   queued.command_id.clone(),
            command_type: queued.command.type_name().to_string(),
        };
        self.record("player", &[received])?;
        self.apply_command(queued.command)
    }

    pub fn apply_command(&mut self, command: PlayerCommand) -> SimResult<Vec<SimEvent>> {
        let now = self.clock.now;
        let mut events = Vec::new();
        match command {
            PlayerCommand::Pause => self.held = true,
            PlayerCommand::Resume => self.held = false,
            PlayerCommand::SetSpeed { speed } => self.clock.set_speed(speed),

            PlayerCommand::Purchase { item } => {
                let cost = item.price(&self.config.shop);
                self.world.purse.debit(cost)?;
                events.push(SimEvent::CoinsSpent {
                    item: item.name().to_string(),
                    cost,
                    remaining: self.world.purse.coins,
                });
                match item.effect() {
                    Some(effect) => {
                        let duration = effect.duration(&self.config.physics.effects);
                        let slot = EffectSlot::Global { effect };
                        self.world.effects.activate(slot, now, duration);
                        events.push(SimEvent::EffectActivated { slot, until: now + duration });
                    }
                    None => {
                        let mut purged = 0;
                        for packet in self.world.packets_mut() {
                            packet.noise = 0.0;
                            purged += 1;
                        }
                        events.push(SimEvent::NoisePurged { packets: purged });
                    }
                }
            }
            PlayerCommand::FreezeWire { connection } => {
                let cost = self.config.shop.freeze_scroll;
                self.scroll(WireEffect::Freeze, connection, cost, &mut events)?;
            }
            PlayerCommand::RestoreWire { connection } => {
                let cost = self.config.shop.restore_scroll;
                self.scroll(WireEffect::Restore, connection, cost, &mut events)?;
            }

            PlayerCommand::Shockwave { at } => {
                self.world.spawn_shockwave(at, now);
                events.push(SimEvent::ShockwaveSpawned { center: at });
            }
            PlayerCommand::Inject { connection, kind, owner } => {
                self.inject(connection, kind, owner)?;
                return Ok(Vec::new());
            }
            PlayerCommand::Edit { edit } => {
                self.apply_edit(edit)?;
                return Ok(Vec::new());
            }
        }
        if !events.is_empty() {
            self.fork_timeline()?;
        }
        self.record("player", &events)?;
        Ok(events)
    }

    /// Player input after a rewind starts a new future; snapshots of the
    /// old one must not be restored.
    fn fork_timeline(&self) -> SimResult<()> {
        let tick = self.clock.current_tick;
        let removed = self.store.discard_snapshots_after(&self.run_id, tick)?;
        if removed > 0 {
            log::debug!("tick={tick} discarded {removed} snapshots of the abandoned future");
        }
        Ok(())
    }

    fn scroll(
        &mut self,
        effect: WireEffect,
        connection: ConnectionId,
        cost: u64,
        events: &mut Vec<SimEvent>,
    ) -> SimResult<()> {
        if self.world.network.connection(connection).is_none() {
            return Err(SimError::UnknownConnection(connection));
        }
        self.world.purse.debit(cost)?;
        let now = self.clock.now;
        let duration = effect.duration(&self.config.physics.effects);
        let slot = EffectSlot::Wire { effect, connection };
        self.world.effects.activate(slot, now, duration);
        events.push(SimEvent::CoinsSpent {
            item: format!("{effect:?}_scroll").to_lowercase(),
            cost,
            remaining: self.world.purse.coins,
        });
        events.push(SimEvent::EffectActivated { slot, until: now + duration });
        Ok(())
    }

    /// Place a packet of any kind at the start of an idle wire.
    pub fn inject(&mut self, connection: ConnectionId, kind: PacketKind, owner: Owner) -> SimResult<PacketId> {
        if self.world.network.connection(connection).is_none() {
            return Err(SimError::UnknownConnection(connection));
        }
        let id = self
            .world
            .spawn(connection, kind, owner, self.clock.now, self.config.physics.base_speed)
            .ok_or(SimError::ConnectionOccupied(connection))?;
        let event = SimEvent::PacketSpawned { packet: id, kind, connection, origin: SpawnOrigin::Injected };
        self.fork_timeline()?;
        self.record("player", &[event])?;
        Ok(id)
    }

    /// Validate and apply a topology edit. Rejections leave the network
    /// untouched and are logged. Returns the id of a created wire.
    pub fn apply_edit(&mut self, edit: TopologyEdit) -> SimResult<Option<ConnectionId>> {
        let description = format!("{edit:?}");
        let network = &mut self.world.network;
        let result = match &edit {
            TopologyEdit::Connect { from, from_port, to, to_port, replace } => network
                .connect(from, *from_port, to, *to_port, *replace)
                .map(|(id, replaced)| {
                    if let Some(old) = replaced {
                        self.world.effects.forget_connection(old.id);
                    }
                    Some(id)
                }),
            TopologyEdit::Disconnect { connection } => network.disconnect(*connection).map(|old| {
                self.world.effects.forget_connection(old.id);
                None
            }),
            TopologyEdit::AddBendPoint { connection, at } => {
                network.add_bend_point(*connection, *at).map(|_| None)
            }
            TopologyEdit::RemoveBendPoint { connection, index } => {
                network.remove_bend_point(*connection, *index).map(|_| None)
            }
            TopologyEdit::MoveBendPoint { connection, index, to } => {
                network.move_bend_point(*connection, *index, *to).map(|_| None)
            }
            TopologyEdit::AddWaypoint { connection, at } => {
                network.add_waypoint(*connection, *at).map(|_| None)
            }
            TopologyEdit::MoveWaypoint { connection, index, to } => {
                network.move_waypoint(*connection, *index, *to).map(|_| None)
            }
            TopologyEdit::MoveNode { node, to } => network.move_node(node, *to).map(|_| None),
        };

        match result {
            Ok(created) => {
                self.fork_timeline()?;
                self.record("editor", &[SimEvent::EditApplied { description }])?;
                if edit.rewires() {
                    self.reset()?;
                }
                Ok(created)
            }
            Err(reason) => {
                log::warn!("edit rejected: {reason} ({description})");
                let event = SimEvent::EditRejected { description, reason: reason.clone() };
                self.record("editor", &[event])?;
                Err(SimError::EditRejected(reason))
            }
        }
    }

    /// Wire an output port to an input port.
    pub fn connect(
        &mut self,
        from: &str,
        from_port: usize,
        to: &str,
        to_port: usize,
    ) -> SimResult<ConnectionId> {
        let created = self.apply_edit(TopologyEdit::Connect {
            from: NodeId::from(from),
            from_port,
            to: NodeId::from(to),
            to_port,
            replace: false,
        })?;
        created.ok_or_else(|| SimError::Other(anyhow::anyhow!("connect created no wire")))
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn outcome(&self) -> LevelOutcome {
        self.world.progress.outcome
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn frame(&self) -> RenderFrame {
        RenderFrame::capture(&self.world, self.clock.current_tick, self.clock.now, &self.config.physics)
    }

    /// Query events for a specific tick from the store.
    /// Used by the determinism test and replay tooling.
    pub fn store_events_for_tick(
        &self,
        run_id: &str,
        tick: Tick,
    ) -> SimResult<Vec<EventLogEntry>> {
        self.store.events_for_tick(run_id, tick)
    }

    pub fn store_events(&self) -> SimResult<Vec<EventLogEntry>> {
        self.store.events_for_run(&self.run_id)
    }

    pub fn count_events(&self, event_type: &str) -> SimResult<u64> {
        self.store.count_events_of_type(&self.run_id, event_type)
    }

    pub fn event_counts(&self) -> SimResult<Vec<(String, u64)>> {
        self.store.event_type_counts(&self.run_id)
    }

    // ── Snapshots ──────────────────────────────────────────────

    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            run_id: self.run_id.clone(),
            tick:   self.clock.current_tick,
            seed:   self.seed,
            clock:  self.clock.clone(),
            world:  self.world.clone(),
        }
    }

    pub fn save_snapshot(&self) -> SimResult<()> {
        let snapshot = self.snapshot();
        let json = serde_json::to_string(&snapshot)?;
        self.store.save_snapshot(&self.run_id, snapshot.tick, &json)?;
        log::debug!("Snapshot saved at tick {}", snapshot.tick);
        Ok(())
    }

    /// Resume from a snapshot. The engine keeps its store and subsystems.
    pub fn restore(&mut self, snapshot: SimSnapshot) {
        self.seed = snapshot.seed;
        self.rng_bank = RngBank::new(snapshot.seed);
        self.clock = snapshot.clock;
        self.clock.pause();
        self.world = snapshot.world;
        self.initialized = true;
    }

    /// Restore the newest stored snapshot at or before `tick`. Returns the
    /// tick restored to, if any snapshot existed.
    pub fn restore_latest(&mut self, tick: Tick) -> SimResult<Option<Tick>> {
        let Some((at, json)) = self.store.latest_snapshot_before(&self.run_id, tick)? else {
            return Ok(None);
        };
        let snapshot: SimSnapshot = serde_json::from_str(&json)?;
        self.restore(snapshot);
        Ok(Some(at))
    }
}

/// Extract a stable string name from a SimEvent variant.
/// Used for the event_type column in event_log.
fn event_type_name(event: &SimEvent) -> &'static str {
    match event {
        SimEvent::TickStarted { .. }           => "tick_started",
        SimEvent::TickCompleted { .. }         => "tick_completed",
        SimEvent::RunInitialized { .. }        => "run_initialized",
        SimEvent::LevelStarted { .. }          => "level_started",
        SimEvent::SimulationReset { .. }       => "simulation_reset",
        SimEvent::PlayerCommandReceived { .. } => "player_command_received",
        SimEvent::PacketEmitted { .. }         => "packet_emitted",
        SimEvent::PacketSpawned { .. }         => "packet_spawned",
        SimEvent::PacketArrived { .. }         => "packet_arrived",
        SimEvent::PacketDelivered { .. }       => "packet_delivered",
        SimEvent::PacketTeleported { .. }      => "packet_teleported",
        SimEvent::PacketConverted { .. }       => "packet_converted",
        SimEvent::PacketReturning { .. }       => "packet_returning",
        SimEvent::PacketDropped { .. }         => "packet_dropped",
        SimEvent::FragmentBuffered { .. }      => "fragment_buffered",
        SimEvent::PacketsCollided { .. }       => "packets_collided",
        SimEvent::PacketLostToNoise { .. }     => "packet_lost_to_noise",
        SimEvent::LossUpdated { .. }           => "loss_updated",
        SimEvent::ShockwaveSpawned { .. }      => "shockwave_spawned",
        SimEvent::WireDestroyed { .. }         => "wire_destroyed",
        SimEvent::PortsRandomized { .. }       => "ports_randomized",
        SimEvent::NodeDamaged { .. }           => "node_damaged",
        SimEvent::EffectActivated { .. }       => "effect_activated",
        SimEvent::EffectExpired { .. }         => "effect_expired",
        SimEvent::EffectRestored { .. }        => "effect_restored",
        SimEvent::NoisePurged { .. }           => "noise_purged",
        SimEvent::CoinsSpent { .. }            => "coins_spent",
        SimEvent::EditApplied { .. }           => "edit_applied",
        SimEvent::EditRejected { .. }          => "edit_rejected",
        SimEvent::LevelSucceeded { .. }        => "level_succeeded",
        SimEvent::LevelFailed { .. }           => "level_failed",
    }
}
