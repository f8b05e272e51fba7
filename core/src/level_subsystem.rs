//! Level subsystem: packet emission at the origin and the win condition.
//!
//! Execution: every forward tick, last. Depends on: motion (freed wires).
//!
//! Each tick the origin places one packet on every free outgoing wire,
//! shaped like the wire's output port, until the quota is emitted. Only
//! squares and triangles count toward the quota. The first terminal
//! outcome sticks.

use crate::{
    error::SimResult,
    event::SimEvent,
    packet::Owner,
    rng::SubsystemRng,
    subsystem::{SimSubsystem, TickContext},
    world::LevelOutcome,
};
use std::any::Any;

pub struct LevelSubsystem;

impl LevelSubsystem {
    pub fn new() -> Self {
        Self
    }

    fn emit(&self, ctx: &mut TickContext<'_>, events: &mut Vec<SimEvent>) {
        let origin_id = ctx.world.network.origin().clone();
        let Some(origin) = ctx.world.network.node(&origin_id) else {
            return;
        };
        if origin.is_damaged(ctx.now, ctx.physics.system_damage_ms) {
            return;
        }
        let shapes = origin.outputs.clone();

        for wire in ctx.world.network.outgoing(&origin_id) {
            if ctx.world.progress.quota_reached() {
                break;
            }
            let Some(port) = ctx.world.network.connection(wire).map(|c| c.from_port) else {
                continue;
            };
            let Some(kind) = shapes.get(port).copied().filter(|k| k.is_emittable()) else {
                continue;
            };
            let Some(packet) = ctx
                .world
                .spawn(wire, kind, Owner::Player, ctx.now, ctx.physics.base_speed)
            else {
                continue;
            };
            let progress = &mut ctx.world.progress;
            progress.emitted += 1;
            *progress.emitted_by_kind.entry(kind).or_insert(0) += 1;
            events.push(SimEvent::PacketEmitted { packet, kind, connection: wire });
        }
    }
}

impl Default for LevelSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSubsystem for LevelSubsystem {
    fn name(&self) -> &'static str {
        "level"
    }

    fn update(
        &mut self,
        ctx: &mut TickContext<'_>,
        _events_in: &[SimEvent],
        _rng: &mut SubsystemRng,
    ) -> SimResult<Vec<SimEvent>> {
        let mut events = Vec::new();
        if !ctx.is_forward() || ctx.world.progress.is_finished() {
            return Ok(events);
        }

        self.emit(ctx, &mut events);

        let progress = &mut ctx.world.progress;
        if progress.quota_reached() {
            progress.outcome = LevelOutcome::Succeeded;
            events.push(SimEvent::LevelSucceeded {
                level: progress.level,
                emitted: progress.counted(),
                delivered: progress.delivered,
            });
            log::info!("tick={} level {} succeeded", ctx.tick, progress.level);
        }
        Ok(events)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
