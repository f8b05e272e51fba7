//! Collision subsystem: timeouts, collisions, noise and packet loss.
//!
//! Execution: every forward tick, after effects. Depends on: effects
//! (collision and noise immunity).
//!
//! Two packets on different wires within the loss distance collide. Both
//! are lost, a shockwave starts at their midpoint, and unless noise
//! immunity is active every packet picks up noise from the impact; any
//! packet whose noise reaches the threshold is lost as well. Each lost
//! packet counts once per tick.

use crate::{
    effects::GlobalEffect,
    error::SimResult,
    event::{DropReason, SimEvent},
    rng::SubsystemRng,
    subsystem::{SimSubsystem, TickContext},
    types::PacketId,
    world::LevelOutcome,
};
use std::{any::Any, collections::BTreeSet};

pub struct CollisionSubsystem;

impl CollisionSubsystem {
    pub fn new() -> Self {
        Self
    }

    /// Packets that have not moved for too long are dropped. Not a loss.
    fn expire_stale(&self, ctx: &mut TickContext<'_>, events: &mut Vec<SimEvent>) {
        let timeout = ctx.physics.packet_timeout_ms;
        let stale: Vec<PacketId> = ctx
            .world
            .packets()
            .filter(|p| ctx.now - p.last_moved_at > timeout)
            .map(|p| p.id)
            .collect();
        for id in stale {
            ctx.world.remove_packet(id);
            ctx.world.progress.timed_out += 1;
            events.push(SimEvent::PacketDropped { packet: id, reason: DropReason::Timeout });
            log::debug!("tick={} packet={id} timed out", ctx.tick);
        }
    }

    fn resolve_collisions(&self, ctx: &mut TickContext<'_>, events: &mut Vec<SimEvent>) {
        let positions = ctx.world.positions();
        let noise_immune = ctx.world.effects.is_active(GlobalEffect::NoiseImmunity, ctx.now);
        let reach = ctx.physics.loss_distance;
        let threshold = ctx.physics.noise_loss_threshold;
        let mut lost: BTreeSet<PacketId> = BTreeSet::new();

        for (i, (first, first_wire, first_at)) in positions.iter().enumerate() {
            for (second, second_wire, second_at) in &positions[i + 1..] {
                if first_wire == second_wire || first_at.distance(second_at) > reach {
                    continue;
                }
                lost.insert(*first);
                lost.insert(*second);
                let point = first_at.midpoint(second_at);
                events.push(SimEvent::PacketsCollided { first: *first, second: *second, point });
                ctx.world.spawn_shockwave(point, ctx.now);
                events.push(SimEvent::ShockwaveSpawned { center: point });

                if noise_immune {
                    continue;
                }
                for (id, _, at) in &positions {
                    let Some(packet) = ctx.world.packet_mut(*id) else {
                        continue;
                    };
                    packet.noise += 1.0 / (at.distance(&point) + 1.0);
                    if packet.noise >= threshold && lost.insert(*id) {
                        events.push(SimEvent::PacketLostToNoise { packet: *id, noise: packet.noise });
                    }
                }
            }
        }

        if lost.is_empty() {
            return;
        }
        for id in &lost {
            ctx.world.remove_packet(*id);
        }
        let added = lost.len() as u32;
        let progress = &mut ctx.world.progress;
        progress.lost += added;
        events.push(SimEvent::LossUpdated { lost: progress.lost, added });
        log::debug!("tick={} lost {added} packets (total {})", ctx.tick, progress.lost);

        if progress.outcome == LevelOutcome::InProgress && progress.loss_exceeded() {
            progress.outcome = LevelOutcome::Failed;
            events.push(SimEvent::LevelFailed { level: progress.level, lost: progress.lost });
            log::warn!(
                "tick={} level {} failed: {} lost against a quota of {}",
                ctx.tick, progress.level, progress.lost, progress.quota
            );
        }
    }
}

impl Default for CollisionSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSubsystem for CollisionSubsystem {
    fn name(&self) -> &'static str {
        "collision"
    }

    fn update(
        &mut self,
        ctx: &mut TickContext<'_>,
        _events_in: &[SimEvent],
        _rng: &mut SubsystemRng,
    ) -> SimResult<Vec<SimEvent>> {
        let mut events = Vec::new();
        if !ctx.is_forward() {
            return Ok(events);
        }
        self.expire_stale(ctx, &mut events);
        if !ctx.world.effects.is_active(GlobalEffect::CollisionImmunity, ctx.now) {
            self.resolve_collisions(ctx, &mut events);
        }
        Ok(events)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
