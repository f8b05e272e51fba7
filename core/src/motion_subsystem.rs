//! Motion subsystem: moves every packet one step along its wire.
//!
//! Execution: every tick, both directions. Runs after mechanics.
//! Depends on: dispatch (arrivals), effects (speed modifiers).
//!
//! Forward: progress += speed; reaching 1.0 moves to the next segment
//! with the overflow carried over; passing the last segment is an
//! arrival at the wire's target node.
//! Backward: the exact inverse; underflowing segment 0 puts the packet
//! back at the wire's source, where it splices onto an incoming wire.

use crate::{
    config::PhysicsConfig,
    dispatch::{self, Arrival},
    effects::{GlobalEffect, WireEffect},
    error::SimResult,
    event::{DropReason, ReturnReason, SimEvent, SpawnOrigin},
    geometry::Point,
    network::Behavior,
    packet::{Packet, PacketKind},
    rng::SubsystemRng,
    subsystem::{SimSubsystem, TickContext},
    types::{ConnectionId, NodeId, PacketId, StepDirection, VirtualTime},
    world::World,
};
use std::any::Any;

const EPSILON: f64 = 1e-9;

pub struct MotionSubsystem;

impl MotionSubsystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MotionSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSubsystem for MotionSubsystem {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn update(
        &mut self,
        ctx: &mut TickContext<'_>,
        _events_in: &[SimEvent],
        rng: &mut SubsystemRng,
    ) -> SimResult<Vec<SimEvent>> {
        let mut events = Vec::new();
        for id in ctx.world.packet_ids() {
            let Some(returning) = ctx.world.packet(id).map(|p| p.returning) else {
                continue;
            };
            match ctx.direction {
                StepDirection::Forward if !returning => step_forward(ctx, id, rng, &mut events),
                _ => step_backward(ctx, id, &mut events),
            }
        }
        Ok(events)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Speed for this tick: base speed, long-wire acceleration (or the
/// confidential slowdowns), entry penalty, global modifiers, freeze.
pub fn current_speed(world: &World, packet: &Packet, now: VirtualTime, physics: &PhysicsConfig) -> f64 {
    let effects = &physics.effects;
    if world
        .effects
        .is_wire_active(WireEffect::Freeze, packet.connection, now)
    {
        return 0.0;
    }

    let mut length = world.network.length(packet.connection);
    if world.effects.is_active(GlobalEffect::WireOptimizer, now) {
        length *= effects.wire_optimizer_factor;
    }

    let mut speed = physics.base_speed;
    if packet.is_confidential() {
        speed *= confidential_factor(world, packet, physics);
    } else if length > physics.long_wire_threshold {
        let excess = (length - physics.long_wire_threshold) / physics.long_wire_threshold;
        speed *= 1.0 + excess * physics.wire_acceleration_factor;
    }

    speed *= packet.entry_penalty;
    if world.effects.is_active(GlobalEffect::SpeedBooster, now) {
        speed *= effects.speed_booster_factor;
    }
    if world.effects.is_active(GlobalEffect::SpeedLimiter, now) {
        speed *= effects.speed_limiter_factor;
    }
    speed
}

fn confidential_factor(world: &World, packet: &Packet, physics: &PhysicsConfig) -> f64 {
    let mut factor = 1.0;
    let Some(target) = world.network.connection(packet.connection).map(|c| c.to.clone()) else {
        return factor;
    };
    let crowded = world
        .network
        .connections()
        .filter(|c| c.id != packet.connection && c.touches(&target))
        .any(|c| world.occupant(c.id).is_some());
    if crowded {
        factor *= physics.confidential_slowdown;
    }

    if packet.kind == PacketKind::Confidential6 {
        let here = world.position(packet);
        let nearest = world
            .packets()
            .filter(|other| other.id != packet.id)
            .map(|other| world.position(other).distance(&here))
            .fold(f64::INFINITY, f64::min);
        let keep = physics.confidential_keep_distance;
        if nearest < keep / 2.0 {
            factor *= 0.5;
        } else if nearest < keep {
            factor *= 0.8;
        }
    }
    factor
}

/// Pull displacement straight back toward the wire by at most `step`.
fn settle(displacement: Point, step: f64) -> Point {
    let distance = displacement.length();
    if distance <= step {
        return Point::ORIGIN;
    }
    displacement.scale(1.0 - step / distance)
}

/// Shared prologue of both step directions. Returns the speed, or None
/// when the packet is gone or not moving this tick.
fn prepare_step(ctx: &mut TickContext<'_>, id: PacketId) -> Option<f64> {
    let packet = ctx.world.packet(id)?;
    let speed = current_speed(ctx.world, packet, ctx.now, ctx.physics);
    let effects = &ctx.world.effects;
    let restoring = effects.is_wire_active(WireEffect::Restore, packet.connection, ctx.now);
    let frozen = effects.is_wire_active(WireEffect::Freeze, packet.connection, ctx.now);

    let packet = ctx.world.packet_mut(id)?;
    packet.speed = speed;
    if restoring {
        packet.displacement = settle(packet.displacement, ctx.physics.effects.restoration_speed);
    }
    // A frozen packet is held on purpose and must not time out.
    if speed > 0.0 || frozen {
        packet.last_moved_at = ctx.now;
    }
    (speed > 0.0).then_some(speed)
}

fn step_forward(
    ctx: &mut TickContext<'_>,
    id: PacketId,
    rng: &mut SubsystemRng,
    events: &mut Vec<SimEvent>,
) {
    let Some(speed) = prepare_step(ctx, id) else {
        return;
    };
    let Some(connection) = ctx.world.packet(id).map(|p| p.connection) else {
        return;
    };
    let segments = ctx.world.network.detailed_path(connection).len().saturating_sub(1);

    let Some(packet) = ctx.world.packet_mut(id) else {
        return;
    };
    // Overflow carries into the next segment so a backward step undoes it.
    let next = packet.progress + speed;
    if next >= 1.0 - EPSILON {
        packet.progress = (next - 1.0).max(0.0);
        packet.segment += 1;
    } else {
        packet.progress = next;
    }
    if packet.segment < segments {
        return;
    }
    arrive(ctx, id, connection, rng, events);
}

fn arrive(
    ctx: &mut TickContext<'_>,
    id: PacketId,
    connection: ConnectionId,
    rng: &mut SubsystemRng,
    events: &mut Vec<SimEvent>,
) {
    let Some(node_id) = ctx.world.network.connection(connection).map(|c| c.to.clone()) else {
        return;
    };
    if &node_id == ctx.world.network.sink() {
        deliver(ctx, id, events);
        return;
    }

    let damage_ms = ctx.physics.system_damage_ms;
    let damaged = ctx
        .world
        .network
        .node(&node_id)
        .is_some_and(|n| n.is_damaged(ctx.now, damage_ms));
    if damaged {
        if let Some(packet) = ctx.world.packet_mut(id) {
            packet.returning = true;
        }
        events.push(SimEvent::PacketReturning { packet: id, reason: ReturnReason::DamagedNode });
        step_backward(ctx, id, events);
        return;
    }

    if dispatch::dispatch(ctx, id, rng, events) != Arrival::Continue {
        return;
    }

    match select_next(ctx.world, &node_id, id, ctx.now, damage_ms) {
        Some(next) if ctx.world.transfer(id, next) => {
            log::debug!("tick={} packet={id} node={node_id} next={next}", ctx.tick);
        }
        _ => {
            ctx.world.remove_packet(id);
            events.push(SimEvent::PacketDropped { packet: id, reason: DropReason::NoNextConnection });
            log::warn!("tick={} packet={id} dropped at {node_id}: no free outgoing wire", ctx.tick);
        }
    }
}

/// Next wire out of `node_id`. Prefers a wire whose output port shape
/// matches the packet (a mismatch at sabotage nodes); confidential
/// packets only get a preference at uncontrollable nodes. Falls back to
/// any free wire whose target is operational.
fn select_next(
    world: &World,
    node_id: &NodeId,
    id: PacketId,
    now: VirtualTime,
    damage_ms: i64,
) -> Option<ConnectionId> {
    let node = world.network.node(node_id)?;
    let packet = world.packet(id)?;
    let usable: Vec<_> = world
        .network
        .outgoing(node_id)
        .into_iter()
        .filter(|c| world.is_free(*c))
        .filter_map(|c| world.network.connection(c))
        .filter(|c| {
            world
                .network
                .node(&c.to)
                .is_some_and(|target| !target.is_damaged(now, damage_ms))
        })
        .collect();

    let shape_rule = !packet.is_confidential() || node.behavior == Behavior::Uncontrollable;
    let preferred = usable.iter().find(|c| {
        let matches = node.outputs.get(c.from_port) == Some(&packet.kind);
        shape_rule && (matches != (node.behavior == Behavior::Sabotage))
    });
    preferred.or(usable.first()).map(|c| c.id)
}

fn deliver(ctx: &mut TickContext<'_>, id: PacketId, events: &mut Vec<SimEvent>) {
    let Some(packet) = ctx.world.remove_packet(id) else {
        return;
    };
    let coins = packet.coin_value();
    ctx.world.purse.credit(coins);
    ctx.world.progress.delivered += 1;
    events.push(SimEvent::PacketDelivered { packet: id, kind: packet.kind, coins });
    log::debug!("tick={} packet={id} delivered (+{coins} coins)", ctx.tick);

    let Some(kind) = packet.feedback_kind() else {
        return;
    };
    let damage_ms = ctx.physics.system_damage_ms;
    let wire = ctx
        .world
        .network
        .nodes()
        .filter(|n| n.behavior == Behavior::Uncontrollable && !n.is_damaged(ctx.now, damage_ms))
        .find_map(|n| ctx.world.first_free_outgoing(&n.id));
    let Some(wire) = wire else {
        return;
    };
    if let Some(spawned) = ctx
        .world
        .spawn(wire, kind, packet.owner.opponent(), ctx.now, ctx.physics.base_speed)
    {
        events.push(SimEvent::PacketSpawned {
            packet: spawned,
            kind,
            connection: wire,
            origin: SpawnOrigin::Feedback,
        });
    }
}

fn step_backward(ctx: &mut TickContext<'_>, id: PacketId, events: &mut Vec<SimEvent>) {
    let Some(speed) = prepare_step(ctx, id) else {
        return;
    };
    let Some(packet) = ctx.world.packet_mut(id) else {
        return;
    };
    let next = packet.progress - speed;
    if next >= -EPSILON {
        packet.progress = if next < EPSILON { 0.0 } else { next };
        return;
    }
    if packet.segment > 0 {
        packet.segment -= 1;
        packet.progress = 1.0 + next;
        return;
    }
    back_at_source(ctx, id, speed, events);
}

/// Underflow at segment 0: leave the wire through its source node.
fn back_at_source(ctx: &mut TickContext<'_>, id: PacketId, speed: f64, events: &mut Vec<SimEvent>) {
    let Some((kind, connection)) = ctx.world.packet(id).map(|p| (p.kind, p.connection)) else {
        return;
    };
    let Some(source) = ctx.world.network.connection(connection).map(|c| c.from.clone()) else {
        return;
    };
    if &source == ctx.world.network.origin() {
        ctx.world.remove_packet(id);
        events.push(SimEvent::PacketDropped { packet: id, reason: DropReason::ReturnedToOrigin });
        return;
    }

    let preferred_port = match kind {
        PacketKind::Triangle => Some(0),
        PacketKind::Square => Some(1),
        _ => None,
    };
    let candidates: Vec<_> = ctx
        .world
        .network
        .incoming(&source)
        .into_iter()
        .filter(|c| ctx.world.is_free(*c))
        .filter_map(|c| ctx.world.network.connection(c))
        .collect();
    let previous = candidates
        .iter()
        .find(|c| Some(c.to_port) == preferred_port)
        .or(candidates.first())
        .map(|c| c.id);

    let Some(previous) = previous else {
        ctx.world.remove_packet(id);
        events.push(SimEvent::PacketDropped { packet: id, reason: DropReason::NoPreviousConnection });
        return;
    };
    let segments = ctx.world.network.detailed_path(previous).len().saturating_sub(1);
    if !ctx.world.transfer(id, previous) {
        return;
    }
    if let Some(packet) = ctx.world.packet_mut(id) {
        packet.segment = segments.saturating_sub(1);
        packet.progress = (1.0 - speed).max(0.0);
    }
}
