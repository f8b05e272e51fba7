//! Mechanics subsystem: node-side sweeps that run on their own clock.
//!
//! Execution: every forward tick, after collisions.
//! Depends on: motion (last tick's packet speeds).
//!
//! - Anti-trojan nodes clean one infected packet in range, then cool down.
//! - Damaged VPN nodes lose their protection over every packet they shield.
//! - A packet moving faster than the safe speed damages the node it is
//!   heading for.

use crate::{
    error::SimResult,
    event::{Conversion, SimEvent},
    network::Behavior,
    rng::SubsystemRng,
    subsystem::{SimSubsystem, TickContext},
    types::{NodeId, PacketId},
};
use std::any::Any;

pub struct MechanicsSubsystem;

impl MechanicsSubsystem {
    pub fn new() -> Self {
        Self
    }

    fn sweep_trojans(&self, ctx: &mut TickContext<'_>, events: &mut Vec<SimEvent>) {
        let damage_ms = ctx.physics.system_damage_ms;
        let cooldown = ctx.physics.antitrojan_cooldown_ms;
        let radius = ctx.physics.antitrojan_radius;
        let ready: Vec<(NodeId, _)> = ctx
            .world
            .network
            .nodes()
            .filter(|n| n.behavior == Behavior::AntiTrojan)
            .filter(|n| !n.is_damaged(ctx.now, damage_ms) && n.sweep_ready(ctx.now, cooldown))
            .map(|n| (n.id.clone(), n.position))
            .collect();

        for (node_id, center) in ready {
            let target = ctx
                .world
                .packets()
                .filter(|p| p.infected)
                .find(|p| ctx.world.position(p).distance(&center) <= radius)
                .map(|p| p.id);
            let Some(id) = target else {
                continue;
            };
            let Some(packet) = ctx.world.packet_mut(id) else {
                continue;
            };
            packet.revert();
            let kind = packet.kind;
            if let Some(node) = ctx.world.network.node_mut(&node_id) {
                node.last_sweep_at = Some(ctx.now);
            }
            events.push(SimEvent::PacketConverted {
                packet: id,
                node: Some(node_id.clone()),
                kind,
                conversion: Conversion::Reverted,
            });
            log::debug!("tick={} packet={id} cleaned by {node_id}", ctx.tick);
        }
    }

    fn fail_vpns(&self, ctx: &mut TickContext<'_>, events: &mut Vec<SimEvent>) {
        let damage_ms = ctx.physics.system_damage_ms;
        let failed: Vec<NodeId> = ctx
            .world
            .network
            .nodes()
            .filter(|n| n.behavior == Behavior::Vpn && n.is_damaged(ctx.now, damage_ms))
            .map(|n| n.id.clone())
            .collect();
        if failed.is_empty() {
            return;
        }

        for packet in ctx.world.packets_mut() {
            let shielded = packet.is_protected()
                && packet.protector.as_ref().is_some_and(|vpn| failed.contains(vpn));
            if !shielded {
                continue;
            }
            let node = packet.protector.clone();
            packet.revert();
            events.push(SimEvent::PacketConverted {
                packet: packet.id,
                node,
                kind: packet.kind,
                conversion: Conversion::Reverted,
            });
        }
    }

    fn damage_from_overspeed(&self, ctx: &mut TickContext<'_>, events: &mut Vec<SimEvent>) {
        let limit = ctx.physics.max_safe_speed;
        let damage_ms = ctx.physics.system_damage_ms;
        let speeding: Vec<(PacketId, f64, NodeId)> = ctx
            .world
            .packets()
            .filter(|p| p.speed > limit)
            .filter_map(|p| {
                let target = ctx.world.network.connection(p.connection)?.to.clone();
                Some((p.id, p.speed, target))
            })
            .collect();

        for (packet, speed, target) in speeding {
            let Some(node) = ctx.world.network.node_mut(&target) else {
                continue;
            };
            if node.is_damaged(ctx.now, damage_ms) {
                continue;
            }
            node.damaged_since = Some(ctx.now);
            events.push(SimEvent::NodeDamaged { node: target.clone(), packet, speed });
            log::warn!("tick={} node {target} damaged by packet={packet} at speed {speed:.3}", ctx.tick);
        }
    }
}

impl Default for MechanicsSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSubsystem for MechanicsSubsystem {
    fn name(&self) -> &'static str {
        "mechanics"
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
        self.sweep_trojans(ctx, &mut events);
        self.fail_vpns(ctx, &mut events);
        self.damage_from_overspeed(ctx, &mut events);
        Ok(events)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
