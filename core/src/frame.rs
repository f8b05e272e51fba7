//! Read-only view of the world for a renderer.

use crate::{
    config::PhysicsConfig,
    geometry::Point,
    network::Behavior,
    packet::{Owner, PacketKind},
    types::{ConnectionId, NodeId, PacketId, Tick, VirtualTime},
    world::{LevelProgress, World},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketView {
    pub id: PacketId,
    pub kind: PacketKind,
    pub owner: Owner,
    pub position: Point,
    pub returning: bool,
    pub noise: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionView {
    pub id: ConnectionId,
    pub from: NodeId,
    pub to: NodeId,
    pub path: Vec<Point>,
    pub occupied: bool,
    pub destroyed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeView {
    pub id: NodeId,
    pub position: Point,
    pub behavior: Behavior,
    pub inputs: Vec<PacketKind>,
    pub outputs: Vec<PacketKind>,
    pub operational: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShockwaveView {
    pub center: Point,
    pub radius: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderFrame {
    pub tick: Tick,
    pub now: VirtualTime,
    pub coins: u64,
    pub wire_used: f64,
    pub wire_ceiling: f64,
    pub progress: LevelProgress,
    pub nodes: Vec<NodeView>,
    pub connections: Vec<ConnectionView>,
    pub packets: Vec<PacketView>,
    pub shockwaves: Vec<ShockwaveView>,
}

impl RenderFrame {
    pub fn capture(world: &World, tick: Tick, now: VirtualTime, physics: &PhysicsConfig) -> Self {
        let network = &world.network;
        Self {
            tick,
            now,
            coins: world.purse.coins,
            wire_used: network.total_wire_length(),
            wire_ceiling: network.budget().ceiling(),
            progress: world.progress.clone(),
            nodes: network
                .nodes()
                .map(|n| NodeView {
                    id: n.id.clone(),
                    position: n.position,
                    behavior: n.behavior,
                    inputs: n.inputs.clone(),
                    outputs: n.outputs.clone(),
                    operational: !n.is_damaged(now, physics.system_damage_ms),
                })
                .collect(),
            connections: network
                .connections()
                .map(|c| ConnectionView {
                    id: c.id,
                    from: c.from.clone(),
                    to: c.to.clone(),
                    path: network.detailed_path(c.id),
                    occupied: !world.is_idle(c.id),
                    destroyed: c.destroyed,
                })
                .collect(),
            packets: world
                .packets()
                .map(|p| PacketView {
                    id: p.id,
                    kind: p.kind,
                    owner: p.owner,
                    position: world.position(p),
                    returning: p.returning,
                    noise: p.noise,
                })
                .collect(),
            shockwaves: world
                .shockwaves
                .iter()
                .filter(|w| w.is_active(now, &physics.shockwave))
                .map(|w| ShockwaveView {
                    center: w.center,
                    radius: w.radius(now, &physics.shockwave),
                })
                .collect(),
        }
    }
}
