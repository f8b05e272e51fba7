//! Mutable simulation state: the network plus everything travelling on it.
//!
//! Packets and occupancy live in id-keyed arenas. A connection carries at
//! most one packet; `occupancy` is the single source of truth for that.

use crate::{
    config::{LevelDescriptor, PhysicsConfig, ShockwaveConfig},
    effects::{EffectTimers, Shockwave},
    error::{SimError, SimResult},
    geometry::{self, Point},
    network::Network,
    packet::{Owner, Packet, PacketKind},
    types::{ConnectionId, NodeId, PacketId, VirtualTime},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelOutcome {
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u32,
    pub quota: u32,
    pub max_loss: u32,
    /// Packets emitted by the origin node, of any kind. Derived packets
    /// are not included.
    pub emitted: u32,
    pub emitted_by_kind: BTreeMap<PacketKind, u32>,
    pub delivered: u32,
    pub lost: u32,
    pub timed_out: u32,
    pub outcome: LevelOutcome,
}

impl LevelProgress {
    pub fn new(level: &LevelDescriptor) -> Self {
        Self {
            level: level.number,
            quota: level.packet_quota,
            max_loss: level.max_packet_loss,
            emitted: 0,
            emitted_by_kind: BTreeMap::new(),
            delivered: 0,
            lost: 0,
            timed_out: 0,
            outcome: LevelOutcome::InProgress,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome != LevelOutcome::InProgress
    }

    /// Emitted squares and triangles; the only kinds the quota counts.
    pub fn counted(&self) -> u32 {
        self.emitted_by_kind
            .iter()
            .filter(|(kind, _)| kind.is_counted())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn quota_reached(&self) -> bool {
        self.counted() >= self.quota
    }

    /// Failure rule: more than half the quota lost.
    pub fn loss_exceeded(&self) -> bool {
        self.lost * 2 > self.quota
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Purse {
    pub coins: u64,
}

impl Purse {
    pub fn credit(&mut self, coins: u32) {
        self.coins += u64::from(coins);
    }

    pub fn debit(&mut self, cost: u64) -> SimResult<()> {
        if cost > self.coins {
            return Err(SimError::InsufficientCoins { needed: cost, available: self.coins });
        }
        self.coins -= cost;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    pub network: Network,
    packets: BTreeMap<PacketId, Packet>,
    occupancy: BTreeMap<ConnectionId, PacketId>,
    next_packet: u64,
    pub effects: EffectTimers,
    pub shockwaves: Vec<Shockwave>,
    spent_shockwaves: Vec<Shockwave>,
    pub progress: LevelProgress,
    pub purse: Purse,
}

impl World {
    pub fn from_level(level: &LevelDescriptor, physics: &PhysicsConfig) -> Self {
        Self {
            network: Network::from_level(level, &physics.geometry),
            packets: BTreeMap::new(),
            occupancy: BTreeMap::new(),
            next_packet: 0,
            effects: EffectTimers::default(),
            shockwaves: Vec::new(),
            spent_shockwaves: Vec::new(),
            progress: LevelProgress::new(level),
            purse: Purse { coins: level.starting_coins },
        }
    }

    // ── Packets ────────────────────────────────────────────────

    pub fn packet(&self, id: PacketId) -> Option<&Packet> {
        self.packets.get(&id)
    }

    pub fn packet_mut(&mut self, id: PacketId) -> Option<&mut Packet> {
        self.packets.get_mut(&id)
    }

    pub fn packets(&self) -> impl Iterator<Item = &Packet> {
        self.packets.values()
    }

    pub fn packets_mut(&mut self) -> impl Iterator<Item = &mut Packet> {
        self.packets.values_mut()
    }

    /// Snapshot of live ids in ascending order. Scans iterate this and
    /// skip ids that disappear mid-scan.
    pub fn packet_ids(&self) -> Vec<PacketId> {
        self.packets.keys().copied().collect()
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    pub fn occupant(&self, connection: ConnectionId) -> Option<PacketId> {
        self.occupancy.get(&connection).copied()
    }

    pub fn is_idle(&self, connection: ConnectionId) -> bool {
        !self.occupancy.contains_key(&connection)
    }

    /// Exists, not destroyed, and carrying nothing.
    pub fn is_free(&self, connection: ConnectionId) -> bool {
        self.is_idle(connection)
            && self
                .network
                .connection(connection)
                .is_some_and(|c| !c.destroyed)
    }

    /// First free wire leaving `node`.
    pub fn first_free_outgoing(&self, node: &NodeId) -> Option<ConnectionId> {
        self.network
            .outgoing(node)
            .into_iter()
            .find(|c| self.is_free(*c))
    }

    /// Place a fresh packet at the start of a free connection.
    pub fn spawn(
        &mut self,
        connection: ConnectionId,
        kind: PacketKind,
        owner: Owner,
        now: VirtualTime,
        base_speed: f64,
    ) -> Option<PacketId> {
        if !self.is_free(connection) {
            return None;
        }
        let id = PacketId(self.next_packet);
        self.next_packet += 1;
        let packet = Packet::new(id, connection, kind, owner, now, base_speed);
        self.occupancy.insert(connection, id);
        self.packets.insert(id, packet);
        Some(id)
    }

    /// Remove a packet and release its connection.
    pub fn remove_packet(&mut self, id: PacketId) -> Option<Packet> {
        let packet = self.packets.remove(&id)?;
        if self.occupancy.get(&packet.connection) == Some(&id) {
            self.occupancy.remove(&packet.connection);
        }
        Some(packet)
    }

    /// Move a packet to the start of another connection. Fails if the
    /// target is already carrying something.
    pub fn transfer(&mut self, id: PacketId, to: ConnectionId) -> bool {
        if !self.is_idle(to) {
            return false;
        }
        let Some(packet) = self.packets.get_mut(&id) else {
            return false;
        };
        if self.occupancy.get(&packet.connection) == Some(&id) {
            self.occupancy.remove(&packet.connection);
        }
        packet.enter(to);
        self.occupancy.insert(to, id);
        true
    }

    /// Drop everything in flight and release every connection at once.
    pub fn clear_in_flight(&mut self) {
        self.packets.clear();
        self.occupancy.clear();
        self.shockwaves.clear();
        self.spent_shockwaves.clear();
    }

    // ── Positions ──────────────────────────────────────────────

    /// Interpolated point along the detailed path, plus displacement.
    pub fn position(&self, packet: &Packet) -> Point {
        let path = self.network.detailed_path(packet.connection);
        geometry::point_on_polyline(&path, packet.segment, packet.progress).add(packet.displacement)
    }

    pub fn position_of(&self, id: PacketId) -> Option<Point> {
        self.packet(id).map(|p| self.position(p))
    }

    /// Every packet with its connection and position, ascending by id.
    pub fn positions(&self) -> Vec<(PacketId, ConnectionId, Point)> {
        self.packets
            .values()
            .map(|p| (p.id, p.connection, self.position(p)))
            .collect()
    }

    // ── Shockwaves ─────────────────────────────────────────────

    pub fn spawn_shockwave(&mut self, center: Point, now: VirtualTime) {
        self.shockwaves.push(Shockwave::new(center, now));
    }

    /// Forward tick: retire waves past their lifespan.
    pub fn retire_shockwaves(&mut self, now: VirtualTime, config: &ShockwaveConfig) {
        let (spent, live): (Vec<_>, Vec<_>) = self
            .shockwaves
            .drain(..)
            .partition(|w| now >= w.started_at + config.lifespan_ms);
        self.shockwaves = live;
        self.spent_shockwaves.extend(spent);
    }

    /// Backward tick: revive retired waves that are live again and forget
    /// waves that have not started yet.
    pub fn rewind_shockwaves(&mut self, now: VirtualTime, config: &ShockwaveConfig) {
        let (revived, spent): (Vec<_>, Vec<_>) = self
            .spent_shockwaves
            .drain(..)
            .partition(|w| w.is_active(now, config));
        self.spent_shockwaves = spent;
        self.shockwaves.extend(revived);
        self.shockwaves.retain(|w| w.started_at <= now);
    }
}
