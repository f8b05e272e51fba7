//! Everything observable that happens during a tick.
//!
//! Subsystems return events; the engine persists every one of them to
//! the event log in emission order.

use crate::{
    effects::EffectSlot,
    error::EditError,
    geometry::Point,
    packet::PacketKind,
    types::{ConnectionId, NodeId, PacketId, RunId, StepDirection, Tick},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnOrigin {
    /// A confidential_6 packet created by a VPN node.
    Vpn,
    /// Counter-packet sent back to the opponent on delivery.
    Feedback,
    Fragment,
    Merged,
    Injected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NoNextConnection,
    NoPreviousConnection,
    Timeout,
    Spy,
    ClearedByBulky,
    ReturnedToOrigin,
    /// A fragment of a split that never produced every bit.
    IncompleteSplit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnReason {
    DamagedNode,
    CircleCollision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    Trojan,
    Protected,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Engine events ──────────────────────────────
    TickStarted {
        tick: Tick,
        direction: StepDirection,
    },
    TickCompleted {
        tick: Tick,
        direction: StepDirection,
    },
    RunInitialized {
        run_id: RunId,
        seed: u64,
    },
    LevelStarted {
        level: u32,
        quota: u32,
    },
    SimulationReset {
        tick: Tick,
    },

    // ── Player command events ──────────────────────
    PlayerCommandReceived {
        tick: Tick,
        command_id: String,
        command_type: String,
    },

    // ── Packet lifecycle ───────────────────────────
    PacketEmitted {
        packet: PacketId,
        kind: PacketKind,
        connection: ConnectionId,
    },
    PacketSpawned {
        packet: PacketId,
        kind: PacketKind,
        connection: ConnectionId,
        origin: SpawnOrigin,
    },
    PacketArrived {
        packet: PacketId,
        node: NodeId,
        coins: u32,
    },
    PacketDelivered {
        packet: PacketId,
        kind: PacketKind,
        coins: u32,
    },
    PacketTeleported {
        packet: PacketId,
        from: NodeId,
        to: NodeId,
    },
    PacketConverted {
        packet: PacketId,
        node: Option<NodeId>,
        kind: PacketKind,
        conversion: Conversion,
    },
    PacketReturning {
        packet: PacketId,
        reason: ReturnReason,
    },
    PacketDropped {
        packet: PacketId,
        reason: DropReason,
    },
    FragmentBuffered {
        packet: PacketId,
        node: NodeId,
        parent: PacketId,
        held: u32,
    },

    // ── Collisions and loss ────────────────────────
    PacketsCollided {
        first: PacketId,
        second: PacketId,
        point: Point,
    },
    PacketLostToNoise {
        packet: PacketId,
        noise: f64,
    },
    LossUpdated {
        lost: u32,
        added: u32,
    },
    ShockwaveSpawned {
        center: Point,
    },

    // ── Network wear and damage ────────────────────
    WireDestroyed {
        connection: ConnectionId,
    },
    PortsRandomized {
        node: NodeId,
        input: Option<(usize, PacketKind)>,
        output: Option<(usize, PacketKind)>,
    },
    NodeDamaged {
        node: NodeId,
        packet: PacketId,
        speed: f64,
    },

    // ── Effects and player actions ─────────────────
    EffectActivated {
        slot: EffectSlot,
        until: i64,
    },
    EffectExpired {
        slot: EffectSlot,
    },
    EffectRestored {
        slot: EffectSlot,
    },
    NoisePurged {
        packets: usize,
    },
    CoinsSpent {
        item: String,
        cost: u64,
        remaining: u64,
    },
    EditApplied {
        description: String,
    },
    EditRejected {
        description: String,
        reason: EditError,
    },

    // ── Level outcome ──────────────────────────────
    LevelSucceeded {
        level: u32,
        emitted: u32,
        delivered: u32,
    },
    LevelFailed {
        level: u32,
        lost: u32,
    },
}

/// A persisted event log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub tick: Tick,
    pub subsystem: String,
    pub event_type: String,
    pub payload: String,
}
