use crate::{
    config::ShopConfig,
    effects::GlobalEffect,
    geometry::Point,
    packet::{Owner, PacketKind},
    types::{ConnectionId, NodeId, RunId, Tick},
};
use serde::{Deserialize, Serialize};

/// Everything the shop sells that acts on the whole network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopItem {
    NoiseImmunity,
    CollisionImmunity,
    /// Clears all noise at once.
    NoisePurge,
    SpeedBooster,
    SpeedLimiter,
    WireOptimizer,
}

impl ShopItem {
    pub fn price(self, shop: &ShopConfig) -> u64 {
        match self {
            Self::NoiseImmunity => shop.noise_immunity,
            Self::CollisionImmunity => shop.collision_immunity,
            Self::NoisePurge => shop.noise_purge,
            Self::SpeedBooster => shop.speed_booster,
            Self::SpeedLimiter => shop.speed_limiter,
            Self::WireOptimizer => shop.wire_optimizer,
        }
    }

    /// The timed effect the item starts, if it is not instantaneous.
    pub fn effect(self) -> Option<GlobalEffect> {
        match self {
            Self::NoiseImmunity => Some(GlobalEffect::NoiseImmunity),
            Self::CollisionImmunity => Some(GlobalEffect::CollisionImmunity),
            Self::NoisePurge => None,
            Self::SpeedBooster => Some(GlobalEffect::SpeedBooster),
            Self::SpeedLimiter => Some(GlobalEffect::SpeedLimiter),
            Self::WireOptimizer => Some(GlobalEffect::WireOptimizer),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NoiseImmunity => "noise_immunity",
            Self::CollisionImmunity => "collision_immunity",
            Self::NoisePurge => "noise_purge",
            Self::SpeedBooster => "speed_booster",
            Self::SpeedLimiter => "speed_limiter",
            Self::WireOptimizer => "wire_optimizer",
        }
    }
}

/// All player-issued commands.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum PlayerCommand {
    // ── Clock control ─────────────────────────────
    Pause,
    Resume,
    SetSpeed { speed: crate::clock::SimSpeed },

    // ── Shop ──────────────────────────────────────
    Purchase { item: ShopItem },
    FreezeWire { connection: ConnectionId },
    RestoreWire { connection: ConnectionId },

    // ── Direct actions ────────────────────────────
    Shockwave { at: Point },
    Inject {
        connection: ConnectionId,
        kind:       PacketKind,
        #[serde(default)]
        owner:      Owner,
    },

    // ── Topology ──────────────────────────────────
    Edit { edit: TopologyEdit },
}

impl PlayerCommand {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Pause              => "pause",
            Self::Resume             => "resume",
            Self::SetSpeed { .. }    => "set_speed",
            Self::Purchase { .. }    => "purchase",
            Self::FreezeWire { .. }  => "freeze_wire",
            Self::RestoreWire { .. } => "restore_wire",
            Self::Shockwave { .. }   => "shockwave",
            Self::Inject { .. }      => "inject",
            Self::Edit { .. }        => "edit",
        }
    }
}

/// Topology edits. Each one is validated in full before it is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TopologyEdit {
    Connect {
        from:      NodeId,
        from_port: usize,
        to:        NodeId,
        to_port:   usize,
        #[serde(default)]
        replace:   bool,
    },
    Disconnect { connection: ConnectionId },
    AddBendPoint { connection: ConnectionId, at: Point },
    RemoveBendPoint { connection: ConnectionId, index: usize },
    MoveBendPoint { connection: ConnectionId, index: usize, to: Point },
    AddWaypoint { connection: ConnectionId, at: Point },
    MoveWaypoint { connection: ConnectionId, index: usize, to: Point },
    MoveNode { node: NodeId, to: Point },
}

impl TopologyEdit {
    /// True for edits that change which wires exist. Those reset the
    /// simulation.
    pub fn rewires(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Disconnect { .. })
    }
}

/// A queued player command with its submission tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedCommand {
    pub run_id:     RunId,
    pub queued_at:  Tick,
    pub command_id: String,
    pub command:    PlayerCommand,
}
