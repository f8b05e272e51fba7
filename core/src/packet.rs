//! Packets and the static packet-kind table.
//!
//! A packet's kind fixes its size, coin value and class. Protected
//! packets derive their size from the kind they were before protection.

use crate::{
    geometry::Point,
    types::{ConnectionId, NodeId, PacketId, VirtualTime},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    Square,
    Triangle,
    Circle,
    Protected,
    #[serde(rename = "confidential_4")]
    Confidential4,
    #[serde(rename = "confidential_6")]
    Confidential6,
    #[serde(rename = "bulky_8")]
    Bulky8,
    #[serde(rename = "bulky_10")]
    Bulky10,
    Bit,
    Trojan,
    Messenger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketClass {
    /// Plain shape packets emitted by the origin.
    Shape,
    Protected,
    Confidential,
    Bulky,
    Bit,
    Overlay,
}

/// Counter-packet family used when picking a feedback kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    First,
    Second,
    Neither,
}

pub struct KindSpec {
    pub size: u32,
    pub coins: u32,
    pub class: PacketClass,
    pub generation: Generation,
    pub counterpart: Option<PacketKind>,
}

// Indexed by `PacketKind as usize`.
const KIND_TABLE: [KindSpec; 11] = [
    KindSpec { size: 2,  coins: 2,  class: PacketClass::Shape,        generation: Generation::First,   counterpart: Some(PacketKind::Confidential4) },
    KindSpec { size: 3,  coins: 3,  class: PacketClass::Shape,        generation: Generation::First,   counterpart: Some(PacketKind::Confidential6) },
    KindSpec { size: 1,  coins: 1,  class: PacketClass::Shape,        generation: Generation::First,   counterpart: Some(PacketKind::Bulky8) },
    KindSpec { size: 2,  coins: 5,  class: PacketClass::Protected,    generation: Generation::First,   counterpart: Some(PacketKind::Bulky10) },
    KindSpec { size: 4,  coins: 3,  class: PacketClass::Confidential, generation: Generation::Second,  counterpart: Some(PacketKind::Square) },
    KindSpec { size: 6,  coins: 4,  class: PacketClass::Confidential, generation: Generation::Second,  counterpart: Some(PacketKind::Triangle) },
    KindSpec { size: 8,  coins: 8,  class: PacketClass::Bulky,        generation: Generation::Second,  counterpart: Some(PacketKind::Circle) },
    KindSpec { size: 10, coins: 10, class: PacketClass::Bulky,        generation: Generation::Second,  counterpart: Some(PacketKind::Protected) },
    KindSpec { size: 1,  coins: 0,  class: PacketClass::Bit,          generation: Generation::Neither, counterpart: None },
    KindSpec { size: 1,  coins: 1,  class: PacketClass::Overlay,      generation: Generation::Neither, counterpart: None },
    KindSpec { size: 1,  coins: 1,  class: PacketClass::Overlay,      generation: Generation::Neither, counterpart: None },
];

impl PacketKind {
    /// Shapes a port may carry when bulky traffic reshuffles it.
    pub const PORT_SHAPES: [PacketKind; 3] =
        [PacketKind::Square, PacketKind::Triangle, PacketKind::Circle];

    pub fn spec(self) -> &'static KindSpec {
        &KIND_TABLE[self as usize]
    }

    pub fn size(self) -> u32 {
        self.spec().size
    }

    pub fn coins(self) -> u32 {
        self.spec().coins
    }

    pub fn class(self) -> PacketClass {
        self.spec().class
    }

    pub fn counterpart(self) -> Option<PacketKind> {
        self.spec().counterpart
    }

    /// Kinds the origin node can emit.
    pub fn is_emittable(self) -> bool {
        self.spec().generation != Generation::Neither
    }

    /// Kinds whose emission counts toward the level quota.
    pub fn is_counted(self) -> bool {
        matches!(self, PacketKind::Square | PacketKind::Triangle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    #[default]
    Player,
    Opponent,
}

impl Owner {
    pub fn opponent(self) -> Owner {
        match self {
            Owner::Player => Owner::Opponent,
            Owner::Opponent => Owner::Player,
        }
    }
}

/// Ties a bit fragment back to the packet it was split from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    pub parent: PacketId,
    pub kind: PacketKind,
    pub original_kind: PacketKind,
    pub size: u32,
    /// Bits actually placed on wires; less than `size` when the splitting
    /// node ran out of free wires.
    pub fragments: u32,
}

impl Lineage {
    pub fn is_complete(&self) -> bool {
        self.fragments >= self.size
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub id: PacketId,
    pub owner: Owner,
    pub kind: PacketKind,
    /// The kind before any protection or trojan swap.
    pub original_kind: PacketKind,
    pub infected: bool,
    /// VPN node that protected this packet, if any.
    pub protector: Option<NodeId>,
    pub lineage: Option<Lineage>,

    // Travel cursor. `progress` is the fraction of `segment` covered.
    pub connection: ConnectionId,
    pub segment: usize,
    pub progress: f64,
    pub returning: bool,

    pub speed: f64,
    /// Multiplier applied after entering a node through mismatched ports.
    pub entry_penalty: f64,
    pub noise: f64,
    pub displacement: Point,
    pub created_at: VirtualTime,
    pub last_moved_at: VirtualTime,
}

impl Packet {
    pub fn new(
        id: PacketId,
        connection: ConnectionId,
        kind: PacketKind,
        owner: Owner,
        now: VirtualTime,
        base_speed: f64,
    ) -> Self {
        Self {
            id,
            owner,
            kind,
            original_kind: kind,
            infected: false,
            protector: None,
            lineage: None,
            connection,
            segment: 0,
            progress: 0.0,
            returning: false,
            speed: base_speed,
            entry_penalty: 1.0,
            noise: 0.0,
            displacement: Point::ORIGIN,
            created_at: now,
            last_moved_at: now,
        }
    }

    pub fn size(&self) -> u32 {
        if self.kind == PacketKind::Protected {
            let base = match self.original_kind {
                PacketKind::Square | PacketKind::Triangle | PacketKind::Circle => {
                    self.original_kind.size()
                }
                _ => 1,
            };
            return base * 2;
        }
        self.kind.size()
    }

    pub fn coin_value(&self) -> u32 {
        self.kind.coins()
    }

    pub fn class(&self) -> PacketClass {
        self.kind.class()
    }

    pub fn is_protected(&self) -> bool {
        self.kind == PacketKind::Protected
    }

    pub fn is_confidential(&self) -> bool {
        self.class() == PacketClass::Confidential
    }

    pub fn is_bulky(&self) -> bool {
        self.class() == PacketClass::Bulky
    }

    pub fn is_bit(&self) -> bool {
        self.kind == PacketKind::Bit
    }

    /// Swap to the counterpart of the original kind and mark infected.
    pub fn infect(&mut self) {
        self.kind = self.original_kind.counterpart().unwrap_or(PacketKind::Trojan);
        self.infected = true;
    }

    pub fn protect(&mut self, vpn: &NodeId) {
        self.kind = PacketKind::Protected;
        self.protector = Some(vpn.clone());
    }

    /// Undo protection and infection.
    pub fn revert(&mut self) {
        self.kind = self.original_kind;
        self.infected = false;
        self.protector = None;
    }

    /// Kind spawned for the opponent when this packet is delivered.
    pub fn feedback_kind(&self) -> Option<PacketKind> {
        match self.original_kind.spec().generation {
            Generation::Neither => None,
            _ => self.original_kind.counterpart(),
        }
    }

    /// Put the packet at the start of another connection.
    pub fn enter(&mut self, connection: ConnectionId) {
        self.connection = connection;
        self.segment = 0;
        self.progress = 0.0;
    }
}
