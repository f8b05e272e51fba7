use crate::types::{ConnectionId, NodeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Edit rejected: {0}")]
    EditRejected(#[from] EditError),

    #[error("Connection {0} not found")]
    UnknownConnection(ConnectionId),

    #[error("Connection {0} is already carrying a packet")]
    ConnectionOccupied(ConnectionId),

    #[error("Insufficient coins: need {needed}, have {available}")]
    InsufficientCoins { needed: u64, available: u64 },

    #[error("Level {0} not found")]
    UnknownLevel(u32),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;

/// Why a topology edit was refused. The network is untouched when any
/// of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EditError {
    #[error("Connection already has the maximum number of bend points")]
    BendPointLimit,

    #[error("Wire would pass through node '{node}'")]
    IntersectsNode { node: NodeId },

    #[error("Wire budget exceeded: {total:.1} > {ceiling:.1}")]
    WireBudgetExceeded { total: f64, ceiling: f64 },

    #[error("Input port {port} of node '{node}' is already connected")]
    InputPortTaken { node: NodeId, port: usize },

    #[error("Connection limit reached")]
    ConnectionLimit,

    #[error("A node cannot connect to itself")]
    SelfLoop,

    #[error("Nothing may connect into the origin node")]
    IntoOrigin,

    #[error("Nothing may leave the sink node")]
    OutOfSink,

    #[error("Port index out of range")]
    PortOutOfRange,

    #[error("Bend point index out of range")]
    BendPointOutOfRange,

    #[error("Waypoint index out of range")]
    WaypointOutOfRange,

    #[error("Node '{node}' cannot be moved")]
    NodeLocked { node: NodeId },

    #[error("Node '{node}' not found")]
    UnknownNode { node: NodeId },

    #[error("Connection {connection} not found")]
    UnknownConnection { connection: ConnectionId },
}
