//! Snapshot serialization: full simulation state to and from JSON.
//!
//! A snapshot is taken every SNAPSHOT_INTERVAL forward ticks and on
//! demand. It captures everything needed to resume the simulation from
//! that tick without replaying from tick 0. References between entities
//! are plain ids, so the snapshot is ordinary serde data.

use crate::{
    clock::SimClock,
    types::{RunId, Tick},
    world::World,
};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_INTERVAL: Tick = 60; // about one second of play

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub run_id: RunId,
    pub tick:   Tick,
    pub seed:   u64,
    pub clock:  SimClock,
    pub world:  World,
}
