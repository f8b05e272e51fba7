//! Subsystem trait and the per-tick context handed to it.
//!
//! RULE: Every tick phase implements SimSubsystem.
//! The engine calls update() on each registered subsystem
//! in registration order, every tick, in both directions.
//! Execution order is fixed and documented in engine.rs.

use crate::{
    config::PhysicsConfig,
    error::SimResult,
    event::SimEvent,
    rng::SubsystemRng,
    types::{StepDirection, Tick, VirtualTime},
    world::World,
};
use std::any::Any;

/// What a subsystem may see and touch during one tick.
pub struct TickContext<'a> {
    pub tick:      Tick,
    pub now:       VirtualTime,
    pub direction: StepDirection,
    pub world:     &'a mut World,
    pub physics:   &'a PhysicsConfig,
}

impl TickContext<'_> {
    pub fn is_forward(&self) -> bool {
        self.direction == StepDirection::Forward
    }
}

/// The contract every subsystem must fulfill.
pub trait SimSubsystem: Send {
    /// Unique stable name for this subsystem.
    fn name(&self) -> &'static str;

    /// Called once per tick by the engine.
    ///
    /// - `ctx`:       tick number, virtual time, direction and the world
    /// - `events_in`: events emitted by earlier subsystems this tick
    /// - `rng`:       this subsystem's deterministic RNG for this tick
    ///
    /// Returns a vec of new events to add to the tick's event log.
    fn update(
        &mut self,
        ctx: &mut TickContext<'_>,
        events_in: &[SimEvent],
        rng: &mut SubsystemRng,
    ) -> SimResult<Vec<SimEvent>>;

    /// For downcasting in tests and tooling only.
    /// Production sim code never uses this.
    fn as_any(&self) -> &dyn Any;
}
