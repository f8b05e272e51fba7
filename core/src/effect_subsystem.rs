//! Effect subsystem: timed-effect bookkeeping and shockwave physics.
//!
//! Execution: every tick, first. Depends on: nothing.
//!
//! Forward ticks expire windows that have ended, retire spent shockwaves
//! and push packets caught inside a live shockwave. Backward ticks bring
//! back windows and shockwaves that are live again at the earlier time.

use crate::{
    error::SimResult,
    event::SimEvent,
    geometry::Point,
    rng::SubsystemRng,
    subsystem::{SimSubsystem, TickContext},
    types::StepDirection,
};
use std::any::Any;

pub struct EffectSubsystem;

impl EffectSubsystem {
    pub fn new() -> Self {
        Self
    }

    fn forward(&self, ctx: &mut TickContext<'_>, events: &mut Vec<SimEvent>) {
        for slot in ctx.world.effects.expire(ctx.now) {
            log::debug!("tick={} effect {slot:?} expired", ctx.tick);
            events.push(SimEvent::EffectExpired { slot });
        }

        let config = &ctx.physics.shockwave;
        ctx.world.retire_shockwaves(ctx.now, config);
        if ctx.world.shockwaves.is_empty() {
            return;
        }

        let pushes: Vec<_> = ctx
            .world
            .packets()
            .map(|p| {
                let at = ctx.world.position(p);
                let push = ctx
                    .world
                    .shockwaves
                    .iter()
                    .fold(Point::ORIGIN, |acc, w| acc.add(w.push_at(&at, ctx.now, config)));
                (p.id, push)
            })
            .filter(|(_, push)| *push != Point::ORIGIN)
            .collect();

        for (id, push) in pushes {
            if let Some(packet) = ctx.world.packet_mut(id) {
                let moved = packet.displacement.add(push);
                let length = moved.length();
                packet.displacement = if length > config.max_displacement {
                    moved.scale(config.max_displacement / length)
                } else {
                    moved
                };
            }
        }
    }

    fn backward(&self, ctx: &mut TickContext<'_>, events: &mut Vec<SimEvent>) {
        for slot in ctx.world.effects.restore(ctx.now) {
            log::debug!("tick={} effect {slot:?} restored by rewind", ctx.tick);
            events.push(SimEvent::EffectRestored { slot });
        }
        ctx.world.rewind_shockwaves(ctx.now, &ctx.physics.shockwave);
    }
}

impl Default for EffectSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSubsystem for EffectSubsystem {
    fn name(&self) -> &'static str {
        "effects"
    }

    fn update(
        &mut self,
        ctx: &mut TickContext<'_>,
        _events_in: &[SimEvent],
        _rng: &mut SubsystemRng,
    ) -> SimResult<Vec<SimEvent>> {
        let mut events = Vec::new();
        match ctx.direction {
            StepDirection::Forward => self.forward(ctx, &mut events),
            StepDirection::Backward => self.backward(ctx, &mut events),
        }
        Ok(events)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
