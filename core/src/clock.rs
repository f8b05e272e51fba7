//! Simulation clock: tick counter, reversible virtual time, speed and pause.

use crate::types::{RunId, StepDirection, Tick, VirtualTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub run_id:       RunId,
    pub current_tick: Tick,
    pub now:          VirtualTime,
    pub tick_ms:      i64,
    pub speed:        SimSpeed,
    pub paused:       bool,
}

impl SimClock {
    pub fn new(run_id: RunId, tick_ms: i64) -> Self {
        Self {
            run_id,
            current_tick: 0,
            now: 0,
            tick_ms,
            speed: SimSpeed::Normal,
            paused: true,
        }
    }

    /// Step one tick in `direction`. Returns the new tick number.
    /// Panics if called while paused; callers must check.
    pub fn step(&mut self, direction: StepDirection) -> Tick {
        assert!(!self.paused, "step() called on paused clock");
        match direction {
            StepDirection::Forward => {
                self.current_tick += 1;
                self.now += self.tick_ms;
            }
            StepDirection::Backward => {
                self.current_tick -= 1;
                self.now -= self.tick_ms;
            }
        }
        self.current_tick
    }

    pub fn pause(&mut self)  { self.paused = true;  }
    pub fn resume(&mut self) { self.paused = false; }

    pub fn set_speed(&mut self, speed: SimSpeed) {
        self.speed = speed;
    }

    pub fn ticks_per_frame(&self) -> u32 {
        match self.speed {
            SimSpeed::Normal      => 1,
            SimSpeed::Accelerated => 2,
            SimSpeed::FastForward => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimSpeed {
    Normal,       // 1 tick per animation frame
    Accelerated,  // 2 ticks per frame
    FastForward,  // 4 ticks per frame
}
