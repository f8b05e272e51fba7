//! Seeded randomness for the tick phases.
//!
//! RULE: no phase may touch an OS or thread-local RNG. Trojan rolls,
//! spy exits and port reshuffles all draw from a `SubsystemRng`.
//!
//! A stream is a pure function of (run seed, phase slot, tick):
//!   - a tick replayed after a rewind draws exactly what it drew before;
//!   - registering a new phase leaves every other phase's draws alone.

use crate::types::Tick;
use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// One phase's random stream for one tick.
pub struct SubsystemRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl SubsystemRng {
    /// Create a subsystem RNG from the master seed, a stable subsystem
    /// index and the tick being simulated.
    pub fn new(master_seed: u64, subsystem_index: u64, tick: Tick) -> Self {
        let derived_seed = master_seed
            ^ subsystem_index.wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ (tick as u64).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Uniform in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// Uniform in [0, n). `n` must be positive.
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "empty range");
        self.inner.next_u64() % n
    }

    /// Uniform index into a slice of length `len`.
    pub fn pick_index(&mut self, len: usize) -> usize {
        self.next_u64_below(len as u64) as usize
    }

    /// True with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// Hands out per-tick streams for every phase of a run.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn for_tick(&self, slot: SubsystemSlot, tick: Tick) -> SubsystemRng {
        SubsystemRng::new(self.master_seed, slot as u64, tick).with_name(slot.name())
    }
}

/// Phase slots. Append only: a slot's number is part of its seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum SubsystemSlot {
    Effects = 0,
    Collision = 1,
    Mechanics = 2,
    Motion = 3,
    Level = 4,
}

impl SubsystemSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Effects => "effects",
            Self::Collision => "collision",
            Self::Mechanics => "mechanics",
            Self::Motion => "motion",
            Self::Level => "level",
        }
    }
}
