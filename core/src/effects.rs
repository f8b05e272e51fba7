//! Timed effects and shockwaves.
//!
//! An effect is an activation window `[started_at, started_at + duration)`
//! on the virtual clock, so whether it is active is a pure function of
//! time. Windows that end are moved to an expiry history on forward ticks
//! and brought back on backward ticks, which makes rewind exact.

use crate::{
    config::{EffectConfig, ShockwaveConfig},
    geometry::Point,
    types::{ConnectionId, VirtualTime},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Effects that apply to the whole network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalEffect {
    NoiseImmunity,
    CollisionImmunity,
    SpeedBooster,
    SpeedLimiter,
    WireOptimizer,
}

impl GlobalEffect {
    pub fn duration(self, config: &EffectConfig) -> i64 {
        match self {
            Self::NoiseImmunity => config.noise_immunity_ms,
            Self::CollisionImmunity => config.collision_immunity_ms,
            Self::SpeedBooster => config.speed_booster_ms,
            Self::SpeedLimiter => config.speed_limiter_ms,
            Self::WireOptimizer => config.wire_optimizer_ms,
        }
    }
}

/// Effects bound to a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireEffect {
    Freeze,
    Restore,
}

impl WireEffect {
    pub fn duration(self, config: &EffectConfig) -> i64 {
        match self {
            Self::Freeze => config.freeze_ms,
            Self::Restore => config.restore_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum EffectSlot {
    Global { effect: GlobalEffect },
    Wire { effect: WireEffect, connection: ConnectionId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectWindow {
    pub started_at: VirtualTime,
    pub duration: i64,
}

impl EffectWindow {
    pub fn ends_at(&self) -> VirtualTime {
        self.started_at + self.duration
    }

    pub fn is_active(&self, now: VirtualTime) -> bool {
        self.started_at <= now && now < self.ends_at()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ExpiredWindow {
    slot: EffectSlot,
    window: EffectWindow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectTimers {
    global: BTreeMap<GlobalEffect, EffectWindow>,
    freeze: BTreeMap<ConnectionId, EffectWindow>,
    restore: BTreeMap<ConnectionId, EffectWindow>,
    expired: Vec<ExpiredWindow>,
}

impl EffectTimers {
    pub fn activate(&mut self, slot: EffectSlot, now: VirtualTime, duration: i64) {
        let window = EffectWindow { started_at: now, duration };
        match slot {
            EffectSlot::Global { effect } => {
                self.global.insert(effect, window);
            }
            EffectSlot::Wire { effect, connection } => {
                self.wire_map_mut(effect).insert(connection, window);
            }
        }
    }

    pub fn is_active(&self, effect: GlobalEffect, now: VirtualTime) -> bool {
        self.global.get(&effect).is_some_and(|w| w.is_active(now))
    }

    pub fn is_wire_active(&self, effect: WireEffect, connection: ConnectionId, now: VirtualTime) -> bool {
        self.wire_map(effect)
            .get(&connection)
            .is_some_and(|w| w.is_active(now))
    }

    pub fn window(&self, slot: EffectSlot) -> Option<EffectWindow> {
        match slot {
            EffectSlot::Global { effect } => self.global.get(&effect).copied(),
            EffectSlot::Wire { effect, connection } => self.wire_map(effect).get(&connection).copied(),
        }
    }

    /// Forward tick: move every window that has ended into the history.
    pub fn expire(&mut self, now: VirtualTime) -> Vec<EffectSlot> {
        let mut ended = Vec::new();
        for (effect, window) in &self.global {
            if now >= window.ends_at() {
                ended.push((EffectSlot::Global { effect: *effect }, *window));
            }
        }
        for effect in [WireEffect::Freeze, WireEffect::Restore] {
            for (connection, window) in self.wire_map(effect) {
                if now >= window.ends_at() {
                    ended.push((EffectSlot::Wire { effect, connection: *connection }, *window));
                }
            }
        }

        for (slot, window) in &ended {
            self.remove(*slot);
            self.expired.push(ExpiredWindow { slot: *slot, window: *window });
        }
        ended.into_iter().map(|(slot, _)| slot).collect()
    }

    /// Backward tick: bring back windows whose end now lies in the future.
    /// A slot that was re-activated since keeps its newer window.
    pub fn restore(&mut self, now: VirtualTime) -> Vec<EffectSlot> {
        let mut restored = Vec::new();
        while let Some(last) = self.expired.last() {
            if last.window.ends_at() <= now {
                break;
            }
            let ExpiredWindow { slot, window } = last.clone();
            self.expired.pop();
            if self.window(slot).is_none() {
                self.activate(slot, window.started_at, window.duration);
                restored.push(slot);
            }
        }
        restored
    }

    /// Drop every window bound to a removed connection.
    pub fn forget_connection(&mut self, connection: ConnectionId) {
        self.freeze.remove(&connection);
        self.restore.remove(&connection);
        self.expired.retain(|e| {
            !matches!(e.slot, EffectSlot::Wire { connection: c, .. } if c == connection)
        });
    }

    fn remove(&mut self, slot: EffectSlot) {
        match slot {
            EffectSlot::Global { effect } => {
                self.global.remove(&effect);
            }
            EffectSlot::Wire { effect, connection } => {
                self.wire_map_mut(effect).remove(&connection);
            }
        }
    }

    fn wire_map(&self, effect: WireEffect) -> &BTreeMap<ConnectionId, EffectWindow> {
        match effect {
            WireEffect::Freeze => &self.freeze,
            WireEffect::Restore => &self.restore,
        }
    }

    fn wire_map_mut(&mut self, effect: WireEffect) -> &mut BTreeMap<ConnectionId, EffectWindow> {
        match effect {
            WireEffect::Freeze => &mut self.freeze,
            WireEffect::Restore => &mut self.restore,
        }
    }
}

/// A transient expanding ring that pushes packets outward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shockwave {
    pub center: Point,
    pub started_at: VirtualTime,
}

impl Shockwave {
    pub fn new(center: Point, now: VirtualTime) -> Self {
        Self { center, started_at: now }
    }

    pub fn is_active(&self, now: VirtualTime, config: &ShockwaveConfig) -> bool {
        self.started_at <= now && now < self.started_at + config.lifespan_ms
    }

    /// Radius grows linearly from 0 to `max_radius` over the lifespan.
    pub fn radius(&self, now: VirtualTime, config: &ShockwaveConfig) -> f64 {
        let elapsed = (now - self.started_at).max(0) as f64;
        (elapsed / config.lifespan_ms as f64 * config.max_radius).min(config.max_radius)
    }

    /// Outward push applied to a packet at `at`, bounded in magnitude.
    /// Zero outside the current radius or once the wave has ended.
    pub fn push_at(&self, at: &Point, now: VirtualTime, config: &ShockwaveConfig) -> Point {
        if !self.is_active(now, config) {
            return Point::ORIGIN;
        }
        let distance = self.center.distance(at);
        if distance == 0.0 || distance > self.radius(now, config) {
            return Point::ORIGIN;
        }
        let magnitude = (config.force / (distance * distance + 0.1)).min(config.max_displacement);
        at.sub(self.center).scale(magnitude / distance)
    }
}
