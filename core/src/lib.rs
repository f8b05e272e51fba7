//! wiregrid-core: the simulation core of a packet-routing network game.
//!
//! Packets of several kinds travel along player-drawn wires between
//! systems, are transformed by node behaviours, collide, and can be
//! rewound tick by tick.

pub mod clock;
pub mod collision_subsystem;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod effect_subsystem;
pub mod effects;
pub mod engine;
pub mod error;
pub mod event;
pub mod frame;
pub mod geometry;
pub mod level_subsystem;
pub mod mechanics_subsystem;
pub mod motion_subsystem;
pub mod network;
pub mod packet;
pub mod rng;
pub mod snapshot;
pub mod store;
pub mod subsystem;
pub mod types;
pub mod wire_budget;
pub mod world;
