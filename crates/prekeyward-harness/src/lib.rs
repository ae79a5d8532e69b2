//! Deterministic simulation harness for prekeyward testing.
//!
//! Everything here is sans-IO: a virtual clock with a seeded RNG
//! ([`SimEnv`]), a fake cryptographic engine ([`SimEngine`]) speaking a
//! plain-text stand-in for the prekey sub-protocol, a discovery directory
//! ([`SimDirectory`]) and prekey servers ([`SimPrekeyServer`]), joined by
//! [`World`].
//!
//! # Model-Based Testing
//!
//! The `model` module provides randomly generated operations. They are
//! applied to a [`World`] whose invariants are checked after every step.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod sim_directory;
pub mod sim_engine;
pub mod sim_env;
pub mod sim_server;
pub mod wire;
pub mod world;

pub use model::Operation;
pub use sim_directory::SimDirectory;
pub use sim_engine::SimEngine;
pub use sim_env::{SimEnv, SimInstant};
pub use sim_server::SimPrekeyServer;
pub use wire::{SimEnsemble, WireMessage};
pub use world::{Delivered, STANDARD_SERVER, World};
