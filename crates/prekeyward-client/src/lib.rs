//! Prekeyward client
//!
//! Action-based client state machine that keeps an account's prekey material
//! published and delivers messages to offline recipients through their
//! prekey servers.
//!
//! # Architecture
//!
//! The client is a pure state machine that:
//! - Receives events from the caller (account lifecycle, discovery
//!   responses, inbound messages, ticks)
//! - Produces actions for the caller to execute (send requests and
//!   messages, suppress intercepted messages, persist state)
//! - Uses the `Environment` trait for time and randomness (deterministic
//!   testing)
//! - Delegates all cryptography and the prekey sub-protocol's message format
//!   to a [`PrekeyEngine`]
//!
//! # Components
//!
//! - [`Client`]: Top-level state machine managing multiple accounts
//! - [`PublicationScheduler`]: Per-account publication debouncing
//! - [`ClientEvent`]: Events fed into the client
//! - [`ClientAction`]: Actions produced by the client

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod account;
mod cache;
mod client;
mod config;
mod engine;
mod error;
mod event;
mod offline;
mod outstanding;
mod publication;

pub use client::{AccountStatus, Client};
pub use config::{ClientConfig, ConfigError};
pub use engine::{PrekeyEngine, Publication, PublicationPlan, Received, ServerReply};
pub use error::{ClientError, EngineError, SnapshotError};
pub use event::{AccountId, AccountSnapshot, ClientAction, ClientEvent};
pub use prekeyward_core::env::Environment;
pub use publication::PublicationScheduler;
