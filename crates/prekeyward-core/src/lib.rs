//! Prekeyward core.
//!
//! Sans-IO building blocks for locating prekey servers:
//!
//! - [`env::Environment`]: time, wall clock and randomness, injected so that
//!   every state machine here is deterministic under test
//! - [`Correlator`]: request identifiers and the pending-request table
//! - [`discovery`]: the three-step discovery chain as a pure `advance`
//!   function, and [`Discoverer`] which runs many chains over one correlator
//!
//! Nothing here sends or receives bytes. Callers turn the returned
//! [`prekeyward_proto::Request`]s into network traffic and feed responses
//! back in.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod correlator;
pub mod discovery;
pub mod env;

pub use correlator::{Correlator, Pending, REQUEST_ID_PREFIX};
pub use discovery::{Discoverer, Effect, SearchId, SearchReport, Step};
pub use env::Environment;
