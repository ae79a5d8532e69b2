//! Prekeyward production runtime.
//!
//! Wires the sans-IO [`prekeyward_client::Client`] to the outside world:
//!
//! ```text
//! prekeyward-runtime
//!   ├─ SystemEnv          (OS clock and entropy)
//!   ├─ Driver             (event loop + timer deadlines)
//!   ├─ Transport          (host connections, e.g. ChannelTransport)
//!   └─ SnapshotStore      (Memory / File, CBOR per account)
//! ```
//!
//! The host keeps a [`DriverHandle`], feeds it account lifecycle, discovery
//! responses and inbound messages, and executes what arrives on its
//! transport.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod store;
mod system_env;
mod transport;

pub use driver::{DEFAULT_EVENT_CAPACITY, Driver, DriverHandle};
pub use error::RuntimeError;
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use system_env::SystemEnv;
pub use transport::{ChannelTransport, Outbound, Transport};
