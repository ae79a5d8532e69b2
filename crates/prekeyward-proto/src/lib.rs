//! Prekeyward wire vocabulary.
//!
//! Types shared by every layer that talks about prekey server discovery:
//!
//! - [`disco`]: request/response stanzas of the three-step discovery chain
//! - [`Fingerprint`]: the 56-byte server fingerprint and its 112-hex encoding
//! - [`domain_of`]: address to domain extraction
//!
//! Nothing in this crate performs I/O.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod address;
pub mod disco;
mod error;
mod fingerprint;

pub use address::{bare_address, domain_of};
pub use disco::{
    DiscoveredServer, Identity, Item, QueryKind, Request, RequestId, Response, ResponseKind,
    ResponsePayload,
};
pub use error::ProtoError;
pub use fingerprint::{FINGERPRINT_HEX_LEN, FINGERPRINT_LEN, Fingerprint};
