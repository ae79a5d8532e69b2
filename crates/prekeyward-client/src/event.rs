//! Events fed into the client and actions it produces.

use std::collections::BTreeMap;

use prekeyward_proto::{DiscoveredServer, Request, Response};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;

/// Local account identifier (the account's own address).
pub type AccountId = String;

/// Events the host feeds into the client.
#[derive(Debug, Clone)]
pub enum ClientEvent<I> {
    /// The host connected an account.
    AccountConnected {
        /// Account that signed on.
        account: AccountId,
    },

    /// The host lost or closed an account's connection.
    AccountDisconnected {
        /// Account that went away.
        account: AccountId,
    },

    /// A discovery response arrived on an account's connection.
    DiscoveryResponse {
        /// Response as parsed by the transport.
        response: Response,
    },

    /// An instant message arrived for an account.
    MessageReceived {
        /// Receiving account.
        account: AccountId,
        /// Sender address.
        from: String,
        /// Message body.
        body: String,
    },

    /// A message is addressed to a recipient that is not reachable now.
    SendOffline {
        /// Sending account.
        account: AccountId,
        /// Recipient address.
        recipient: String,
        /// Plaintext to deliver.
        message: String,
    },

    /// Something suggests the account's published material may be stale.
    TriggerPublish {
        /// Account to check.
        account: AccountId,
    },

    /// Time advanced; fire due timers.
    Tick {
        /// Current time.
        now: I,
    },
}

/// Actions the host must execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Send a discovery request on the account's connection.
    SendRequest {
        /// Connection to use.
        account: AccountId,
        /// Request to send.
        request: Request,
    },

    /// Send an instant message.
    SendMessage {
        /// Sending account.
        account: AccountId,
        /// Destination address.
        to: String,
        /// Message body.
        body: String,
    },

    /// The inbound message was consumed and must not be displayed.
    SuppressMessage {
        /// Receiving account.
        account: AccountId,
        /// Sender of the consumed message.
        from: String,
    },

    /// Persist the account's prekey bookkeeping.
    Persist(AccountSnapshot),
}

/// Persistable per-account state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Account the snapshot belongs to.
    pub account: AccountId,
    /// Known prekey servers keyed by the domain they serve.
    pub servers: BTreeMap<String, DiscoveredServer>,
    /// Prekey messages believed to be stored at our server.
    pub stored_prekeys: u32,
    /// Expiry of our last published client profile (Unix seconds).
    pub client_profile_expires_at: Option<u64>,
    /// Expiry of our last published prekey profile (Unix seconds).
    pub prekey_profile_expires_at: Option<u64>,
}

impl AccountSnapshot {
    /// Encode as CBOR.
    pub fn to_cbor(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| SnapshotError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, SnapshotError> {
        ciborium::from_reader(bytes).map_err(|e| SnapshotError::Decode(e.to_string()))
    }
}
