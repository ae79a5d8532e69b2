//! Seam to the external cryptographic engine.
//!
//! Key exchange, ratcheting, profile signing and the prekey server
//! sub-protocol's message format all live in the engine. The client only
//! decides *when* to ask the engine for something and *where* the result
//! goes. Every outbound engine product is an opaque string carried as an
//! instant message.

use std::fmt;

use prekeyward_proto::DiscoveredServer;

use crate::error::EngineError;

/// What a publication should contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublicationPlan {
    /// Republish the client profile.
    pub client_profile: bool,
    /// Republish the prekey profile.
    pub prekey_profile: bool,
    /// Number of fresh one-time prekey messages to generate.
    pub prekey_messages: u32,
}

impl PublicationPlan {
    /// Whether the plan publishes anything at all.
    pub fn is_empty(&self) -> bool {
        !self.client_profile && !self.prekey_profile && self.prekey_messages == 0
    }
}

/// A publication message built by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    /// Message to send to the prekey server.
    pub message: String,
    /// Expiry (Unix seconds) of the included client profile, if included.
    pub client_profile_expires_at: Option<u64>,
    /// Expiry (Unix seconds) of the included prekey profile, if included.
    pub prekey_profile_expires_at: Option<u64>,
}

/// Decoded message from a prekey server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReply<E> {
    /// Number of our prekey messages the server still holds.
    StorageStatus {
        /// Stored prekey messages.
        stored: u32,
    },
    /// Last publication was accepted.
    Success,
    /// Last request was rejected.
    Failure,
    /// Protocol-level error notification.
    Error {
        /// Engine-specific error code.
        code: i32,
    },
    /// Prekey ensembles for a recipient.
    Ensembles {
        /// Recipient the ensembles belong to.
        recipient: String,
        /// One ensemble per recipient device. Unvalidated.
        ensembles: Vec<E>,
    },
    /// The server holds nothing for a recipient.
    NoPrekeyInStorage {
        /// Recipient that was asked for.
        recipient: String,
    },
}

/// Result of offering an inbound message to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received<E> {
    /// Decoded server reply, if the message completed one.
    pub reply: Option<ServerReply<E>>,
    /// Message the engine wants sent back to the server.
    pub response: Option<String>,
}

/// External cryptographic engine.
///
/// Account arguments are the local account address; server arguments are
/// the discovered server the request is for.
pub trait PrekeyEngine {
    /// One device's prekey material.
    type Ensemble: fmt::Debug;

    /// Build a request for our storage status at `server`.
    fn storage_status_request(
        &mut self,
        account: &str,
        server: &DiscoveredServer,
    ) -> Result<String, EngineError>;

    /// Build a publication following `plan`.
    fn publication(
        &mut self,
        account: &str,
        server: &DiscoveredServer,
        plan: &PublicationPlan,
    ) -> Result<Publication, EngineError>;

    /// Build a request for `recipient`'s prekey ensembles at `server`.
    fn ensemble_request(
        &mut self,
        account: &str,
        server: &DiscoveredServer,
        recipient: &str,
    ) -> Result<String, EngineError>;

    /// Offer an inbound message from a known prekey server.
    ///
    /// Returns `None` when the message is not part of the prekey
    /// sub-protocol; it is then left for the host to display.
    fn receive(
        &mut self,
        account: &str,
        from: &str,
        message: &str,
    ) -> Option<Received<Self::Ensemble>>;

    /// Structural and signature check of an ensemble.
    fn validate_ensemble(&self, ensemble: &Self::Ensemble) -> bool;

    /// Non-interactive authentication message bound to `ensemble`.
    fn non_interactive_auth(
        &mut self,
        account: &str,
        recipient: &str,
        ensemble: &Self::Ensemble,
    ) -> Result<String, EngineError>;

    /// Encrypt `plaintext` under the session the last authentication
    /// established with `recipient`.
    fn encrypt(
        &mut self,
        account: &str,
        recipient: &str,
        plaintext: &str,
    ) -> Result<String, EngineError>;
}
