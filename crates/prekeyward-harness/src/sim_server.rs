//! Simulated prekey server.

use std::collections::HashMap;

use prekeyward_proto::bare_address;

use crate::wire::{SimEnsemble, WireMessage};

/// In-memory prekey server.
///
/// Keeps a stored-prekey count per publishing account and a device list per
/// recipient. Every ensemble retrieval consumes one of the recipient's
/// stored prekey messages.
#[derive(Debug)]
pub struct SimPrekeyServer {
    identity: String,
    stored: HashMap<String, u32>,
    devices: HashMap<String, Vec<SimEnsemble>>,
    reject_publications: bool,
    reject_retrievals: bool,
    publications: usize,
}

impl SimPrekeyServer {
    /// Empty server reachable at `identity`.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            stored: HashMap::new(),
            devices: HashMap::new(),
            reject_publications: false,
            reject_retrievals: false,
            publications: 0,
        }
    }

    /// Address the server receives messages at.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Register a device for `recipient`.
    pub fn add_device(&mut self, recipient: &str, device: u32, valid: bool) {
        self.devices
            .entry(bare_address(recipient).to_string())
            .or_default()
            .push(SimEnsemble { device, valid });
    }

    /// Prekey messages stored for `owner`.
    pub fn stored_for(&self, owner: &str) -> u32 {
        self.stored.get(bare_address(owner)).copied().unwrap_or(0)
    }

    /// Set `owner`'s stored prekey messages.
    pub fn set_stored(&mut self, owner: &str, stored: u32) {
        self.stored.insert(bare_address(owner).to_string(), stored);
    }

    /// Remove up to `amount` of `owner`'s stored prekey messages, as other
    /// peers fetching them would.
    pub fn consume(&mut self, owner: &str, amount: u32) {
        if let Some(stored) = self.stored.get_mut(bare_address(owner)) {
            *stored = stored.saturating_sub(amount);
        }
    }

    /// Reject every following publication.
    pub fn reject_publications(&mut self, reject: bool) {
        self.reject_publications = reject;
    }

    /// Answer every following ensemble request with a failure.
    pub fn reject_retrievals(&mut self, reject: bool) {
        self.reject_retrievals = reject;
    }

    /// Publications accepted so far.
    pub fn publications(&self) -> usize {
        self.publications
    }

    /// Handle a message from `from`; returns the replies to send back.
    pub fn handle(&mut self, from: &str, body: &str) -> Vec<String> {
        let owner = bare_address(from).to_string();
        let reply = match WireMessage::parse(body) {
            Some(WireMessage::StatusRequest) => WireMessage::Stored(self.stored_for(&owner)),
            Some(WireMessage::Publish { prekey_messages, .. }) => {
                if self.reject_publications {
                    WireMessage::Failure
                } else {
                    let stored = self.stored.entry(owner).or_default();
                    *stored = stored.saturating_add(prekey_messages);
                    self.publications += 1;
                    WireMessage::Success
                }
            },
            Some(WireMessage::EnsembleRequest { .. }) if self.reject_retrievals => {
                WireMessage::Failure
            },
            Some(WireMessage::EnsembleRequest { recipient }) => self.retrieve(recipient),
            _ => WireMessage::Error(1),
        };

        tracing::trace!(server = %self.identity, from, reply = ?reply, "prekey server replied");
        vec![reply.encode()]
    }

    fn retrieve(&mut self, recipient: String) -> WireMessage {
        let ensembles = self.devices.get(&recipient).cloned().unwrap_or_default();
        if ensembles.is_empty() || self.stored_for(&recipient) == 0 {
            return WireMessage::Empty { recipient };
        }

        self.consume(&recipient, 1);
        WireMessage::Ensembles { recipient, ensembles }
    }
}
