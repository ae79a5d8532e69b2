//! Fake cryptographic engine speaking the simulated sub-protocol.

use std::time::Duration;

use prekeyward_client::{
    EngineError, PrekeyEngine, Publication, PublicationPlan, Received, ServerReply,
};
use prekeyward_proto::DiscoveredServer;

use crate::wire::{SimEnsemble, WireMessage};

/// Lifetime given to freshly signed client profiles.
pub const CLIENT_PROFILE_LIFETIME: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Lifetime given to freshly signed prekey profiles.
pub const PREKEY_PROFILE_LIFETIME: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Engine that signs nothing and encrypts nothing, but keeps score.
#[derive(Debug, Default)]
pub struct SimEngine {
    unix_now: u64,
    publications: Vec<PublicationPlan>,
    sessions: Vec<(String, u32)>,
    fail_publications: bool,
}

impl SimEngine {
    /// Engine stamping profile expiries relative to `unix_now`.
    pub fn new(unix_now: u64) -> Self {
        Self { unix_now, ..Self::default() }
    }

    /// Update the wall clock used for profile expiries.
    pub fn set_unix_time(&mut self, unix_now: u64) {
        self.unix_now = unix_now;
    }

    /// Make every following publication fail to build.
    pub fn fail_publications(&mut self, fail: bool) {
        self.fail_publications = fail;
    }

    /// Plans of every publication built so far.
    pub fn publications(&self) -> &[PublicationPlan] {
        &self.publications
    }

    /// `(recipient, device)` for every session established so far.
    pub fn sessions(&self) -> &[(String, u32)] {
        &self.sessions
    }
}

/// Text of the authentication message for `device`.
pub fn auth_message(device: u32) -> String {
    format!("?PKW-AUTH:{device}")
}

/// Text of `plaintext` encrypted for `device`.
pub fn data_message(device: u32, plaintext: &str) -> String {
    format!("?PKW-DATA:{device}:{plaintext}")
}

impl PrekeyEngine for SimEngine {
    type Ensemble = SimEnsemble;

    fn storage_status_request(
        &mut self,
        _account: &str,
        _server: &DiscoveredServer,
    ) -> Result<String, EngineError> {
        Ok(WireMessage::StatusRequest.encode())
    }

    fn publication(
        &mut self,
        _account: &str,
        _server: &DiscoveredServer,
        plan: &PublicationPlan,
    ) -> Result<Publication, EngineError> {
        if self.fail_publications {
            return Err(EngineError::new("long-term key unavailable"));
        }
        self.publications.push(*plan);

        let message = WireMessage::Publish {
            client_profile: plan.client_profile,
            prekey_profile: plan.prekey_profile,
            prekey_messages: plan.prekey_messages,
        };
        Ok(Publication {
            message: message.encode(),
            client_profile_expires_at: plan
                .client_profile
                .then_some(self.unix_now + CLIENT_PROFILE_LIFETIME.as_secs()),
            prekey_profile_expires_at: plan
                .prekey_profile
                .then_some(self.unix_now + PREKEY_PROFILE_LIFETIME.as_secs()),
        })
    }

    fn ensemble_request(
        &mut self,
        _account: &str,
        _server: &DiscoveredServer,
        recipient: &str,
    ) -> Result<String, EngineError> {
        let recipient = prekeyward_proto::bare_address(recipient).to_string();
        Ok(WireMessage::EnsembleRequest { recipient }.encode())
    }

    fn receive(
        &mut self,
        _account: &str,
        _from: &str,
        message: &str,
    ) -> Option<Received<Self::Ensemble>> {
        let reply = match WireMessage::parse(message)? {
            WireMessage::Stored(stored) => ServerReply::StorageStatus { stored },
            WireMessage::Success => ServerReply::Success,
            WireMessage::Failure => ServerReply::Failure,
            WireMessage::Error(code) => ServerReply::Error { code },
            WireMessage::Ensembles { recipient, ensembles } => {
                ServerReply::Ensembles { recipient, ensembles }
            },
            WireMessage::Empty { recipient } => ServerReply::NoPrekeyInStorage { recipient },
            // Client-to-server messages echoed back are consumed silently.
            WireMessage::StatusRequest
            | WireMessage::Publish { .. }
            | WireMessage::EnsembleRequest { .. } => {
                return Some(Received { reply: None, response: None });
            },
        };
        Some(Received { reply: Some(reply), response: None })
    }

    fn validate_ensemble(&self, ensemble: &Self::Ensemble) -> bool {
        ensemble.valid
    }

    fn non_interactive_auth(
        &mut self,
        _account: &str,
        recipient: &str,
        ensemble: &Self::Ensemble,
    ) -> Result<String, EngineError> {
        self.sessions.push((recipient.to_string(), ensemble.device));
        Ok(auth_message(ensemble.device))
    }

    fn encrypt(
        &mut self,
        _account: &str,
        recipient: &str,
        plaintext: &str,
    ) -> Result<String, EngineError> {
        let (_, device) = self
            .sessions
            .iter()
            .rev()
            .find(|(peer, _)| peer == recipient)
            .ok_or_else(|| EngineError::new(format!("no session with {recipient}")))?;
        Ok(data_message(*device, plaintext))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use prekeyward_proto::Fingerprint;

    use super::*;

    fn server() -> DiscoveredServer {
        DiscoveredServer {
            identity: "prekeys.example.org".into(),
            fingerprint: Fingerprint::new([1; 56]),
        }
    }

    #[test]
    fn publication_stamps_expiries_for_included_profiles() {
        let mut engine = SimEngine::new(1_000);
        let plan =
            PublicationPlan { client_profile: true, prekey_profile: false, prekey_messages: 5 };

        let publication = engine.publication("alice", &server(), &plan).unwrap();

        assert_eq!(publication.client_profile_expires_at, Some(1_000 + 14 * 24 * 60 * 60));
        assert_eq!(publication.prekey_profile_expires_at, None);
        assert_eq!(engine.publications(), &[plan]);
    }

    #[test]
    fn encrypt_uses_latest_session() {
        let mut engine = SimEngine::default();
        assert!(engine.encrypt("alice", "bob", "hi").is_err());

        let ensemble = SimEnsemble { device: 4, valid: true };
        engine.non_interactive_auth("alice", "bob", &ensemble).unwrap();
        assert_eq!(engine.encrypt("alice", "bob", "hi").unwrap(), "?PKW-DATA:4:hi");
    }

    #[test]
    fn chat_is_left_alone() {
        let mut engine = SimEngine::default();
        assert!(engine.receive("alice", "prekeys.example.org", "hello").is_none());
    }
}
