//! Per-account bookkeeping.

use prekeyward_proto::{DiscoveredServer, domain_of};

use crate::{
    cache::PrekeyClientCache,
    config::ClientConfig,
    engine::{Publication, PublicationPlan},
    event::AccountSnapshot,
};

/// Where an account's publication stands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) enum PublishState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// A publication is being resolved, built or awaiting the server's
    /// verdict.
    Publishing {
        /// What the publication carries.
        plan: PublicationPlan,
        /// Expiries of the profiles actually sent, once built.
        sent: Option<SentProfiles>,
    },
}

/// Profile expiries carried by a built publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SentProfiles {
    client_profile_expires_at: Option<u64>,
    prekey_profile_expires_at: Option<u64>,
}

impl From<&Publication> for SentProfiles {
    fn from(publication: &Publication) -> Self {
        Self {
            client_profile_expires_at: publication.client_profile_expires_at,
            prekey_profile_expires_at: publication.prekey_profile_expires_at,
        }
    }
}

/// State for one local account.
///
/// Persisted fields survive disconnects; lookups and the publish state do
/// not.
#[derive(Debug, Default)]
pub(crate) struct AccountState {
    pub(crate) connected: bool,
    pub(crate) cache: PrekeyClientCache,
    pub(crate) publishing: PublishState,
    pub(crate) prekey_supply_low: bool,
    pub(crate) stored_prekeys: u32,
    pub(crate) client_profile_expires_at: Option<u64>,
    pub(crate) prekey_profile_expires_at: Option<u64>,
}

impl AccountState {
    /// Disconnected state seeded from a snapshot.
    pub(crate) fn restored(snapshot: AccountSnapshot) -> Self {
        Self {
            connected: false,
            cache: PrekeyClientCache::with_servers(snapshot.servers),
            publishing: PublishState::Idle,
            prekey_supply_low: false,
            stored_prekeys: snapshot.stored_prekeys,
            client_profile_expires_at: snapshot.client_profile_expires_at,
            prekey_profile_expires_at: snapshot.prekey_profile_expires_at,
        }
    }

    /// Replace the persisted fields, keeping connection-scoped state.
    pub(crate) fn reload(&mut self, snapshot: AccountSnapshot) {
        for (domain, server) in snapshot.servers {
            self.cache.insert(domain, server);
        }
        self.stored_prekeys = snapshot.stored_prekeys;
        self.client_profile_expires_at = snapshot.client_profile_expires_at;
        self.prekey_profile_expires_at = snapshot.prekey_profile_expires_at;
    }

    pub(crate) fn snapshot(&self, account: &str) -> AccountSnapshot {
        AccountSnapshot {
            account: account.to_string(),
            servers: self.cache.servers().clone(),
            stored_prekeys: self.stored_prekeys,
            client_profile_expires_at: self.client_profile_expires_at,
            prekey_profile_expires_at: self.prekey_profile_expires_at,
        }
    }

    /// The server for the account's own domain, if known.
    pub(crate) fn own_server(&self, account: &str) -> Option<&DiscoveredServer> {
        self.cache.server(domain_of(account))
    }

    pub(crate) fn is_publishing(&self) -> bool {
        matches!(self.publishing, PublishState::Publishing { .. })
    }

    /// What should be published at wall-clock time `now` (Unix seconds).
    ///
    /// A client profile is republished once it expires within the
    /// configured margin, a prekey profile once it has expired. A fresh
    /// batch of prekey messages goes out when the local count is below the
    /// threshold or the server reported low supply.
    pub(crate) fn plan(&self, config: &ClientConfig, now: u64) -> PublicationPlan {
        let margin = config.profile_expiry_margin.as_secs();
        let client_profile = self
            .client_profile_expires_at
            .is_none_or(|expires| expires <= now.saturating_add(margin));
        let prekey_profile = self.prekey_profile_expires_at.is_none_or(|expires| expires <= now);
        let low = self.stored_prekeys < config.min_stored_prekeys || self.prekey_supply_low;

        PublicationPlan {
            client_profile,
            prekey_profile,
            prekey_messages: if low { config.prekey_batch_size } else { 0 },
        }
    }

    /// The server accepted the publication in flight.
    ///
    /// Returns false when nothing was in flight.
    pub(crate) fn publication_accepted(&mut self) -> bool {
        let PublishState::Publishing { plan, sent } = std::mem::take(&mut self.publishing) else {
            return false;
        };

        if plan.prekey_messages > 0 {
            self.stored_prekeys = self.stored_prekeys.saturating_add(plan.prekey_messages);
            self.prekey_supply_low = false;
        }
        if let Some(sent) = sent {
            if plan.client_profile {
                self.client_profile_expires_at =
                    sent.client_profile_expires_at.or(self.client_profile_expires_at);
            }
            if plan.prekey_profile {
                self.prekey_profile_expires_at =
                    sent.prekey_profile_expires_at.or(self.prekey_profile_expires_at);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const NOW: u64 = 1_700_000_000;
    const DAY: u64 = 24 * 60 * 60;

    fn fresh() -> AccountState {
        AccountState {
            stored_prekeys: 50,
            client_profile_expires_at: Some(NOW + 7 * DAY),
            prekey_profile_expires_at: Some(NOW + DAY),
            ..AccountState::default()
        }
    }

    #[test]
    fn fresh_account_needs_nothing() {
        assert!(fresh().plan(&ClientConfig::default(), NOW).is_empty());
    }

    #[test]
    fn unknown_expiries_publish_both_profiles() {
        let state = AccountState { stored_prekeys: 50, ..AccountState::default() };
        let plan = state.plan(&ClientConfig::default(), NOW);

        assert!(plan.client_profile);
        assert!(plan.prekey_profile);
        assert_eq!(plan.prekey_messages, 0);
    }

    #[test]
    fn client_profile_republished_inside_margin() {
        let state = AccountState { client_profile_expires_at: Some(NOW + DAY), ..fresh() };
        assert!(state.plan(&ClientConfig::default(), NOW).client_profile);

        let config = ClientConfig {
            profile_expiry_margin: Duration::from_secs(60),
            ..ClientConfig::default()
        };
        assert!(!state.plan(&config, NOW).client_profile);
    }

    #[test]
    fn prekey_profile_republished_only_when_expired() {
        let state = AccountState { prekey_profile_expires_at: Some(NOW), ..fresh() };
        assert!(state.plan(&ClientConfig::default(), NOW).prekey_profile);
        assert!(!state.plan(&ClientConfig::default(), NOW - 1).prekey_profile);
    }

    #[test]
    fn low_supply_requests_a_batch() {
        let config = ClientConfig::default();

        let below = AccountState { stored_prekeys: 19, ..fresh() };
        assert_eq!(below.plan(&config, NOW).prekey_messages, 100);

        let reported = AccountState { prekey_supply_low: true, ..fresh() };
        assert_eq!(reported.plan(&config, NOW).prekey_messages, 100);
    }

    #[test]
    fn acceptance_applies_what_was_sent() {
        let mut state = AccountState { stored_prekeys: 3, prekey_supply_low: true, ..fresh() };
        state.publishing = PublishState::Publishing {
            plan: PublicationPlan {
                client_profile: true,
                prekey_profile: false,
                prekey_messages: 100,
            },
            sent: Some(SentProfiles {
                client_profile_expires_at: Some(NOW + 30 * DAY),
                prekey_profile_expires_at: None,
            }),
        };

        assert!(state.publication_accepted());
        assert_eq!(state.publishing, PublishState::Idle);
        assert_eq!(state.stored_prekeys, 103);
        assert!(!state.prekey_supply_low);
        assert_eq!(state.client_profile_expires_at, Some(NOW + 30 * DAY));
        assert_eq!(state.prekey_profile_expires_at, Some(NOW + DAY));
    }

    #[test]
    fn acceptance_without_publication_is_ignored() {
        let mut state = fresh();
        assert!(!state.publication_accepted());
        assert_eq!(state.stored_prekeys, 50);
    }
}
