//! Prekey client cache.
//!
//! Per account, remembers which prekey server serves which domain and parks
//! work that needs a server while discovery for its domain is running. The
//! first server reported for a domain wins; later reports for the same domain
//! only bump the lookup's found count.

use std::collections::{BTreeMap, HashMap};

use prekeyward_core::SearchId;
use prekeyward_proto::DiscoveredServer;

/// Work that needs a domain's prekey server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Deferred {
    /// Ask the server how many of our prekey messages it holds.
    RequestStorageStatus,
    /// Build and send the publication reserved in the account state.
    Publish,
    /// Ask the server for a recipient's ensembles, then park `message`
    /// until they arrive.
    RetrieveEnsembles {
        /// Recipient address as given by the host.
        recipient: String,
        /// Plaintext to deliver.
        message: String,
    },
}

/// A discovery lookup in progress for one domain.
#[derive(Debug)]
struct Lookup {
    search: SearchId,
    found: u32,
    deferred: Vec<Deferred>,
}

/// Outcome of asking the cache for a domain's server.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// Server known; run the work now.
    Ready(DiscoveredServer, Deferred),
    /// Work parked on an existing lookup.
    Queued,
    /// No server and no lookup; the caller must start discovery and call
    /// [`PrekeyClientCache::begin`] with the work.
    Unknown(Deferred),
}

/// Servers and lookups of one account.
#[derive(Debug, Default)]
pub(crate) struct PrekeyClientCache {
    servers: BTreeMap<String, DiscoveredServer>,
    lookups: HashMap<String, Lookup>,
}

impl PrekeyClientCache {
    /// Cache pre-populated from persisted servers.
    pub(crate) fn with_servers(servers: BTreeMap<String, DiscoveredServer>) -> Self {
        Self { servers, lookups: HashMap::new() }
    }

    pub(crate) fn servers(&self) -> &BTreeMap<String, DiscoveredServer> {
        &self.servers
    }

    pub(crate) fn server(&self, domain: &str) -> Option<&DiscoveredServer> {
        self.servers.get(domain)
    }

    /// Cache `server` for `domain`, replacing any previous entry.
    pub(crate) fn insert(&mut self, domain: String, server: DiscoveredServer) {
        self.servers.insert(domain, server);
    }

    /// Whether `address` is one of the servers we know.
    pub(crate) fn is_server(&self, address: &str) -> bool {
        self.servers.values().any(|server| server.identity == address)
    }

    /// Resolve `domain`, parking `deferred` if a lookup is already running.
    pub(crate) fn resolve(&mut self, domain: &str, deferred: Deferred) -> Resolution {
        if let Some(server) = self.servers.get(domain) {
            return Resolution::Ready(server.clone(), deferred);
        }

        match self.lookups.get_mut(domain) {
            Some(lookup) => {
                lookup.deferred.push(deferred);
                Resolution::Queued
            },
            None => Resolution::Unknown(deferred),
        }
    }

    /// Record a freshly started lookup for `domain` with its first parked
    /// work item.
    pub(crate) fn begin(&mut self, domain: &str, search: SearchId, deferred: Deferred) {
        self.lookups
            .insert(domain.to_string(), Lookup { search, found: 0, deferred: vec![deferred] });
    }

    /// A search reported `server` for `domain`.
    ///
    /// The first report caches the server and returns the parked work.
    /// Duplicates return `None`.
    pub(crate) fn found(
        &mut self,
        domain: &str,
        search: SearchId,
        server: DiscoveredServer,
    ) -> Option<Vec<Deferred>> {
        let lookup = self.lookups.get_mut(domain).filter(|lookup| lookup.search == search)?;
        lookup.found += 1;
        if lookup.found > 1 {
            return None;
        }

        let deferred = std::mem::take(&mut lookup.deferred);
        self.servers.insert(domain.to_string(), server);
        Some(deferred)
    }

    /// A search ran dry. Returns work that must be abandoned because nothing
    /// was found.
    pub(crate) fn finished(&mut self, domain: &str, search: SearchId) -> Vec<Deferred> {
        match self.lookups.get(domain) {
            Some(lookup) if lookup.search == search => {},
            _ => return Vec::new(),
        }

        self.lookups.remove(domain).map(|lookup| lookup.deferred).unwrap_or_default()
    }

    /// Drop every lookup, returning all parked work.
    pub(crate) fn abandon_lookups(&mut self) -> Vec<Deferred> {
        self.lookups.drain().flat_map(|(_, lookup)| lookup.deferred).collect()
    }
}
