//! Simulated service discovery directory.

use std::collections::HashMap;

use prekeyward_proto::{Fingerprint, Identity, Item, QueryKind, Request, Response};

/// Canned discovery answers keyed by address.
///
/// Addresses without an entry answer with an error, like a domain that
/// does not support service discovery.
#[derive(Debug, Default)]
pub struct SimDirectory {
    items: HashMap<String, Vec<Item>>,
    identities: HashMap<String, Vec<Identity>>,
    answered: usize,
}

impl SimDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a prekey server for `domain` at `identity`.
    pub fn add_prekey_server(&mut self, domain: &str, identity: &str, fingerprint: &Fingerprint) {
        self.items.entry(domain.to_string()).or_default().push(Item::at(identity));
        self.identities.insert(identity.to_string(), vec![Identity::prekey_server()]);
        self.items
            .entry(identity.to_string())
            .or_default()
            .push(Item::fingerprint(identity, fingerprint.to_hex()));
    }

    /// Publish some other service for `domain`.
    pub fn add_service(&mut self, domain: &str, address: &str, category: &str, kind: &str) {
        self.items.entry(domain.to_string()).or_default().push(Item::at(address));
        self.identities.insert(address.to_string(), vec![Identity::new(category, kind)]);
    }

    /// Make `domain` answer its item query with an empty list.
    pub fn add_empty_domain(&mut self, domain: &str) {
        self.items.entry(domain.to_string()).or_default();
    }

    /// Number of requests answered.
    pub fn answered(&self) -> usize {
        self.answered
    }

    /// Answer `request`.
    pub fn answer(&mut self, request: &Request) -> Response {
        self.answered += 1;

        let id = request.id.clone();
        let to = request.to.clone();
        match request.kind {
            QueryKind::Items => match self.items.get(&request.to) {
                Some(items) => Response::items(id, to, items.clone()),
                None => Response::error(id, to),
            },
            QueryKind::Info => match self.identities.get(&request.to) {
                Some(identities) => Response::info(id, to, identities.clone()),
                None => Response::error(id, to),
            },
        }
    }
}
