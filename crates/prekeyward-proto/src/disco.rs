//! Discovery stanzas.
//!
//! Discovery is a request/response exchange over the host's transport. Every
//! request carries a [`RequestId`]; the matching response echoes it. Two query
//! kinds exist: item enumeration (used for steps 1 and 3 of the chain) and
//! capability queries (step 2).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{FINGERPRINT_HEX_LEN, Fingerprint};

/// Identity category advertised by prekey servers.
pub const PREKEY_CATEGORY: &str = "auth";

/// Identity type advertised by prekey servers.
pub const PREKEY_TYPE: &str = "otr-prekey";

/// `node` attribute of the sub-item carrying a server fingerprint.
pub const FINGERPRINT_NODE: &str = "fingerprint";

/// Correlation identifier attached to a request and echoed by its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap an identifier received from the wire.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a discovery request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryKind {
    /// Enumerate the items published at an address.
    Items,
    /// Query the identities/capabilities an address declares.
    Info,
}

impl QueryKind {
    /// XML namespace of the query element for this kind.
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::Items => "http://jabber.org/protocol/disco#items",
            Self::Info => "http://jabber.org/protocol/disco#info",
        }
    }
}

/// Outgoing discovery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation identifier.
    pub id: RequestId,
    /// Address the request is sent to.
    pub to: String,
    /// Query kind.
    pub kind: QueryKind,
}

/// Type of an incoming response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Successful result.
    Result,
    /// Error reply.
    Error,
}

/// One `<item/>` of an item enumeration. Any attribute may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// `jid` attribute.
    pub address: Option<String>,
    /// `node` attribute.
    pub node: Option<String>,
    /// `name` attribute.
    pub name: Option<String>,
}

impl Item {
    /// Item with only an address, as returned when enumerating a domain.
    pub fn at(address: impl Into<String>) -> Self {
        Self { address: Some(address.into()), node: None, name: None }
    }

    /// Fingerprint sub-item published by a prekey server.
    pub fn fingerprint(address: impl Into<String>, hex: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            node: Some(FINGERPRINT_NODE.to_string()),
            name: Some(hex.into()),
        }
    }

    /// Decode the fingerprint this item advertises for `queried`.
    ///
    /// Returns `None` unless the item's address is `queried`, its node is the
    /// fingerprint marker, and its name is exactly 112 valid hex characters.
    pub fn fingerprint_for(&self, queried: &str) -> Option<Fingerprint> {
        if self.address.as_deref() != Some(queried) {
            return None;
        }
        if self.node.as_deref() != Some(FINGERPRINT_NODE) {
            return None;
        }

        let name = self.name.as_deref()?;
        if name.len() != FINGERPRINT_HEX_LEN {
            return None;
        }

        Fingerprint::from_hex(name).ok()
    }
}

/// One `<identity/>` of a capability response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// `category` attribute.
    pub category: Option<String>,
    /// `type` attribute.
    pub kind: Option<String>,
}

impl Identity {
    /// Identity with both attributes set.
    pub fn new(category: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { category: Some(category.into()), kind: Some(kind.into()) }
    }

    /// The identity prekey servers declare.
    pub fn prekey_server() -> Self {
        Self::new(PREKEY_CATEGORY, PREKEY_TYPE)
    }

    /// Whether this identity marks a prekey authentication service.
    pub fn is_prekey_server(&self) -> bool {
        self.category.as_deref() == Some(PREKEY_CATEGORY)
            && self.kind.as_deref() == Some(PREKEY_TYPE)
    }
}

/// Body of a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// No query element.
    #[default]
    Empty,
    /// Item enumeration.
    Items(Vec<Item>),
    /// Capability declaration.
    Info(Vec<Identity>),
}

/// Incoming discovery response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Echoed correlation identifier.
    pub id: RequestId,
    /// Address that answered.
    pub from: String,
    /// Result or error.
    pub kind: ResponseKind,
    /// Query payload, if any.
    pub payload: ResponsePayload,
}

impl Response {
    /// Successful item enumeration.
    pub fn items(id: RequestId, from: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            id,
            from: from.into(),
            kind: ResponseKind::Result,
            payload: ResponsePayload::Items(items),
        }
    }

    /// Successful capability response.
    pub fn info(id: RequestId, from: impl Into<String>, identities: Vec<Identity>) -> Self {
        Self {
            id,
            from: from.into(),
            kind: ResponseKind::Result,
            payload: ResponsePayload::Info(identities),
        }
    }

    /// Error reply.
    pub fn error(id: RequestId, from: impl Into<String>) -> Self {
        Self { id, from: from.into(), kind: ResponseKind::Error, payload: ResponsePayload::Empty }
    }

    /// Items carried by a successful enumeration, otherwise empty.
    pub fn result_items(&self) -> &[Item] {
        match (&self.kind, &self.payload) {
            (ResponseKind::Result, ResponsePayload::Items(items)) => items.as_slice(),
            _ => &[],
        }
    }

    /// Identities carried by a successful capability response, otherwise
    /// empty.
    pub fn result_identities(&self) -> &[Identity] {
        match (&self.kind, &self.payload) {
            (ResponseKind::Result, ResponsePayload::Info(identities)) => identities.as_slice(),
            _ => &[],
        }
    }
}

/// A prekey server found by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredServer {
    /// Endpoint address of the server.
    pub identity: String,
    /// Long-term key fingerprint.
    pub fingerprint: Fingerprint,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex112() -> String {
        "ab".repeat(56)
    }

    #[test]
    fn fingerprint_item_for_matching_address() {
        let item = Item::fingerprint("prekeys.example.org", hex112());
        let fingerprint = item.fingerprint_for("prekeys.example.org");

        assert_eq!(fingerprint, Some(Fingerprint::new([0xab; 56])));
    }

    #[test]
    fn fingerprint_item_for_other_address_is_ignored() {
        let item = Item::fingerprint("evil.example.org", hex112());
        assert_eq!(item.fingerprint_for("prekeys.example.org"), None);
    }

    #[test]
    fn wrong_node_is_ignored() {
        let mut item = Item::fingerprint("p.example.org", hex112());
        item.node = Some("something-else".to_string());
        assert_eq!(item.fingerprint_for("p.example.org"), None);
    }

    #[test]
    fn off_by_one_names_are_ignored() {
        let short = Item::fingerprint("p.example.org", "a".repeat(111));
        let long = Item::fingerprint("p.example.org", "a".repeat(113));

        assert_eq!(short.fingerprint_for("p.example.org"), None);
        assert_eq!(long.fingerprint_for("p.example.org"), None);
    }

    #[test]
    fn missing_attributes_are_ignored() {
        let item = Item { address: Some("p.example.org".to_string()), node: None, name: None };
        assert_eq!(item.fingerprint_for("p.example.org"), None);
    }

    #[test]
    fn identity_matching() {
        assert!(Identity::prekey_server().is_prekey_server());
        assert!(!Identity::new("auth", "generic").is_prekey_server());
        assert!(!Identity::default().is_prekey_server());
    }

    #[test]
    fn error_response_has_no_items() {
        let response = Response::error(RequestId::new("x1"), "example.org");
        assert!(response.result_items().is_empty());
        assert!(response.result_identities().is_empty());
    }

    #[test]
    fn namespaces() {
        assert!(QueryKind::Items.namespace().ends_with("#items"));
        assert!(QueryKind::Info.namespace().ends_with("#info"));
    }
}
