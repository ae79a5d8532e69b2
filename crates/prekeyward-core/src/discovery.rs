//! Prekey server discovery.
//!
//! Discovery is a chain of three request/response steps:
//!
//! ```text
//! ItemsAtDomain ──result──▶ CapabilityQuery(item) ──prekey identity──▶ SubItems(item)
//!   (disco#items domain)      (disco#info item)                       (disco#items item)
//!                                                                          │
//!                                            fingerprint sub-item ─────────▶ Found
//! ```
//!
//! Each step is a [`Step`] value; [`advance`] consumes one response for one
//! step and returns the follow-up [`Effect`]s. Steps for different candidates
//! fan out independently. Within one candidate, step N+1 is only issued
//! after step N's response.
//!
//! [`Discoverer`] runs any number of chains over a shared [`Correlator`],
//! tracking per search how many requests are still in flight so the caller
//! learns when a chain has run dry.

use std::collections::HashMap;

use prekeyward_proto::{DiscoveredServer, QueryKind, Request, RequestId, Response, domain_of};

use crate::correlator::Correlator;

/// Position of one request in the discovery chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Enumerate items at the target domain.
    ItemsAtDomain,
    /// Ask a candidate item which identities it declares.
    CapabilityQuery {
        /// Item address being queried.
        candidate: String,
    },
    /// Enumerate a qualifying candidate's sub-items for its fingerprint.
    SubItems {
        /// Item address being queried.
        candidate: String,
    },
}

/// Follow-up produced by advancing a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Issue another request.
    Query {
        /// Destination address.
        to: String,
        /// Query kind.
        kind: QueryKind,
        /// Step the response will resume.
        step: Step,
    },
    /// A prekey server was located.
    Found(DiscoveredServer),
}

/// First request of a chain for `address`.
///
/// Returns the domain and the items query for it, or `None` when there is no
/// address at all. An empty address yields an empty domain; the chain still
/// runs.
pub fn start(address: Option<&str>) -> Option<(String, Effect)> {
    let domain = domain_of(address?).to_string();
    let effect =
        Effect::Query { to: domain.clone(), kind: QueryKind::Items, step: Step::ItemsAtDomain };

    Some((domain, effect))
}

/// Consume `response` for `step` and return what to do next.
///
/// Error responses and responses without the expected payload end that
/// branch of the chain with no effects. Malformed items are skipped
/// individually.
pub fn advance(step: &Step, response: &Response) -> Vec<Effect> {
    match step {
        Step::ItemsAtDomain => response
            .result_items()
            .iter()
            .filter_map(|item| item.address.clone())
            .map(|candidate| Effect::Query {
                to: candidate.clone(),
                kind: QueryKind::Info,
                step: Step::CapabilityQuery { candidate },
            })
            .collect(),

        Step::CapabilityQuery { candidate } => {
            if response.result_identities().iter().any(|identity| identity.is_prekey_server()) {
                vec![Effect::Query {
                    to: candidate.clone(),
                    kind: QueryKind::Items,
                    step: Step::SubItems { candidate: candidate.clone() },
                }]
            } else {
                Vec::new()
            }
        },

        Step::SubItems { candidate } => response
            .result_items()
            .iter()
            .filter_map(|item| item.fingerprint_for(candidate))
            .map(|fingerprint| {
                Effect::Found(DiscoveredServer { identity: candidate.clone(), fingerprint })
            })
            .collect(),
    }
}

/// Identifier of one discovery search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SearchId(u64);

impl SearchId {
    /// Raw value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Bookkeeping for one running search.
#[derive(Debug)]
struct Search<K> {
    owner: K,
    domain: String,
    outstanding: usize,
    found: u32,
}

/// What a dispatched response did to its search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReport<K> {
    /// Search the response belonged to.
    pub search: SearchId,
    /// Owner that started the search.
    pub owner: K,
    /// Domain being searched.
    pub domain: String,
    /// Follow-up requests to put on the wire.
    pub requests: Vec<Request>,
    /// Servers found by this response, in report order.
    pub found: Vec<DiscoveredServer>,
    /// Servers found by this search so far, including `found`.
    pub found_total: u32,
    /// No request of this search is in flight any more.
    pub finished: bool,
}

/// Runs discovery chains over a shared correlator.
///
/// The discoverer does not deduplicate: the same server may be reported once
/// per qualifying candidate/sub-item. Callers wanting a single result act on
/// the first report and use `found_total` to ignore the rest.
#[derive(Debug)]
pub struct Discoverer<K> {
    correlator: Correlator<K, (SearchId, Step)>,
    searches: HashMap<SearchId, Search<K>>,
    next_search: u64,
}

impl<K: Clone + PartialEq> Discoverer<K> {
    /// Create a discoverer on top of `correlator`.
    pub fn new(correlator: Correlator<K, (SearchId, Step)>) -> Self {
        Self { correlator, searches: HashMap::new(), next_search: 1 }
    }

    /// Number of searches with requests still in flight.
    pub fn active_searches(&self) -> usize {
        self.searches.len()
    }

    /// Number of requests awaiting a response.
    pub fn outstanding_requests(&self) -> usize {
        self.correlator.len()
    }

    /// Whether `id` is a discovery request still awaiting its response.
    pub fn is_awaiting(&self, id: &RequestId) -> bool {
        self.correlator.is_pending(id)
    }

    /// Start searching for prekey servers serving `address`'s domain.
    ///
    /// Returns `None` without sending anything when `address` is absent.
    pub fn lookup(&mut self, owner: K, address: Option<&str>) -> Option<(SearchId, Request)> {
        let Some((domain, Effect::Query { to, kind, step })) = start(address) else {
            return None;
        };

        let search = SearchId(self.next_search);
        self.next_search += 1;

        let request = self.correlator.send_and_track(owner.clone(), to, kind, (search, step));
        self.searches
            .insert(search, Search { owner, domain: domain.clone(), outstanding: 1, found: 0 });

        tracing::debug!(search = search.0, %domain, id = %request.id, "discovery started");

        Some((search, request))
    }

    /// Feed a response in.
    ///
    /// Returns `None` for responses this discoverer did not ask for.
    pub fn handle_response(&mut self, response: &Response) -> Option<SearchReport<K>> {
        let pending = self.correlator.dispatch(response)?;
        let (search_id, step) = pending.continuation;
        if !self.searches.contains_key(&search_id) {
            return None;
        }

        let effects = advance(&step, response);

        let mut requests = Vec::new();
        let mut found = Vec::new();
        for effect in effects {
            match effect {
                Effect::Query { to, kind, step } => {
                    let request = self.correlator.send_and_track(
                        pending.owner.clone(),
                        to,
                        kind,
                        (search_id, step),
                    );
                    requests.push(request);
                },
                Effect::Found(server) => found.push(server),
            }
        }

        let search = self.searches.get_mut(&search_id)?;
        search.outstanding = search.outstanding.saturating_sub(1) + requests.len();
        search.found += u32::try_from(found.len()).unwrap_or(u32::MAX);

        tracing::debug!(
            search = search_id.0,
            ?step,
            follow_ups = requests.len(),
            found = found.len(),
            "discovery step answered"
        );

        let report = SearchReport {
            search: search_id,
            owner: search.owner.clone(),
            domain: search.domain.clone(),
            requests,
            found,
            found_total: search.found,
            finished: search.outstanding == 0,
        };

        if report.finished {
            self.searches.remove(&search_id);
        }

        Some(report)
    }

    /// Drop every search and pending request owned by `owner`. Returns the
    /// number of pending requests dropped.
    pub fn invalidate_all_for(&mut self, owner: &K) -> usize {
        self.searches.retain(|_, search| search.owner != *owner);
        self.correlator.invalidate_all_for(owner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use prekeyward_proto::{Fingerprint, Identity, Item, RequestId};

    use super::*;

    fn fp_hex() -> String {
        "0f".repeat(56)
    }

    fn discoverer() -> Discoverer<&'static str> {
        Discoverer::new(Correlator::new(0x100))
    }

    #[test]
    fn start_without_address_sends_nothing() {
        assert!(start(None).is_none());
        assert!(discoverer().lookup("alice", None).is_none());
    }

    #[test]
    fn start_with_empty_address_queries_empty_domain() {
        let (domain, effect) = start(Some("")).unwrap();
        assert_eq!(domain, "");
        assert_eq!(
            effect,
            Effect::Query { to: String::new(), kind: QueryKind::Items, step: Step::ItemsAtDomain }
        );
    }

    #[test]
    fn items_fan_out_to_capability_queries() {
        let response = Response::items(
            RequestId::new("r"),
            "example.org",
            vec![Item::at("a.example.org"), Item::default(), Item::at("b.example.org")],
        );

        let effects = advance(&Step::ItemsAtDomain, &response);
        assert_eq!(effects.len(), 2);
        assert!(matches!(
            &effects[1],
            Effect::Query { to, kind: QueryKind::Info, step: Step::CapabilityQuery { candidate } }
                if to == "b.example.org" && candidate == "b.example.org"
        ));
    }

    #[test]
    fn error_on_first_step_ends_chain() {
        let response = Response::error(RequestId::new("r"), "example.org");
        assert!(advance(&Step::ItemsAtDomain, &response).is_empty());
    }

    #[test]
    fn non_prekey_candidate_is_discarded() {
        let step = Step::CapabilityQuery { candidate: "muc.example.org".to_string() };
        let response = Response::info(
            RequestId::new("r"),
            "muc.example.org",
            vec![Identity::new("conference", "text")],
        );

        assert!(advance(&step, &response).is_empty());
    }

    #[test]
    fn sub_items_report_every_valid_fingerprint() {
        let step = Step::SubItems { candidate: "p.example.org".to_string() };
        let response = Response::items(
            RequestId::new("r"),
            "p.example.org",
            vec![
                Item::fingerprint("p.example.org", fp_hex()),
                Item::fingerprint("p.example.org", "zz".repeat(56)),
                Item::fingerprint("other.example.org", fp_hex()),
                Item::fingerprint("p.example.org", fp_hex()),
            ],
        );

        let effects = advance(&step, &response);
        assert_eq!(effects.len(), 2);
        assert_eq!(
            effects[0],
            Effect::Found(DiscoveredServer {
                identity: "p.example.org".to_string(),
                fingerprint: Fingerprint::new([0x0f; 56]),
            })
        );
    }

    #[test]
    fn empty_domain_listing_finishes_search_without_follow_ups() {
        let mut discoverer = discoverer();
        let (_, request) = discoverer.lookup("alice", Some("alice@example.org")).unwrap();

        let report = discoverer
            .handle_response(&Response::items(request.id, "example.org", vec![]))
            .unwrap();

        assert!(report.requests.is_empty());
        assert!(report.found.is_empty());
        assert!(report.finished);
        assert_eq!(discoverer.active_searches(), 0);
    }

    #[test]
    fn search_stays_open_while_branches_are_in_flight() {
        let mut discoverer = discoverer();
        let (_, request) = discoverer.lookup("alice", Some("alice@example.org/phone")).unwrap();
        assert_eq!(request.to, "example.org");

        let report = discoverer
            .handle_response(&Response::items(
                request.id,
                "example.org",
                vec![Item::at("a.example.org"), Item::at("b.example.org")],
            ))
            .unwrap();
        assert_eq!(report.requests.len(), 2);
        assert!(!report.finished);

        let first = &report.requests[0];
        let report_a = discoverer
            .handle_response(&Response::info(first.id.clone(), first.to.clone(), vec![]))
            .unwrap();
        assert!(!report_a.finished);

        let second = &report.requests[1];
        let report_b = discoverer
            .handle_response(&Response::error(second.id.clone(), second.to.clone()))
            .unwrap();
        assert!(report_b.finished);
        assert_eq!(report_b.found_total, 0);
    }

    #[test]
    fn invalidation_drops_searches_and_requests() {
        let mut discoverer = discoverer();
        discoverer.lookup("alice", Some("alice@a.org")).unwrap();
        let (_, bob) = discoverer.lookup("bob", Some("bob@b.org")).unwrap();

        assert_eq!(discoverer.invalidate_all_for(&"alice"), 1);
        assert_eq!(discoverer.active_searches(), 1);
        assert_eq!(discoverer.outstanding_requests(), 1);
        assert!(discoverer.handle_response(&Response::items(bob.id, "b.org", vec![])).is_some());
    }
}
