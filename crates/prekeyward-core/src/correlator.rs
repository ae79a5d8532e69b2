//! Request correlation.
//!
//! Every discovery request is tagged with an identifier and a continuation is
//! parked under that identifier until the response arrives. Identifiers are a
//! fixed prefix followed by a hexadecimal counter seeded from a random
//! non-zero value, so they don't collide with unrelated traffic on the same
//! stream.
//!
//! # Invariants
//!
//! - An identifier is never reissued while still outstanding
//! - A response is matched to at most one pending request; the entry is
//!   removed before the continuation is handed back
//! - No timeouts: entries stay until answered or invalidated with
//!   [`Correlator::invalidate_all_for`]

use std::collections::HashMap;

use prekeyward_proto::{QueryKind, Request, RequestId, Response};

use crate::env::Environment;

/// Prefix of every identifier this correlator issues.
pub const REQUEST_ID_PREFIX: &str = "pkwdisco";

/// A parked continuation together with the owner it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending<K, C> {
    /// Owner of the request (used for bulk invalidation on teardown).
    pub owner: K,
    /// State to resume with when the response arrives.
    pub continuation: C,
}

/// Pending-request table keyed by correlation identifier.
///
/// # Type Parameters
///
/// - `K`: owner key, typically the account whose connection carries the
///   request
/// - `C`: continuation state resumed on response
#[derive(Debug)]
pub struct Correlator<K, C> {
    counter: u32,
    pending: HashMap<RequestId, Pending<K, C>>,
}

impl<K: PartialEq, C> Correlator<K, C> {
    /// Create a correlator whose counter starts at `seed`.
    ///
    /// A zero seed is bumped to one; the counter never renders as zero.
    pub fn new(seed: u32) -> Self {
        Self { counter: seed.max(1), pending: HashMap::new() }
    }

    /// Create a correlator seeded from the environment's RNG.
    pub fn from_env<E: Environment>(env: &E) -> Self {
        let mut seed = env.random_u32();
        while seed == 0 {
            seed = env.random_u32();
        }
        Self::new(seed)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no request is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether `id` is outstanding.
    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.pending.contains_key(id)
    }

    /// Issue a fresh identifier, park `continuation` under it, and return the
    /// request for the caller to put on the wire. Never blocks.
    pub fn send_and_track(
        &mut self,
        owner: K,
        to: impl Into<String>,
        kind: QueryKind,
        continuation: C,
    ) -> Request {
        let id = self.next_id();
        self.pending.insert(id.clone(), Pending { owner, continuation });

        Request { id, to: to.into(), kind }
    }

    /// Match `response` to its pending request.
    ///
    /// Returns `None` when the identifier is unknown: the response belongs to
    /// some other subsystem and the caller may pass it on. Otherwise the entry
    /// is removed and returned, so a second response with the same identifier
    /// is unhandled.
    pub fn dispatch(&mut self, response: &Response) -> Option<Pending<K, C>> {
        self.pending.remove(&response.id)
    }

    /// Drop every pending request owned by `owner`. Returns how many were
    /// dropped.
    pub fn invalidate_all_for(&mut self, owner: &K) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, pending| pending.owner != *owner);
        before - self.pending.len()
    }

    /// Drop every pending request.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn next_id(&mut self) -> RequestId {
        loop {
            let id = RequestId::new(format!("{REQUEST_ID_PREFIX}{:x}", self.counter));
            self.counter = self.counter.wrapping_add(1).max(1);

            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }
}
