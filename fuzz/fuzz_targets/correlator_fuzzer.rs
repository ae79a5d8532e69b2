//! Fuzz target for the [`Correlator`]
//!
//! # Strategy
//!
//! - Seeds: any start value, including 0 and values next to the wrap point
//! - Sequences: interleaved sends, dispatches (valid, repeated and
//!   unknown ids) and per-owner invalidation
//!
//! # Invariants
//!
//! - Ids of pending requests are pairwise distinct
//! - Every id carries the discovery prefix
//! - A dispatched id never dispatches again
//! - Invalidation removes exactly the owner's requests

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use prekeyward_core::{Correlator, REQUEST_ID_PREFIX};
use prekeyward_proto::{QueryKind, RequestId, Response};

#[derive(Debug, Arbitrary)]
enum Op {
    Send { owner: u8 },
    Dispatch { pick: u16 },
    Redispatch { pick: u16 },
    Unknown { id: String },
    Invalidate { owner: u8 },
}

#[derive(Debug, Arbitrary)]
struct Input {
    seed: u32,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let mut correlator: Correlator<u8, u32> = Correlator::new(input.seed);
    let mut pending: Vec<(RequestId, u8)> = Vec::new();
    let mut dispatched: Vec<RequestId> = Vec::new();
    let mut sent = 0u32;

    for op in input.ops {
        match op {
            Op::Send { owner } => {
                let owner = owner % 4;
                let request =
                    correlator.send_and_track(owner, "example.org".into(), QueryKind::Items, sent);
                sent += 1;
                assert!(request.id.as_str().starts_with(REQUEST_ID_PREFIX));
                assert!(pending.iter().all(|(id, _)| *id != request.id), "duplicate pending id");
                pending.push((request.id, owner));
            },
            Op::Dispatch { pick } => {
                if pending.is_empty() {
                    continue;
                }
                let (id, owner) = pending.remove(usize::from(pick) % pending.len());
                let entry = correlator
                    .dispatch(&Response::error(id.clone(), "example.org"))
                    .expect("pending id must dispatch");
                assert_eq!(entry.owner, owner);
                dispatched.push(id);
            },
            Op::Redispatch { pick } => {
                if dispatched.is_empty() {
                    continue;
                }
                let id = &dispatched[usize::from(pick) % dispatched.len()];
                if pending.iter().all(|(live, _)| live != id) {
                    assert!(correlator.dispatch(&Response::error(id.clone(), "x")).is_none());
                }
            },
            Op::Unknown { id } => {
                let id = RequestId::new(id);
                if pending.iter().all(|(live, _)| *live != id) {
                    assert!(correlator.dispatch(&Response::error(id, "x")).is_none());
                }
            },
            Op::Invalidate { owner } => {
                let owner = owner % 4;
                let expected = pending.iter().filter(|(_, o)| *o == owner).count();
                assert_eq!(correlator.invalidate_all_for(&owner), expected);
                pending.retain(|(_, o)| *o != owner);
            },
        }

        assert_eq!(correlator.len(), pending.len());
        let unique: HashSet<_> = pending.iter().map(|(id, _)| id).collect();
        assert_eq!(unique.len(), pending.len());
    }
});
