//! Fuzz target for the discovery chain
//!
//! Feed a [`Discoverer`] hostile directory answers.
//!
//! # Strategy
//!
//! - Responses: arbitrary item lists, identities, error results and
//!   fingerprint names of any length and alphabet
//! - Routing: each response answers one outstanding request, picked by
//!   index, so chains fan out and interleave
//! - Strays: responses with ids nobody asked for
//!
//! # Invariants
//!
//! - Every reported server carries the address that was queried
//! - A search reports `finished` exactly once, when nothing is in flight
//! - Stray ids are never dispatched
//! - NEVER panic on malformed items

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use prekeyward_core::{Correlator, Discoverer};
use prekeyward_proto::{Identity, Item, QueryKind, Request, RequestId, Response};

#[derive(Debug, Arbitrary)]
enum FuzzedAnswer {
    Items(Vec<FuzzedItem>),
    Info(Vec<(String, String)>),
    Error,
    Stray { id: String },
}

#[derive(Debug, Arbitrary)]
struct FuzzedItem {
    address: Option<String>,
    node: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Arbitrary)]
struct Input {
    address: Option<String>,
    answers: Vec<(u8, FuzzedAnswer)>,
}

fn respond(request: &Request, answer: FuzzedAnswer) -> Response {
    let id = request.id.clone();
    let from = request.to.clone();
    match answer {
        FuzzedAnswer::Items(items) => {
            let items = items
                .into_iter()
                .map(|item| Item { address: item.address, node: item.node, name: item.name })
                .collect();
            Response::items(id, from, items)
        },
        FuzzedAnswer::Info(identities) => {
            let identities = identities
                .into_iter()
                .map(|(category, kind)| Identity::new(category, kind))
                .collect();
            Response::info(id, from, identities)
        },
        FuzzedAnswer::Error | FuzzedAnswer::Stray { .. } => Response::error(id, from),
    }
}

fuzz_target!(|input: Input| {
    let mut discoverer: Discoverer<u8> = Discoverer::new(Correlator::new(1));
    let Some((search, first)) = discoverer.lookup(0, input.address.as_deref()) else {
        assert_eq!(discoverer.outstanding_requests(), 0);
        return;
    };

    let mut outstanding: Vec<Request> = vec![first];
    let mut finished = false;

    for (pick, answer) in input.answers {
        if outstanding.is_empty() {
            break;
        }

        if let FuzzedAnswer::Stray { id } = &answer {
            let stray = Response::error(RequestId::new(id.clone()), "stray");
            if !outstanding.iter().any(|request| request.id == stray.id) {
                assert!(discoverer.handle_response(&stray).is_none());
            }
            continue;
        }

        let request = outstanding.remove(usize::from(pick) % outstanding.len());
        let queried = request.to.clone();
        let asked_items = request.kind == QueryKind::Items;
        let response = respond(&request, answer);

        let report = discoverer.handle_response(&response).expect("tracked request must dispatch");
        assert_eq!(report.search, search);
        assert!(!finished, "search finished twice");

        for server in &report.found {
            assert!(asked_items, "servers only come from item listings");
            assert_eq!(server.identity, queried);
        }

        outstanding.extend(report.requests);
        finished = report.finished;
        assert_eq!(finished, outstanding.is_empty());
        assert_eq!(discoverer.outstanding_requests(), outstanding.len());
    }
});
