//! Fuzz target for snapshot decoding
//!
//! Persisted snapshots come back from storage the client does not control.
//!
//! # Invariants
//!
//! - Decoding arbitrary bytes returns an error or a snapshot, NEVER panics
//! - A decoded snapshot re-encodes and decodes to itself
//! - Restoring a decoded snapshot with a non-empty account succeeds

#![no_main]

use libfuzzer_sys::fuzz_target;
use prekeyward_client::AccountSnapshot;
use prekeyward_harness::World;

fuzz_target!(|data: &[u8]| {
    let Ok(snapshot) = AccountSnapshot::from_cbor(data) else {
        return;
    };

    let bytes = snapshot.to_cbor().expect("decoded snapshot must encode");
    assert_eq!(AccountSnapshot::from_cbor(&bytes).expect("re-decode"), snapshot);

    let mut world = World::standard(0).expect("default config is valid");
    let restored = world.client_mut().restore(snapshot.clone());
    assert_eq!(restored.is_ok(), !snapshot.account.is_empty());
});
