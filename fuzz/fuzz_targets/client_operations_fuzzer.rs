//! Fuzz target for the client inside the simulated world
//!
//! # Strategy
//!
//! - Operation sequences decoded straight from the fuzz input: connects,
//!   disconnects, publication triggers, offline sends, server-side prekey
//!   consumption, rejected publications and retrievals, time jumps and
//!   partial delivery
//! - Reordered delivery, seeded from the input
//!
//! # Invariants
//!
//! - `World::check_invariants` holds after every operation
//! - Draining the world always terminates and leaves the invariants intact

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use prekeyward_harness::{Operation, World};

#[derive(Debug, Arbitrary)]
struct Input {
    seed: u64,
    reorder: bool,
    ops: Vec<Operation>,
}

fuzz_target!(|input: Input| {
    let mut world = World::standard(input.seed).expect("default config is valid");
    world.set_reordering(input.reorder);

    for op in &input.ops {
        op.apply(&mut world).expect("operations in the standard world succeed");
        if let Err(violation) = world.check_invariants() {
            panic!("after {op:?}: {violation}");
        }
    }

    world.run_until_idle().expect("drain succeeds");
    if let Err(violation) = world.check_invariants() {
        panic!("after drain: {violation}");
    }
});
