//! Property-based tests over random operation sequences.
//!
//! ```text
//! proptest generates: (seed, Vec<Operation>)
//!                          │
//!                          ▼
//!      World::standard(seed) ──apply──▶ check_invariants() after every step
//! ```

use prekeyward_harness::{
    Operation, World,
    model::{ACCOUNTS, account},
};
use proptest::prelude::*;

fn operation_strategy() -> impl Strategy<Value = Operation> {
    let account = 0..ACCOUNTS.len() as u8;

    prop_oneof![
        3 => account.clone().prop_map(|account| Operation::Connect { account }),
        1 => account.clone().prop_map(|account| Operation::Disconnect { account }),
        2 => account.clone().prop_map(|account| Operation::TriggerPublish { account }),
        3 => (account.clone(), any::<u8>(), any::<u8>()).prop_map(|(account, recipient, seed)| {
            Operation::SendOffline { account, recipient, seed }
        }),
        1 => (account, any::<u8>())
            .prop_map(|(account, amount)| Operation::ConsumePrekeys { account, amount }),
        1 => any::<bool>().prop_map(|reject| Operation::RejectPublications { reject }),
        1 => any::<bool>().prop_map(|reject| Operation::RejectRetrievals { reject }),
        3 => (0u16..5000).prop_map(|millis| Operation::AdvanceTime { millis }),
        4 => Just(Operation::DeliverOne),
        2 => Just(Operation::DeliverAll),
    ]
}

/// Observable outcome of a run, for determinism checks.
#[derive(Debug, PartialEq, Eq)]
struct Outcome {
    delivered: Vec<(String, String)>,
    publications: usize,
    suppressed: usize,
    stored: Vec<Option<u32>>,
}

fn run(seed: u64, ops: &[Operation], reorder: bool) -> Result<(World, Outcome), String> {
    let mut world = World::standard(seed).map_err(|e| e.to_string())?;
    world.set_reordering(reorder);

    for (step, op) in ops.iter().enumerate() {
        op.apply(&mut world).map_err(|e| format!("step {step} {op:?}: {e}"))?;
        world.check_invariants().map_err(|e| format!("step {step} {op:?}: {e}"))?;
    }
    world.run_until_idle().map_err(|e| e.to_string())?;
    world.check_invariants()?;

    let outcome = Outcome {
        delivered: world.delivered().iter().map(|d| (d.to.clone(), d.body.clone())).collect(),
        publications: world.client().engine().publications().len(),
        suppressed: world.suppressed(),
        stored: (0..ACCOUNTS.len() as u8)
            .map(|ix| world.client().status(account(ix)).map(|s| s.stored_prekeys))
            .collect(),
    };
    Ok((world, outcome))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_invariants_hold(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 1..60),
        reorder in any::<bool>(),
    ) {
        let result = run(seed, &ops, reorder);
        prop_assert!(result.is_ok(), "seed {}: {:?}", seed, result.err());
    }

    #[test]
    fn prop_same_seed_same_outcome(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 1..40),
    ) {
        let (_, first) = run(seed, &ops, true).map_err(TestCaseError::fail)?;
        let (_, second) = run(seed, &ops, true).map_err(TestCaseError::fail)?;

        // PROPERTY: Determinism - same inputs produce same outputs
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_connected_accounts_settle_published(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 0..40),
    ) {
        let (mut world, _) = run(seed, &ops, false).map_err(TestCaseError::fail)?;

        world.server_mut(prekeyward_harness::STANDARD_SERVER).unwrap().reject_publications(false);
        for ix in 0..ACCOUNTS.len() as u8 {
            world.connect(account(ix)).unwrap();
        }
        world.run_until_idle().unwrap();

        // PROPERTY: once the network is quiet, nothing is stuck mid-publication
        for ix in 0..ACCOUNTS.len() as u8 {
            let status = world.client().status(account(ix)).unwrap();
            prop_assert!(!status.publishing, "{} stuck publishing", account(ix));
            prop_assert!(status.own_server.is_some());
            prop_assert_eq!(status.waiting_messages, 0);
        }
    }
}
