//! Prekeyward simulation runner.
//!
//! Applies a seeded stream of random operations to the standard world and
//! checks invariants after every step. A failing seed reproduces exactly.
//!
//! # Usage
//!
//! ```bash
//! prekeyward-sim --seed 42 --steps 5000 --reorder
//! RUST_LOG=prekeyward_client=debug prekeyward-sim --seed 42
//! ```

use arbitrary::{Arbitrary, Unstructured};
use clap::Parser;
use prekeyward_harness::{Operation, World, model::ACCOUNTS};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Bytes of entropy decoded into operations per refill.
const CHUNK: usize = 4096;

/// Prekeyward deterministic simulation
#[derive(Parser, Debug)]
#[command(name = "prekeyward-sim")]
#[command(about = "Run random operations against a simulated prekey network")]
#[command(version)]
struct Args {
    /// Seed for the world and the operation stream
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Number of operations to apply
    #[arg(long, default_value = "1000")]
    steps: usize,

    /// Deliver network traffic out of order
    #[arg(long)]
    reorder: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(seed = args.seed, steps = args.steps, reorder = args.reorder, "simulation");

    let mut world = World::standard(args.seed)?;
    world.set_reordering(args.reorder);

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut entropy = vec![0u8; CHUNK];
    let mut applied = 0;

    while applied < args.steps {
        rng.fill_bytes(&mut entropy);
        let mut input = Unstructured::new(&entropy);

        while applied < args.steps && !input.is_empty() {
            let Ok(op) = Operation::arbitrary(&mut input) else { break };
            tracing::debug!(step = applied, ?op, "apply");

            op.apply(&mut world)?;
            world
                .check_invariants()
                .map_err(|e| format!("seed {} step {applied} {op:?}: {e}", args.seed))?;
            applied += 1;
        }
    }

    world.run_until_idle()?;
    world.check_invariants().map_err(|e| format!("seed {} after settling: {e}", args.seed))?;

    for account in ACCOUNTS {
        if let Some(status) = world.client().status(account) {
            tracing::info!(
                account,
                connected = status.connected,
                stored = status.stored_prekeys,
                waiting = status.waiting_messages,
                "final state"
            );
        }
    }
    tracing::info!(
        delivered = world.delivered().len(),
        suppressed = world.suppressed(),
        publications = world.client().engine().publications().len(),
        "simulation passed"
    );

    Ok(())
}
