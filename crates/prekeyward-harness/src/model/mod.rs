//! Model-based testing.
//!
//! Random [`Operation`] sequences are applied to a [`crate::World`]; after
//! every step the world's invariants must hold.

mod operation;

pub use operation::{ACCOUNTS, Operation, RECIPIENTS, account, recipient};
