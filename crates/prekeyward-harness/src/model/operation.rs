//! Operations for model-based testing.
//!
//! Operations are generated by proptest or decoded from fuzz input and
//! applied to a [`World`]. Indices wrap, so every generated value is valid.

use std::time::Duration;

use arbitrary::Arbitrary;
use prekeyward_client::ClientError;

use crate::world::{STANDARD_SERVER, World};

/// Local accounts operations pick from.
pub const ACCOUNTS: [&str; 2] = ["alice@example.org", "zoe@example.org/laptop"];

/// Offline recipients operations pick from.
///
/// Covers a recipient with mixed valid/invalid devices, one addressed with
/// a resource, one with no devices, and one on a domain without a server.
pub const RECIPIENTS: [&str; 4] =
    ["bob@example.org", "carol@example.org/phone", "dave@example.org", "erin@example.net"];

/// Account for index `ix`.
pub fn account(ix: u8) -> &'static str {
    ACCOUNTS[usize::from(ix) % ACCOUNTS.len()]
}

/// Recipient for index `ix`.
pub fn recipient(ix: u8) -> &'static str {
    RECIPIENTS[usize::from(ix) % RECIPIENTS.len()]
}

/// Operations that can be applied to the world.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Account signs on.
    Connect {
        /// Account index.
        account: u8,
    },

    /// Account loses its connection.
    Disconnect {
        /// Account index.
        account: u8,
    },

    /// Host hints that published material may be stale.
    TriggerPublish {
        /// Account index.
        account: u8,
    },

    /// Send a message to an offline recipient.
    SendOffline {
        /// Sending account index.
        account: u8,
        /// Recipient index.
        recipient: u8,
        /// Message content seed.
        seed: u8,
    },

    /// Other peers fetch some of an account's stored prekey messages.
    ConsumePrekeys {
        /// Account index.
        account: u8,
        /// How many are taken.
        amount: u8,
    },

    /// Server starts or stops rejecting publications.
    RejectPublications {
        /// Reject from now on.
        reject: bool,
    },

    /// Server starts or stops failing ensemble requests.
    RejectRetrievals {
        /// Reject from now on.
        reject: bool,
    },

    /// Advance simulation time.
    AdvanceTime {
        /// Milliseconds to advance.
        millis: u16,
    },

    /// Deliver one queued item.
    DeliverOne,

    /// Deliver until the network is quiet.
    DeliverAll,
}

impl Operation {
    /// Apply to `world`.
    ///
    /// Operations on accounts that are offline are legal and must be no-ops.
    pub fn apply(&self, world: &mut World) -> Result<(), ClientError> {
        match *self {
            Self::Connect { account: ix } => world.connect(account(ix)),
            Self::Disconnect { account: ix } => world.disconnect(account(ix)),
            Self::TriggerPublish { account: ix } => world.trigger_publish(account(ix)),
            Self::SendOffline { account: ix, recipient: to, seed } => {
                world.send_offline(account(ix), recipient(to), &format!("message {seed}"))
            },
            Self::ConsumePrekeys { account: ix, amount } => {
                if let Some(server) = world.server_mut(STANDARD_SERVER) {
                    server.consume(account(ix), u32::from(amount));
                }
                Ok(())
            },
            Self::RejectPublications { reject } => {
                if let Some(server) = world.server_mut(STANDARD_SERVER) {
                    server.reject_publications(reject);
                }
                Ok(())
            },
            Self::RejectRetrievals { reject } => {
                if let Some(server) = world.server_mut(STANDARD_SERVER) {
                    server.reject_retrievals(reject);
                }
                Ok(())
            },
            Self::AdvanceTime { millis } => world.advance(Duration::from_millis(u64::from(millis))),
            Self::DeliverOne => world.deliver_one().map(|_| ()),
            Self::DeliverAll => world.deliver_all().map(|_| ()),
        }
    }
}
