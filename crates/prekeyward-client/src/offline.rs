//! Offline delivery.
//!
//! A message for an unreachable recipient waits as an outstanding ensemble
//! request until its prekey server answers. Each answer with ensembles
//! releases exactly one waiting message, which is then fanned out here.

use crate::{engine::PrekeyEngine, event::ClientAction};

/// A message waiting for its recipient's ensembles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OfflineMessage {
    /// Recipient address as given by the host.
    pub(crate) recipient: String,
    pub(crate) message: String,
}

/// Deliver `offline` once per valid ensemble.
///
/// Each valid ensemble yields an authentication message followed by the
/// ciphertext of the message under the session it establishes. Invalid
/// ensembles and engine failures skip that ensemble only.
pub(crate) fn fan_out<P: PrekeyEngine>(
    engine: &mut P,
    account: &str,
    offline: &OfflineMessage,
    ensembles: &[P::Ensemble],
) -> Vec<ClientAction> {
    let recipient = offline.recipient.as_str();
    let mut actions = Vec::with_capacity(ensembles.len() * 2);

    for (index, ensemble) in ensembles.iter().enumerate() {
        if !engine.validate_ensemble(ensemble) {
            tracing::warn!(account, recipient, index, "invalid prekey ensemble skipped");
            continue;
        }

        let auth = match engine.non_interactive_auth(account, recipient, ensemble) {
            Ok(auth) => auth,
            Err(e) => {
                tracing::warn!(account, recipient, index, error = %e, "auth message failed");
                continue;
            },
        };
        let ciphertext = match engine.encrypt(account, recipient, &offline.message) {
            Ok(ciphertext) => ciphertext,
            Err(e) => {
                tracing::warn!(account, recipient, index, error = %e, "offline encryption failed");
                continue;
            },
        };

        actions.push(ClientAction::SendMessage {
            account: account.to_string(),
            to: recipient.to_string(),
            body: auth,
        });
        actions.push(ClientAction::SendMessage {
            account: account.to_string(),
            to: recipient.to_string(),
            body: ciphertext,
        });
    }

    tracing::debug!(
        account,
        recipient,
        ensembles = ensembles.len(),
        sent = actions.len() / 2,
        "offline message fanned out"
    );

    actions
}
