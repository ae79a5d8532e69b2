//! Requests awaiting a prekey server's reply.
//!
//! Prekey server replies carry no request id. Replies that name what they
//! answer (a stored count, a verdict on a publication, ensembles for a
//! recipient) are matched by kind. Bare failures and errors answer the
//! oldest request still outstanding at the server that sent them, since a
//! server answers one account's requests in the order they arrive.

use std::collections::{HashMap, VecDeque};

use prekeyward_proto::bare_address;

use crate::{event::AccountId, offline::OfflineMessage};

/// What a request sent to a prekey server is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Awaiting {
    /// Our stored prekey message count.
    StorageStatus,
    /// The verdict on our publication.
    Publication,
    /// Ensembles for the message's recipient.
    Ensembles(OfflineMessage),
}

/// Outstanding requests per (account, bare server address), oldest first.
#[derive(Debug, Default)]
pub(crate) struct Outstanding {
    queues: HashMap<(AccountId, String), VecDeque<Awaiting>>,
}

impl Outstanding {
    pub(crate) fn push(&mut self, account: &str, server: &str, awaiting: Awaiting) {
        self.queues.entry(key(account, server)).or_default().push_back(awaiting);
    }

    /// Match a storage status report. Returns false for unsolicited reports.
    pub(crate) fn answer_storage_status(&mut self, account: &str, server: &str) -> bool {
        self.take_first(account, server, |awaiting| *awaiting == Awaiting::StorageStatus)
            .is_some()
    }

    /// Match a success verdict. Returns false unless a publication was sent
    /// to `server`.
    pub(crate) fn answer_publication(&mut self, account: &str, server: &str) -> bool {
        self.take_first(account, server, |awaiting| *awaiting == Awaiting::Publication).is_some()
    }

    /// Release the oldest message waiting for `recipient`'s ensembles at
    /// `server`.
    pub(crate) fn answer_ensembles(
        &mut self,
        account: &str,
        server: &str,
        recipient: &str,
    ) -> Option<OfflineMessage> {
        let recipient = bare_address(recipient);
        let awaiting = self.take_first(account, server, |awaiting| {
            matches!(awaiting, Awaiting::Ensembles(offline)
                if bare_address(&offline.recipient) == recipient)
        })?;
        match awaiting {
            Awaiting::Ensembles(offline) => Some(offline),
            Awaiting::StorageStatus | Awaiting::Publication => None,
        }
    }

    /// Oldest request outstanding at `server`, for replies that do not say
    /// what they answer.
    pub(crate) fn answer_oldest(&mut self, account: &str, server: &str) -> Option<Awaiting> {
        self.take_first(account, server, |_| true)
    }

    /// Drop everything outstanding for `account`. Returns how many were
    /// dropped.
    pub(crate) fn purge(&mut self, account: &str) -> usize {
        let mut dropped = 0;
        self.queues.retain(|(owner, _), queue| {
            if owner == account {
                dropped += queue.len();
                false
            } else {
                true
            }
        });
        dropped
    }

    /// Offline messages of `account` waiting for ensembles.
    pub(crate) fn waiting_messages(&self, account: &str) -> usize {
        self.queues
            .iter()
            .filter(|((owner, _), _)| owner == account)
            .flat_map(|(_, queue)| queue.iter())
            .filter(|awaiting| matches!(awaiting, Awaiting::Ensembles(_)))
            .count()
    }

    fn take_first(
        &mut self,
        account: &str,
        server: &str,
        matches: impl Fn(&Awaiting) -> bool,
    ) -> Option<Awaiting> {
        let key = key(account, server);
        let queue = self.queues.get_mut(&key)?;
        let index = queue.iter().position(matches)?;
        let awaiting = queue.remove(index);
        if queue.is_empty() {
            self.queues.remove(&key);
        }
        awaiting
    }
}

fn key(account: &str, server: &str) -> (AccountId, String) {
    (account.to_string(), bare_address(server).to_string())
}
