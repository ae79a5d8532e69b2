//! Client state machine.
//!
//! The `Client` is the top-level state machine. For every local account it
//! keeps the prekey client cache, the publication state and the messages
//! waiting for offline delivery, and it runs discovery chains for any domain
//! whose prekey server is not yet known.

use std::collections::HashMap;

use prekeyward_core::{Correlator, Discoverer, Environment, SearchReport};
use prekeyward_proto::{DiscoveredServer, RequestId, Response, bare_address, domain_of};

use crate::{
    account::{AccountState, PublishState, SentProfiles},
    cache::{Deferred, Resolution},
    config::ClientConfig,
    engine::{PrekeyEngine, ServerReply},
    error::ClientError,
    event::{AccountId, AccountSnapshot, ClientAction, ClientEvent},
    offline::{OfflineMessage, fan_out},
    outstanding::{Awaiting, Outstanding},
    publication::PublicationScheduler,
};

/// Observable state of one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStatus {
    /// The host reported the account connected.
    pub connected: bool,
    /// Prekey server for the account's own domain, once known.
    pub own_server: Option<DiscoveredServer>,
    /// A publication is being resolved, built or awaiting a verdict.
    pub publishing: bool,
    /// A publication check is armed.
    pub publish_scheduled: bool,
    /// Prekey messages believed to be stored at our server.
    pub stored_prekeys: u32,
    /// The server reported fewer stored prekey messages than the threshold.
    pub prekey_supply_low: bool,
    /// Offline messages whose ensembles have been requested.
    pub waiting_messages: usize,
}

/// Client state machine.
///
/// Pure state machine: returns actions, caller handles I/O.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time/randomness
/// - `P`: the external cryptographic engine
pub struct Client<E: Environment, P: PrekeyEngine> {
    config: ClientConfig,

    /// Environment for time/randomness.
    env: E,

    engine: P,

    /// Discovery chains and the correlation table they share.
    discoverer: Discoverer<AccountId>,

    accounts: HashMap<AccountId, AccountState>,

    scheduler: PublicationScheduler<E::Instant>,

    outstanding: Outstanding,
}

impl<E: Environment, P: PrekeyEngine> Client<E, P> {
    /// Create a client. The correlation counter is seeded from `env`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if `config` does not validate.
    pub fn new(config: ClientConfig, env: E, engine: P) -> Result<Self, ClientError> {
        config.validate()?;

        let discoverer = Discoverer::new(Correlator::from_env(&env));
        let scheduler = PublicationScheduler::new(config.publish_delay);

        Ok(Self {
            config,
            env,
            engine,
            discoverer,
            accounts: HashMap::new(),
            scheduler,
            outstanding: Outstanding::default(),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The cryptographic engine.
    pub fn engine(&self) -> &P {
        &self.engine
    }

    /// Mutable access to the cryptographic engine.
    pub fn engine_mut(&mut self) -> &mut P {
        &mut self.engine
    }

    /// Whether `account` is currently connected.
    pub fn is_connected(&self, account: &str) -> bool {
        self.accounts.get(account).is_some_and(|state| state.connected)
    }

    /// Whether a discovery response with `id` would be consumed.
    ///
    /// Responses with other ids belong to some other subsystem; the host may
    /// route them there instead.
    pub fn is_awaiting(&self, id: &RequestId) -> bool {
        self.discoverer.is_awaiting(id)
    }

    /// Number of discovery requests awaiting a response.
    pub fn outstanding_requests(&self) -> usize {
        self.discoverer.outstanding_requests()
    }

    /// Earliest time at which a `Tick` has work to do.
    pub fn next_deadline(&self) -> Option<E::Instant> {
        self.scheduler.next_deadline()
    }

    /// Current state of `account`, if the client has seen it.
    pub fn status(&self, account: &str) -> Option<AccountStatus> {
        self.accounts.get(account).map(|state| AccountStatus {
            connected: state.connected,
            own_server: state.own_server(account).cloned(),
            publishing: state.is_publishing(),
            publish_scheduled: self.scheduler.is_scheduled(account),
            stored_prekeys: state.stored_prekeys,
            prekey_supply_low: state.prekey_supply_low,
            waiting_messages: self.outstanding.waiting_messages(account),
        })
    }

    /// Persistable state of `account`.
    pub fn snapshot(&self, account: &str) -> Option<AccountSnapshot> {
        self.accounts.get(account).map(|state| state.snapshot(account))
    }

    /// Load persisted state for an account, typically before it connects.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidAddress` if the snapshot names no account.
    pub fn restore(&mut self, snapshot: AccountSnapshot) -> Result<(), ClientError> {
        if snapshot.account.is_empty() {
            return Err(ClientError::InvalidAddress { address: snapshot.account });
        }

        tracing::debug!(
            account = %snapshot.account,
            servers = snapshot.servers.len(),
            stored = snapshot.stored_prekeys,
            "account state restored"
        );

        match self.accounts.get_mut(&snapshot.account) {
            Some(state) => state.reload(snapshot),
            None => {
                self.accounts.insert(snapshot.account.clone(), AccountState::restored(snapshot));
            },
        }
        Ok(())
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the event names an empty address or the
    /// engine fails on a path the caller initiated directly. Failures on
    /// resumed or timer-driven work are logged instead.
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::AccountConnected { account } => self.handle_connected(&account),
            ClientEvent::AccountDisconnected { account } => {
                Ok(self.handle_disconnected(&account))
            },
            ClientEvent::DiscoveryResponse { response } => {
                Ok(self.handle_discovery_response(&response))
            },
            ClientEvent::MessageReceived { account, from, body } => {
                Ok(self.handle_message(&account, &from, &body))
            },
            ClientEvent::SendOffline { account, recipient, message } => {
                self.handle_send_offline(&account, recipient, message)
            },
            ClientEvent::TriggerPublish { account } => Ok(self.handle_trigger_publish(&account)),
            ClientEvent::Tick { now } => Ok(self.handle_tick(now)),
        }
    }

    /// Handle an account coming online.
    fn handle_connected(&mut self, account: &str) -> Result<Vec<ClientAction>, ClientError> {
        if account.is_empty() {
            return Err(ClientError::InvalidAddress { address: account.to_string() });
        }

        self.accounts.entry(account.to_string()).or_default().connected = true;
        tracing::info!(account, "account connected");

        let now = self.env.now();
        self.scheduler.trigger(account, now);

        self.with_server(account, domain_of(account), Deferred::RequestStorageStatus)
    }

    /// Tear down everything scoped to the account's connection.
    fn handle_disconnected(&mut self, account: &str) -> Vec<ClientAction> {
        let dropped_requests = self.discoverer.invalidate_all_for(&account.to_string());
        let dropped_messages = self.outstanding.waiting_messages(account);
        let dropped_replies = self.outstanding.purge(account);
        self.scheduler.cancel(account);

        if let Some(state) = self.accounts.get_mut(account) {
            let abandoned = state.cache.abandon_lookups();
            state.connected = false;
            state.publishing = PublishState::Idle;

            tracing::info!(
                account,
                dropped_requests,
                dropped_replies,
                dropped_messages,
                abandoned = abandoned.len(),
                "account disconnected"
            );
        }

        Vec::new()
    }

    /// Advance the discovery chain a response belongs to.
    fn handle_discovery_response(&mut self, response: &Response) -> Vec<ClientAction> {
        let Some(report) = self.discoverer.handle_response(response) else {
            tracing::debug!(
                id = response.id.as_str(),
                from = %response.from,
                "response not ours, ignored"
            );
            return Vec::new();
        };

        let SearchReport { search, owner, domain, requests, found, found_total, finished } =
            report;

        let mut actions: Vec<ClientAction> = requests
            .into_iter()
            .map(|request| ClientAction::SendRequest { account: owner.clone(), request })
            .collect();

        for server in found {
            let Some(state) = self.accounts.get_mut(&owner) else {
                break;
            };

            let Some(deferred) = state.cache.found(&domain, search, server.clone()) else {
                tracing::debug!(
                    account = %owner,
                    %domain,
                    server = %server.identity,
                    found_total,
                    "additional prekey server ignored"
                );
                continue;
            };

            tracing::info!(
                account = %owner,
                %domain,
                server = %server.identity,
                fingerprint = ?server.fingerprint,
                "prekey server discovered"
            );
            actions.push(ClientAction::Persist(state.snapshot(&owner)));

            for work in deferred {
                actions.extend(self.resume(&owner, &server, work));
            }
        }

        if finished && let Some(state) = self.accounts.get_mut(&owner) {
            let abandoned = state.cache.finished(&domain, search);
            if !abandoned.is_empty() {
                tracing::warn!(
                    account = %owner,
                    %domain,
                    abandoned = abandoned.len(),
                    "no prekey server found"
                );
            }
            for work in abandoned {
                self.abandon(&owner, &work);
            }
        }

        actions
    }

    /// Offer an inbound message to the engine if it comes from a prekey
    /// server we know.
    fn handle_message(&mut self, account: &str, from: &str, body: &str) -> Vec<ClientAction> {
        let Some(state) = self.accounts.get(account) else {
            return Vec::new();
        };
        if !state.connected || !state.cache.is_server(bare_address(from)) {
            return Vec::new();
        }

        let Some(received) = self.engine.receive(account, from, body) else {
            return Vec::new();
        };

        let mut actions = vec![ClientAction::SuppressMessage {
            account: account.to_string(),
            from: from.to_string(),
        }];
        if let Some(response) = received.response {
            actions.push(ClientAction::SendMessage {
                account: account.to_string(),
                to: from.to_string(),
                body: response,
            });
        }
        if let Some(reply) = received.reply {
            actions.extend(self.apply_reply(account, from, reply));
        }

        actions
    }

    /// Start delivery of a message to a recipient that is not online.
    ///
    /// An empty recipient is not an error: discovery runs on the empty
    /// domain, finds no server and the message is dropped.
    fn handle_send_offline(
        &mut self,
        account: &str,
        recipient: String,
        message: String,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if !self.is_connected(account) {
            tracing::debug!(account, %recipient, "offline delivery without connection, dropped");
            return Ok(Vec::new());
        }

        let domain = domain_of(&recipient).to_string();
        self.with_server(account, &domain, Deferred::RetrieveEnsembles { recipient, message })
    }

    fn handle_trigger_publish(&mut self, account: &str) -> Vec<ClientAction> {
        if self.is_connected(account) {
            let now = self.env.now();
            self.scheduler.trigger(account, now);
        } else {
            tracing::debug!(account, "publish trigger without connection, ignored");
        }
        Vec::new()
    }

    /// Fire due publication timers.
    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        for account in self.scheduler.take_due(now) {
            match self.check_publication(&account) {
                Ok(more) => actions.extend(more),
                Err(e) => tracing::warn!(account = %account, error = %e, "publication failed"),
            }
        }
        actions
    }

    /// Publish whatever is stale, unless a publication is in flight.
    fn check_publication(&mut self, account: &str) -> Result<Vec<ClientAction>, ClientError> {
        let Some(state) = self.accounts.get_mut(account) else {
            return Ok(Vec::new());
        };
        if !state.connected {
            return Ok(Vec::new());
        }
        if state.is_publishing() {
            tracing::debug!(account, "publication already in flight");
            return Ok(Vec::new());
        }

        let plan = state.plan(&self.config, self.env.unix_time());
        if plan.is_empty() {
            tracing::debug!(account, "published material is current");
            return Ok(Vec::new());
        }

        state.publishing = PublishState::Publishing { plan, sent: None };
        self.with_server(account, domain_of(account), Deferred::Publish)
    }

    /// Run `deferred` against `domain`'s prekey server, discovering it
    /// first if needed.
    fn with_server(
        &mut self,
        account: &str,
        domain: &str,
        deferred: Deferred,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let Some(state) = self.accounts.get_mut(account) else {
            return Ok(Vec::new());
        };

        match state.cache.resolve(domain, deferred) {
            Resolution::Ready(server, deferred) => self.run_deferred(account, &server, deferred),
            Resolution::Queued => {
                tracing::debug!(account, domain, "waiting on running discovery");
                Ok(Vec::new())
            },
            Resolution::Unknown(deferred) => {
                let Some((search, request)) =
                    self.discoverer.lookup(account.to_string(), Some(domain))
                else {
                    return Ok(Vec::new());
                };
                state.cache.begin(domain, search, deferred);
                Ok(vec![ClientAction::SendRequest { account: account.to_string(), request }])
            },
        }
    }

    fn run_deferred(
        &mut self,
        account: &str,
        server: &DiscoveredServer,
        deferred: Deferred,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let body = match deferred {
            Deferred::RequestStorageStatus => {
                let body = self.engine.storage_status_request(account, server)?;
                self.outstanding.push(account, &server.identity, Awaiting::StorageStatus);
                body
            },
            Deferred::Publish => return self.send_publication(account, server),
            Deferred::RetrieveEnsembles { recipient, message } => {
                let body = self.engine.ensemble_request(account, server, &recipient)?;
                let offline = OfflineMessage { recipient, message };
                self.outstanding.push(account, &server.identity, Awaiting::Ensembles(offline));
                body
            },
        };

        Ok(vec![ClientAction::SendMessage {
            account: account.to_string(),
            to: server.identity.clone(),
            body,
        }])
    }

    /// Build and send the publication reserved in the account's state.
    fn send_publication(
        &mut self,
        account: &str,
        server: &DiscoveredServer,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let Some(state) = self.accounts.get_mut(account) else {
            return Ok(Vec::new());
        };
        let PublishState::Publishing { plan, .. } = state.publishing else {
            return Ok(Vec::new());
        };

        match self.engine.publication(account, server, &plan) {
            Ok(publication) => {
                state.publishing = PublishState::Publishing {
                    plan,
                    sent: Some(SentProfiles::from(&publication)),
                };
                self.outstanding.push(account, &server.identity, Awaiting::Publication);
                tracing::info!(
                    account,
                    server = %server.identity,
                    client_profile = plan.client_profile,
                    prekey_profile = plan.prekey_profile,
                    prekey_messages = plan.prekey_messages,
                    "publishing"
                );
                Ok(vec![ClientAction::SendMessage {
                    account: account.to_string(),
                    to: server.identity.clone(),
                    body: publication.message,
                }])
            },
            Err(e) => {
                state.publishing = PublishState::Idle;
                Err(e.into())
            },
        }
    }

    /// Run parked work now that its server is known.
    fn resume(
        &mut self,
        account: &str,
        server: &DiscoveredServer,
        work: Deferred,
    ) -> Vec<ClientAction> {
        self.run_deferred(account, server, work).unwrap_or_else(|e| {
            tracing::warn!(account, server = %server.identity, error = %e, "resumed work failed");
            Vec::new()
        })
    }

    /// Give up parked work whose server could not be found.
    fn abandon(&mut self, account: &str, work: &Deferred) {
        match work {
            Deferred::Publish => {
                if let Some(state) = self.accounts.get_mut(account) {
                    state.publishing = PublishState::Idle;
                }
            },
            Deferred::RetrieveEnsembles { recipient, .. } => {
                tracing::warn!(account, %recipient, "offline message dropped");
            },
            Deferred::RequestStorageStatus => {},
        }
    }

    /// Apply a decoded prekey server reply from `from`.
    ///
    /// Only the server a publication went to can settle it. Failures and
    /// errors answer the oldest request outstanding at `from`.
    fn apply_reply(
        &mut self,
        account: &str,
        from: &str,
        reply: ServerReply<P::Ensemble>,
    ) -> Vec<ClientAction> {
        let Some(state) = self.accounts.get_mut(account) else {
            return Vec::new();
        };

        match reply {
            ServerReply::StorageStatus { stored } => {
                if !self.outstanding.answer_storage_status(account, from) {
                    tracing::debug!(account, server = from, "unsolicited storage status");
                }
                state.stored_prekeys = stored;
                state.prekey_supply_low = stored < self.config.min_stored_prekeys;
                tracing::debug!(account, stored, low = state.prekey_supply_low, "storage status");

                if state.prekey_supply_low {
                    let now = self.env.now();
                    self.scheduler.trigger(account, now);
                }
                Vec::new()
            },
            ServerReply::Success => {
                if !self.outstanding.answer_publication(account, from) {
                    tracing::warn!(account, server = from, "success without publication to server");
                    return Vec::new();
                }
                if !state.publication_accepted() {
                    tracing::warn!(account, "success reply without publication in flight");
                    return Vec::new();
                }
                tracing::info!(account, stored = state.stored_prekeys, "publication accepted");
                vec![ClientAction::Persist(state.snapshot(account))]
            },
            ServerReply::Failure => {
                tracing::warn!(account, server = from, "prekey server rejected request");
                self.settle_oldest(account, from);
                Vec::new()
            },
            ServerReply::Error { code } => {
                tracing::warn!(account, server = from, code, "prekey server error");
                self.settle_oldest(account, from);
                Vec::new()
            },
            ServerReply::Ensembles { recipient, ensembles } => {
                let now = self.env.now();
                self.scheduler.trigger(account, now);

                let Some(offline) = self.outstanding.answer_ensembles(account, from, &recipient)
                else {
                    tracing::warn!(account, %recipient, "ensembles without waiting message");
                    return Vec::new();
                };
                fan_out(&mut self.engine, account, &offline, &ensembles)
            },
            ServerReply::NoPrekeyInStorage { recipient } => {
                if self.outstanding.answer_ensembles(account, from, &recipient).is_some() {
                    tracing::info!(account, %recipient, "no prekeys stored, message dropped");
                }
                Vec::new()
            },
        }
    }

    /// Settle the oldest request at `server` after a failure or error.
    fn settle_oldest(&mut self, account: &str, server: &str) {
        match self.outstanding.answer_oldest(account, server) {
            Some(Awaiting::Publication) => {
                if let Some(state) = self.accounts.get_mut(account) {
                    state.publishing = PublishState::Idle;
                }
            },
            Some(Awaiting::Ensembles(offline)) => {
                tracing::warn!(
                    account,
                    recipient = %offline.recipient,
                    "ensemble retrieval failed, message dropped"
                );
            },
            Some(Awaiting::StorageStatus) => {
                tracing::debug!(account, server, "storage status request failed");
            },
            None => {
                tracing::warn!(account, server, "failure without outstanding request");
            },
        }
    }
}
