//! Simulated world.
//!
//! One [`Client`] with a [`SimEngine`], a [`SimDirectory`] and any number of
//! [`SimPrekeyServer`]s, joined by an in-memory network. Client actions are
//! executed immediately; what the network carries back waits in a queue
//! until delivered, optionally out of order. Replies from one prekey server
//! to one account always arrive in the order they were sent.

use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    time::Duration,
};

use prekeyward_client::{
    AccountId, AccountSnapshot, Client, ClientAction, ClientConfig, ClientError, ClientEvent,
};
use prekeyward_core::Environment;
use prekeyward_proto::{Fingerprint, Response, bare_address};

use crate::{
    sim_directory::SimDirectory,
    sim_engine::SimEngine,
    sim_env::{SimEnv, SimInstant},
    sim_server::SimPrekeyServer,
    wire::{PREFIX, WireMessage},
};

/// Upper bound on deliveries or timer firings in one drain, so a livelock
/// fails the test instead of hanging it.
const MAX_STEPS: usize = 10_000;

/// Standard prekey server of `example.org`.
pub const STANDARD_SERVER: &str = "prekeys.example.org";

/// A message the client sent to a peer that is not a prekey server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Sending account.
    pub account: AccountId,
    /// Recipient address.
    pub to: String,
    /// Message body.
    pub body: String,
}

#[derive(Debug, Clone)]
enum InFlight {
    Response { account: AccountId, response: Response },
    Message { account: AccountId, from: String, body: String, answers_publication: bool },
}

impl InFlight {
    fn account(&self) -> &str {
        match self {
            Self::Response { account, .. } | Self::Message { account, .. } => account,
        }
    }

    fn sender(&self) -> Option<(&str, &str)> {
        match self {
            Self::Response { .. } => None,
            Self::Message { account, from, .. } => Some((account, from)),
        }
    }
}

/// Client plus everything it talks to.
pub struct World {
    env: SimEnv,
    client: Client<SimEnv, SimEngine>,
    directory: SimDirectory,
    servers: HashMap<String, SimPrekeyServer>,
    network: VecDeque<InFlight>,
    reorder: bool,
    accounts: BTreeSet<AccountId>,
    delivered: Vec<Delivered>,
    suppressed: usize,
    persisted: HashMap<AccountId, AccountSnapshot>,
    unanswered_publications: HashMap<AccountId, u32>,
    max_unanswered_publications: u32,
}

impl World {
    /// Empty world: no servers, nothing in the directory.
    pub fn with_config(seed: u64, config: ClientConfig) -> Result<Self, ClientError> {
        let env = SimEnv::with_seed(seed);
        let engine = SimEngine::new(env.unix_time());
        let client = Client::new(config, env.clone(), engine)?;

        Ok(Self {
            env,
            client,
            directory: SimDirectory::new(),
            servers: HashMap::new(),
            network: VecDeque::new(),
            reorder: false,
            accounts: BTreeSet::new(),
            delivered: Vec::new(),
            suppressed: 0,
            persisted: HashMap::new(),
            unanswered_publications: HashMap::new(),
            max_unanswered_publications: 0,
        })
    }

    /// World with default config and the standard topology:
    ///
    /// - `example.org` lists a pubsub service and [`STANDARD_SERVER`]
    /// - `bob@example.org` has devices 1, 2 (invalid) and 3 on that server
    /// - `carol@example.org` has device 1; `dave@example.org` has none
    /// - `example.net` lists nothing
    pub fn standard(seed: u64) -> Result<Self, ClientError> {
        let mut world = Self::with_config(seed, ClientConfig::default())?;

        world.directory.add_service("example.org", "pubsub.example.org", "pubsub", "service");
        world.add_prekey_server("example.org", STANDARD_SERVER);
        world.directory.add_empty_domain("example.net");

        if let Some(server) = world.servers.get_mut(STANDARD_SERVER) {
            server.add_device("bob@example.org", 1, true);
            server.add_device("bob@example.org", 2, false);
            server.add_device("bob@example.org", 3, true);
            server.set_stored("bob@example.org", 50);
            server.add_device("carol@example.org", 1, true);
            server.set_stored("carol@example.org", 50);
        }

        Ok(world)
    }

    /// Publish a new prekey server for `domain`. Returns its fingerprint.
    pub fn add_prekey_server(&mut self, domain: &str, identity: &str) -> Fingerprint {
        let mut bytes = [0u8; 56];
        self.env.random_bytes(&mut bytes);
        let fingerprint = Fingerprint::new(bytes);

        self.directory.add_prekey_server(domain, identity, &fingerprint);
        self.servers.insert(identity.to_string(), SimPrekeyServer::new(identity));
        fingerprint
    }

    /// Deliver queued traffic in random order from now on.
    pub fn set_reordering(&mut self, reorder: bool) {
        self.reorder = reorder;
    }

    /// The environment shared with the client.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// The client under test.
    pub fn client(&self) -> &Client<SimEnv, SimEngine> {
        &self.client
    }

    /// Mutable access to the client under test.
    pub fn client_mut(&mut self) -> &mut Client<SimEnv, SimEngine> {
        &mut self.client
    }

    /// The discovery directory.
    pub fn directory_mut(&mut self) -> &mut SimDirectory {
        &mut self.directory
    }

    /// Prekey server at `identity`.
    pub fn server(&self, identity: &str) -> Option<&SimPrekeyServer> {
        self.servers.get(identity)
    }

    /// Mutable prekey server at `identity`.
    pub fn server_mut(&mut self, identity: &str) -> Option<&mut SimPrekeyServer> {
        self.servers.get_mut(identity)
    }

    /// Messages sent to peers, in send order.
    pub fn delivered(&self) -> &[Delivered] {
        &self.delivered
    }

    /// Inbound messages the client asked the host to hide.
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    /// Latest snapshot the client asked to persist for `account`.
    pub fn persisted(&self, account: &str) -> Option<&AccountSnapshot> {
        self.persisted.get(account)
    }

    /// Traffic waiting to be delivered to the client.
    pub fn in_flight(&self) -> usize {
        self.network.len()
    }

    /// Feed an event to the client and execute what it returns.
    pub fn handle(&mut self, event: ClientEvent<SimInstant>) -> Result<(), ClientError> {
        let actions = self.client.handle(event)?;
        self.execute(actions);
        Ok(())
    }

    /// Bring `account` online.
    pub fn connect(&mut self, account: &str) -> Result<(), ClientError> {
        self.accounts.insert(account.to_string());
        self.handle(ClientEvent::AccountConnected { account: account.to_string() })
    }

    /// Take `account` offline. Traffic still in flight for it is lost.
    pub fn disconnect(&mut self, account: &str) -> Result<(), ClientError> {
        self.network.retain(|item| item.account() != account);
        self.unanswered_publications.remove(account);
        self.handle(ClientEvent::AccountDisconnected { account: account.to_string() })
    }

    /// Ask `account` to deliver `message` to an offline `recipient`.
    pub fn send_offline(
        &mut self,
        account: &str,
        recipient: &str,
        message: &str,
    ) -> Result<(), ClientError> {
        self.handle(ClientEvent::SendOffline {
            account: account.to_string(),
            recipient: recipient.to_string(),
            message: message.to_string(),
        })
    }

    /// Hint that `account`'s published material may be stale.
    pub fn trigger_publish(&mut self, account: &str) -> Result<(), ClientError> {
        self.handle(ClientEvent::TriggerPublish { account: account.to_string() })
    }

    /// Advance the clock by `by` and let timers fire.
    pub fn advance(&mut self, by: Duration) -> Result<(), ClientError> {
        let now = self.env.advance(by);
        self.tick(now)
    }

    fn tick(&mut self, now: SimInstant) -> Result<(), ClientError> {
        let unix = self.env.unix_time();
        self.client.engine_mut().set_unix_time(unix);
        self.handle(ClientEvent::Tick { now })
    }

    /// Deliver one queued item. Returns false if nothing was queued.
    pub fn deliver_one(&mut self) -> Result<bool, ClientError> {
        let mut index = if self.reorder && !self.network.is_empty() {
            self.env.random_below(self.network.len())
        } else {
            0
        };
        if let Some(sender) = self.network.get(index).and_then(InFlight::sender) {
            index = self
                .network
                .iter()
                .position(|item| item.sender() == Some(sender))
                .unwrap_or(index);
        }
        let Some(item) = self.network.remove(index) else {
            return Ok(false);
        };

        match item {
            InFlight::Response { response, .. } => {
                self.handle(ClientEvent::DiscoveryResponse { response })?;
            },
            InFlight::Message { account, from, body, answers_publication } => {
                if answers_publication
                    && let Some(count) = self.unanswered_publications.get_mut(&account)
                {
                    *count = count.saturating_sub(1);
                }
                self.handle(ClientEvent::MessageReceived { account, from, body })?;
            },
        }
        Ok(true)
    }

    /// Deliver until the network is quiet. Returns how many items were
    /// delivered.
    pub fn deliver_all(&mut self) -> Result<usize, ClientError> {
        let mut delivered = 0;
        while delivered < MAX_STEPS && self.deliver_one()? {
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Deliver everything and fire every timer until nothing is left to do.
    pub fn run_until_idle(&mut self) -> Result<(), ClientError> {
        for _ in 0..MAX_STEPS {
            self.deliver_all()?;
            let Some(deadline) = self.client.next_deadline() else {
                return Ok(());
            };
            let now = self.env.advance_to(deadline);
            self.tick(now)?;
        }
        Ok(())
    }

    fn execute(&mut self, actions: Vec<ClientAction>) {
        for action in actions {
            match action {
                ClientAction::SendRequest { account, request } => {
                    let response = self.directory.answer(&request);
                    self.network.push_back(InFlight::Response { account, response });
                },
                ClientAction::SendMessage { account, to, body } => self.send(account, to, body),
                ClientAction::SuppressMessage { .. } => self.suppressed += 1,
                ClientAction::Persist(snapshot) => {
                    self.persisted.insert(snapshot.account.clone(), snapshot);
                },
            }
        }
    }

    fn send(&mut self, account: AccountId, to: String, body: String) {
        let Some(server) = self.servers.get_mut(bare_address(&to)) else {
            self.delivered.push(Delivered { account, to, body });
            return;
        };

        let answers_publication =
            matches!(WireMessage::parse(&body), Some(WireMessage::Publish { .. }));
        if answers_publication {
            let count = self.unanswered_publications.entry(account.clone()).or_default();
            *count += 1;
            self.max_unanswered_publications = self.max_unanswered_publications.max(*count);
        }

        for reply in server.handle(&account, &body) {
            self.network.push_back(InFlight::Message {
                account: account.clone(),
                from: to.clone(),
                body: reply,
                answers_publication,
            });
        }
    }

    /// Check properties that must hold after any sequence of operations.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.max_unanswered_publications > 1 {
            return Err(format!(
                "{} publications in flight for one account",
                self.max_unanswered_publications
            ));
        }

        let mut any_connected = false;
        for account in &self.accounts {
            let Some(status) = self.client.status(account) else {
                continue;
            };
            any_connected |= status.connected;
            if !status.connected
                && (status.publishing || status.publish_scheduled || status.waiting_messages > 0)
            {
                return Err(format!("{account} keeps connection state while offline: {status:?}"));
            }
            if self.network.is_empty() && (status.publishing || status.waiting_messages > 0) {
                return Err(format!("{account} awaits replies on a quiet network: {status:?}"));
            }
        }
        if !any_connected && self.client.outstanding_requests() > 0 {
            return Err("discovery requests outstanding with no account online".to_string());
        }

        let mut sends = self.delivered.iter();
        while let Some(sent) = sends.next() {
            if sent.body.starts_with(PREFIX) {
                return Err(format!("sub-protocol message sent to peer {}", sent.to));
            }
            let Some(device) = sent.body.strip_prefix("?PKW-AUTH:") else {
                return Err(format!("ciphertext without authentication: {}", sent.body));
            };
            let expected = format!("?PKW-DATA:{device}:");
            match sends.next() {
                Some(data) if data.to == sent.to && data.body.starts_with(&expected) => {},
                other => return Err(format!("authentication not followed by data: {other:?}")),
            }
        }

        Ok(())
    }
}
