//! Async driver around the sans-IO client.
//!
//! The driver owns a [`Client`] and runs a single loop: host events arrive
//! over a channel, timer deadlines come from [`Client::next_deadline`], and
//! every resulting [`ClientAction`] is executed against a [`Transport`] and
//! a [`SnapshotStore`] before the next event is taken.

use std::time::Instant;

use prekeyward_client::{AccountId, Client, ClientAction, ClientConfig, ClientEvent, PrekeyEngine};
use prekeyward_core::Environment;
use prekeyward_proto::Response;
use tokio::sync::mpsc;

use crate::{
    error::RuntimeError, store::SnapshotStore, system_env::SystemEnv, transport::Transport,
};

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Feeds host events into a running [`Driver`]. Cheap to clone.
///
/// The driver stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    events: mpsc::Sender<ClientEvent<Instant>>,
}

impl DriverHandle {
    async fn send(&self, event: ClientEvent<Instant>) -> Result<(), RuntimeError> {
        self.events.send(event).await.map_err(|_| RuntimeError::Closed)
    }

    /// An account signed on.
    pub async fn connected(&self, account: impl Into<AccountId>) -> Result<(), RuntimeError> {
        self.send(ClientEvent::AccountConnected { account: account.into() }).await
    }

    /// An account's connection went away.
    pub async fn disconnected(&self, account: impl Into<AccountId>) -> Result<(), RuntimeError> {
        self.send(ClientEvent::AccountDisconnected { account: account.into() }).await
    }

    /// A discovery response arrived.
    pub async fn discovery_response(&self, response: Response) -> Result<(), RuntimeError> {
        self.send(ClientEvent::DiscoveryResponse { response }).await
    }

    /// An instant message arrived.
    ///
    /// Whether it is shown to the user is decided by the driver; consumed
    /// messages are reported through [`Transport::suppress_message`].
    pub async fn message_received(
        &self,
        account: impl Into<AccountId>,
        from: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<(), RuntimeError> {
        self.send(ClientEvent::MessageReceived {
            account: account.into(),
            from: from.into(),
            body: body.into(),
        })
        .await
    }

    /// Deliver `message` to a recipient that is offline.
    pub async fn send_offline(
        &self,
        account: impl Into<AccountId>,
        recipient: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), RuntimeError> {
        self.send(ClientEvent::SendOffline {
            account: account.into(),
            recipient: recipient.into(),
            message: message.into(),
        })
        .await
    }

    /// Ask for the account's published material to be checked.
    pub async fn trigger_publish(&self, account: impl Into<AccountId>) -> Result<(), RuntimeError> {
        self.send(ClientEvent::TriggerPublish { account: account.into() }).await
    }
}

/// Runs a [`Client`] against real time, a transport and a snapshot store.
pub struct Driver<P, T, S>
where
    P: PrekeyEngine,
{
    client: Client<SystemEnv, P>,
    env: SystemEnv,
    transport: T,
    store: S,
    events: mpsc::Receiver<ClientEvent<Instant>>,
}

impl<P, T, S> Driver<P, T, S>
where
    P: PrekeyEngine + Send,
    T: Transport,
    S: SnapshotStore,
{
    /// Build a driver and the handle that feeds it.
    pub fn new(
        config: ClientConfig,
        engine: P,
        transport: T,
        store: S,
    ) -> Result<(Self, DriverHandle), RuntimeError> {
        Self::with_capacity(config, engine, transport, store, DEFAULT_EVENT_CAPACITY)
    }

    /// Like [`Driver::new`] with an explicit event channel capacity.
    pub fn with_capacity(
        config: ClientConfig,
        engine: P,
        transport: T,
        store: S,
        capacity: usize,
    ) -> Result<(Self, DriverHandle), RuntimeError> {
        let env = SystemEnv::new();
        let client = Client::new(config, env, engine)?;
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let driver = Self { client, env, transport, store, events: rx };
        Ok((driver, DriverHandle { events: tx }))
    }

    /// The wrapped client.
    pub fn client(&self) -> &Client<SystemEnv, P> {
        &self.client
    }

    /// Load every stored snapshot into the client.
    ///
    /// Call before the first account connects so known servers are reused
    /// instead of rediscovered. Returns the number of accounts restored.
    pub async fn restore(&mut self) -> Result<usize, RuntimeError> {
        let snapshots = self.store.load_all().await?;
        let count = snapshots.len();
        for snapshot in snapshots {
            self.client.restore(snapshot)?;
        }
        tracing::info!(accounts = count, "snapshots restored");
        Ok(count)
    }

    /// Process events until every [`DriverHandle`] is dropped.
    ///
    /// # Errors
    ///
    /// Transport and store failures stop the loop. Client errors caused by
    /// a single event are logged and the loop continues.
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        tracing::info!("driver started");

        loop {
            let deadline = self.client.next_deadline();

            tokio::select! {
                biased;
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    self.process(event).await?;
                },
                () = wait_for(deadline) => {
                    let now = self.env.now();
                    self.process(ClientEvent::Tick { now }).await?;
                },
            }
        }

        tracing::info!("driver stopped, all handles dropped");
        Ok(())
    }

    async fn process(&mut self, event: ClientEvent<Instant>) -> Result<(), RuntimeError> {
        match self.client.handle(event) {
            Ok(actions) => execute(&self.transport, &self.store, actions).await,
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!("event failed, retried on next trigger: {}", e);
                } else {
                    tracing::warn!("event rejected: {}", e);
                }
                Ok(())
            },
        }
    }
}

/// Resolves at `deadline`, or never when there is none.
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

async fn execute<T, S>(
    transport: &T,
    store: &S,
    actions: Vec<ClientAction>,
) -> Result<(), RuntimeError>
where
    T: Transport,
    S: SnapshotStore,
{
    for action in actions {
        match action {
            ClientAction::SendRequest { account, request } => {
                transport.send_request(&account, request).await?;
            },
            ClientAction::SendMessage { account, to, body } => {
                transport.send_message(&account, &to, body).await?;
            },
            ClientAction::SuppressMessage { account, from } => {
                transport.suppress_message(&account, &from).await?;
            },
            ClientAction::Persist(snapshot) => store.save(&snapshot).await?,
        }
    }
    Ok(())
}
