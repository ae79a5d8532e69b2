//! Driver tests against the simulated directory and prekey server.

#![allow(clippy::unwrap_used)]

use std::{collections::BTreeMap, time::Duration};

use prekeyward_client::{AccountSnapshot, ClientConfig};
use prekeyward_core::Environment;
use prekeyward_harness::{
    SimDirectory, SimEngine, SimPrekeyServer,
    sim_engine::{auth_message, data_message},
};
use prekeyward_proto::{DiscoveredServer, Fingerprint};
use prekeyward_runtime::{
    ChannelTransport, Driver, DriverHandle, MemorySnapshotStore, Outbound, RuntimeError,
    SnapshotStore, SystemEnv,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing_subscriber::EnvFilter;

const ALICE: &str = "alice@example.org";
const SERVER: &str = "prekeys.example.org";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn config() -> ClientConfig {
    ClientConfig { publish_delay: Duration::from_millis(20), ..ClientConfig::default() }
}

/// Host side of the driver: answers discovery, runs the prekey server and
/// records everything else.
struct Host {
    handle: DriverHandle,
    outbound: mpsc::Receiver<Outbound>,
    directory: SimDirectory,
    server: SimPrekeyServer,
    store: MemorySnapshotStore,
    delivered: Vec<(String, String)>,
    suppressed: usize,
    requests: usize,
    restored: usize,
}

impl Host {
    async fn start(
        store: MemorySnapshotStore,
        restore: bool,
    ) -> (Self, JoinHandle<Result<(), RuntimeError>>) {
        init_tracing();

        let engine = SimEngine::new(SystemEnv::new().unix_time());
        let (transport, outbound) = ChannelTransport::new(64);
        let (mut driver, handle) = Driver::new(config(), engine, transport, store.clone()).unwrap();
        let restored = if restore { driver.restore().await.unwrap() } else { 0 };
        let task = tokio::spawn(driver.run());

        let mut directory = SimDirectory::new();
        directory.add_prekey_server("example.org", SERVER, &Fingerprint::new([3; 56]));

        let mut server = SimPrekeyServer::new(SERVER);
        server.add_device("bob@example.org", 1, true);
        server.add_device("bob@example.org", 2, false);
        server.add_device("bob@example.org", 3, true);
        server.set_stored("bob@example.org", 50);

        let host = Self {
            handle,
            outbound,
            directory,
            server,
            store,
            delivered: Vec::new(),
            suppressed: 0,
            requests: 0,
            restored,
        };
        (host, task)
    }

    async fn step(&mut self) {
        let item = tokio::time::timeout(Duration::from_secs(5), self.outbound.recv())
            .await
            .unwrap()
            .unwrap();

        match item {
            Outbound::Request { request, .. } => {
                self.requests += 1;
                let response = self.directory.answer(&request);
                self.handle.discovery_response(response).await.unwrap();
            },
            Outbound::Message { account, to, body } if to == SERVER => {
                for reply in self.server.handle(&account, &body) {
                    self.handle.message_received(account.clone(), SERVER, reply).await.unwrap();
                }
            },
            Outbound::Message { to, body, .. } => self.delivered.push((to, body)),
            Outbound::Suppressed { .. } => self.suppressed += 1,
        }
    }

    async fn stored(&self) -> u32 {
        self.store.load(ALICE).await.unwrap().map_or(0, |snapshot| snapshot.stored_prekeys)
    }
}

#[tokio::test]
async fn connect_discovers_publishes_and_persists() {
    let (mut host, _task) = Host::start(MemorySnapshotStore::new(), false).await;

    host.handle.connected(ALICE).await.unwrap();
    while host.stored().await < 100 || host.suppressed < 2 {
        host.step().await;
    }

    let snapshot = host.store.load(ALICE).await.unwrap().unwrap();
    assert_eq!(snapshot.servers["example.org"].identity, SERVER);
    assert!(snapshot.client_profile_expires_at.is_some());
    assert!(snapshot.prekey_profile_expires_at.is_some());
    assert_eq!(host.server.stored_for(ALICE), 100);
    assert_eq!(host.requests, 3);
    // Stored status and publication success.
    assert_eq!(host.suppressed, 2);
    assert!(host.delivered.is_empty());
}

#[tokio::test]
async fn offline_message_fans_out_to_valid_devices() {
    let (mut host, _task) = Host::start(MemorySnapshotStore::new(), false).await;

    host.handle.connected(ALICE).await.unwrap();
    while host.stored().await < 100 {
        host.step().await;
    }

    host.handle.send_offline(ALICE, "bob@example.org", "hello").await.unwrap();
    while host.delivered.len() < 4 {
        host.step().await;
    }

    let bodies: Vec<&str> = host.delivered.iter().map(|(_, body)| body.as_str()).collect();
    assert_eq!(
        bodies,
        vec![
            auth_message(1).as_str(),
            data_message(1, "hello").as_str(),
            auth_message(3).as_str(),
            data_message(3, "hello").as_str(),
        ]
    );
    assert!(host.delivered.iter().all(|(to, _)| to == "bob@example.org"));
    assert_eq!(host.server.stored_for("bob@example.org"), 49);
}

#[tokio::test]
async fn restored_server_skips_discovery() {
    let store = MemorySnapshotStore::new();
    let unix = SystemEnv::new().unix_time();
    let mut servers = BTreeMap::new();
    servers.insert(
        "example.org".to_string(),
        DiscoveredServer { identity: SERVER.to_string(), fingerprint: Fingerprint::new([3; 56]) },
    );
    store
        .save(&AccountSnapshot {
            account: ALICE.to_string(),
            servers,
            stored_prekeys: 100,
            client_profile_expires_at: Some(unix + 30 * 24 * 60 * 60),
            prekey_profile_expires_at: Some(unix + 30 * 24 * 60 * 60),
        })
        .await
        .unwrap();

    let (mut host, _task) = Host::start(store, true).await;
    assert_eq!(host.restored, 1);
    host.server.set_stored(ALICE, 100);

    host.handle.connected(ALICE).await.unwrap();
    // Status request straight to the known server, then its consumed reply.
    host.step().await;
    host.step().await;
    assert_eq!(host.suppressed, 1);

    host.handle.trigger_publish(ALICE).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(host.requests, 0);
    assert!(host.outbound.try_recv().is_err());
    assert_eq!(host.server.publications(), 0);
}

#[tokio::test]
async fn dropping_every_handle_stops_the_driver() {
    let (host, task) = Host::start(MemorySnapshotStore::new(), false).await;

    drop(host);

    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn closed_transport_stops_the_driver() {
    init_tracing();
    let engine = SimEngine::new(SystemEnv::new().unix_time());
    let (transport, outbound) = ChannelTransport::new(1);
    drop(outbound);

    let (driver, handle) =
        Driver::new(config(), engine, transport, MemorySnapshotStore::new()).unwrap();
    let task = tokio::spawn(driver.run());

    handle.connected(ALICE).await.unwrap();

    assert!(matches!(task.await.unwrap(), Err(RuntimeError::Transport(_))));
}

#[tokio::test]
async fn rejected_event_does_not_stop_the_driver() {
    let (mut host, _task) = Host::start(MemorySnapshotStore::new(), false).await;

    host.handle.connected("").await.unwrap();
    host.handle.connected(ALICE).await.unwrap();
    host.step().await;

    assert_eq!(host.requests, 1);
}

#[test]
fn invalid_config_is_rejected() {
    let config = ClientConfig { prekey_batch_size: 0, ..ClientConfig::default() };
    let (transport, _outbound) = ChannelTransport::new(1);

    let result = Driver::new(config, SimEngine::default(), transport, MemorySnapshotStore::new());

    assert!(matches!(result, Err(RuntimeError::Client(_))));
}
