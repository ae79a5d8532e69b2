//! End-to-end scenarios against the simulated world.

use std::time::Duration;

use prekeyward_client::{ClientConfig, ClientError, ConfigError, PublicationPlan};
use prekeyward_harness::{Delivered, STANDARD_SERVER, World};

const ALICE: &str = "alice@example.org";

fn published_world(seed: u64) -> World {
    let mut world = World::standard(seed).unwrap();
    world.connect(ALICE).unwrap();
    world.run_until_idle().unwrap();
    world
}

fn bodies(delivered: &[Delivered]) -> Vec<&str> {
    delivered.iter().map(|d| d.body.as_str()).collect()
}

#[test]
fn connect_discovers_and_publishes() {
    let world = published_world(1);

    let status = world.client().status(ALICE).unwrap();
    assert_eq!(status.own_server.map(|s| s.identity), Some(STANDARD_SERVER.to_string()));
    assert_eq!(status.stored_prekeys, 100);
    assert!(!status.publishing);
    assert!(!status.publish_scheduled);

    assert_eq!(
        world.client().engine().publications(),
        &[PublicationPlan { client_profile: true, prekey_profile: true, prekey_messages: 100 }]
    );
    assert_eq!(world.server(STANDARD_SERVER).unwrap().stored_for(ALICE), 100);

    let snapshot = world.persisted(ALICE).unwrap();
    assert_eq!(snapshot.stored_prekeys, 100);
    assert!(snapshot.servers.contains_key("example.org"));
    assert!(snapshot.client_profile_expires_at.is_some());

    // Storage status and the publication verdict never reach the user.
    assert_eq!(world.suppressed(), 2);
    assert_eq!(world.client().outstanding_requests(), 0);
    world.check_invariants().unwrap();
}

#[test]
fn offline_message_reaches_every_valid_device() {
    let mut world = published_world(2);

    world.send_offline(ALICE, "bob@example.org", "hi").unwrap();
    world.run_until_idle().unwrap();

    assert_eq!(
        bodies(world.delivered()),
        vec!["?PKW-AUTH:1", "?PKW-DATA:1:hi", "?PKW-AUTH:3", "?PKW-DATA:3:hi"]
    );
    assert!(world.delivered().iter().all(|d| d.to == "bob@example.org"));
    assert_eq!(world.server(STANDARD_SERVER).unwrap().stored_for("bob@example.org"), 49);

    // The fan-out re-checks publication, but nothing is stale.
    assert_eq!(world.client().engine().publications().len(), 1);
    assert_eq!(world.client().status(ALICE).unwrap().waiting_messages, 0);
    world.check_invariants().unwrap();
}

#[test]
fn recipient_without_devices_gets_nothing() {
    let mut world = published_world(3);

    world.send_offline(ALICE, "dave@example.org", "hi").unwrap();
    world.run_until_idle().unwrap();

    assert!(world.delivered().is_empty());
    assert_eq!(world.client().status(ALICE).unwrap().waiting_messages, 0);
}

#[test]
fn recipient_domain_without_server_drops_message() {
    let mut world = published_world(4);

    world.send_offline(ALICE, "erin@example.net", "hi").unwrap();
    world.run_until_idle().unwrap();

    assert!(world.delivered().is_empty());
    assert_eq!(world.client().outstanding_requests(), 0);
    assert_eq!(world.client().status(ALICE).unwrap().waiting_messages, 0);
}

#[test]
fn offline_message_waits_for_discovery() {
    let mut world = World::standard(5).unwrap();
    world.connect(ALICE).unwrap();
    world.send_offline(ALICE, "carol@example.org/phone", "early").unwrap();

    world.run_until_idle().unwrap();

    assert_eq!(bodies(world.delivered()), vec!["?PKW-AUTH:1", "?PKW-DATA:1:early"]);
    assert_eq!(world.delivered()[0].to, "carol@example.org/phone");
}

#[test]
fn disconnect_mid_discovery_leaves_nothing_behind() {
    let mut world = World::standard(6).unwrap();
    world.connect(ALICE).unwrap();
    world.deliver_one().unwrap();
    assert!(world.client().outstanding_requests() > 0);

    world.disconnect(ALICE).unwrap();

    assert_eq!(world.client().outstanding_requests(), 0);
    assert_eq!(world.in_flight(), 0);
    assert_eq!(world.client().next_deadline(), None);
    world.check_invariants().unwrap();

    world.connect(ALICE).unwrap();
    world.run_until_idle().unwrap();
    assert!(world.client().status(ALICE).unwrap().own_server.is_some());
}

#[test]
fn low_supply_is_replenished_on_reconnect() {
    let mut world = published_world(7);
    world.server_mut(STANDARD_SERVER).unwrap().consume(ALICE, 90);

    world.disconnect(ALICE).unwrap();
    world.connect(ALICE).unwrap();
    world.run_until_idle().unwrap();

    let publications = world.client().engine().publications();
    assert_eq!(publications.len(), 2);
    assert_eq!(
        publications[1],
        PublicationPlan { client_profile: false, prekey_profile: false, prekey_messages: 100 }
    );
    assert_eq!(world.server(STANDARD_SERVER).unwrap().stored_for(ALICE), 110);
    assert_eq!(world.client().status(ALICE).unwrap().stored_prekeys, 110);
}

#[test]
fn rejected_publication_is_retried_on_next_trigger() {
    let mut world = World::standard(8).unwrap();
    world.server_mut(STANDARD_SERVER).unwrap().reject_publications(true);
    world.connect(ALICE).unwrap();
    world.run_until_idle().unwrap();

    assert_eq!(world.client().engine().publications().len(), 1);
    assert_eq!(world.server(STANDARD_SERVER).unwrap().publications(), 0);
    assert!(!world.client().status(ALICE).unwrap().publishing);

    world.server_mut(STANDARD_SERVER).unwrap().reject_publications(false);
    world.trigger_publish(ALICE).unwrap();
    world.run_until_idle().unwrap();

    assert_eq!(world.client().engine().publications().len(), 2);
    assert_eq!(world.server(STANDARD_SERVER).unwrap().publications(), 1);
}

/// Connected with the first publication due but not yet sent.
fn publication_due_world(seed: u64) -> World {
    let mut world = World::standard(seed).unwrap();
    world.connect(ALICE).unwrap();
    world.deliver_all().unwrap();
    world.server_mut(STANDARD_SERVER).unwrap().reject_retrievals(true);
    world
}

#[test]
fn failed_retrieval_before_publication_verdict() {
    let mut world = publication_due_world(10);
    world.send_offline(ALICE, "bob@example.org", "hi").unwrap();
    world.advance(Duration::from_secs(3)).unwrap();
    assert_eq!(world.in_flight(), 2);

    world.deliver_one().unwrap();
    let status = world.client().status(ALICE).unwrap();
    assert!(status.publishing);
    assert_eq!(status.waiting_messages, 0);

    world.run_until_idle().unwrap();
    assert_eq!(world.client().engine().publications().len(), 1);
    assert_eq!(world.server(STANDARD_SERVER).unwrap().publications(), 1);
    assert!(world.delivered().is_empty());
    world.check_invariants().unwrap();
}

#[test]
fn failed_retrieval_after_publication_verdict() {
    let mut world = publication_due_world(11);
    world.advance(Duration::from_secs(3)).unwrap();
    world.send_offline(ALICE, "bob@example.org", "hi").unwrap();
    world.run_until_idle().unwrap();

    let status = world.client().status(ALICE).unwrap();
    assert!(!status.publishing);
    assert_eq!(status.waiting_messages, 0);
    assert_eq!(status.stored_prekeys, 100);
    assert_eq!(world.client().engine().publications().len(), 1);
    world.check_invariants().unwrap();
}

#[test]
fn failing_engine_does_not_wedge_publication() {
    let mut world = World::standard(9).unwrap();
    world.client_mut().engine_mut().fail_publications(true);
    world.connect(ALICE).unwrap();
    world.run_until_idle().unwrap();

    assert!(!world.client().status(ALICE).unwrap().publishing);

    world.client_mut().engine_mut().fail_publications(false);
    world.trigger_publish(ALICE).unwrap();
    world.run_until_idle().unwrap();
    assert_eq!(world.server(STANDARD_SERVER).unwrap().publications(), 1);
}

#[test]
fn first_discovered_server_wins() {
    let mut world = World::standard(10).unwrap();
    world.add_prekey_server("example.org", "prekeys2.example.org");

    world.connect(ALICE).unwrap();
    world.run_until_idle().unwrap();

    let own = world.client().status(ALICE).unwrap().own_server.unwrap();
    assert_eq!(own.identity, STANDARD_SERVER);
    assert_eq!(world.server("prekeys2.example.org").unwrap().publications(), 0);
}

#[test]
fn restored_state_skips_discovery_and_publication() {
    let first = published_world(11);
    let snapshot = first.persisted(ALICE).unwrap().clone();

    let mut world = World::standard(11).unwrap();
    world.server_mut(STANDARD_SERVER).unwrap().set_stored(ALICE, 100);
    world.client_mut().restore(snapshot).unwrap();
    world.connect(ALICE).unwrap();
    world.run_until_idle().unwrap();

    assert_eq!(world.client().engine().publications().len(), 0);
    assert_eq!(world.client().status(ALICE).unwrap().stored_prekeys, 100);
}

#[test]
fn publication_is_debounced() {
    let mut world = published_world(12);
    world.server_mut(STANDARD_SERVER).unwrap().consume(ALICE, 95);

    world.disconnect(ALICE).unwrap();
    world.connect(ALICE).unwrap();
    world.deliver_all().unwrap();
    for _ in 0..5 {
        world.trigger_publish(ALICE).unwrap();
        world.advance(Duration::from_millis(200)).unwrap();
    }
    world.run_until_idle().unwrap();

    assert_eq!(world.client().engine().publications().len(), 2);
}

#[test]
fn invalid_config_is_rejected() {
    let config = ClientConfig { publish_delay: Duration::ZERO, ..ClientConfig::default() };
    assert!(matches!(
        World::with_config(1, config),
        Err(ClientError::Config(ConfigError::ZeroPublishDelay))
    ));
}
