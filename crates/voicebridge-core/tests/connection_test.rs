mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use voicebridge_common::{BridgeError, BridgeEvent, ChannelId, GroupId, RegistryError};
use voicebridge_config::BridgeConfig;
use voicebridge_core::platform::{LoopbackPlatform, SessionStatus};
use voicebridge_core::{BridgeHub, ConnectionStatus, GroupRegistration, RegistrationStore};

use common::{channel, gid, settle, Harness};

#[tokio::test(start_paused = true)]
async fn two_quick_ensures_open_one_session() {
    let h = Harness::new(&[("a", "x")]);
    let (g, c) = (gid("a"), channel("a"));

    let (first, second) = tokio::join!(
        h.hub.ensure_connection(&g, &c),
        h.hub.ensure_connection(&g, &c),
    );

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(h.platform.join_count(&gid("a")), 1);
    assert_eq!(h.hub.manager().connected_groups().await, vec![gid("a")]);
}

#[tokio::test(start_paused = true)]
async fn ensure_on_live_entry_returns_existing_session() {
    let h = Harness::new(&[("a", "x")]);
    h.connect("a").await;
    let (_, attempt) = h.hub.manager().entry_info(&gid("a")).await.unwrap();

    h.connect("a").await;

    let (_, again) = h.hub.manager().entry_info(&gid("a")).await.unwrap();
    assert_eq!(attempt, again);
    assert_eq!(h.platform.join_count(&gid("a")), 1);
}

#[tokio::test(start_paused = true)]
async fn ready_timeout_fails_without_persisting_entry() {
    let h = Harness::new(&[("a", "x")]);
    h.platform.set_auto_ready(false);

    let err = h
        .hub
        .ensure_connection(&gid("a"), &channel("a"))
        .await
        .err()
        .expect("should time out");

    assert!(matches!(err, BridgeError::Timeout { stage: "ready", .. }));
    assert_eq!(err.to_string(), "ready timed out after 30000ms");
    assert_eq!(h.hub.manager().status(&gid("a")).await, ConnectionStatus::Idle);
    assert!(h.session("a").is_destroyed());

    h.platform.set_auto_ready(true);
    h.connect("a").await;
    assert_eq!(h.platform.join_count(&gid("a")), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_ensure_still_times_out() {
    let h = Harness::new(&[("a", "x")]);
    h.platform.set_auto_ready(false);

    let hub = h.hub.clone();
    let call = tokio::spawn(async move {
        let (g, c) = (gid("a"), channel("a"));
        hub.ensure_connection(&g, &c).await.map(|_| ())
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    call.abort();
    assert_eq!(
        h.hub.manager().status(&gid("a")).await,
        ConnectionStatus::Connecting
    );

    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;

    assert_eq!(h.hub.manager().status(&gid("a")).await, ConnectionStatus::Idle);
    assert!(h.session("a").is_destroyed());

    h.platform.set_auto_ready(true);
    h.connect("a").await;
    assert_eq!(h.platform.join_count(&gid("a")), 2);
}

#[tokio::test(start_paused = true)]
async fn open_failure_is_reported_and_not_retried() {
    let h = Harness::new(&[("a", "x")]);
    h.platform.fail_next_joins(1);

    let err = h
        .hub
        .ensure_connection(&gid("a"), &channel("a"))
        .await
        .err()
        .expect("join should fail");

    assert!(matches!(err, BridgeError::Platform(_)));
    assert!(err.is_transient());
    assert_eq!(h.platform.join_count(&gid("a")), 0);
    assert_eq!(h.hub.manager().status(&gid("a")).await, ConnectionStatus::Idle);

    h.connect("a").await;
    assert!(h.hub.manager().is_connected(&gid("a")).await);
}

#[tokio::test(start_paused = true)]
async fn unrecovered_disconnect_tears_down_and_allows_fresh_session() {
    let h = Harness::new(&[("a", "x"), ("b", "x")]);
    h.connect("a").await;
    h.connect("b").await;
    let mut events = h.hub.subscribe();

    h.session("a").set_status(SessionStatus::Disconnected);
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(h.hub.manager().status(&gid("a")).await, ConnectionStatus::Idle);
    assert!(h.session("a").is_destroyed());
    assert!(!h.hub.bridge().references_group(&gid("a")));
    assert!(!h.hub.bridge().has_link(&gid("b"), &gid("a")));

    let mut lost = None;
    while let Ok(event) = events.try_recv() {
        if let BridgeEvent::ConnectionLost { group, reason } = event {
            lost = Some((group, reason));
        }
    }
    assert_eq!(lost, Some((gid("a"), "recovery window elapsed".to_string())));

    h.connect("a").await;
    assert_eq!(h.platform.join_count(&gid("a")), 2);
    assert!(h.hub.bridge().has_link(&gid("a"), &gid("b")));
    assert!(h.hub.bridge().has_link(&gid("b"), &gid("a")));
}

#[tokio::test(start_paused = true)]
async fn disconnect_that_recovers_keeps_entry() {
    let h = Harness::new(&[("a", "x")]);
    h.connect("a").await;
    let session = h.session("a");

    session.set_status(SessionStatus::Disconnected);
    tokio::time::sleep(Duration::from_secs(2)).await;
    session.set_status(SessionStatus::Connecting);
    settle().await;
    session.set_status(SessionStatus::Ready);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.hub.manager().status(&gid("a")).await, ConnectionStatus::Ready);
    assert!(!session.is_destroyed());
    assert_eq!(h.platform.join_count(&gid("a")), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_disconnected_entry_is_replaced_by_ensure() {
    let h = Harness::new(&[("a", "x")]);
    h.connect("a").await;
    let old = h.session("a");

    old.set_status(SessionStatus::Disconnected);
    settle().await;
    h.connect("a").await;

    assert!(old.is_destroyed());
    assert_eq!(h.platform.join_count(&gid("a")), 2);
    assert_eq!(h.hub.manager().status(&gid("a")).await, ConnectionStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn release_is_a_noop_without_entry() {
    let h = Harness::new(&[("a", "x")]);
    assert!(!h.hub.release(&gid("a")).await);

    h.connect("a").await;
    assert!(h.hub.release(&gid("a")).await);
    assert!(h.session("a").is_destroyed());
    assert!(!h.hub.release(&gid("a")).await);
}

#[tokio::test(start_paused = true)]
async fn reconnect_all_continues_past_failures() {
    let h = Harness::new(&[("a", "x"), ("b", "x"), ("c", "y")]);
    h.platform.fail_next_joins(1);

    let summary = h.hub.reconnect_all().await.unwrap();

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.ready, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(h.platform.join_count(&gid("a")), 0);
    assert_eq!(
        h.hub.manager().connected_groups().await,
        vec![gid("b"), gid("c")]
    );

    let summary = h.hub.reconnect_all().await.unwrap();
    assert_eq!(summary.ready, 3);
    assert_eq!(h.platform.join_count(&gid("b")), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_every_group() {
    let h = Harness::new(&[("a", "x"), ("b", "x")]);
    h.connect("a").await;
    h.connect("b").await;

    assert_eq!(h.hub.shutdown().await, 2);
    assert!(h.hub.manager().connected_groups().await.is_empty());
    assert_eq!(h.hub.bridge().link_count(), 0);
    assert_eq!(h.platform.last_activity().as_deref(), Some("No active voice chats"));
}

/// Registry whose secret lookups always fail.
struct BrokenRegistry;

#[async_trait]
impl RegistrationStore for BrokenRegistry {
    async fn registration(
        &self,
        _group: &GroupId,
    ) -> Result<Option<GroupRegistration>, RegistryError> {
        Err(RegistryError::Unavailable("database offline".into()))
    }

    async fn registration_for_channel(
        &self,
        _channel: &ChannelId,
    ) -> Result<Option<GroupRegistration>, RegistryError> {
        Err(RegistryError::Unavailable("database offline".into()))
    }

    async fn all(&self) -> Result<Vec<GroupRegistration>, RegistryError> {
        Err(RegistryError::Unavailable("database offline".into()))
    }

    async fn groups_by_secret(
        &self,
        _secret: &str,
        _excluding: Option<&GroupId>,
    ) -> Result<Vec<GroupId>, RegistryError> {
        Err(RegistryError::Unavailable("database offline".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn registry_failure_fails_ensure_connection() {
    let platform = LoopbackPlatform::new();
    let hub = BridgeHub::new(
        platform.clone(),
        Arc::new(BrokenRegistry),
        &BridgeConfig::default(),
    );

    let err = hub
        .ensure_connection(&gid("a"), &channel("a"))
        .await
        .err()
        .expect("registry lookup should fail");
    assert!(matches!(err, BridgeError::Registry(RegistryError::Unavailable(_))));

    let sweep = hub.reconnect_all().await;
    assert!(matches!(sweep, Err(BridgeError::Registry(_))));
}
