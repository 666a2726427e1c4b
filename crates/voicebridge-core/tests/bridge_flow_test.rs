mod common;

use std::time::Duration;

use voicebridge_common::{BridgeEvent, CueKind};
use voicebridge_core::PipelineStatus;

use common::{gid, settle, uid, Harness};

#[tokio::test(start_paused = true)]
async fn shared_secret_groups_are_wired_both_ways() {
    let h = Harness::new(&[("a", "x"), ("b", "x"), ("c", "y")]);
    h.connect("a").await;
    h.connect("b").await;
    h.connect("c").await;

    let bridge = h.hub.bridge();
    assert!(bridge.has_link(&gid("a"), &gid("b")));
    assert!(bridge.has_link(&gid("b"), &gid("a")));
    assert!(!bridge.has_link(&gid("a"), &gid("c")));
    assert!(!bridge.has_link(&gid("c"), &gid("b")));
    assert_eq!(bridge.link_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn speaker_reaches_every_peer_once() {
    let h = Harness::new(&[("a", "x"), ("b", "x"), ("c", "x")]);
    for group in ["a", "b", "c"] {
        h.connect(group).await;
    }
    settle().await;

    let a = h.session("a");
    a.start_speaking(&uid("alice"), false);
    settle().await;
    a.start_speaking(&uid("alice"), false);
    settle().await;

    let bridge = h.hub.bridge();
    assert_eq!(bridge.pipeline_count(), 2);
    assert!(bridge.pipeline(&gid("b"), &uid("alice")).is_some());
    assert!(bridge.pipeline(&gid("c"), &uid("alice")).is_some());
    // One capture per outgoing link.
    assert_eq!(a.captures_opened(), 2);

    assert!(a.push_audio(&uid("alice"), b"opus").await);
    settle().await;
    assert_eq!(h.session("b").players()[0].frames().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn pipeline_closes_after_silence_and_reopens_on_speech() {
    let h = Harness::new(&[("a", "x"), ("b", "x")]);
    h.connect("a").await;
    h.connect("b").await;
    settle().await;
    let mut events = h.hub.subscribe();

    let a = h.session("a");
    a.start_speaking(&uid("alice"), false);
    settle().await;
    let first = h
        .hub
        .bridge()
        .pipeline(&gid("b"), &uid("alice"))
        .expect("pipeline opened");
    assert_eq!(first.status, PipelineStatus::Active);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(h.hub.bridge().pipeline(&gid("b"), &uid("alice")).is_none());

    let mut closed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, BridgeEvent::PipelineClosed { ref speaker, .. } if speaker.as_str() == "alice")
        {
            closed = true;
        }
    }
    assert!(closed);

    a.start_speaking(&uid("alice"), false);
    settle().await;
    let second = h
        .hub
        .bridge()
        .pipeline(&gid("b"), &uid("alice"))
        .expect("pipeline reopened");
    assert_ne!(first.id, second.id);
    assert_eq!(a.captures_opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn steady_audio_keeps_pipeline_open() {
    let h = Harness::new(&[("a", "x"), ("b", "x")]);
    h.connect("a").await;
    h.connect("b").await;
    settle().await;

    let a = h.session("a");
    a.start_speaking(&uid("alice"), false);
    settle().await;
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(a.push_audio(&uid("alice"), b"frame").await);
        settle().await;
    }

    assert!(h.hub.bridge().pipeline(&gid("b"), &uid("alice")).is_some());
    assert_eq!(h.session("b").players()[0].frames().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn player_error_is_contained_to_its_pipeline() {
    let h = Harness::new(&[("a", "x"), ("b", "x")]);
    h.connect("a").await;
    h.connect("b").await;
    settle().await;

    let b = h.session("b");
    b.set_fail_playback(true);
    h.session("a").start_speaking(&uid("alice"), false);
    settle().await;

    assert!(h.hub.bridge().pipeline(&gid("b"), &uid("alice")).is_none());
    assert!(h.hub.bridge().has_link(&gid("a"), &gid("b")));
    assert!(b.players()[0].stop_calls() >= 1);
    assert!(h.hub.manager().is_connected(&gid("b")).await);

    b.set_fail_playback(false);
    h.session("a").start_speaking(&uid("alice"), false);
    settle().await;
    assert!(h.hub.bridge().pipeline(&gid("b"), &uid("alice")).is_some());
}

#[tokio::test(start_paused = true)]
async fn teardown_leaves_nothing_behind() {
    let h = Harness::new(&[("a", "x"), ("b", "x"), ("c", "x")]);
    for group in ["a", "b", "c"] {
        h.connect(group).await;
    }
    settle().await;

    h.session("a").start_speaking(&uid("alice"), false);
    h.session("b").start_speaking(&uid("bob"), false);
    h.hub.membership().insert(&gid("a"), uid("alice"));
    assert!(h.hub.play_cue(&gid("a"), CueKind::Join).await);
    settle().await;
    assert_eq!(h.hub.bridge().pipeline_count(), 4);

    assert!(h.hub.release(&gid("a")).await);

    assert!(!h.hub.bridge().references_group(&gid("a")));
    assert!(!h.hub.cues().has_player(&gid("a")));
    assert!(!h.hub.membership().contains_group(&gid("a")));
    assert_eq!(h.hub.manager().connected_groups().await, vec![gid("b"), gid("c")]);

    // b <-> c is untouched.
    assert!(h.hub.bridge().has_link(&gid("b"), &gid("c")));
    assert!(h.hub.bridge().has_link(&gid("c"), &gid("b")));
    assert!(h.hub.bridge().pipeline(&gid("c"), &uid("bob")).is_some());
    assert_eq!(h.hub.bridge().pipeline_count(), 1);
}
