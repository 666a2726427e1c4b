//! Bridge engine: speaking listeners per link, one pipeline per speaker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voicebridge_common::{new_correlation_id, BridgeEvent, EventBus, GroupId, UserId};

use super::types::{BridgePipeline, Link, LinkKey, PipelineInfo, PipelineKey, PipelineStatus};
use crate::platform::{
    current_status, AudioPlayer, AudioSource, SessionStatus, SpeakingStart, VoiceSession,
};

/// Owns every link listener and every pipeline.
pub struct BridgeEngine {
    links: DashMap<LinkKey, Link>,
    relay: Arc<Relay>,
}

/// State shared with link and pump tasks.
struct Relay {
    pipelines: DashMap<PipelineKey, BridgePipeline>,
    events: Arc<EventBus>,
    silence: Duration,
    gain: f32,
}

impl BridgeEngine {
    pub fn new(events: Arc<EventBus>, silence: Duration, gain: f32) -> Self {
        Self {
            links: DashMap::new(),
            relay: Arc::new(Relay {
                pipelines: DashMap::new(),
                events,
                silence,
                gain,
            }),
        }
    }

    /// Relay `source` speakers into `target`. Returns false when the link
    /// already exists or either session is already gone.
    pub fn wire_bridge(
        &self,
        source: Arc<dyn VoiceSession>,
        target: Arc<dyn VoiceSession>,
    ) -> bool {
        let key: LinkKey = (source.group().clone(), target.group().clone());
        if key.0 == key.1 {
            return false;
        }

        match self.links.entry(key.clone()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                let speaking = source.speaking();
                let task = tokio::spawn(Arc::clone(&self.relay).run_link(
                    source.clone(),
                    target.clone(),
                    speaking,
                    token.clone(),
                ));
                slot.insert(Link { token, task });
            }
        }

        // A teardown that ran before the insert would have missed this link.
        if is_gone(source.as_ref()) || is_gone(target.as_ref()) {
            if let Some((_, link)) = self.links.remove(&key) {
                link.stop();
            }
            return false;
        }

        info!(source = %key.0, target = %key.1, "Bridge wired");
        true
    }

    /// Stop every link and pipeline that touches `group`. Returns the number
    /// of pipelines closed.
    pub fn unwire_group(&self, group: &GroupId) -> usize {
        let links: Vec<LinkKey> = self
            .links
            .iter()
            .filter(|entry| &entry.key().0 == group || &entry.key().1 == group)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &links {
            if let Some((_, link)) = self.links.remove(key) {
                link.stop();
            }
        }

        let keys: Vec<PipelineKey> = self
            .relay
            .pipelines
            .iter()
            .filter(|entry| entry.value().touches(group))
            .map(|entry| entry.key().clone())
            .collect();

        let mut closed = 0;
        for key in keys {
            if let Some((_, mut pipeline)) = self
                .relay
                .pipelines
                .remove_if(&key, |_, pipeline| pipeline.touches(group))
            {
                pipeline.close();
                self.relay.publish_closed(&pipeline);
                closed += 1;
            }
        }

        if !links.is_empty() || closed > 0 {
            info!(group = %group, links = links.len(), pipelines = closed, "Bridges unwired");
        }
        closed
    }

    /// Stop everything.
    pub fn shutdown(&self) -> usize {
        let keys: Vec<LinkKey> = self.links.iter().map(|e| e.key().clone()).collect();
        let mut closed = 0;
        for (source, _) in keys {
            closed += self.unwire_group(&source);
        }
        closed
    }

    pub fn has_link(&self, source: &GroupId, target: &GroupId) -> bool {
        self.links.contains_key(&(source.clone(), target.clone()))
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn pipeline_count(&self) -> usize {
        self.relay.pipelines.len()
    }

    pub fn pipeline(&self, target: &GroupId, speaker: &UserId) -> Option<PipelineInfo> {
        self.relay
            .pipelines
            .get(&PipelineKey::new(target.clone(), speaker.clone()))
            .map(|p| p.info())
    }

    pub fn pipelines(&self) -> Vec<PipelineInfo> {
        let mut all: Vec<PipelineInfo> = self.relay.pipelines.iter().map(|p| p.info()).collect();
        all.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        all
    }

    /// True if any link or pipeline still references `group`.
    pub fn references_group(&self, group: &GroupId) -> bool {
        self.links
            .iter()
            .any(|e| &e.key().0 == group || &e.key().1 == group)
            || self.relay.pipelines.iter().any(|p| p.touches(group))
    }
}

fn is_gone(session: &dyn VoiceSession) -> bool {
    current_status(session) == SessionStatus::Destroyed
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

impl Relay {
    async fn run_link(
        self: Arc<Self>,
        source: Arc<dyn VoiceSession>,
        target: Arc<dyn VoiceSession>,
        mut speaking: broadcast::Receiver<SpeakingStart>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                event = speaking.recv() => match event {
                    Ok(start) if start.is_bot => continue,
                    Ok(start) => {
                        self.open_pipeline(&source, &target, start.user_id, &token).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(source = %source.group(), skipped, "Speaking events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!(source = %source.group(), target = %target.group(), "Link listener stopped");
    }

    async fn open_pipeline(
        self: &Arc<Self>,
        source: &Arc<dyn VoiceSession>,
        target: &Arc<dyn VoiceSession>,
        speaker: UserId,
        token: &CancellationToken,
    ) {
        let key = PipelineKey::new(target.group().clone(), speaker.clone());
        if self.pipelines.contains_key(&key) {
            return;
        }

        let stream = match source.capture(&speaker, self.silence).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(source = %source.group(), speaker = %speaker, error = %e, "Capture failed");
                return;
            }
        };
        let player = match target.create_player().await {
            Ok(player) => player,
            Err(e) => {
                warn!(target = %target.group(), speaker = %speaker, error = %e, "Player creation failed");
                return;
            }
        };

        match self.pipelines.entry(key.clone()) {
            Entry::Occupied(_) => player.stop(),
            Entry::Vacant(_) if token.is_cancelled() => player.stop(),
            Entry::Vacant(slot) => {
                let id = new_correlation_id();
                let source_group = source.group().clone();
                self.events.publish(BridgeEvent::PipelineOpened {
                    source: source_group.clone(),
                    target: key.target.clone(),
                    speaker: speaker.clone(),
                });
                let pump = tokio::spawn(Arc::clone(self).pump(
                    id.clone(),
                    key.clone(),
                    Arc::clone(&player),
                    AudioSource::Stream(stream),
                ));
                slot.insert(BridgePipeline {
                    id: id.clone(),
                    source: source_group,
                    target: key.target.clone(),
                    speaker: speaker.clone(),
                    status: PipelineStatus::Active,
                    player,
                    pump,
                    opened_at: Utc::now(),
                });
                debug!(target = %key.target, speaker = %speaker, pipeline = %id, "Pipeline opened");
            }
        }
    }

    /// Feed the captured stream into the player, then remove the pipeline
    /// if it is still the one this pump belongs to.
    async fn pump(
        self: Arc<Self>,
        id: String,
        key: PipelineKey,
        player: Arc<dyn AudioPlayer>,
        source: AudioSource,
    ) {
        if let Err(e) = player.play(source, self.gain).await {
            warn!(target = %key.target, speaker = %key.speaker, error = %e, "Bridge playback failed");
        }

        if let Some(mut pipeline) = self.pipelines.get_mut(&key) {
            if pipeline.id == id {
                pipeline.status = PipelineStatus::Draining;
            }
        }
        player.stop();

        if let Some((_, mut pipeline)) = self.pipelines.remove_if(&key, |_, p| p.id == id) {
            pipeline.status = PipelineStatus::Closed;
            self.publish_closed(&pipeline);
            debug!(target = %key.target, speaker = %key.speaker, pipeline = %id, "Pipeline closed");
        }
    }

    fn publish_closed(&self, pipeline: &BridgePipeline) {
        self.events.publish(BridgeEvent::PipelineClosed {
            source: pipeline.source.clone(),
            target: pipeline.target.clone(),
            speaker: pipeline.speaker.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{LoopbackPlatform, VoicePlatform};
    use voicebridge_common::ChannelId;

    async fn ready_session(
        platform: &LoopbackPlatform,
        group: &str,
    ) -> Arc<dyn VoiceSession> {
        let session = platform
            .join(&GroupId::from(group), &ChannelId::from(format!("{group}-voice")))
            .await
            .unwrap();
        let mut status = session.status();
        status
            .wait_for(|s| *s == SessionStatus::Ready)
            .await
            .unwrap();
        session
    }

    fn engine() -> BridgeEngine {
        BridgeEngine::new(Arc::new(EventBus::default()), Duration::from_millis(200), 1.0)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn rewiring_same_direction_is_noop() {
        let platform = LoopbackPlatform::new();
        let a = ready_session(&platform, "a").await;
        let b = ready_session(&platform, "b").await;
        let engine = engine();

        assert!(engine.wire_bridge(a.clone(), b.clone()));
        assert!(!engine.wire_bridge(a.clone(), b.clone()));
        assert!(engine.wire_bridge(b, a));
        assert_eq!(engine.link_count(), 2);
    }

    #[tokio::test]
    async fn wiring_to_destroyed_session_is_refused() {
        let platform = LoopbackPlatform::new();
        let a = ready_session(&platform, "a").await;
        let b = ready_session(&platform, "b").await;
        b.destroy();

        let engine = engine();
        assert!(!engine.wire_bridge(a, b));
        assert_eq!(engine.link_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_speaking_keeps_one_pipeline() {
        let platform = LoopbackPlatform::new();
        let a = ready_session(&platform, "a").await;
        let b = ready_session(&platform, "b").await;
        let engine = engine();
        engine.wire_bridge(a.clone(), b.clone());
        settle().await;

        let loop_a = platform.session(&GroupId::from("a")).unwrap();
        let speaker = UserId::from("alice");
        loop_a.start_speaking(&speaker, false);
        settle().await;
        loop_a.start_speaking(&speaker, false);
        settle().await;

        assert_eq!(engine.pipeline_count(), 1);
        assert_eq!(loop_a.captures_opened(), 1);
        let info = engine.pipeline(&GroupId::from("b"), &speaker).unwrap();
        assert_eq!(info.source.as_str(), "a");
        assert_eq!(info.status, PipelineStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn bot_speakers_are_ignored() {
        let platform = LoopbackPlatform::new();
        let a = ready_session(&platform, "a").await;
        let b = ready_session(&platform, "b").await;
        let engine = engine();
        engine.wire_bridge(a, b);
        settle().await;

        let loop_a = platform.session(&GroupId::from("a")).unwrap();
        loop_a.start_speaking(&UserId::from("music-bot"), true);
        settle().await;

        assert_eq!(engine.pipeline_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn audio_reaches_target_player_at_gain() {
        let platform = LoopbackPlatform::new();
        let a = ready_session(&platform, "a").await;
        let b = ready_session(&platform, "b").await;
        let engine = engine();
        engine.wire_bridge(a, b);
        settle().await;

        let loop_a = platform.session(&GroupId::from("a")).unwrap();
        let speaker = UserId::from("alice");
        loop_a.start_speaking(&speaker, false);
        settle().await;
        assert!(loop_a.push_audio(&speaker, b"frame-1").await);
        settle().await;

        let loop_b = platform.session(&GroupId::from("b")).unwrap();
        let players = loop_b.players();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].frames().len(), 1);
        assert_eq!(players[0].volumes(), vec![1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_failure_is_contained() {
        let platform = LoopbackPlatform::new();
        let a = ready_session(&platform, "a").await;
        let b = ready_session(&platform, "b").await;
        let engine = engine();
        engine.wire_bridge(a, b);
        settle().await;

        let loop_a = platform.session(&GroupId::from("a")).unwrap();
        loop_a.set_fail_capture(true);
        loop_a.start_speaking(&UserId::from("alice"), false);
        settle().await;
        assert_eq!(engine.pipeline_count(), 0);

        loop_a.set_fail_capture(false);
        loop_a.start_speaking(&UserId::from("alice"), false);
        settle().await;
        assert_eq!(engine.pipeline_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unwire_group_closes_links_and_pipelines() {
        let platform = LoopbackPlatform::new();
        let a = ready_session(&platform, "a").await;
        let b = ready_session(&platform, "b").await;
        let engine = engine();
        engine.wire_bridge(a.clone(), b.clone());
        engine.wire_bridge(b, a);
        settle().await;

        let loop_a = platform.session(&GroupId::from("a")).unwrap();
        loop_a.start_speaking(&UserId::from("alice"), false);
        settle().await;
        assert_eq!(engine.pipeline_count(), 1);

        let closed = engine.unwire_group(&GroupId::from("b"));
        assert_eq!(closed, 1);
        assert!(!engine.references_group(&GroupId::from("b")));
        assert!(!engine.references_group(&GroupId::from("a")));

        let loop_b = platform.session(&GroupId::from("b")).unwrap();
        assert!(loop_b.players()[0].stop_calls() >= 1);
    }
}
