//! In-process platform with scriptable sessions.
//!
//! Sessions, speakers and audio live entirely in memory. Status changes,
//! speaking events and frames are injected through the inspection methods on
//! [`LoopbackPlatform`] and [`LoopbackSession`]; the trailing-silence close
//! runs on real tokio timers so paused-clock tests can drive it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;
use voicebridge_common::{ChannelId, GroupId, PlatformError, UserId};

use super::types::{
    AudioFrame, AudioPlayer, AudioSource, AudioStream, ChannelOccupant, SessionStatus,
    SpeakingStart, VoicePlatform, VoiceSession,
};

/// Retired players kept per session for inspection.
const PLAYER_HISTORY: usize = 16;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// In-memory [`VoicePlatform`].
pub struct LoopbackPlatform {
    sessions: Mutex<HashMap<GroupId, Vec<Arc<LoopbackSession>>>>,
    occupants: Mutex<HashMap<ChannelId, Vec<ChannelOccupant>>>,
    activity: Mutex<Vec<String>>,
    auto_ready: AtomicBool,
    failing_joins: AtomicUsize,
    fail_activity: AtomicBool,
}

impl LoopbackPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            occupants: Mutex::new(HashMap::new()),
            activity: Mutex::new(Vec::new()),
            auto_ready: AtomicBool::new(true),
            failing_joins: AtomicUsize::new(0),
            fail_activity: AtomicBool::new(false),
        })
    }

    /// When false, new sessions stay in `Connecting` until moved by hand.
    pub fn set_auto_ready(&self, auto_ready: bool) {
        self.auto_ready.store(auto_ready, Ordering::SeqCst);
    }

    /// Make the next `count` joins fail.
    pub fn fail_next_joins(&self, count: usize) {
        self.failing_joins.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_activity(&self, fail: bool) {
        self.fail_activity.store(fail, Ordering::SeqCst);
    }

    pub fn set_occupants(&self, channel: &ChannelId, occupants: Vec<ChannelOccupant>) {
        lock(&self.occupants).insert(channel.clone(), occupants);
    }

    /// Number of sessions ever opened for a group.
    pub fn join_count(&self, group: &GroupId) -> usize {
        lock(&self.sessions).get(group).map_or(0, Vec::len)
    }

    /// The most recently opened session for a group.
    pub fn session(&self, group: &GroupId) -> Option<Arc<LoopbackSession>> {
        lock(&self.sessions)
            .get(group)
            .and_then(|sessions| sessions.last().cloned())
    }

    pub fn activity_history(&self) -> Vec<String> {
        lock(&self.activity).clone()
    }

    pub fn last_activity(&self) -> Option<String> {
        lock(&self.activity).last().cloned()
    }
}

#[async_trait]
impl VoicePlatform for LoopbackPlatform {
    async fn join(
        &self,
        group: &GroupId,
        channel: &ChannelId,
    ) -> Result<Arc<dyn VoiceSession>, PlatformError> {
        let failing = self
            .failing_joins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(PlatformError::SessionOpen(format!(
                "loopback refused join for group {group}"
            )));
        }

        let session = Arc::new(LoopbackSession::new(group.clone(), channel.clone()));
        lock(&self.sessions)
            .entry(group.clone())
            .or_default()
            .push(Arc::clone(&session));

        if self.auto_ready.load(Ordering::SeqCst) {
            let status_tx = session.status_tx.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                status_tx.send_if_modified(|status| {
                    if *status == SessionStatus::Connecting {
                        *status = SessionStatus::Ready;
                        true
                    } else {
                        false
                    }
                });
            });
        }

        debug!(group = %group, channel = %channel, "Loopback session opened");
        Ok(session)
    }

    async fn channel_occupants(
        &self,
        _group: &GroupId,
        channel: &ChannelId,
    ) -> Result<Vec<ChannelOccupant>, PlatformError> {
        Ok(lock(&self.occupants)
            .get(channel)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_activity(&self, text: &str) -> Result<(), PlatformError> {
        if self.fail_activity.load(Ordering::SeqCst) {
            return Err(PlatformError::Activity("loopback activity rejected".into()));
        }
        lock(&self.activity).push(text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// In-memory [`VoiceSession`].
pub struct LoopbackSession {
    group: GroupId,
    channel: ChannelId,
    status_tx: Arc<watch::Sender<SessionStatus>>,
    speaking_tx: broadcast::Sender<SpeakingStart>,
    /// Feed side of each open capture. A speaker may be captured once per
    /// outgoing link.
    inputs: Mutex<HashMap<UserId, Vec<mpsc::Sender<AudioFrame>>>>,
    players: Mutex<Vec<Arc<LoopbackPlayer>>>,
    captures_opened: AtomicUsize,
    fail_capture: AtomicBool,
    fail_playback: Arc<AtomicBool>,
}

impl LoopbackSession {
    fn new(group: GroupId, channel: ChannelId) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Connecting);
        let (speaking_tx, _) = broadcast::channel(64);
        Self {
            group,
            channel,
            status_tx: Arc::new(status_tx),
            speaking_tx,
            inputs: Mutex::new(HashMap::new()),
            players: Mutex::new(Vec::new()),
            captures_opened: AtomicUsize::new(0),
            fail_capture: AtomicBool::new(false),
            fail_playback: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_status(&self, status: SessionStatus) {
        self.status_tx.send_replace(status);
    }

    pub fn current_status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    pub fn is_destroyed(&self) -> bool {
        self.current_status() == SessionStatus::Destroyed
    }

    /// Emit a speaking-start event. Returns the number of listeners.
    pub fn start_speaking(&self, user: &UserId, is_bot: bool) -> usize {
        self.speaking_tx
            .send(SpeakingStart {
                user_id: user.clone(),
                is_bot,
            })
            .unwrap_or(0)
    }

    /// Feed one frame into every open capture of the speaker. Returns false
    /// when no capture took it.
    pub async fn push_audio(&self, user: &UserId, bytes: &[u8]) -> bool {
        let inputs = {
            let mut map = lock(&self.inputs);
            match map.get_mut(user) {
                Some(senders) => {
                    senders.retain(|tx| !tx.is_closed());
                    senders.clone()
                }
                None => Vec::new(),
            }
        };

        let mut delivered = false;
        for tx in inputs {
            delivered |= tx.send(AudioFrame(bytes.to_vec())).await.is_ok();
        }
        delivered
    }

    pub fn has_open_capture(&self, user: &UserId) -> bool {
        lock(&self.inputs)
            .get(user)
            .is_some_and(|senders| senders.iter().any(|tx| !tx.is_closed()))
    }

    pub fn captures_opened(&self) -> usize {
        self.captures_opened.load(Ordering::SeqCst)
    }

    pub fn players(&self) -> Vec<Arc<LoopbackPlayer>> {
        lock(&self.players).clone()
    }

    pub fn set_fail_capture(&self, fail: bool) {
        self.fail_capture.store(fail, Ordering::SeqCst);
    }

    /// Make stream playback on this session's players fail.
    pub fn set_fail_playback(&self, fail: bool) {
        self.fail_playback.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceSession for LoopbackSession {
    fn group(&self) -> &GroupId {
        &self.group
    }

    fn channel(&self) -> &ChannelId {
        &self.channel
    }

    fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    fn speaking(&self) -> broadcast::Receiver<SpeakingStart> {
        self.speaking_tx.subscribe()
    }

    async fn capture(
        &self,
        speaker: &UserId,
        silence: Duration,
    ) -> Result<AudioStream, PlatformError> {
        if self.is_destroyed() {
            return Err(PlatformError::SessionClosed);
        }
        if self.fail_capture.load(Ordering::SeqCst) {
            return Err(PlatformError::Capture(format!(
                "loopback capture refused for {speaker}"
            )));
        }

        let (in_tx, mut in_rx) = mpsc::channel::<AudioFrame>(64);
        let (out_tx, out_rx) = mpsc::channel::<AudioFrame>(64);
        lock(&self.inputs)
            .entry(speaker.clone())
            .or_default()
            .push(in_tx);
        self.captures_opened.fetch_add(1, Ordering::SeqCst);

        // Silence gate: the stream ends once no frame arrives for `silence`.
        tokio::spawn(async move {
            loop {
                match tokio::time::timeout(silence, in_rx.recv()).await {
                    Ok(Some(frame)) => {
                        if out_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        });

        Ok(AudioStream::new(out_rx))
    }

    async fn create_player(&self) -> Result<Arc<dyn AudioPlayer>, PlatformError> {
        if self.is_destroyed() {
            return Err(PlatformError::SessionClosed);
        }
        let player = Arc::new(LoopbackPlayer::new(Arc::clone(&self.fail_playback)));
        let mut players = lock(&self.players);
        // Oldest players nobody else holds go first.
        let mut excess = (players.len() + 1).saturating_sub(PLAYER_HISTORY);
        players.retain(|p| {
            if excess > 0 && Arc::strong_count(p) == 1 {
                excess -= 1;
                false
            } else {
                true
            }
        });
        players.push(Arc::clone(&player));
        Ok(player)
    }

    fn destroy(&self) {
        self.status_tx.send_replace(SessionStatus::Destroyed);
        lock(&self.inputs).clear();
        for player in lock(&self.players).iter() {
            player.stop();
        }
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// In-memory [`AudioPlayer`] that records everything it plays.
pub struct LoopbackPlayer {
    frames: Mutex<Vec<AudioFrame>>,
    clips: Mutex<Vec<usize>>,
    volumes: Mutex<Vec<f32>>,
    /// Bumped by every `play` and `stop`; a running `play` exits when it moves.
    generation: watch::Sender<u64>,
    stop_calls: AtomicUsize,
    fail_playback: Arc<AtomicBool>,
}

impl LoopbackPlayer {
    fn new(fail_playback: Arc<AtomicBool>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            frames: Mutex::new(Vec::new()),
            clips: Mutex::new(Vec::new()),
            volumes: Mutex::new(Vec::new()),
            generation,
            stop_calls: AtomicUsize::new(0),
            fail_playback,
        }
    }

    pub fn frames(&self) -> Vec<AudioFrame> {
        lock(&self.frames).clone()
    }

    /// Byte length of every clip played, in order.
    pub fn clips_played(&self) -> Vec<usize> {
        lock(&self.clips).clone()
    }

    pub fn volumes(&self) -> Vec<f32> {
        lock(&self.volumes).clone()
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPlayer for LoopbackPlayer {
    async fn play(&self, source: AudioSource, volume: f32) -> Result<(), PlatformError> {
        let mut takeover = self.generation.subscribe();
        self.generation.send_modify(|generation| *generation += 1);
        let mine = *takeover.borrow_and_update();
        lock(&self.volumes).push(volume);

        match source {
            AudioSource::Clip(bytes) => {
                lock(&self.clips).push(bytes.len());
                Ok(())
            }
            AudioSource::Stream(mut stream) => {
                if self.fail_playback.load(Ordering::SeqCst) {
                    return Err(PlatformError::Player("loopback playback failure".into()));
                }
                loop {
                    tokio::select! {
                        frame = stream.next_frame() => match frame {
                            Some(frame) => lock(&self.frames).push(frame),
                            None => return Ok(()),
                        },
                        changed = takeover.changed() => {
                            if changed.is_err() || *takeover.borrow_and_update() != mine {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.generation.send_modify(|generation| *generation += 1);
    }
}
