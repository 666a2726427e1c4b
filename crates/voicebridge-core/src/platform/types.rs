//! Collaborator traits and value types for the hosting voice platform.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use voicebridge_common::{ChannelId, GroupId, PlatformError, UserId};

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Voice session lifecycle as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Signalling,
    Connecting,
    Ready,
    Disconnected,
    Destroyed,
}

impl SessionStatus {
    /// Statuses a disconnected session may move into while healing itself.
    pub fn is_recovering(self) -> bool {
        matches!(
            self,
            SessionStatus::Signalling | SessionStatus::Connecting | SessionStatus::Ready
        )
    }
}

/// A participant currently sitting in a voice channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOccupant {
    pub user_id: UserId,
    pub is_bot: bool,
}

/// Speaking-start notification from a session's receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakingStart {
    pub user_id: UserId,
    pub is_bot: bool,
}

/// One encoded audio packet, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame(pub Vec<u8>);

/// A captured per-speaker stream. Ends (yields `None`) once the platform's
/// trailing-silence policy closes it.
pub struct AudioStream {
    frames: mpsc::Receiver<AudioFrame>,
}

impl AudioStream {
    pub fn new(frames: mpsc::Receiver<AudioFrame>) -> Self {
        Self { frames }
    }

    pub async fn next_frame(&mut self) -> Option<AudioFrame> {
        self.frames.recv().await
    }
}

/// What a player is asked to play.
pub enum AudioSource {
    /// Live relay of another group's speaker.
    Stream(AudioStream),
    /// Embedded fixed clip (raw PCM).
    Clip(&'static [u8]),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Entry point into the hosting platform.
#[async_trait]
pub trait VoicePlatform: Send + Sync + 'static {
    /// Join `channel` in `group`. The returned session starts in
    /// `Signalling` or `Connecting` and reports progress on `status()`.
    async fn join(
        &self,
        group: &GroupId,
        channel: &ChannelId,
    ) -> Result<Arc<dyn VoiceSession>, PlatformError>;

    /// Current occupants of a voice channel.
    async fn channel_occupants(
        &self,
        group: &GroupId,
        channel: &ChannelId,
    ) -> Result<Vec<ChannelOccupant>, PlatformError>;

    /// Replace the process's displayed activity ("Watching <text>").
    async fn set_activity(&self, text: &str) -> Result<(), PlatformError>;
}

/// A live voice connection to one channel.
#[async_trait]
pub trait VoiceSession: Send + Sync {
    fn group(&self) -> &GroupId;

    fn channel(&self) -> &ChannelId;

    /// Watch the session status. The sender side moves to `Destroyed`
    /// after `destroy()`.
    fn status(&self) -> watch::Receiver<SessionStatus>;

    /// Subscribe to speaking-start events for every participant.
    fn speaking(&self) -> broadcast::Receiver<SpeakingStart>;

    /// Open a capture for one speaker that closes after `silence` without audio.
    async fn capture(&self, speaker: &UserId, silence: Duration)
        -> Result<AudioStream, PlatformError>;

    /// Create a player subscribed to this session's output.
    async fn create_player(&self) -> Result<Arc<dyn AudioPlayer>, PlatformError>;

    /// Tear down the connection. Idempotent.
    fn destroy(&self);
}

/// An output player bound to one session.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play `source` at `volume`. Resolves when the source is exhausted, when
    /// a newer `play` takes the player over, or when `stop()` is called.
    async fn play(&self, source: AudioSource, volume: f32) -> Result<(), PlatformError>;

    fn stop(&self);
}

/// Session status snapshot without holding a receiver.
pub fn current_status(session: &dyn VoiceSession) -> SessionStatus {
    *session.status().borrow()
}

/// Wait until `accept` matches the status. `None` once the sender is gone.
pub async fn wait_for_status(
    status: &mut watch::Receiver<SessionStatus>,
    accept: impl FnMut(&SessionStatus) -> bool,
) -> Option<SessionStatus> {
    status.wait_for(accept).await.ok().map(|status| *status)
}
