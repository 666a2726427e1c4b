//! Line-delimited JSON control channel for simulation runs.
//!
//! Each stdin line is one [`ControlCommand`]; replies are JSON lines on
//! stdout.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use voicebridge_common::{GroupId, UserId};
use voicebridge_core::platform::LoopbackPlatform;
use voicebridge_core::{BridgeHub, VoiceStateUpdate};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Feed a voice-state notification to the hub.
    VoiceState(VoiceStateUpdate),
    /// Make `user` start speaking in `group`'s session.
    Speak { group: GroupId, user: UserId },
    /// Push one audio frame for `user` in `group`.
    Audio { group: GroupId, user: UserId, data: String },
    Snapshot { group: GroupId },
    Release { group: GroupId },
    Reconnect,
}

#[derive(Debug, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlReply {
    Ok { detail: serde_json::Value },
    Error { message: String },
}

impl ControlReply {
    fn ok(detail: impl Serialize) -> Self {
        match serde_json::to_value(detail) {
            Ok(detail) => ControlReply::Ok { detail },
            Err(e) => ControlReply::Error {
                message: format!("failed to serialize reply: {e}"),
            },
        }
    }

    fn error(message: impl ToString) -> Self {
        ControlReply::Error {
            message: message.to_string(),
        }
    }
}

pub struct Controller {
    hub: BridgeHub,
    platform: Arc<LoopbackPlatform>,
}

impl Controller {
    pub fn new(hub: BridgeHub, platform: Arc<LoopbackPlatform>) -> Self {
        Self { hub, platform }
    }

    pub async fn execute(&self, command: ControlCommand) -> ControlReply {
        match command {
            ControlCommand::VoiceState(update) => match self.hub.handle_voice_state(&update).await {
                Ok(change) => ControlReply::ok(format!("{change:?}")),
                Err(e) => ControlReply::error(e),
            },
            ControlCommand::Speak { group, user } => match self.platform.session(&group) {
                Some(session) => ControlReply::ok(session.start_speaking(&user, false)),
                None => ControlReply::error(format!("no session for group {group}")),
            },
            ControlCommand::Audio { group, user, data } => match self.platform.session(&group) {
                Some(session) => ControlReply::ok(session.push_audio(&user, data.as_bytes()).await),
                None => ControlReply::error(format!("no session for group {group}")),
            },
            ControlCommand::Snapshot { group } => match self.hub.network_snapshot(&group).await {
                Ok(rows) => ControlReply::ok(rows),
                Err(e) => ControlReply::error(e),
            },
            ControlCommand::Release { group } => ControlReply::ok(self.hub.release(&group).await),
            ControlCommand::Reconnect => match self.hub.reconnect_all().await {
                Ok(summary) => ControlReply::ok(summary),
                Err(e) => ControlReply::error(e),
            },
        }
    }

    /// Handle one raw line. Blank lines produce no reply.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let reply = match serde_json::from_str::<ControlCommand>(line) {
            Ok(command) => {
                debug!(?command, "Control command");
                self.execute(command).await
            }
            Err(e) => ControlReply::error(format!("invalid command: {e}")),
        };
        Some(serde_json::to_string(&reply).unwrap_or_else(|e| {
            format!(r#"{{"reply":"error","message":"failed to encode reply: {e}"}}"#)
        }))
    }

    /// Read commands until EOF or shutdown.
    pub async fn run<R>(&self, reader: R, shutdown: CancellationToken)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) => {
                    if let Some(reply) = self.handle_line(&line).await {
                        println!("{reply}");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Control input failed");
                    break;
                }
            }
        }
        debug!("Control channel closed");
    }
}
