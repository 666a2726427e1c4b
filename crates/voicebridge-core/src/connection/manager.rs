//! Connection manager: one voice session per group, disconnect recovery,
//! and full per-group teardown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voicebridge_common::{
    new_correlation_id, BridgeError, BridgeEvent, ChannelId, EventBus, GroupId, Result, UserId,
};
use voicebridge_config::schema::ConnectionConfig;

use super::table::ConnectionTable;
use super::types::{ConnectionState, ConnectionStatus, GroupSlot, ReconnectSummary};
use crate::bridge::BridgeEngine;
use crate::cue::CuePlayer;
use crate::membership::MembershipTable;
use crate::platform::{wait_for_status, SessionStatus, VoicePlatform, VoiceSession};
use crate::presence::PresenceAggregator;
use crate::registry::RegistrationStore;

/// Collaborators the manager drives during connect and teardown.
pub struct ManagerParts {
    pub platform: Arc<dyn VoicePlatform>,
    pub registry: Arc<dyn RegistrationStore>,
    pub table: Arc<ConnectionTable>,
    pub bridge: Arc<BridgeEngine>,
    pub membership: Arc<MembershipTable>,
    pub presence: Arc<PresenceAggregator>,
    pub cues: Arc<CuePlayer>,
    pub events: Arc<EventBus>,
}

struct Inner {
    parts: ManagerParts,
    ready_timeout: Duration,
    recovery_window: Duration,
}

/// Owns every [`ConnectionState`]. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(parts: ManagerParts, config: &ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                parts,
                ready_timeout: config.ready_timeout(),
                recovery_window: config.recovery_window(),
            }),
        }
    }

    fn parts(&self) -> &ManagerParts {
        &self.inner.parts
    }

    // -----------------------------------------------------------------------
    // Connect
    // -----------------------------------------------------------------------

    /// Make sure `group` has a live session in `channel`.
    ///
    /// A live entry is returned as is. Otherwise a stale entry is cleaned up,
    /// a new session is opened and awaited until `Ready`, membership and
    /// presence are refreshed and the group is wired to every peer sharing
    /// its secret.
    pub async fn ensure_connection(
        &self,
        group: &GroupId,
        channel: &ChannelId,
    ) -> Result<Arc<dyn VoiceSession>> {
        let attempt = new_correlation_id();

        let (session, mut status_rx, started) = {
            let mut slot = self.parts().table.lock(group).await;

            if let Some(conn) = slot.connection.as_ref() {
                if !conn.status().is_stale() {
                    let session = Arc::clone(&conn.session);
                    let rewire = conn.is_ready() && !conn.bridges_wired;
                    let current = conn.attempt.clone();
                    drop(slot);
                    debug!(group = %group, attempt = %current, "Connection already live");
                    if rewire {
                        self.wire_peers(group, &current).await?;
                    }
                    return Ok(session);
                }
            }

            let had_stale = match slot.connection.take() {
                Some(stale) => {
                    self.release_locked(group, stale);
                    true
                }
                None => false,
            };

            info!(group = %group, channel = %channel, attempt = %attempt, "Opening voice connection");
            let session = match self.parts().platform.join(group, channel).await {
                Ok(session) => session,
                Err(e) => {
                    drop(slot);
                    warn!(group = %group, attempt = %attempt, error = %e, "Voice connection failed");
                    if had_stale {
                        self.after_teardown(group, "stale entry replaced").await;
                    }
                    return Err(e.into());
                }
            };

            let status_rx = session.status();
            let observer = CancellationToken::new();
            slot.connection = Some(ConnectionState {
                group_id: group.clone(),
                channel_id: channel.clone(),
                session: Arc::clone(&session),
                status_rx: status_rx.clone(),
                created_at: Utc::now(),
                attempt: attempt.clone(),
                observer: observer.clone(),
                bridges_wired: false,
            });

            // Taken before the observer starts its own deadline clock.
            let started = Instant::now();
            tokio::spawn(self.clone().observe(
                group.clone(),
                attempt.clone(),
                status_rx.clone(),
                observer,
            ));
            (session, status_rx, started)
        };

        let reached = timeout(
            self.inner.ready_timeout,
            wait_for_status(&mut status_rx, |s| {
                matches!(s, SessionStatus::Ready | SessionStatus::Destroyed)
            }),
        )
        .await;

        match reached {
            Ok(Some(SessionStatus::Ready)) => {}
            Ok(_) if started.elapsed() < self.inner.ready_timeout => {
                warn!(group = %group, attempt = %attempt, "Connection torn down before ready");
                return Err(BridgeError::Superseded(group.clone()));
            }
            // Either side may hit the deadline first; the observer enforces it
            // even when this call is dropped.
            _ => {
                self.ready_deadline_passed(group, &attempt).await;
                return Err(BridgeError::Timeout {
                    stage: "ready",
                    after: self.inner.ready_timeout,
                });
            }
        }

        {
            let slot = self.parts().table.lock(group).await;
            if !is_current(&slot, &attempt) {
                return Err(BridgeError::Superseded(group.clone()));
            }
            self.snapshot_members(group, channel).await;
            self.parts().events.publish(BridgeEvent::ConnectionReady {
                group: group.clone(),
                attempt: attempt.clone(),
            });
        }
        info!(group = %group, channel = %channel, attempt = %attempt, "Voice connection ready");

        self.parts().presence.recompute().await;
        self.wire_peers(group, &attempt).await?;
        Ok(session)
    }

    async fn snapshot_members(&self, group: &GroupId, channel: &ChannelId) {
        match self.parts().platform.channel_occupants(group, channel).await {
            Ok(occupants) => {
                let users = occupants
                    .into_iter()
                    .filter(|o| !o.is_bot)
                    .map(|o| o.user_id);
                self.parts().membership.replace(group, users);
            }
            Err(e) => warn!(group = %group, error = %e, "Failed to list channel occupants"),
        }
    }

    /// Wire both directions against every ready peer sharing the secret.
    async fn wire_peers(&self, group: &GroupId, attempt: &str) -> Result<()> {
        let parts = self.parts();
        let peers = match parts.registry.secret_for(group).await? {
            Some(secret) => parts.registry.groups_by_secret(&secret, Some(group)).await?,
            None => {
                debug!(group = %group, "Group has no registration, nothing to wire");
                Vec::new()
            }
        };

        let Some(own) = parts.table.ready_session(group).await else {
            return Ok(());
        };

        let mut wired = 0;
        for peer in &peers {
            let Some(peer_session) = parts.table.ready_session(peer).await else {
                debug!(group = %group, peer = %peer, "Peer not ready, it wires on connect");
                continue;
            };
            parts
                .bridge
                .wire_bridge(Arc::clone(&own), Arc::clone(&peer_session));
            parts.bridge.wire_bridge(peer_session, Arc::clone(&own));
            wired += 1;
        }

        let mut slot = parts.table.lock(group).await;
        if let Some(conn) = slot.connection.as_mut() {
            if conn.attempt == attempt {
                conn.bridges_wired = true;
            }
        }
        drop(slot);

        if wired > 0 {
            info!(group = %group, peers = wired, "Bridges wired to peers");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Disconnect observer
    // -----------------------------------------------------------------------

    async fn ready_deadline_passed(&self, group: &GroupId, attempt: &str) {
        if self.teardown_if_current(group, attempt, "ready timeout").await {
            warn!(
                group = %group,
                attempt = %attempt,
                timeout_ms = self.inner.ready_timeout.as_millis() as u64,
                "Voice connection did not become ready"
            );
        }
    }

    async fn observe(
        self,
        group: GroupId,
        attempt: String,
        mut status_rx: watch::Receiver<SessionStatus>,
        token: CancellationToken,
    ) {
        let reached = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            reached = timeout(
                self.inner.ready_timeout,
                wait_for_status(&mut status_rx, |s| {
                    matches!(s, SessionStatus::Ready | SessionStatus::Destroyed)
                }),
            ) => reached,
        };
        match reached {
            Ok(Some(SessionStatus::Ready)) => {}
            Ok(_) => return,
            Err(_) => {
                self.ready_deadline_passed(&group, &attempt).await;
                return;
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }

            let status = *status_rx.borrow_and_update();
            match status {
                SessionStatus::Destroyed => return,
                SessionStatus::Disconnected => {
                    warn!(group = %group, attempt = %attempt, "Voice connection lost, waiting for recovery");
                    let window = self.inner.recovery_window;
                    let probe = tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        probe = timeout(
                            window,
                            wait_for_status(&mut status_rx, |s| {
                                s.is_recovering() || *s == SessionStatus::Destroyed
                            }),
                        ) => probe,
                    };

                    match probe {
                        Ok(Some(status)) if status.is_recovering() => {
                            info!(group = %group, status = ?status, "Voice connection recovering");
                        }
                        Ok(_) => return,
                        Err(_) => {
                            self.teardown_if_current(&group, &attempt, "recovery window elapsed")
                                .await;
                            return;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Release every per-group structure. Must run with the group's slot
    /// locked so no connect or cue can interleave.
    fn release_locked(&self, group: &GroupId, conn: ConnectionState) {
        let parts = self.parts();
        conn.observer.cancel();
        conn.session.destroy();
        let pipelines = parts.bridge.unwire_group(group);
        parts.cues.release(group);
        parts.membership.remove_group(group);
        info!(group = %group, attempt = %conn.attempt, pipelines, "Connection resources released");
    }

    async fn after_teardown(&self, group: &GroupId, reason: &str) {
        self.parts().presence.recompute().await;
        self.parts().events.publish(BridgeEvent::ConnectionLost {
            group: group.clone(),
            reason: reason.to_string(),
        });
    }

    /// Tear down only if the entry still belongs to `attempt`.
    async fn teardown_if_current(&self, group: &GroupId, attempt: &str, reason: &str) -> bool {
        let released = {
            let mut slot = self.parts().table.lock(group).await;
            if is_current(&slot, attempt) {
                slot.connection
                    .take()
                    .map(|conn| self.release_locked(group, conn))
                    .is_some()
            } else {
                false
            }
        };
        if released {
            warn!(group = %group, attempt = %attempt, reason, "Voice connection torn down");
            self.after_teardown(group, reason).await;
        }
        released
    }

    /// Destroy the group's session and release everything it owns. Returns
    /// false when the group had no entry.
    pub async fn release(&self, group: &GroupId) -> bool {
        let released = {
            let mut slot = self.parts().table.lock(group).await;
            slot.connection
                .take()
                .map(|conn| self.release_locked(group, conn))
                .is_some()
        };
        if released {
            self.after_teardown(group, "released").await;
        }
        released
    }

    /// Ensure every registered group, one after another.
    pub async fn reconnect_all(&self) -> Result<ReconnectSummary> {
        let registrations = self.parts().registry.all().await?;
        let mut summary = ReconnectSummary::default();

        for registration in registrations {
            summary.attempted += 1;
            match self
                .ensure_connection(&registration.group_id, &registration.channel_id)
                .await
            {
                Ok(_) => summary.ready += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(group = %registration.group_id, error = %e, "Reconnect failed");
                }
            }
        }

        info!(
            attempted = summary.attempted,
            ready = summary.ready,
            failed = summary.failed,
            "Reconnect sweep finished"
        );
        Ok(summary)
    }

    /// Release every group.
    pub async fn shutdown(&self) -> usize {
        let mut released = 0;
        for group in self.parts().table.connected_groups().await {
            if self.release(&group).await {
                released += 1;
            }
        }
        self.parts().bridge.shutdown();
        info!(released, "Connection manager shut down");
        released
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Record a user joining or leaving the group's monitored channel. Joins
    /// are only tracked while the group has a connection entry; the ready
    /// snapshot covers everyone else.
    pub async fn track_member(&self, group: &GroupId, user: &UserId, joined: bool) -> bool {
        let slot = self.parts().table.lock(group).await;
        if joined {
            slot.connection.is_some() && self.parts().membership.insert(group, user.clone())
        } else {
            self.parts().membership.remove(group, user)
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn status(&self, group: &GroupId) -> ConnectionStatus {
        self.parts().table.status(group).await
    }

    pub async fn is_connected(&self, group: &GroupId) -> bool {
        self.status(group).await == ConnectionStatus::Ready
    }

    pub async fn connected_groups(&self) -> Vec<GroupId> {
        self.parts().table.connected_groups().await
    }

    /// Channel and attempt id of the group's current entry.
    pub async fn entry_info(&self, group: &GroupId) -> Option<(ChannelId, String)> {
        let slot = self.parts().table.lock(group).await;
        slot.connection
            .as_ref()
            .map(|conn| (conn.channel_id.clone(), conn.attempt.clone()))
    }
}

fn is_current(slot: &GroupSlot, attempt: &str) -> bool {
    slot.connection
        .as_ref()
        .is_some_and(|conn| conn.attempt == attempt)
}
