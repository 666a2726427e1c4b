//! Network-wide status line.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use voicebridge_common::{BridgeEvent, EventBus};

use crate::membership::MembershipTable;
use crate::platform::VoicePlatform;

/// Render the activity text for the given totals.
pub fn format_status(users: usize, channels: usize, idle_text: &str) -> String {
    if channels == 0 {
        idle_text.to_string()
    } else {
        format!("{users} users in {channels} channels")
    }
}

/// Recomputes the status line from membership and pushes it to the platform.
pub struct PresenceAggregator {
    platform: Arc<dyn VoicePlatform>,
    membership: Arc<MembershipTable>,
    events: Arc<EventBus>,
    idle_text: String,
    enabled: bool,
    /// Last string successfully pushed. Held across the push so concurrent
    /// recomputes land in order.
    last: Mutex<Option<String>>,
}

impl PresenceAggregator {
    pub fn new(
        platform: Arc<dyn VoicePlatform>,
        membership: Arc<MembershipTable>,
        events: Arc<EventBus>,
        idle_text: impl Into<String>,
        enabled: bool,
    ) -> Self {
        Self {
            platform,
            membership,
            events,
            idle_text: idle_text.into(),
            enabled,
            last: Mutex::new(None),
        }
    }

    /// Current status string without pushing it.
    pub fn status(&self) -> String {
        let (users, channels) = self.membership.totals();
        format_status(users, channels, &self.idle_text)
    }

    pub async fn last_pushed(&self) -> Option<String> {
        self.last.lock().await.clone()
    }

    /// Push the current status. Unchanged text is not re-sent and failures
    /// are logged only.
    pub async fn recompute(&self) {
        if !self.enabled {
            return;
        }

        let mut last = self.last.lock().await;
        let status = self.status();
        if last.as_deref() == Some(status.as_str()) {
            return;
        }

        match self.platform.set_activity(&status).await {
            Ok(()) => {
                debug!(status = %status, "Presence updated");
                self.events.publish(BridgeEvent::PresenceChanged(status.clone()));
                *last = Some(status);
            }
            Err(e) => warn!(error = %e, "Failed to update presence"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::LoopbackPlatform;
    use voicebridge_common::{GroupId, UserId};

    fn aggregator(platform: Arc<LoopbackPlatform>) -> (PresenceAggregator, Arc<MembershipTable>) {
        let membership = Arc::new(MembershipTable::new());
        let presence = PresenceAggregator::new(
            platform,
            Arc::clone(&membership),
            Arc::new(EventBus::default()),
            "No active voice chats",
            true,
        );
        (presence, membership)
    }

    #[test]
    fn format_counts_and_idle() {
        assert_eq!(format_status(0, 0, "idle"), "idle");
        assert_eq!(format_status(5, 2, "idle"), "5 users in 2 channels");
    }

    #[tokio::test]
    async fn recompute_pushes_totals() {
        let platform = LoopbackPlatform::new();
        let (presence, membership) = aggregator(Arc::clone(&platform));

        membership.replace(&GroupId::from("a"), [UserId::from("1"), UserId::from("2")]);
        membership.replace(&GroupId::from("b"), [UserId::from("3")]);
        presence.recompute().await;

        assert_eq!(platform.last_activity().as_deref(), Some("3 users in 2 channels"));
    }

    #[tokio::test]
    async fn unchanged_status_is_not_resent() {
        let platform = LoopbackPlatform::new();
        let (presence, _membership) = aggregator(Arc::clone(&platform));

        presence.recompute().await;
        presence.recompute().await;

        assert_eq!(platform.activity_history(), vec!["No active voice chats".to_string()]);
    }

    #[tokio::test]
    async fn failures_are_swallowed_and_retried_later() {
        let platform = LoopbackPlatform::new();
        let (presence, _membership) = aggregator(Arc::clone(&platform));

        platform.set_fail_activity(true);
        presence.recompute().await;
        assert!(presence.last_pushed().await.is_none());

        platform.set_fail_activity(false);
        presence.recompute().await;
        assert_eq!(presence.last_pushed().await.as_deref(), Some("No active voice chats"));
    }
}
