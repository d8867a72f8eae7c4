//! Inter-tab message fanout.
//!
//! Models a browser extension's runtime messaging: every host tab holds a
//! subscription handle, and `ConfigStore` broadcasts through a single bus
//! shared by all of them. Delivery is best-effort; a tab that already
//! dropped its receiver (page closed) is simply never updated again.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Where a `profileChanged` message originated, carried through so a
/// receiving tab can avoid redundantly re-applying its own change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Inline,
    Panel,
}

/// Every notification the bus can fan out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusMessage {
    ProfileChanged { profile_name: String, origin: Origin },
    TokenApproximatorSettingsChanged,
}

/// Opaque identifier for a host tab, used only to exclude the initiator of a
/// broadcast from receiving its own message back.
pub type TabId = u64;

const CHANNEL_CAPACITY: usize = 64;

/// Shared fanout channel. Cloning is cheap; every subscriber gets its own
/// receiver via [`BroadcastBus::subscribe`].
#[derive(Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<(Option<TabId>, BusMessage)>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        BroadcastBus { tx }
    }

    /// Subscribe a tab. The returned handle filters out messages this same
    /// tab originated.
    pub fn subscribe(&self, tab_id: TabId) -> TabSubscription {
        TabSubscription {
            tab_id,
            rx: self.tx.subscribe(),
        }
    }

    /// Broadcast a message to every subscribed tab except `exclude_tab_id`.
    /// Failures (no tabs subscribed) are ignored, matching the bus's
    /// best-effort delivery contract.
    pub fn broadcast(&self, message: BusMessage, exclude_tab_id: Option<TabId>) {
        let _ = self.tx.send((exclude_tab_id, message));
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A single tab's view of the bus.
pub struct TabSubscription {
    tab_id: TabId,
    rx: broadcast::Receiver<(Option<TabId>, BusMessage)>,
}

impl TabSubscription {
    /// Await the next message addressed to this tab, silently skipping
    /// messages this tab itself originated and messages dropped due to a
    /// slow-receiver lag.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.rx.recv().await {
                Ok((exclude, msg)) => {
                    if exclude != Some(self.tab_id) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn excludes_originating_tab() {
        let bus = BroadcastBus::new();
        let mut tab_a = bus.subscribe(1);
        let mut tab_b = bus.subscribe(2);

        bus.broadcast(
            BusMessage::ProfileChanged {
                profile_name: "Default".into(),
                origin: Origin::Panel,
            },
            Some(1),
        );

        let received_b = tab_b.recv().await;
        match received_b {
            Some(BusMessage::ProfileChanged { profile_name, .. }) => {
                assert_eq!(profile_name, "Default")
            }
            other => panic!("unexpected message: {other:?}"),
        }

        // tab_a originated the change and should not see it echoed back.
        let result = tokio::time::timeout(std::time::Duration::from_millis(50), tab_a.recv()).await;
        assert!(result.is_err(), "excluded tab should not receive its own broadcast");
    }

    #[tokio::test]
    async fn delivers_to_all_non_excluded_tabs() {
        let bus = BroadcastBus::new();
        let mut tab_a = bus.subscribe(1);
        let mut tab_b = bus.subscribe(2);

        bus.broadcast(
            BusMessage::ProfileChanged {
                profile_name: "Work".into(),
                origin: Origin::Inline,
            },
            None,
        );

        for tab in [&mut tab_a, &mut tab_b] {
            match tab.recv().await {
                Some(BusMessage::ProfileChanged { profile_name, .. }) => {
                    assert_eq!(profile_name, "Work")
                }
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }
}
