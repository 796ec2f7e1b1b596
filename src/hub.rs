//! In-process fan-out to connected dashboards.
//!
//! The [`BroadcastHub`] is an explicit connection manager: every component
//! that publishes receives it through state, there is no ambient global.
//! Subscribers are WebSocket tasks holding the receiving half of an
//! unbounded channel.
//!
//! Notices carry identifiers, not documents: a notice is a signal to
//! re-pull full state. There is no buffering or replay: a subscriber that
//! connects after a publish never sees it. Delivery is best-effort and
//! independent per subscriber; one dead connection fires the
//! `on_send_failure` hook and the rest still receive. Subscribers leave the
//! registry only on explicit [`BroadcastHub::unsubscribe`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::event::TicketAction;

/// A change notification pushed to every dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notice {
    /// A community's configuration document was replaced.
    #[serde(rename = "config:update")]
    ConfigUpdate {
        #[serde(rename = "communityId")]
        community_id: String,
        at: String,
    },

    /// A community's stats document was folded.
    #[serde(rename = "stats:update")]
    StatsUpdate {
        #[serde(rename = "communityId")]
        community_id: String,
        at: String,
    },

    /// A ticket opened or closed.
    #[serde(rename = "ticket:event")]
    TicketEvent {
        #[serde(rename = "communityId")]
        community_id: String,
        action: TicketAction,
        at: String,
    },
}

impl Notice {
    pub fn config_update(community_id: impl Into<String>) -> Self {
        Notice::ConfigUpdate {
            community_id: community_id.into(),
            at: Utc::now().to_rfc3339(),
        }
    }

    pub fn stats_update(community_id: impl Into<String>) -> Self {
        Notice::StatsUpdate {
            community_id: community_id.into(),
            at: Utc::now().to_rfc3339(),
        }
    }

    pub fn ticket_event(community_id: impl Into<String>, action: TicketAction) -> Self {
        Notice::TicketEvent {
            community_id: community_id.into(),
            action,
            at: Utc::now().to_rfc3339(),
        }
    }
}

/// Identifies one subscriber connection for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Lifecycle hooks injected into the hub.
///
/// The default implementation only logs; tests inject recording hooks.
pub trait HubHooks: Send + Sync {
    fn on_connect(&self, id: SubscriberId) {
        debug!(subscriber = %id, "Subscriber connected");
    }

    fn on_disconnect(&self, id: SubscriberId) {
        debug!(subscriber = %id, "Subscriber disconnected");
    }

    fn on_send_failure(&self, id: SubscriberId) {
        warn!(subscriber = %id, "Delivery to subscriber failed, leaving it registered");
    }
}

struct TraceHooks;

impl HubHooks for TraceHooks {}

struct HubInner {
    subscribers: RwLock<HashMap<SubscriberId, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
    hooks: Arc<dyn HubHooks>,
}

/// Thread-safe, cloneable subscriber registry.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_hooks(Arc::new(TraceHooks))
    }

    pub fn with_hooks(hooks: Arc<dyn HubHooks>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                hooks,
            }),
        }
    }

    /// Register a new subscriber; returns its id and the message stream.
    pub async fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<String>) {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.write().await.insert(id, tx);
        self.inner.hooks.on_connect(id);
        (id, rx)
    }

    /// Remove a subscriber. The only way out of the registry.
    pub async fn unsubscribe(&self, id: SubscriberId) {
        if self.inner.subscribers.write().await.remove(&id).is_some() {
            self.inner.hooks.on_disconnect(id);
        }
    }

    /// Serialize once and deliver to every registered subscriber.
    ///
    /// Returns how many deliveries succeeded. A failed send leaves the
    /// subscriber registered; cleanup happens on its own explicit close.
    pub async fn publish(&self, notice: &Notice) -> usize {
        let payload = match serde_json::to_string(notice) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize notice, dropping it");
                return 0;
            }
        };

        let subscribers = self.inner.subscribers.read().await;
        let mut delivered = 0;
        for (id, tx) in subscribers.iter() {
            if tx.send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                self.inner.hooks.on_send_failure(*id);
            }
        }

        debug!(
            delivered,
            total = subscribers.len(),
            "Notice published"
        );
        delivered
    }

    /// Currently registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().await.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
