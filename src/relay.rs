//! Best-effort push channel to connected browsers. Fan-out is a bounded
//! broadcast: send-or-drop per subscriber, at-most-once, no history replay
//! for viewers that join late. A viewer that disconnects mid-broadcast just
//! stops receiving; nobody else is affected.

use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use crate::aggregator::Aggregator;
use crate::cache::SnapshotCache;
use crate::models::Snapshot;

const CHANNEL_CAPACITY: usize = 64;

/// Messages delivered to subscribed viewers, tagged for the browser-side
/// dispatcher.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    StatsUpdate {
        #[serde(flatten)]
        stats: Snapshot,
    },
    NodeStatusChange {
        id: String,
        name: String,
        online: bool,
    },
    UserActivity {
        title: &'static str,
        description: &'static str,
        icon: &'static str,
        color: &'static str,
    },
}

#[derive(Clone)]
pub struct PushRelay {
    tx: broadcast::Sender<PushMessage>,
}

impl PushRelay {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.tx.subscribe()
    }

    /// Sends to every current subscriber. Returns how many were reached;
    /// zero subscribers is not an error.
    pub fn broadcast(&self, msg: PushMessage) -> usize {
        self.tx.send(msg).unwrap_or(0)
    }

    /// Emission point for node online/offline transitions. Callers that
    /// detect a transition report it here; the relay itself does no
    /// detection.
    pub fn node_status_change(&self, id: &str, name: &str, online: bool) {
        self.broadcast(PushMessage::NodeStatusChange {
            id: id.to_string(),
            name: name.to_string(),
            online,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for PushRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic stats refresh: fetch a snapshot, store it through the cache's
/// write ticket, broadcast it. A refresh that lost the ticket race is not
/// broadcast either, so viewers never see values older than the cache.
pub fn spawn_stats_loop(
    relay: PushRelay,
    aggregator: Arc<Aggregator>,
    cache: Arc<SnapshotCache>,
    interval_secs: u64,
) {
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tick.tick().await;
            let ticket = cache.begin();
            let snapshot = aggregator.fetch_snapshot().await;
            if cache.store(ticket, snapshot) {
                let reached = relay.broadcast(PushMessage::StatsUpdate { stats: snapshot });
                debug!(?snapshot, reached, "stats update broadcast");
            }
        }
    });
}

/// Fixed catalog of decorative activity entries for demo installs.
const DEMO_ACTIVITIES: [PushMessage; 4] = [
    PushMessage::UserActivity {
        title: "User authenticated",
        description: "Successful login from new device",
        icon: "fas fa-sign-in-alt",
        color: "success",
    },
    PushMessage::UserActivity {
        title: "Key expired",
        description: "Pre-auth key reached expiration",
        icon: "fas fa-key",
        color: "warning",
    },
    PushMessage::UserActivity {
        title: "Route updated",
        description: "Network routing table modified",
        icon: "fas fa-route",
        color: "info",
    },
    PushMessage::UserActivity {
        title: "Health check",
        description: "System health verification passed",
        icon: "fas fa-heartbeat",
        color: "success",
    },
];

/// Emits a pseudo-random catalog entry on a fixed interval. Simulated
/// traffic, not telemetry; only runs when `updates.demo_activity` is set.
pub fn spawn_demo_activity(relay: PushRelay, interval_secs: u64) {
    info!("demo activity feed enabled");
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs.max(1)));
        // Skip the immediate first tick; the feed stays quiet for one full
        // interval after startup.
        tick.tick().await;
        loop {
            tick.tick().await;
            let msg = {
                let mut rng = rand::thread_rng();
                DEMO_ACTIVITIES.choose(&mut rng).cloned()
            };
            if let Some(msg) = msg {
                relay.broadcast(msg);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_msg(total_nodes: usize) -> PushMessage {
        PushMessage::StatsUpdate {
            stats: Snapshot {
                total_nodes,
                ..Snapshot::default()
            },
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let relay = PushRelay::new();
        let mut a = relay.subscribe();
        let mut b = relay.subscribe();

        assert_eq!(relay.broadcast(stats_msg(3)), 2);

        for rx in [&mut a, &mut b] {
            match rx.recv().await.unwrap() {
                PushMessage::StatsUpdate { stats } => assert_eq!(stats.total_nodes, 3),
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_poison_the_rest() {
        let relay = PushRelay::new();
        let gone = relay.subscribe();
        let mut stays = relay.subscribe();
        drop(gone);

        assert_eq!(relay.broadcast(stats_msg(1)), 1);
        assert!(matches!(
            stays.recv().await.unwrap(),
            PushMessage::StatsUpdate { .. }
        ));
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_fine() {
        let relay = PushRelay::new();
        assert_eq!(relay.broadcast(stats_msg(1)), 0);
        assert_eq!(relay.subscriber_count(), 0);
    }

    #[test]
    fn messages_carry_the_wire_type_tags() {
        let stats = serde_json::to_value(stats_msg(5)).unwrap();
        assert_eq!(stats["type"], "stats_update");
        assert_eq!(stats["totalNodes"], 5);

        let relay = PushRelay::new();
        let mut rx = relay.subscribe();
        relay.node_status_change("7", "laptop", false);
        let change = serde_json::to_value(rx.try_recv().unwrap()).unwrap();
        assert_eq!(change["type"], "node_status_change");
        assert_eq!(change["online"], false);

        let activity = serde_json::to_value(&DEMO_ACTIVITIES[0]).unwrap();
        assert_eq!(activity["type"], "user_activity");
        assert_eq!(activity["color"], "success");
    }
}
