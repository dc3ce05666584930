use std::{collections::HashMap, sync::Arc};

use tokio::sync::{broadcast, mpsc, watch, RwLock};
use uuid::Uuid;

use super::events::{Outbound, ServerEvent};

const ANNOUNCEMENT_CAPACITY: usize = 256;

/// Sending half of a connection's outgoing frame queue.
pub type Outbox = mpsc::UnboundedSender<Outbound>;

/// An event for every active connection except the one it came from.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub origin: Uuid,
    pub event: ServerEvent,
}

struct Session {
    connection_id: Uuid,
    outbox: Outbox,
}

struct Inner {
    sessions: RwLock<HashMap<Uuid, Session>>,
    announcements: broadcast::Sender<Announcement>,
    shutdown: watch::Sender<bool>,
}

/// Which users are connected right now, and where to reach them.
///
/// One session per user: a newer connection replaces the older one.
#[derive(Clone)]
pub struct Presence {
    inner: Arc<Inner>,
}

impl Default for Presence {
    fn default() -> Self {
        Self::new()
    }
}

impl Presence {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: RwLock::new(HashMap::new()),
                announcements: broadcast::channel(ANNOUNCEMENT_CAPACITY).0,
                shutdown: watch::channel(false).0,
            }),
        }
    }

    /// Returns the connection id this registration replaced, if any.
    pub async fn register(&self, user_id: Uuid, connection_id: Uuid, outbox: Outbox) -> Option<Uuid> {
        self.inner
            .sessions
            .write()
            .await
            .insert(user_id, Session { connection_id, outbox })
            .map(|previous| previous.connection_id)
    }

    /// Removes the user only while `connection_id` is still their current session.
    pub async fn unregister(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let mut sessions = self.inner.sessions.write().await;
        match sessions.get(&user_id) {
            Some(session) if session.connection_id == connection_id => {
                sessions.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.sessions.read().await.contains_key(&user_id)
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.sessions.read().await.keys().copied().collect()
    }

    /// Pushes an event to the user's private channel. False when they are offline.
    pub async fn send_to(&self, user_id: Uuid, event: ServerEvent) -> bool {
        match self.inner.sessions.read().await.get(&user_id) {
            Some(session) => session.outbox.send(Outbound::Event(event)).is_ok(),
            None => false,
        }
    }

    pub fn announce(&self, origin: Uuid, event: ServerEvent) {
        // no receivers just means nobody else is connected
        let _ = self.inner.announcements.send(Announcement { origin, event });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Announcement> {
        self.inner.announcements.subscribe()
    }

    /// Drops every session and wakes anything waiting on [`Presence::closed`].
    pub async fn shutdown(&self) {
        let count = {
            let mut sessions = self.inner.sessions.write().await;
            let count = sessions.len();
            sessions.clear();
            count
        };
        self.inner.shutdown.send_replace(true);
        tracing::info!(sessions = count, "presence registry shut down");
    }

    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.inner.shutdown.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn later_connection_wins_and_stale_disconnect_is_ignored() {
        let presence = Presence::new();
        let user = Uuid::now_v7();
        let (first_tx, _first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        let (first, second) = (Uuid::now_v7(), Uuid::now_v7());

        assert_eq!(presence.register(user, first, first_tx).await, None);
        assert_eq!(presence.register(user, second, second_tx).await, Some(first));

        assert!(!presence.unregister(user, first).await);
        assert!(presence.is_online(user).await);

        assert!(presence.send_to(user, ServerEvent::UserOnline { user_id: user }).await);
        assert!(matches!(second_rx.try_recv(), Ok(Outbound::Event(ServerEvent::UserOnline { .. }))));

        assert!(presence.unregister(user, second).await);
        assert!(!presence.is_online(user).await);
        assert!(!presence.send_to(user, ServerEvent::UserOffline { user_id: user }).await);
    }

    #[tokio::test]
    async fn isolated_registries_do_not_share_state() {
        let (a, b) = (Presence::new(), Presence::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let user = Uuid::now_v7();
        a.register(user, Uuid::now_v7(), tx).await;

        assert_eq!(a.online_users().await, vec![user]);
        assert!(b.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_clears_sessions_and_resolves_closed() {
        let presence = Presence::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        presence.register(Uuid::now_v7(), Uuid::now_v7(), tx).await;

        let closed = presence.closed();
        presence.shutdown().await;
        closed.await;
        assert!(presence.online_users().await.is_empty());
    }
}
