use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use crate::domain::order::UserId;
use crate::metrics::Metrics;

use super::connection::{
    CloseReason, ConnectionId, ConnectionSettings, PushConnection, PushStream,
};
use super::frame::Frame;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to encode notification payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of fanning one event out to a user
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub pruned: usize,
}

struct RegistryInner {
    connections: DashMap<UserId, Vec<Arc<PushConnection>>>,
    settings: ConnectionSettings,
    metrics: Arc<Metrics>,
    accepting: AtomicBool,
}

impl RegistryInner {
    /// Drop one connection; the user's entry goes away with its last connection
    fn remove(&self, user_id: UserId, connection_id: ConnectionId, reason: &str) -> bool {
        let removed = match self.connections.get_mut(&user_id) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|c| c.id() != connection_id);
                entry.len() != before
            }
            None => false,
        };

        self.connections.remove_if(&user_id, |_, list| list.is_empty());

        if removed {
            self.metrics.record_connection_closed(reason);
            tracing::debug!(
                user_id = user_id,
                connection_id = %connection_id,
                reason = reason,
                "Push connection removed"
            );
        }
        removed
    }
}

// ============================================================================
// Subscriber Registry - open push connections per user
// ============================================================================
//
// - A user may hold any number of connections; each receives every event
// - Entries are removed when the connection closes (client gone, timeout,
//   failed write, shutdown); users with no connections have no entry
// - Dispatch writes to a snapshot, so it never holds a map guard across an
//   await and never races a concurrent register/unregister
//
// Cloning is cheap; all clones share one registry.
//
// ============================================================================

#[derive(Clone)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriberRegistry {
    pub fn new(settings: ConnectionSettings, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connections: DashMap::new(),
                settings,
                metrics,
                accepting: AtomicBool::new(true),
            }),
        }
    }

    /// Open a connection for `user_id` and send the `connected` frame
    ///
    /// The returned stream is the response body. If the first frame cannot be
    /// written the connection is already unregistered and the stream ends.
    pub async fn subscribe(&self, user_id: UserId) -> PushStream {
        let (connection, stream) = PushConnection::channel(user_id, &self.inner.settings);
        let connection = self.register(connection);

        if let Err(e) = connection.send(Frame::connected()).await {
            tracing::warn!(user_id = user_id, error = %e, "Failed to send connected frame");
            self.unregister(user_id, connection.id());
        } else {
            tracing::info!(
                user_id = user_id,
                connection_id = %connection.id(),
                "Push connection opened"
            );
        }

        stream
    }

    /// Add a connection under its user and hook its close into removal
    ///
    /// After `shutdown` the connection is closed immediately instead.
    pub fn register(&self, connection: PushConnection) -> Arc<PushConnection> {
        let user_id = connection.user_id();
        let connection = Arc::new(connection);

        if !self.is_accepting() {
            connection.close(CloseReason::Completed);
            return connection;
        }

        self.inner
            .connections
            .entry(user_id)
            .or_default()
            .push(connection.clone());
        self.inner.metrics.record_connection_opened();

        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let connection_id = connection.id();
        connection.on_close(move |reason| {
            if let Some(inner) = registry.upgrade() {
                inner.remove(user_id, connection_id, reason.label());
            }
        });

        // shutdown may have drained the map between the check and the insert
        if !self.is_accepting() {
            connection.close(CloseReason::Completed);
        }

        connection
    }

    /// Remove a connection; a no-op when it is not registered
    pub fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        self.inner.remove(user_id, connection_id, "unregistered")
    }

    /// Serialize `payload` once and write it to every connection of `user_id`
    ///
    /// Connections whose write fails are pruned. A user without connections
    /// is not an error.
    pub async fn dispatch<T>(
        &self,
        user_id: UserId,
        event_name: &str,
        payload: &T,
    ) -> Result<DispatchOutcome, DispatchError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let connections = self.snapshot(user_id);
        if connections.is_empty() {
            tracing::debug!(user_id = user_id, event = event_name, "No push connections for user");
            return Ok(DispatchOutcome::default());
        }

        let started = Instant::now();
        let frame = Frame::new(event_name, serde_json::to_string(payload)?);

        let results = join_all(connections.iter().map(|connection| {
            let frame = frame.clone();
            async move { (connection, connection.send(frame).await) }
        }))
        .await;

        let mut outcome = DispatchOutcome::default();
        for (connection, result) in results {
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        user_id = user_id,
                        connection_id = %connection.id(),
                        event = event_name,
                        error = %e,
                        "Push delivery failed, dropping connection"
                    );
                    self.unregister(user_id, connection.id());
                    outcome.pruned += 1;
                }
            }
        }

        self.inner
            .metrics
            .record_dispatch(event_name, outcome.delivered, started.elapsed().as_secs_f64());

        Ok(outcome)
    }

    /// Close every connection and refuse new ones
    pub fn shutdown(&self) -> usize {
        self.inner.accepting.store(false, Ordering::SeqCst);

        let all: Vec<Arc<PushConnection>> = self
            .inner
            .connections
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();

        for connection in &all {
            connection.close(CloseReason::Completed);
        }

        tracing::info!(closed = all.len(), "Push connections closed for shutdown");
        all.len()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.inner
            .connections
            .get(&user_id)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    pub fn user_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn total_connections(&self) -> usize {
        self.inner.connections.iter().map(|entry| entry.len()).sum()
    }

    fn snapshot(&self, user_id: UserId) -> Vec<Arc<PushConnection>> {
        self.inner
            .connections
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}
