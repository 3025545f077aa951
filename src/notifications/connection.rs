use actix_web::web::Bytes;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::domain::order::UserId;

use super::frame::{Frame, KEEP_ALIVE};

// ============================================================================
// Push Connection
// ============================================================================
//
// A subscription has two halves:
// - PushConnection: server side, held by the registry, accepts frames
// - PushStream:     client side, turned into the streaming HTTP body
//
// Both share a Lifecycle. Whichever half notices the end first (client gone,
// idle timeout, failed write, shutdown) closes it, and the close hook runs
// exactly once with the reason.
//
// ============================================================================

pub type ConnectionId = Uuid;

/// Streaming body of a push response
pub type PushBody = BoxStream<'static, Result<Bytes, Infallible>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The stream ended: client went away or the server closed it
    Completed,
    /// No event frame within the idle timeout
    TimedOut,
    /// A write failed
    Errored(String),
}

impl CloseReason {
    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::Completed => "completed",
            CloseReason::TimedOut => "timeout",
            CloseReason::Errored(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection is closed")]
    Closed,

    #[error("write did not complete within {0:?}")]
    TimedOut(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Interval between keep-alive comments
    pub keepalive: Duration,
    /// Close after this long without an event frame; `None` never expires
    pub idle_timeout: Option<Duration>,
    /// Upper bound for a single frame write
    pub write_timeout: Duration,
    /// Frames buffered per connection before writes start waiting
    pub buffer: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(15),
            idle_timeout: None,
            write_timeout: Duration::from_secs(2),
            buffer: 64,
        }
    }
}

type CloseHook = Box<dyn FnOnce(CloseReason) + Send>;

#[derive(Default)]
struct LifecycleState {
    hook: Option<CloseHook>,
    closed: Option<CloseReason>,
}

#[derive(Default)]
struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Lifecycle {
    fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns false if the connection was already closed
    fn close(&self, reason: CloseReason) -> bool {
        let hook = {
            let mut state = self.lock();
            if state.closed.is_some() {
                return false;
            }
            state.closed = Some(reason.clone());
            state.hook.take()
        };

        if let Some(hook) = hook {
            hook(reason);
        }
        true
    }

    /// Runs `hook` right away if the connection is already closed
    fn on_close(&self, hook: CloseHook) {
        let mut state = self.lock();
        match state.closed.clone() {
            Some(reason) => {
                drop(state);
                hook(reason);
            }
            None => state.hook = Some(hook),
        }
    }

    fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }
}

/// Transport a connection writes frames into
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn write(&self, frame: Frame) -> Result<(), DeliveryError>;

    /// Stop accepting frames
    fn close(&self) {}
}

/// Sink feeding the in-process channel behind a PushStream
struct ChannelSink {
    tx: Mutex<Option<mpsc::Sender<Frame>>>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn write(&self, frame: Frame) -> Result<(), DeliveryError> {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(DeliveryError::Closed)?;

        tx.send(frame).await.map_err(|_| DeliveryError::Closed)
    }

    fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

pub struct PushConnection {
    id: ConnectionId,
    user_id: UserId,
    sink: Box<dyn FrameSink>,
    lifecycle: Arc<Lifecycle>,
    write_timeout: Duration,
}

impl PushConnection {
    /// A connection over an arbitrary sink (no client-side stream)
    pub fn with_sink(user_id: UserId, sink: Box<dyn FrameSink>, write_timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            sink,
            lifecycle: Arc::new(Lifecycle::default()),
            write_timeout,
        }
    }

    /// A connection plus the stream its frames come out of
    pub fn channel(user_id: UserId, settings: &ConnectionSettings) -> (Self, PushStream) {
        let (tx, rx) = mpsc::channel(settings.buffer.max(1));
        let sink = ChannelSink {
            tx: Mutex::new(Some(tx)),
        };
        let connection = Self::with_sink(user_id, Box::new(sink), settings.write_timeout);

        let stream = PushStream {
            connection_id: connection.id,
            rx,
            guard: CloseGuard(connection.lifecycle.clone()),
            keepalive: settings.keepalive,
            idle_timeout: settings.idle_timeout,
        };

        (connection, stream)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    /// Write one frame, waiting at most the write timeout
    ///
    /// A closed connection is never written to. A failed write closes the
    /// connection with `CloseReason::Errored`.
    pub async fn send(&self, frame: Frame) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }

        let result = match tokio::time::timeout(self.write_timeout, self.sink.write(frame)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::TimedOut(self.write_timeout)),
        };

        if let Err(e) = &result {
            self.close(CloseReason::Errored(e.to_string()));
        }
        result
    }

    /// Close from the server side; false if it was already closed
    pub fn close(&self, reason: CloseReason) -> bool {
        self.sink.close();
        self.lifecycle.close(reason)
    }

    /// Register the single close callback
    pub fn on_close<F>(&self, hook: F)
    where
        F: FnOnce(CloseReason) + Send + 'static,
    {
        self.lifecycle.on_close(Box::new(hook));
    }
}

/// Closes the lifecycle when the client half is dropped
struct CloseGuard(Arc<Lifecycle>);

impl CloseGuard {
    fn close(&self, reason: CloseReason) {
        self.0.close(reason);
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.close(CloseReason::Completed);
    }
}

/// Client half of a connection
pub struct PushStream {
    connection_id: ConnectionId,
    rx: mpsc::Receiver<Frame>,
    guard: CloseGuard,
    keepalive: Duration,
    idle_timeout: Option<Duration>,
}

struct StreamState {
    stream: PushStream,
    keepalive: tokio::time::Interval,
    last_event: Instant,
}

impl StreamState {
    async fn next_chunk(&mut self) -> Option<Bytes> {
        let idle_deadline = self.stream.idle_timeout.map(|t| self.last_event + t);

        tokio::select! {
            frame = self.stream.rx.recv() => match frame {
                Some(frame) => {
                    self.last_event = Instant::now();
                    Some(frame.encode())
                }
                None => {
                    self.stream.guard.close(CloseReason::Completed);
                    None
                }
            },
            _ = self.keepalive.tick() => Some(Bytes::from_static(KEEP_ALIVE)),
            _ = idle(idle_deadline) => {
                tracing::debug!(
                    connection_id = %self.stream.connection_id,
                    "Push connection idle timeout"
                );
                self.stream.guard.close(CloseReason::TimedOut);
                None
            }
        }
    }
}

async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

impl PushStream {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Body for a `text/event-stream` response
    ///
    /// Yields encoded frames and keep-alive comments. Dropping the stream
    /// counts as the client disconnecting.
    pub fn into_body(self) -> PushBody {
        let mut keepalive = tokio::time::interval_at(Instant::now() + self.keepalive, self.keepalive);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let state = StreamState {
            stream: self,
            keepalive,
            last_event: Instant::now(),
        };

        stream::unfold(state, |mut state| async move {
            let chunk = state.next_chunk().await?;
            Some((Ok::<_, Infallible>(chunk), state))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            keepalive: Duration::from_secs(60),
            idle_timeout: None,
            write_timeout: Duration::from_millis(100),
            buffer: 4,
        }
    }

    fn counting_hook(connection: &PushConnection) -> (Arc<AtomicUsize>, Arc<Mutex<Option<CloseReason>>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let reason = Arc::new(Mutex::new(None));
        let (c, r) = (calls.clone(), reason.clone());
        connection.on_close(move |why| {
            c.fetch_add(1, Ordering::SeqCst);
            *r.lock().unwrap() = Some(why);
        });
        (calls, reason)
    }

    #[tokio::test]
    async fn test_frames_reach_the_stream() {
        let (connection, stream) = PushConnection::channel(1, &settings());
        let mut body = stream.into_body();

        connection.send(Frame::new("order-created", "{}")).await.unwrap();

        let chunk = body.next().await.unwrap().unwrap();
        assert_eq!(chunk, Frame::new("order-created", "{}").encode());
    }

    #[tokio::test]
    async fn test_dropping_stream_fires_completion_once() {
        let (connection, stream) = PushConnection::channel(1, &settings());
        let (calls, reason) = counting_hook(&connection);

        drop(stream);

        assert!(connection.is_closed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*reason.lock().unwrap(), Some(CloseReason::Completed));

        // Later failures do not fire again
        assert_eq!(connection.send(Frame::new("x", "y")).await, Err(DeliveryError::Closed));
        assert!(!connection.close(CloseReason::Completed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hook_registered_after_close_still_runs() {
        let (connection, stream) = PushConnection::channel(1, &settings());
        drop(stream);

        let (calls, _) = counting_hook(&connection);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_full_buffer_times_out_and_errors() {
        let mut config = settings();
        config.buffer = 1;
        let (connection, _stream) = PushConnection::channel(1, &config);
        let (calls, reason) = counting_hook(&connection);

        connection.send(Frame::new("a", "1")).await.unwrap();
        let result = connection.send(Frame::new("a", "2")).await;

        assert!(matches!(result, Err(DeliveryError::TimedOut(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(*reason.lock().unwrap(), Some(CloseReason::Errored(_))));
    }

    #[tokio::test]
    async fn test_server_close_ends_stream_after_buffered_frames() {
        let (connection, stream) = PushConnection::channel(1, &settings());
        let mut body = stream.into_body();

        connection.send(Frame::new("a", "1")).await.unwrap();
        assert!(connection.close(CloseReason::Completed));

        assert!(body.next().await.is_some());
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_connection() {
        let mut config = settings();
        config.idle_timeout = Some(Duration::from_millis(50));
        let (connection, stream) = PushConnection::channel(1, &config);
        let (_, reason) = counting_hook(&connection);

        let mut body = stream.into_body();
        assert!(body.next().await.is_none());

        assert_eq!(*reason.lock().unwrap(), Some(CloseReason::TimedOut));
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_keepalive_comment_on_quiet_connection() {
        let mut config = settings();
        config.keepalive = Duration::from_millis(20);
        let (_connection, stream) = PushConnection::channel(1, &config);

        let mut body = stream.into_body();
        let chunk = body.next().await.unwrap().unwrap();
        assert_eq!(chunk, Bytes::from_static(KEEP_ALIVE));
    }
}
