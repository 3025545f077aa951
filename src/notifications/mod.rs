// ============================================================================
// Notifications - push delivery of order events to connected users
// ============================================================================
//
// - frame:      server-sent event encoding
// - connection: one open push connection (server half + response body)
// - registry:   open connections per user, fan-out and pruning
// - consumer:   bus messages to registry dispatches
//
// ============================================================================

mod connection;
mod consumer;
mod frame;
mod registry;

pub use connection::{
    CloseReason, ConnectionId, ConnectionSettings, DeliveryError, FrameSink, PushBody,
    PushConnection, PushStream,
};
pub use consumer::{
    decode, DecodeError, HandleOutcome, NotificationConsumer, CONSUMED_TOPICS,
    ORDER_CREATED_FRAME, ORDER_STATUS_CHANGED_FRAME,
};
pub use frame::{Frame, CONNECTED_EVENT, KEEP_ALIVE};
pub use registry::{DispatchError, DispatchOutcome, SubscriberRegistry};
