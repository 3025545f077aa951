// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// Reusable infrastructure actors for system concerns:
// - Event consumption (bus to push registry)
// - Health monitoring and the probes it polls
// - Coordination and graceful shutdown
//
// ============================================================================

// Private module declarations
mod coordinator;
mod event_consumer;
mod health_monitor;
mod probes;

// Re-export for public API
pub use coordinator::{CoordinatorActor, Shutdown};
pub use event_consumer::EventConsumerActor;
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
pub use probes::{EventBusProbe, PushRegistryProbe};
