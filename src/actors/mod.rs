// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for asynchronous, concurrent operations.
//
// Structure:
// - core/           - Health types and the HealthProbe trait
// - infrastructure/ - Concrete infrastructure actors (consumer, health, coordinator)
//
// Note: Order logic runs in OrderCommandHandler, NOT in actors.
//       Actors are reserved for infrastructure concerns only.
//
// ============================================================================

// Private module declarations
mod core;
mod infrastructure;

// Re-export only what's needed in the public API
pub use infrastructure::{CoordinatorActor, EventConsumerActor, HealthMonitorActor, Shutdown};
pub use infrastructure::{EventBusProbe, PushRegistryProbe};

// Internal re-exports for use within the crate
pub(crate) use core::HealthStatus;
pub(crate) use infrastructure::GetSystemHealth;
