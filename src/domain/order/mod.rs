// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (ids, OrderStatus)
// - Aggregate (Order, NewOrder, status transitions)
// - Commands (CreateOrder, UpdateOrderStatus) and their validation
// - Events (OrderCreatedEvent, OrderStatusChangedEvent)
// - Errors (OrderError)
// - Command Handler (OrderCommandHandler)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
