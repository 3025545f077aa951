// ============================================================================
// Core Actor Abstractions
// ============================================================================
//
// Health types and the probe trait shared by the infrastructure actors.
//
// ============================================================================

pub mod health;

// Re-export core types
pub use health::*;
