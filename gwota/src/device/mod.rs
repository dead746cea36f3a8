//! Device-side models used for testing and development.

pub mod emulator;

// Re-export for convenience
pub use emulator::{FaultPlan, GatewayEmulator};
