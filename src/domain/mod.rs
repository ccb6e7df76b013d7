//! Domain layer - Core data types and port definitions
//!
//! This module defines the core traits (ports) that adapters implement,
//! following hexagonal architecture principles.

pub mod catalog;
pub mod clock;
pub mod ports;

pub use catalog::*;
pub use clock::{ManualClock, SystemClock};
pub use ports::*;
