//! Core primitives.
//!
//! Geometry and the seeded random generator every match draws from.

pub mod position;
pub mod rng;

// Re-export core types
pub use position::Position;
pub use rng::DeterministicRng;
