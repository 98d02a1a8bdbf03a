//! # Shipwreck Match Server
//!
//! Authoritative server core for Shipwreck, a social-deduction game: one
//! hidden infiltrator sabotages the boat's fuel while disguised among
//! NPCs, and the castaways must refuel, vote it out and outlast the clock.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SHIPWRECK SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Primitives                               │
//! │  ├── position.rs  - Island coordinates                       │
//! │  └── rng.rs       - Seeded Xorshift128+ PRNG                 │
//! │                                                              │
//! │  game/            - Match logic (transport independent)      │
//! │  ├── avatar.rs    - Players and NPCs                         │
//! │  ├── task.rs      - Repair and contest tasks                 │
//! │  ├── tally.rs     - Strict-maximum tally                     │
//! │  ├── meeting.rs   - Chat and votes                           │
//! │  ├── state.rs     - Match state machine                      │
//! │  ├── rules.rs     - Action validation                        │
//! │  ├── population.rs- Roles, NPCs and tasks at start           │
//! │  └── snapshot.rs  - Public match view                        │
//! │                                                              │
//! │  network/         - Concurrency and publication              │
//! │  ├── session.rs   - Match registry                           │
//! │  ├── engine.rs    - Tickers and vote timeouts                │
//! │  ├── service.rs   - Request handling                         │
//! │  ├── broadcast.rs - Outbound sinks                           │
//! │  └── protocol.rs  - Message types                            │
//! │                                                              │
//! │  config.rs        - Match and server settings                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Each match lives behind its own `tokio::sync::RwLock`. Requests and
//! the background clock take the same lock, so their combined effect is
//! always that of some serial order. No lock is held while publishing.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::config::{ConfigError, MatchConfig, ServerConfig};
pub use crate::core::position::Position;
pub use crate::core::rng::DeterministicRng;
pub use crate::game::{ActionError, Match, MatchStatus, Player};
pub use crate::network::{GameEngine, GameService, MatchHandle, MatchRegistry, ServerMessage};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Countdown length in seconds.
pub const MATCH_DURATION_SECONDS: u32 = 300;

/// Length of one fuel window cycle in seconds. Windows open on odd cycles.
pub const FUEL_WINDOW_CYCLE_SECONDS: u32 = 60;

/// Players required to start a match.
pub const MIN_PLAYERS: usize = 5;

/// Maximum distance for an elimination.
pub const ELIMINATION_RADIUS: f64 = 20.0;

/// Where the boat sits.
pub const BOAT_POSITION: Position = Position::new(112.0, 0.0);

/// Maximum distance from the boat for fuel actions.
pub const FUEL_RADIUS: f64 = 40.0;

/// Default fuel delta per action.
pub const FUEL_STEP: f64 = 5.0;

/// Seconds before a meeting is forced to a verdict.
pub const VOTE_DURATION_SECONDS: u32 = 30;

/// NPCs spawned per match.
pub const NPC_COUNT: usize = 6;

/// Per-axis NPC step amplitude.
pub const NPC_MOVEMENT_SPEED: f64 = 0.5;

/// Half the side of the square island.
pub const ISLAND_HALF_EXTENT: f64 = 150.0;
