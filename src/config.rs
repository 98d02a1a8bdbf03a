//! Server and Match Configuration
//!
//! Every tunable rule constant lives in [`MatchConfig`]; process-level
//! settings live in [`ServerConfig`]. Both default to the values in
//! the crate root and can be overridden through `SHIPWRECK_*`
//! environment variables.

use std::str::FromStr;
use std::time::Duration;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::position::Position;
use crate::{
    BOAT_POSITION, ELIMINATION_RADIUS, FUEL_RADIUS, FUEL_STEP, FUEL_WINDOW_CYCLE_SECONDS,
    ISLAND_HALF_EXTENT, MATCH_DURATION_SECONDS, MIN_PLAYERS, NPC_COUNT, NPC_MOVEMENT_SPEED,
    VOTE_DURATION_SECONDS,
};

/// Rule constants for a single match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Countdown length in seconds.
    pub match_duration_seconds: u32,
    /// Length of one fuel window cycle (closed, then open) in seconds.
    pub fuel_window_cycle_seconds: u32,
    /// Players required to start.
    pub min_players: usize,
    /// Maximum infiltrator-to-target distance for an elimination.
    pub elimination_radius: f64,
    /// Where the boat (fuel gauge) sits.
    pub boat_position: Position,
    /// Maximum actor-to-boat distance for fuel actions.
    pub fuel_radius: f64,
    /// Fuel delta applied when a request omits an amount.
    pub fuel_step: f64,
    /// Seconds a meeting stays open before the vote is forced.
    pub vote_duration_seconds: u32,
    /// NPCs spawned at match start.
    pub npc_count: usize,
    /// NPC per-axis movement amplitude per tick.
    pub npc_movement_speed: f64,
    /// Half the side of the square island.
    pub island_half_extent: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_duration_seconds: MATCH_DURATION_SECONDS,
            fuel_window_cycle_seconds: FUEL_WINDOW_CYCLE_SECONDS,
            min_players: MIN_PLAYERS,
            elimination_radius: ELIMINATION_RADIUS,
            boat_position: BOAT_POSITION,
            fuel_radius: FUEL_RADIUS,
            fuel_step: FUEL_STEP,
            vote_duration_seconds: VOTE_DURATION_SECONDS,
            npc_count: NPC_COUNT,
            npc_movement_speed: NPC_MOVEMENT_SPEED,
            island_half_extent: ISLAND_HALF_EXTENT,
        }
    }
}

impl MatchConfig {
    /// Meeting timeout as a `Duration`.
    pub fn vote_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.vote_duration_seconds))
    }

    /// Override fields from `SHIPWRECK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Self {
            match_duration_seconds: env_or("SHIPWRECK_MATCH_DURATION", defaults.match_duration_seconds)?,
            fuel_window_cycle_seconds: env_or("SHIPWRECK_FUEL_CYCLE", defaults.fuel_window_cycle_seconds)?,
            min_players: env_or("SHIPWRECK_MIN_PLAYERS", defaults.min_players)?,
            elimination_radius: env_or("SHIPWRECK_ELIMINATION_RADIUS", defaults.elimination_radius)?,
            boat_position: defaults.boat_position,
            fuel_radius: env_or("SHIPWRECK_FUEL_RADIUS", defaults.fuel_radius)?,
            fuel_step: env_or("SHIPWRECK_FUEL_STEP", defaults.fuel_step)?,
            vote_duration_seconds: env_or("SHIPWRECK_VOTE_DURATION", defaults.vote_duration_seconds)?,
            npc_count: env_or("SHIPWRECK_NPC_COUNT", defaults.npc_count)?,
            npc_movement_speed: env_or("SHIPWRECK_NPC_SPEED", defaults.npc_movement_speed)?,
            island_half_extent: defaults.island_half_extent,
        }
        .validated()
    }

    /// Reject values that would break the state machine.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.match_duration_seconds == 0 {
            return Err(ConfigError::Invalid("match duration must be positive"));
        }
        if self.fuel_window_cycle_seconds == 0 {
            return Err(ConfigError::Invalid("fuel window cycle must be positive"));
        }
        if self.min_players == 0 {
            return Err(ConfigError::Invalid("minimum players must be positive"));
        }
        Ok(self)
    }
}

/// Process-level configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Ticker period (one match second).
    pub tick_period: Duration,
    /// Capacity of the broadcast channel.
    pub broadcast_capacity: usize,
    /// Period of the sweep that drops finished matches.
    pub cleanup_interval: Duration,
    /// Default filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Rules applied to new matches.
    pub match_config: MatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            broadcast_capacity: 256,
            cleanup_interval: Duration::from_secs(60),
            log_filter: "info".to_string(),
            match_config: MatchConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let tick_ms: u64 = env_or("SHIPWRECK_TICK_MS", 1000)?;
        if tick_ms == 0 {
            return Err(ConfigError::Invalid("tick period must be positive"));
        }
        let cleanup_secs: u64 = env_or("SHIPWRECK_CLEANUP_SECS", defaults.cleanup_interval.as_secs())?;
        if cleanup_secs == 0 {
            return Err(ConfigError::Invalid("cleanup interval must be positive"));
        }

        Ok(Self {
            tick_period: Duration::from_millis(tick_ms),
            broadcast_capacity: env_or("SHIPWRECK_BROADCAST_CAPACITY", defaults.broadcast_capacity)?,
            cleanup_interval: Duration::from_secs(cleanup_secs),
            log_filter: std::env::var("SHIPWRECK_LOG").unwrap_or(defaults.log_filter),
            match_config: MatchConfig::from_env()?,
        })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Variable present but unparsable.
    #[error("Invalid value for {name}: {value:?}")]
    Parse {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },

    /// Parsed but semantically invalid.
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Parse { name, value: raw }),
        Err(_) => Ok(default),
    }
}
