//! Network Layer
//!
//! Match registry, background clock, request handling and outbound
//! messages. All rules live in `game/`; this layer decides when they run
//! and who hears about it.

pub mod broadcast;
pub mod engine;
pub mod protocol;
pub mod service;
pub mod session;

pub use broadcast::{BroadcastSink, ChannelSink, Envelope, LogSink};
pub use engine::GameEngine;
pub use protocol::{LobbyPlayer, LobbyUpdate, ServerMessage, VoteResult, VoteStart};
pub use service::GameService;
pub use session::{MatchHandle, MatchRegistry};
