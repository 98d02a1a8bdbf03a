//! Game Logic Module
//!
//! Everything that happens on the island, independent of transport.
//!
//! ## Module Structure
//!
//! - `avatar`: Players and NPCs
//! - `task`: Repair and contest tasks
//! - `tally`: Strict-maximum tally shared by votes and contests
//! - `meeting`: Chat and vote collection
//! - `state`: Match state machine
//! - `rules`: Validation of player actions
//! - `population`: Roles, NPCs and tasks at match start
//! - `snapshot`: Public view of a match

pub mod avatar;
pub mod task;
pub mod tally;
pub mod meeting;
pub mod state;
pub mod rules;
pub mod population;
pub mod snapshot;

// Re-export key types
pub use avatar::{Avatar, AvatarId, Npc, Player, NPC_ID_BASE};
pub use task::{ContestTask, ProgressTask, Task, TaskBehavior, TaskId};
pub use meeting::{ChatMessage, Meeting, MeetingId};
pub use state::{Expelled, Match, MatchId, MatchStatus, VoteOutcome, Winner};
pub use rules::{ActionError, Elimination, FuelAction, RejectionKind};
pub use population::{Population, RandomPopulation};
pub use snapshot::{AvatarKind, AvatarView, MatchSnapshot};
