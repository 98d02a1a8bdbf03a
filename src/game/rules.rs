//! Action Rules
//!
//! Validation for player-initiated actions. Every check runs before any
//! mutation, so a rejected action leaves the match untouched.

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::position::Position;
use crate::game::avatar::{AvatarId, Player, NPC_ID_BASE};
use crate::game::meeting::MeetingId;
use crate::game::population::Population;
use crate::game::state::{Match, MatchStatus};
use crate::game::task::{Task, TaskBehavior, TaskId};

// =============================================================================
// ERRORS
// =============================================================================

/// Broad category of a rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Something is missing or the match is in the wrong phase.
    Precondition,
    /// The actor is not allowed to do this.
    Ineligible,
    /// Allowed, but not right now.
    Locked,
}

/// Why an action was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    /// No match with this code.
    #[error("match {0} not found")]
    MatchNotFound(String),

    /// The match is not running.
    #[error("match is not in progress")]
    MatchNotStarted,

    /// The match is over and accepts no more actions.
    #[error("match is finished")]
    MatchFinished,

    /// The lobby no longer accepts players.
    #[error("match already started")]
    LobbyClosed,

    /// Username or id already on the roster.
    #[error("player already joined")]
    AlreadyJoined,

    /// Not enough players to start.
    #[error("need {needed} players, have {have}")]
    InsufficientPlayers {
        /// Players present.
        have: usize,
        /// Players required.
        needed: usize,
    },

    /// Only the host may do this.
    #[error("only the host can start the match")]
    NotHost,

    /// Player id inside the NPC id range.
    #[error("player id {0} is reserved for NPCs")]
    InvalidPlayerId(AvatarId),

    /// Unknown player.
    #[error("player {0} not found")]
    PlayerNotFound(String),

    /// Unknown target.
    #[error("target {0} not found")]
    TargetNotFound(AvatarId),

    /// Unknown task.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// The task is not a contest.
    #[error("task {0} is not a contest")]
    NotAContest(TaskId),

    /// Amount is NaN or infinite.
    #[error("invalid amount")]
    InvalidAmount,

    /// Position is NaN or infinite.
    #[error("invalid position")]
    InvalidPosition,

    /// The actor was eliminated.
    #[error("eliminated players cannot act")]
    ActorEliminated,

    /// The target was already eliminated.
    #[error("target already eliminated")]
    TargetEliminated,

    /// Infiltrator-only action.
    #[error("only the infiltrator can do this")]
    NotInfiltrator,

    /// The infiltrator cannot be the target.
    #[error("target cannot be eliminated")]
    TargetIsInfiltrator,

    /// The infiltrator may not fill the tank.
    #[error("the infiltrator cannot fill fuel")]
    FillForbidden,

    /// The infiltrator may not vote.
    #[error("player cannot vote")]
    CannotVote,

    /// Target too far away.
    #[error("target out of range ({distance:.1} > {radius})")]
    OutOfRange {
        /// Actual distance.
        distance: f64,
        /// Allowed radius.
        radius: f64,
    },

    /// Actor too far from the boat.
    #[error("too far from the boat ({distance:.1} > {radius})")]
    TooFarFromBoat {
        /// Actual distance.
        distance: f64,
        /// Allowed radius.
        radius: f64,
    },

    /// The fuel window is closed.
    #[error("fuel window closed, opens in {seconds_remaining}s")]
    FuelWindowClosed {
        /// Seconds until the window flips.
        seconds_remaining: u32,
    },

    /// No voting session.
    #[error("voting is not active")]
    VotingNotActive,

    /// A voting session is already running.
    #[error("voting already in progress")]
    VotingAlreadyActive,
}

impl ActionError {
    /// Category of this rejection.
    pub fn kind(&self) -> RejectionKind {
        use ActionError::*;
        match self {
            FuelWindowClosed { .. } => RejectionKind::Locked,
            NotHost
            | ActorEliminated
            | NotInfiltrator
            | TargetIsInfiltrator
            | FillForbidden
            | CannotVote
            | OutOfRange { .. }
            | TooFarFromBoat { .. } => RejectionKind::Ineligible,
            _ => RejectionKind::Precondition,
        }
    }
}

// =============================================================================
// LOOKUPS
// =============================================================================

fn require_started(m: &Match) -> Result<(), ActionError> {
    match m.status() {
        MatchStatus::Started => Ok(()),
        MatchStatus::Waiting => Err(ActionError::MatchNotStarted),
        MatchStatus::Finished => Err(ActionError::MatchFinished),
    }
}

fn find_player<'a>(m: &'a Match, username: &str) -> Result<&'a Player, ActionError> {
    m.player_by_username(username)
        .ok_or_else(|| ActionError::PlayerNotFound(username.to_string()))
}

fn find_alive_player<'a>(m: &'a Match, username: &str) -> Result<&'a Player, ActionError> {
    let player = find_player(m, username)?;
    if !player.alive {
        return Err(ActionError::ActorEliminated);
    }
    Ok(player)
}

// =============================================================================
// LOBBY
// =============================================================================

/// Add a player to an open lobby.
pub fn join(m: &mut Match, player: Player) -> Result<(), ActionError> {
    if m.status() != MatchStatus::Waiting {
        return Err(ActionError::LobbyClosed);
    }
    if player.id >= NPC_ID_BASE {
        return Err(ActionError::InvalidPlayerId(player.id));
    }
    if m.player(player.id).is_some() || m.player_by_username(&player.username).is_some() {
        return Err(ActionError::AlreadyJoined);
    }
    m.add_player(player);
    Ok(())
}

/// The host starts the match once enough players joined.
pub fn start(m: &mut Match, username: &str, population: &dyn Population) -> Result<(), ActionError> {
    if m.status() != MatchStatus::Waiting {
        return Err(ActionError::LobbyClosed);
    }
    let player = find_player(m, username)?;
    if m.host().map(|h| h.id) != Some(player.id) {
        return Err(ActionError::NotHost);
    }

    let needed = m.config().min_players;
    let have = m.players().len();
    if have < needed || !m.start_match(population) {
        return Err(ActionError::InsufficientPlayers { have, needed });
    }
    Ok(())
}

// =============================================================================
// ELIMINATION
// =============================================================================

/// A successful elimination. Broadcast as is, so it never names the actor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Elimination {
    /// The eliminated player.
    pub target_id: AvatarId,
    /// The elimination ended the match.
    pub match_finished: bool,
}

/// Eligibility of `actor` to eliminate `target`.
pub fn check_elimination(actor: &Player, target: &Player, radius: f64) -> Result<(), ActionError> {
    if !actor.alive {
        return Err(ActionError::ActorEliminated);
    }
    if !actor.infiltrator {
        return Err(ActionError::NotInfiltrator);
    }
    if !target.alive {
        return Err(ActionError::TargetEliminated);
    }
    if target.infiltrator {
        return Err(ActionError::TargetIsInfiltrator);
    }
    if !actor.position.is_within(target.position, radius) {
        return Err(ActionError::OutOfRange {
            distance: actor.position.distance(target.position),
            radius,
        });
    }
    Ok(())
}

/// The infiltrator eliminates a nearby human. `target` is an id from
/// the public view.
pub fn eliminate(m: &mut Match, actor: &str, target: AvatarId) -> Result<Elimination, ActionError> {
    require_started(m)?;
    let actor = find_player(m, actor)?;
    let target_player = m
        .player_for_public_id(target)
        .ok_or(ActionError::TargetNotFound(target))?;
    check_elimination(actor, target_player, m.config().elimination_radius)?;

    let target_id = target_player.id;
    m.eliminate_player(target_id);
    info!("Match {}: player {} eliminated", m.code(), target_id);

    Ok(Elimination {
        target_id,
        match_finished: m.is_finished(),
    })
}

// =============================================================================
// MOVEMENT
// =============================================================================

/// Move an alive player. Allowed in the lobby and while started.
pub fn move_player(m: &mut Match, username: &str, position: Position) -> Result<(), ActionError> {
    if m.is_finished() {
        return Err(ActionError::MatchFinished);
    }
    let id = find_alive_player(m, username)?.id;
    if !m.move_player(id, position) {
        return Err(ActionError::InvalidPosition);
    }
    Ok(())
}

// =============================================================================
// FUEL
// =============================================================================

/// What a player does at the boat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelAction {
    /// Raise the gauge. Humans only.
    Fill,
    /// Lower the gauge. Infiltrator only.
    Sabotage,
}

/// Fill or sabotage the boat tank. Returns the new gauge value.
pub fn modify_fuel(
    m: &mut Match,
    actor: &str,
    action: FuelAction,
    amount: Option<f64>,
) -> Result<f64, ActionError> {
    require_started(m)?;
    let player = find_alive_player(m, actor)?;

    match action {
        FuelAction::Fill if player.infiltrator => return Err(ActionError::FillForbidden),
        FuelAction::Sabotage if !player.infiltrator => return Err(ActionError::NotInfiltrator),
        _ => {}
    }

    let config = m.config();
    if !player.position.is_within(config.boat_position, config.fuel_radius) {
        return Err(ActionError::TooFarFromBoat {
            distance: player.position.distance(config.boat_position),
            radius: config.fuel_radius,
        });
    }

    if !m.is_fuel_window_open_now() {
        return Err(ActionError::FuelWindowClosed {
            seconds_remaining: m.fuel_window_seconds_remaining(),
        });
    }

    let amount = amount.unwrap_or(config.fuel_step);
    if !amount.is_finite() {
        return Err(ActionError::InvalidAmount);
    }
    let delta = match action {
        FuelAction::Fill => amount.abs(),
        FuelAction::Sabotage => -amount.abs(),
    };

    debug!("Match {}: {} {:?} {}", m.code(), actor, action, delta);
    Ok(m.adjust_fuel(delta))
}

// =============================================================================
// VOTING
// =============================================================================

/// Alive non-infiltrator players may vote and open meetings.
pub fn check_voter<'a>(m: &'a Match, username: &str) -> Result<&'a Player, ActionError> {
    let player = find_alive_player(m, username)?;
    if player.infiltrator {
        return Err(ActionError::CannotVote);
    }
    Ok(player)
}

/// Open a meeting on behalf of a voter.
pub fn open_meeting(m: &mut Match, username: &str) -> Result<MeetingId, ActionError> {
    require_started(m)?;
    let caller = check_voter(m, username)?.id;
    if m.voting_active() {
        return Err(ActionError::VotingAlreadyActive);
    }
    m.trigger_meeting(caller).ok_or(ActionError::MatchNotStarted)
}

/// Record a vote from an eligible voter.
pub fn vote(m: &mut Match, username: &str, target: AvatarId) -> Result<(), ActionError> {
    if !m.voting_active() {
        return Err(ActionError::VotingNotActive);
    }
    check_voter(m, username)?;
    m.record_vote(username, target);
    Ok(())
}

/// Post a chat line to the live meeting. Any alive player may speak.
pub fn chat(m: &mut Match, username: &str, text: &str) -> Result<(), ActionError> {
    if !m.voting_active() {
        return Err(ActionError::VotingNotActive);
    }
    let sender = find_alive_player(m, username)?.id;
    m.add_chat(sender, text);
    Ok(())
}

// =============================================================================
// TASKS
// =============================================================================

fn task_actor(m: &Match, username: &str, task: TaskId) -> Result<AvatarId, ActionError> {
    require_started(m)?;
    let actor = find_alive_player(m, username)?.id;
    m.task(task).ok_or(ActionError::TaskNotFound(task))?;
    Ok(actor)
}

/// Start a task.
pub fn start_task(m: &mut Match, username: &str, task: TaskId) -> Result<(), ActionError> {
    let actor = task_actor(m, username, task)?;
    if let Some(t) = m.task_mut(task) {
        t.start_by(actor);
    }
    Ok(())
}

/// Feed progress (or a click) into a task.
pub fn progress_task(m: &mut Match, username: &str, task: TaskId, delta: i32) -> Result<(), ActionError> {
    let actor = task_actor(m, username, task)?;
    if let Some(t) = m.task_mut(task) {
        t.progress_update(actor, delta);
    }
    Ok(())
}

/// Current leader of a contest.
pub fn contest_winner(m: &Match, task: TaskId) -> Result<Option<AvatarId>, ActionError> {
    match m.task(task) {
        Some(Task::Contest(contest)) => Ok(contest.determine_winner()),
        Some(_) => Err(ActionError::NotAContest(task)),
        None => Err(ActionError::TaskNotFound(task)),
    }
}

// =============================================================================
// TESTS
// =============================================================================
