//! Match State Machine
//!
//! The aggregate root of a match: roster, NPCs, tasks, fuel gauge,
//! countdown, voting session and outcome.
//!
//! ```text
//! WAITING ──start_match──▶ STARTED ──timer hits 0 / end_match──▶ FINISHED
//! ```
//!
//! Mutators never fail loudly. A call made in the wrong phase is a
//! no-op reported through its `bool` / `Option` result, and everything
//! is frozen once the match is `FINISHED`.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::config::MatchConfig;
use crate::core::position::Position;
use crate::core::rng::DeterministicRng;
use crate::game::avatar::{AvatarId, Npc, Player, NPC_ID_BASE};
use crate::game::meeting::{ChatMessage, Meeting, MeetingId};
use crate::game::population::Population;
use crate::game::task::{Task, TaskBehavior, TaskId};

/// Numeric match identifier.
pub type MatchId = u64;

/// Message stored when the castaways win.
pub const HUMANS_WIN_MESSAGE: &str = "The castaways win: the infiltrator was stopped.";

/// Message stored when the infiltrator wins.
pub const INFILTRATOR_WIN_MESSAGE: &str = "The infiltrator wins: the boat never left the island.";

// =============================================================================
// STATUS & OUTCOME
// =============================================================================

/// Lifecycle of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    /// Lobby open, roster may grow.
    #[default]
    Waiting,
    /// Countdown running.
    Started,
    /// Terminal, read-only.
    Finished,
}

/// Winning side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    /// Every non-infiltrator player.
    Humans,
    /// The infiltrator.
    Infiltrator,
}

impl Winner {
    /// Message recorded on the match.
    pub fn message(self) -> &'static str {
        match self {
            Winner::Humans => HUMANS_WIN_MESSAGE,
            Winner::Infiltrator => INFILTRATOR_WIN_MESSAGE,
        }
    }
}

/// What a concluded vote removed from the island.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expelled {
    /// Tie, no votes, or a target that is no longer present.
    Nobody,
    /// A decoy NPC.
    Npc,
    /// The infiltrator.
    Infiltrator,
    /// A human player.
    Human,
}

/// Result of closing a voting session.
#[derive(Clone, Debug, PartialEq)]
pub struct VoteOutcome {
    /// Session that was closed.
    pub meeting_id: MeetingId,
    /// Tally winner, if any.
    pub target: Option<AvatarId>,
    /// Effect of the expulsion.
    pub expelled: Expelled,
    /// Votes per target.
    pub counts: BTreeMap<AvatarId, u32>,
    /// The expulsion ended the match.
    pub match_finished: bool,
}

// =============================================================================
// MATCH
// =============================================================================

/// Complete state of one match.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Match {
    pub(crate) id: MatchId,
    pub(crate) code: String,
    pub(crate) status: MatchStatus,
    pub(crate) players: Vec<Player>,
    pub(crate) npcs: Vec<Npc>,
    pub(crate) tasks: Vec<Task>,
    pub(crate) infiltrator: Option<AvatarId>,
    pub(crate) disguise: Option<AvatarId>,
    pub(crate) timer_seconds: u32,
    pub(crate) fuel_percentage: f64,
    pub(crate) voting: Option<Meeting>,
    pub(crate) winner_message: Option<String>,
    pub(crate) config: MatchConfig,
    pub(crate) rng: DeterministicRng,
    next_meeting_id: MeetingId,
    next_chat_id: u64,
}

impl Match {
    /// Create a match with default rules and a reproducible seed.
    pub fn new(id: MatchId, code: impl Into<String>) -> Self {
        Self::with_config(id, code, MatchConfig::default(), [0; 16])
    }

    /// Create a match with explicit rules and seed entropy.
    pub fn with_config(id: MatchId, code: impl Into<String>, config: MatchConfig, entropy: [u8; 16]) -> Self {
        let code = code.into();
        let rng = DeterministicRng::for_match(&entropy, id, &code);
        Self {
            id,
            code,
            status: MatchStatus::Waiting,
            players: Vec::new(),
            npcs: Vec::new(),
            tasks: Vec::new(),
            infiltrator: None,
            disguise: None,
            timer_seconds: 0,
            fuel_percentage: 0.0,
            voting: None,
            winner_message: None,
            config,
            rng,
            next_meeting_id: 1,
            next_chat_id: 1,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Match identifier.
    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Join code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Current lifecycle status.
    pub fn status(&self) -> MatchStatus {
        self.status
    }

    /// Finished matches are read-only.
    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }

    /// Players in join order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// NPCs in spawn order.
    pub fn npcs(&self) -> &[Npc] {
        &self.npcs
    }

    /// Tasks in creation order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Seconds left on the countdown.
    pub fn timer_seconds(&self) -> u32 {
        self.timer_seconds
    }

    /// Fuel gauge, always within [0, 100].
    pub fn fuel_percentage(&self) -> f64 {
        self.fuel_percentage
    }

    /// Outcome text once finished.
    pub fn winner_message(&self) -> Option<&str> {
        self.winner_message.as_deref()
    }

    /// Rules for this match.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// A voting session is live.
    pub fn voting_active(&self) -> bool {
        self.voting.is_some()
    }

    /// The live voting session.
    pub fn meeting(&self) -> Option<&Meeting> {
        self.voting.as_ref()
    }

    /// Votes of the live session.
    pub fn votes_by_player(&self) -> Option<&BTreeMap<String, AvatarId>> {
        self.voting.as_ref().map(|m| &m.votes)
    }

    /// First player to join.
    pub fn host(&self) -> Option<&Player> {
        self.players.first()
    }

    /// Id of the infiltrator.
    pub fn infiltrator_id(&self) -> Option<AvatarId> {
        self.infiltrator
    }

    /// The infiltrator player.
    pub fn infiltrator(&self) -> Option<&Player> {
        self.infiltrator.and_then(|id| self.player(id))
    }

    /// NPC-range id the infiltrator is shown under once started.
    pub fn disguise_id(&self) -> Option<AvatarId> {
        self.disguise
    }

    /// Player behind an id taken from the public view.
    ///
    /// The disguise id resolves to the infiltrator. Once disguised, the
    /// infiltrator's own player id resolves to nothing, since no client
    /// is shown it.
    pub fn player_for_public_id(&self, id: AvatarId) -> Option<&Player> {
        match (self.disguise, self.infiltrator) {
            (Some(disguise), infiltrator) if disguise == id => infiltrator.and_then(|i| self.player(i)),
            (Some(_), Some(infiltrator)) if infiltrator == id => None,
            _ => self.player(id),
        }
    }

    /// Player by id.
    pub fn player(&self, id: AvatarId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub(crate) fn player_mut(&mut self, id: AvatarId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Player by username.
    pub fn player_by_username(&self, username: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.username == username)
    }

    /// NPC by id.
    pub fn npc(&self, id: AvatarId) -> Option<&Npc> {
        self.npcs.iter().find(|n| n.id == id)
    }

    /// Task by id.
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        if self.is_finished() {
            return None;
        }
        self.tasks.iter_mut().find(|t| t.id() == id)
    }

    // -------------------------------------------------------------------------
    // Lobby
    // -------------------------------------------------------------------------

    /// Append a player while the lobby is open. Returns whether added.
    /// Ids from the NPC range are refused.
    pub fn add_player(&mut self, player: Player) -> bool {
        if self.status != MatchStatus::Waiting {
            debug!("Match {} is not waiting, ignoring {}", self.code, player.username);
            return false;
        }
        if player.id >= NPC_ID_BASE || self.player(player.id).is_some() {
            return false;
        }
        info!("{} joined match {}", player.username, self.code);
        self.players.push(player);
        true
    }

    /// Add an NPC.
    pub fn add_npc(&mut self, npc: Npc) {
        if !self.is_finished() {
            self.npcs.push(npc);
        }
    }

    /// Next free NPC id.
    pub fn next_npc_id(&self) -> AvatarId {
        self.npcs
            .iter()
            .map(|n| n.id)
            .chain(self.disguise)
            .map(|id| id + 1)
            .max()
            .unwrap_or(NPC_ID_BASE)
            .max(NPC_ID_BASE)
    }

    /// Add a task.
    pub fn add_task(&mut self, task: impl Into<Task>) {
        if !self.is_finished() {
            self.tasks.push(task.into());
        }
    }

    /// Next free task id.
    pub fn next_task_id(&self) -> TaskId {
        self.tasks.iter().map(|t| t.id() + 1).max().unwrap_or(1)
    }

    /// Flag one uniformly chosen player as the infiltrator.
    pub fn assign_infiltrator(&mut self) {
        if self.players.is_empty() || self.is_finished() {
            return;
        }

        let chosen = self.rng.next_index(self.players.len());
        for (i, player) in self.players.iter_mut().enumerate() {
            player.infiltrator = i == chosen;
        }
        self.infiltrator = Some(self.players[chosen].id);
        debug!("Match {} infiltrator assigned", self.code);
    }

    /// Draw the infiltrator's NPC-range id uniformly among the NPC ids
    /// plus one fresh id. An NPC holding the drawn id takes the fresh one.
    fn assign_disguise(&mut self) {
        if self.infiltrator.is_none() {
            return;
        }

        let fresh = self.next_npc_id();
        let mut ids: Vec<AvatarId> = self.npcs.iter().map(|n| n.id).collect();
        ids.push(fresh);
        ids.sort_unstable();
        let disguise = ids[self.rng.next_index(ids.len())];

        if let Some(npc) = self.npcs.iter_mut().find(|n| n.id == disguise) {
            npc.renumber(fresh);
        }
        self.disguise = Some(disguise);
    }

    /// Start the countdown. Requires an open lobby with at least
    /// `min_players` players; otherwise nothing changes.
    pub fn start_match(&mut self, population: &dyn Population) -> bool {
        if self.status != MatchStatus::Waiting {
            return false;
        }
        if self.players.len() < self.config.min_players {
            info!(
                "Match {} needs {} players, has {}",
                self.code, self.config.min_players, self.players.len()
            );
            return false;
        }

        population.assign_human_roles(self);
        population.generate_npcs(self);
        self.assign_disguise();
        population.generate_tasks(self);

        self.status = MatchStatus::Started;
        self.timer_seconds = self.config.match_duration_seconds;
        info!(
            "Match {} started: {} players, {} NPCs, {}s",
            self.code, self.players.len(), self.npcs.len(), self.timer_seconds
        );
        true
    }

    // -------------------------------------------------------------------------
    // Clock
    // -------------------------------------------------------------------------

    /// Advance the countdown by one second. Returns `true` when this
    /// tick finished the match.
    pub fn tick_timer(&mut self) -> bool {
        if self.status != MatchStatus::Started {
            return false;
        }

        self.timer_seconds = self.timer_seconds.saturating_sub(1);
        if self.timer_seconds == 0 {
            self.finish(self.evaluate_winner());
            return true;
        }
        false
    }

    /// One random step for every active NPC.
    pub fn move_npcs(&mut self) {
        if self.status != MatchStatus::Started {
            return;
        }
        for npc in self.npcs.iter_mut() {
            npc.perform_random_movement(&mut self.rng);
        }
    }

    fn elapsed_seconds(&self) -> u32 {
        self.config.match_duration_seconds.saturating_sub(self.timer_seconds)
    }

    fn fuel_cycle(&self) -> u32 {
        self.config.fuel_window_cycle_seconds.max(1)
    }

    /// Fuel actions are allowed during odd-numbered cycles.
    pub fn is_fuel_window_open_now(&self) -> bool {
        if self.status != MatchStatus::Started || self.timer_seconds == 0 {
            return false;
        }
        (self.elapsed_seconds() / self.fuel_cycle()) % 2 == 1
    }

    /// Seconds until the current cycle flips.
    pub fn fuel_window_seconds_remaining(&self) -> u32 {
        if self.status != MatchStatus::Started || self.timer_seconds == 0 {
            return 0;
        }
        let cycle = self.fuel_cycle();
        (cycle - self.elapsed_seconds() % cycle).min(self.timer_seconds)
    }

    // -------------------------------------------------------------------------
    // Fuel
    // -------------------------------------------------------------------------

    /// Add `delta` to the gauge, clamped to [0, 100]. Returns the new value.
    pub fn adjust_fuel(&mut self, delta: f64) -> f64 {
        if self.is_finished() || !delta.is_finite() {
            return self.fuel_percentage;
        }
        self.fuel_percentage = (self.fuel_percentage + delta).clamp(0.0, 100.0);
        debug!("Match {} fuel at {:.1}%", self.code, self.fuel_percentage);
        self.fuel_percentage
    }

    /// Empty the gauge.
    pub fn reset_fuel(&mut self) {
        if !self.is_finished() {
            self.fuel_percentage = 0.0;
        }
    }

    // -------------------------------------------------------------------------
    // Players
    // -------------------------------------------------------------------------

    /// Alive players other than the infiltrator.
    pub fn count_human_alive_players(&self) -> usize {
        self.players.iter().filter(|p| p.is_alive_human()).count()
    }

    /// Move an alive player, kept on the island. Returns whether the move applied.
    pub fn move_player(&mut self, id: AvatarId, position: Position) -> bool {
        if self.is_finished() || !position.is_finite() {
            return false;
        }
        let half_extent = self.config.island_half_extent;
        match self.player_mut(id) {
            Some(player) if player.alive => {
                player.move_to(position.clamp_to_island(half_extent));
                true
            }
            _ => false,
        }
    }

    /// Mark a player dead and apply the win rules that follow from it.
    pub(crate) fn eliminate_player(&mut self, id: AvatarId) -> bool {
        if self.is_finished() {
            return false;
        }
        let was_infiltrator = match self.player_mut(id) {
            Some(player) if player.alive => {
                player.eliminate();
                player.infiltrator
            }
            _ => return false,
        };
        info!("Player {} eliminated in match {}", id, self.code);

        if was_infiltrator {
            self.finish(Winner::Humans);
        } else if self.status == MatchStatus::Started && self.count_human_alive_players() == 0 {
            self.finish(Winner::Infiltrator);
        }
        true
    }

    // -------------------------------------------------------------------------
    // Meetings & voting
    // -------------------------------------------------------------------------

    fn open_meeting(&mut self, convener: Option<AvatarId>) -> MeetingId {
        let id = self.next_meeting_id;
        self.next_meeting_id += 1;
        self.voting = Some(Meeting::new(id, convener, self.config.vote_duration_seconds));
        id
    }

    /// Open a meeting called by `caller`. Only while started.
    pub fn trigger_meeting(&mut self, caller: AvatarId) -> Option<MeetingId> {
        if self.status != MatchStatus::Started {
            return None;
        }
        Some(self.open_meeting(Some(caller)))
    }

    /// Open a fresh voting session, discarding any live one.
    pub fn start_voting(&mut self) -> Option<MeetingId> {
        if self.is_finished() {
            return None;
        }
        Some(self.open_meeting(None))
    }

    /// Record or replace a vote. Ignored when voting is not active.
    pub fn record_vote(&mut self, voter_key: &str, target: AvatarId) -> bool {
        match self.voting.as_mut() {
            Some(meeting) => {
                meeting.cast_vote(voter_key, target);
                true
            }
            None => false,
        }
    }

    /// Every alive non-infiltrator player has a live vote.
    pub fn all_humans_voted(&self) -> bool {
        let Some(meeting) = self.voting.as_ref() else {
            return false;
        };
        self.players
            .iter()
            .filter(|p| p.is_alive_human())
            .all(|p| meeting.has_voted(&p.username))
    }

    /// Tally of the live session.
    pub fn tally_votes(&self) -> Option<AvatarId> {
        self.voting.as_ref().and_then(Meeting::tally_votes)
    }

    /// Close the voting session without applying a result.
    pub fn stop_voting(&mut self) {
        if let Some(meeting) = self.voting.take() {
            debug!("Match {} closed meeting {}", self.code, meeting.id);
        }
    }

    /// Append a chat line to the live meeting.
    pub fn add_chat(&mut self, sender: AvatarId, text: impl Into<String>) -> bool {
        let Some(meeting) = self.voting.as_mut() else {
            return false;
        };
        let id = self.next_chat_id;
        self.next_chat_id += 1;
        meeting.add_chat(ChatMessage::new(id, sender, text));
        true
    }

    /// Stop voting, tally and apply the expulsion.
    ///
    /// With `Some(id)` the call only acts if `id` is still the live
    /// session, which lets a late timeout detect that it is stale.
    pub fn conclude_voting(&mut self, expected: Option<MeetingId>) -> Option<VoteOutcome> {
        let live = self.voting.as_ref()?.id;
        if expected.is_some_and(|id| id != live) {
            return None;
        }

        let meeting = self.voting.take()?;
        let counts = meeting.vote_counts();
        let target = meeting.tally_votes();
        let expelled = match target {
            Some(id) => self.expel(id),
            None => Expelled::Nobody,
        };

        Some(VoteOutcome {
            meeting_id: meeting.id,
            target,
            expelled,
            counts,
            match_finished: self.is_finished(),
        })
    }

    fn expel(&mut self, target: AvatarId) -> Expelled {
        if let Some(npc) = self.npcs.iter_mut().find(|n| n.id == target && n.active) {
            npc.deactivate();
            return Expelled::Npc;
        }

        let (id, infiltrator) = match self.player_for_public_id(target) {
            Some(player) if player.alive => (player.id, player.infiltrator),
            _ => return Expelled::Nobody,
        };
        self.eliminate_player(id);
        if infiltrator {
            Expelled::Infiltrator
        } else {
            Expelled::Human
        }
    }

    // -------------------------------------------------------------------------
    // Outcome
    // -------------------------------------------------------------------------

    /// Infiltrator wins only while alive with the gauge not full.
    pub fn evaluate_winner(&self) -> Winner {
        let infiltrator_alive = self.infiltrator().is_some_and(|p| p.alive);
        if infiltrator_alive && self.fuel_percentage < 100.0 {
            Winner::Infiltrator
        } else {
            Winner::Humans
        }
    }

    /// Force the match to finish now.
    pub fn end_match(&mut self) {
        if !self.is_finished() {
            self.finish(self.evaluate_winner());
        }
    }

    /// Finish with an explicit winner.
    pub fn finish_with(&mut self, winner: Winner) {
        if !self.is_finished() {
            self.finish(winner);
        }
    }

    fn finish(&mut self, winner: Winner) {
        self.status = MatchStatus::Finished;
        self.voting = None;
        if self.winner_message.is_none() {
            self.winner_message = Some(winner.message().to_string());
        }
        info!("Match {} finished: {:?}", self.code, winner);
    }
}

// =============================================================================
// TESTS
// =============================================================================
