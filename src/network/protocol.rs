//! Protocol Messages
//!
//! Everything the server publishes to the participants of a match.
//! Messages serialize as JSON for debugging ease, with binary (bincode)
//! for production transports.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::game::avatar::AvatarId;
use crate::game::meeting::{ChatMessage, MeetingId};
use crate::game::rules::Elimination;
use crate::game::snapshot::{AvatarView, MatchSnapshot};
use crate::game::state::{Expelled, Match, MatchStatus, VoteOutcome};

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages published to every participant of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    /// Roster changed while the lobby is open.
    LobbyUpdate(LobbyUpdate),

    /// Full match view.
    GameState(MatchSnapshot),

    /// A meeting opened.
    VoteStart(VoteStart),

    /// A meeting closed.
    VoteResult(VoteResult),

    /// A player was eliminated.
    Elimination(Elimination),

    /// Meeting chat line.
    Chat(ChatMessage),
}

/// Lobby roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyPlayer {
    /// Player id.
    pub id: AvatarId,
    /// Username.
    pub username: String,
    /// Cosmetic selection.
    pub skin_id: String,
}

/// Lobby state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyUpdate {
    /// Join code.
    pub code: String,
    /// Status.
    pub status: MatchStatus,
    /// Host username.
    pub host: Option<String>,
    /// Players in join order.
    pub players: Vec<LobbyPlayer>,
    /// Players needed to start.
    pub min_players: usize,
}

impl LobbyUpdate {
    /// Describe the lobby of a match.
    pub fn from_match(m: &Match) -> Self {
        Self {
            code: m.code().to_string(),
            status: m.status(),
            host: m.host().map(|p| p.username.clone()),
            players: m
                .players()
                .iter()
                .map(|p| LobbyPlayer {
                    id: p.id,
                    username: p.username.clone(),
                    skin_id: p.skin_id.clone(),
                })
                .collect(),
            min_players: m.config().min_players,
        }
    }
}

/// Meeting announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteStart {
    /// Meeting id.
    pub meeting_id: MeetingId,
    /// Player who called it.
    pub convener: Option<AvatarId>,
    /// Seconds before the vote is forced.
    pub duration_seconds: u32,
    /// Avatars that can be voted out.
    pub candidates: Vec<AvatarView>,
}

impl VoteStart {
    /// Describe the live meeting, if any.
    pub fn from_match(m: &Match) -> Option<Self> {
        let meeting = m.meeting()?;
        let candidates = m
            .snapshot()
            .avatars
            .into_iter()
            .filter(|a| a.present)
            .collect();
        Some(Self {
            meeting_id: meeting.id,
            convener: meeting.convener,
            duration_seconds: meeting.duration_seconds,
            candidates,
        })
    }
}

/// Meeting verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteResult {
    /// Meeting id.
    pub meeting_id: MeetingId,
    /// Avatar voted out.
    pub expelled_id: Option<AvatarId>,
    /// What the expelled avatar was.
    pub expelled: Expelled,
    /// Votes per target.
    pub counts: BTreeMap<AvatarId, u32>,
    /// Human readable verdict.
    pub message: String,
    /// The vote ended the match.
    pub match_finished: bool,
}

impl VoteResult {
    /// Build the verdict after `outcome` was applied to `m`.
    pub fn from_outcome(m: &Match, outcome: VoteOutcome) -> Self {
        let name = outcome
            .target
            .and_then(|id| m.public_name(id))
            .unwrap_or_default();
        let message = match outcome.expelled {
            Expelled::Nobody => "Nobody was expelled.".to_string(),
            Expelled::Infiltrator => format!("{} was the infiltrator!", name),
            Expelled::Npc | Expelled::Human => format!("{} was not the infiltrator.", name),
        };

        Self {
            meeting_id: outcome.meeting_id,
            expelled_id: outcome.target.filter(|_| outcome.expelled != Expelled::Nobody),
            expelled: outcome.expelled,
            counts: outcome.counts,
            message,
            match_finished: outcome.match_finished,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ServerMessage {
    /// Message name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::LobbyUpdate(_) => "lobby_update",
            ServerMessage::GameState(_) => "game_state",
            ServerMessage::VoteStart(_) => "vote_start",
            ServerMessage::VoteResult(_) => "vote_result",
            ServerMessage::Elimination(_) => "elimination",
            ServerMessage::Chat(_) => "chat",
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::position::Position;
    use crate::game::avatar::Player;
    use crate::game::population::RandomPopulation;
    use crate::game::snapshot::AvatarKind;

    fn started() -> Match {
        let mut m = Match::new(1, "PROTO1");
        for id in 1..=5 {
            m.add_player(Player::new(id, format!("p{}", id), "skin", Position::ORIGIN));
        }
        m.start_match(&RandomPopulation);
        m
    }

    #[test]
    fn test_lobby_update() {
        let mut m = Match::new(1, "PROTO1");
        m.add_player(Player::new(4, "ana", "skin", Position::ORIGIN));
        m.add_player(Player::new(9, "ben", "skin", Position::ORIGIN));

        let update = LobbyUpdate::from_match(&m);
        assert_eq!(update.host.as_deref(), Some("ana"));
        assert_eq!(update.players.len(), 2);
        assert_eq!(update.min_players, 5);
    }

    #[test]
    fn test_roster_never_matches_an_npc_view() {
        let m = started();
        let roster: Vec<_> = LobbyUpdate::from_match(&m).players.iter().map(|p| p.id).collect();
        let unmasked: Vec<_> = m
            .snapshot()
            .avatars
            .iter()
            .filter(|a| a.kind == AvatarKind::Npc && roster.contains(&a.id))
            .map(|a| a.id)
            .collect();
        assert!(unmasked.is_empty(), "npc views on the roster: {:?}", unmasked);
    }

    #[test]
    fn test_game_state_json_tag() {
        let msg = ServerMessage::GameState(started().snapshot());
        let json = msg.to_json().unwrap();
        assert!(json.starts_with("{\"game_state\":"));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_game_state_binary() {
        let msg = ServerMessage::GameState(started().snapshot());
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(ServerMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_vote_start_lists_present_avatars() {
        let mut m = started();
        assert!(VoteStart::from_match(&m).is_none());

        let npc = m.npcs()[0].id;
        m.npcs[0].deactivate();
        m.trigger_meeting(2);

        let start = VoteStart::from_match(&m).unwrap();
        assert_eq!(start.convener, Some(2));
        assert!(start.candidates.iter().all(|c| c.id != npc));
    }

    #[test]
    fn test_vote_result_messages() {
        let mut m = started();
        let disguise = m.disguise_id().unwrap();
        let voter = m.players().iter().find(|p| !p.infiltrator).unwrap().username.clone();

        m.start_voting();
        m.record_vote(&voter, disguise);
        let outcome = m.conclude_voting(None).unwrap();
        let result = VoteResult::from_outcome(&m, outcome);

        assert_eq!(result.expelled, Expelled::Infiltrator);
        assert_eq!(result.expelled_id, Some(disguise));
        assert_eq!(result.message, format!("NPC-{} was the infiltrator!", disguise));
        assert!(result.match_finished);
    }

    #[test]
    fn test_vote_result_tie() {
        let mut m = started();
        m.start_voting();
        m.record_vote("p1", 1000);
        m.record_vote("p2", 1001);
        let outcome = m.conclude_voting(None).unwrap();
        let result = VoteResult::from_outcome(&m, outcome);

        assert_eq!(result.expelled, Expelled::Nobody);
        assert_eq!(result.expelled_id, None);
        assert_eq!(result.message, "Nobody was expelled.");
        assert_eq!(result.counts.get(&1000), Some(&1));
    }
}
