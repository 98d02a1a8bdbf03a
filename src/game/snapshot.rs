//! Game State Snapshots
//!
//! The view of a match sent to every participant. The infiltrator is
//! listed among the NPCs under an NPC-range id, and neither its flag nor
//! its player id leaves the server.

use serde::{Serialize, Deserialize};

use crate::core::position::Position;
use crate::game::avatar::{Avatar, AvatarId, Npc};
use crate::game::state::{Match, MatchStatus};
use crate::game::task::Task;

/// How an avatar is presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarKind {
    /// A known human player.
    Player,
    /// An NPC, or the disguised infiltrator.
    Npc,
}

/// Public view of one avatar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvatarView {
    /// Avatar id.
    pub id: AvatarId,
    /// Shown name.
    pub name: String,
    /// Presentation kind.
    pub kind: AvatarKind,
    /// Appearance.
    pub skin_id: String,
    /// Position.
    pub position: Position,
    /// Alive player or active NPC.
    pub present: bool,
}

/// Public view of a match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Join code.
    pub code: String,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Seconds left.
    pub timer_seconds: u32,
    /// Fuel gauge.
    pub fuel_percentage: f64,
    /// Fuel actions currently allowed.
    pub fuel_window_open: bool,
    /// Seconds until the window flips.
    pub fuel_window_seconds_remaining: u32,
    /// A meeting is running.
    pub voting_active: bool,
    /// Outcome once finished.
    pub winner_message: Option<String>,
    /// Players and NPCs.
    pub avatars: Vec<AvatarView>,
    /// Tasks.
    pub tasks: Vec<Task>,
}

impl Match {
    /// Name other participants see for a public avatar id.
    pub fn public_name(&self, id: AvatarId) -> Option<String> {
        if self.disguise == Some(id) {
            return self.infiltrator().map(|_| Npc::name_for(id));
        }
        if let Some(p) = self.player_for_public_id(id) {
            return Some(p.display_name());
        }
        self.npc(id).map(|n| n.display_name())
    }

    /// Build the broadcast view of this match.
    ///
    /// Once a disguise is drawn the infiltrator appears only under it,
    /// ordered by id among the NPCs, on a whole-unit position like theirs.
    pub fn snapshot(&self) -> MatchSnapshot {
        let disguised = self.disguise.zip(self.infiltrator());

        let players = self
            .players
            .iter()
            .filter(|p| disguised.map_or(true, |(_, infiltrator)| infiltrator.id != p.id))
            .map(|p| AvatarView {
                id: p.id,
                name: p.display_name(),
                kind: AvatarKind::Player,
                skin_id: p.skin_id.clone(),
                position: p.position,
                present: p.alive,
            });

        let mut npcs: Vec<AvatarView> = self
            .npcs
            .iter()
            .map(|n| AvatarView {
                id: n.id,
                name: n.display_name(),
                kind: AvatarKind::Npc,
                skin_id: n.skin_id.clone(),
                position: n.position,
                present: n.active,
            })
            .chain(disguised.map(|(id, p)| AvatarView {
                id,
                name: Npc::name_for(id),
                kind: AvatarKind::Npc,
                skin_id: p.skin_id.clone(),
                position: p.position.rounded(),
                present: p.alive,
            }))
            .collect();
        npcs.sort_by_key(|a| a.id);

        MatchSnapshot {
            code: self.code.clone(),
            status: self.status,
            timer_seconds: self.timer_seconds,
            fuel_percentage: self.fuel_percentage,
            fuel_window_open: self.is_fuel_window_open_now(),
            fuel_window_seconds_remaining: self.fuel_window_seconds_remaining(),
            voting_active: self.voting_active(),
            winner_message: self.winner_message.clone(),
            avatars: players.chain(npcs).collect(),
            tasks: self.tasks.clone(),
        }
    }
}
