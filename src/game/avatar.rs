//! Participants
//!
//! Human players and NPCs share the [`Avatar`] capability. Players only
//! move when a request moves them; NPCs wander on every ticker pass.

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::position::Position;
use crate::core::rng::DeterministicRng;

/// Identifier shared by players and NPCs (one id space per match).
pub type AvatarId = u64;

/// First id handed to generated NPCs.
pub const NPC_ID_BASE: AvatarId = 1000;

/// Capability shared by every participant on the island.
pub trait Avatar {
    /// Unique identifier.
    fn id(&self) -> AvatarId;
    /// Name shown to other participants.
    fn display_name(&self) -> String;
    /// Current position.
    fn position(&self) -> Position;
    /// Still taking part (alive player, active NPC).
    fn is_present(&self) -> bool;
    /// Holds the infiltrator flag.
    fn is_infiltrator(&self) -> bool;
}

// =============================================================================
// PLAYER
// =============================================================================

/// A human participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Identifier issued by the account layer.
    pub id: AvatarId,
    /// Login name, also the voter key.
    pub username: String,
    /// Cosmetic selection.
    pub skin_id: String,
    /// Current position.
    pub position: Position,
    /// Is this player the infiltrator.
    pub infiltrator: bool,
    /// Still alive.
    pub alive: bool,
}

impl Player {
    /// Create an alive, non-infiltrator player.
    pub fn new(id: AvatarId, username: impl Into<String>, skin_id: impl Into<String>, position: Position) -> Self {
        Self {
            id,
            username: username.into(),
            skin_id: skin_id.into(),
            position,
            infiltrator: false,
            alive: true,
        }
    }

    /// Replace the position.
    pub fn move_to(&mut self, position: Position) {
        self.position = position;
        debug!("{} moved to {}", self.username, position);
    }

    /// Mark the player as eliminated.
    pub fn eliminate(&mut self) {
        self.alive = false;
    }

    /// Alive and not the infiltrator.
    #[inline]
    pub fn is_alive_human(&self) -> bool {
        self.alive && !self.infiltrator
    }
}

impl Avatar for Player {
    fn id(&self) -> AvatarId {
        self.id
    }

    fn display_name(&self) -> String {
        self.username.clone()
    }

    fn position(&self) -> Position {
        self.position
    }

    fn is_present(&self) -> bool {
        self.alive
    }

    fn is_infiltrator(&self) -> bool {
        self.infiltrator
    }
}

// =============================================================================
// NPC
// =============================================================================

/// A decoy wandering the island.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    /// Identifier (allocated from [`NPC_ID_BASE`]).
    pub id: AvatarId,
    /// Appearance, normally copied from the infiltrator.
    pub skin_id: String,
    /// Current position.
    pub position: Position,
    /// Still on the island.
    pub active: bool,
    /// Per-axis movement amplitude.
    pub movement_speed: f64,
    /// Cosmetic infiltrator theme, no gameplay role.
    pub infiltrator_themed: bool,
    /// Name shown to players.
    pub display_name: String,
}

impl Npc {
    /// Create an active NPC named `NPC-<id>`.
    pub fn new(
        id: AvatarId,
        skin_id: impl Into<String>,
        position: Position,
        movement_speed: f64,
        infiltrator_themed: bool,
    ) -> Self {
        Self {
            id,
            skin_id: skin_id.into(),
            position,
            active: true,
            movement_speed,
            infiltrator_themed,
            display_name: Self::name_for(id),
        }
    }

    /// Name shown for an NPC-range id.
    pub fn name_for(id: AvatarId) -> String {
        format!("NPC-{}", id)
    }

    /// Take a new id, and the name that goes with it.
    pub fn renumber(&mut self, id: AvatarId) {
        self.id = id;
        self.display_name = Self::name_for(id);
    }

    /// Move to explicit coordinates. Ignored while inactive.
    pub fn move_to(&mut self, x: f64, y: f64) {
        if !self.active {
            debug!("NPC {} is inactive and cannot move", self.id);
            return;
        }
        self.position.move_to(x, y);
    }

    /// Take one random step of at most `movement_speed` per axis,
    /// landing on whole coordinates.
    pub fn perform_random_movement(&mut self, rng: &mut DeterministicRng) {
        if !self.active {
            return;
        }

        let dx = rng.next_f64_range(-1.0, 1.0) * self.movement_speed;
        let dy = rng.next_f64_range(-1.0, 1.0) * self.movement_speed;
        let next = self.position.translate(dx, dy).rounded();

        self.move_to(next.x, next.y);
    }

    /// Remove the NPC from play.
    pub fn deactivate(&mut self) {
        if self.active {
            self.active = false;
            info!("NPC {} removed from the island", self.id);
        }
    }
}

impl Avatar for Npc {
    fn id(&self) -> AvatarId {
        self.id
    }

    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn position(&self) -> Position {
        self.position
    }

    fn is_present(&self) -> bool {
        self.active
    }

    fn is_infiltrator(&self) -> bool {
        // The theme flag is cosmetic only
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_defaults() {
        let p = Player::new(1, "ana", "skin1", Position::new(0.0, 0.0));
        assert!(p.alive);
        assert!(!p.infiltrator);
        assert!(p.is_alive_human());
        assert_eq!(p.display_name(), "ana");
    }

    #[test]
    fn test_player_move_replaces_position() {
        let mut p = Player::new(1, "ana", "skin1", Position::ORIGIN);
        p.move_to(Position::new(4.0, 2.0));
        assert_eq!(p.position(), Position::new(4.0, 2.0));
    }

    #[test]
    fn test_npc_display_name() {
        let mut npc = Npc::new(1003, "skin", Position::ORIGIN, 0.5, false);
        assert_eq!(npc.display_name(), "NPC-1003");
        assert!(npc.is_present());

        npc.renumber(1007);
        assert_eq!(npc.id(), 1007);
        assert_eq!(npc.display_name(), "NPC-1007");
    }

    #[test]
    fn test_npc_random_movement_bounded_and_rounded() {
        let mut rng = DeterministicRng::new(3);
        let mut npc = Npc::new(1000, "skin", Position::new(10.0, 10.0), 2.0, false);

        for _ in 0..200 {
            let before = npc.position;
            npc.perform_random_movement(&mut rng);
            let after = npc.position;

            assert_eq!(after, after.rounded());
            // Rounding can add at most half a unit per axis
            assert!((after.x - before.x).abs() <= 2.5);
            assert!((after.y - before.y).abs() <= 2.5);
        }
    }

    #[test]
    fn test_inactive_npc_never_moves() {
        let mut rng = DeterministicRng::new(3);
        let mut npc = Npc::new(1000, "skin", Position::new(10.0, 10.0), 50.0, false);
        npc.deactivate();

        npc.perform_random_movement(&mut rng);
        npc.move_to(0.0, 0.0);
        assert_eq!(npc.position, Position::new(10.0, 10.0));
    }

    #[test]
    fn test_deactivate_idempotent() {
        let mut npc = Npc::new(1000, "skin", Position::ORIGIN, 0.5, false);
        npc.deactivate();
        npc.deactivate();
        assert!(!npc.active);
    }

    #[test]
    fn test_themed_npc_is_not_infiltrator() {
        let npc = Npc::new(1000, "skin", Position::ORIGIN, 0.5, true);
        assert!(npc.infiltrator_themed);
        assert!(!npc.is_infiltrator());
    }
}
