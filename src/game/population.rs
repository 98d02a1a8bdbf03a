//! Match Population
//!
//! Fills a match when it starts: roles, decoy NPCs and tasks. Every
//! random choice draws from the match RNG, so a given seed always yields
//! the same island.

use tracing::debug;

use crate::game::avatar::Npc;
use crate::game::state::Match;
use crate::game::task::{ContestTask, ProgressTask};

/// Repair tasks placed on every island.
pub const REPAIR_TASK_COUNT: usize = 3;

/// Skin used when no infiltrator has been chosen.
pub const DEFAULT_SKIN: &str = "castaway";

/// Populates a match at start.
pub trait Population: Send + Sync {
    /// Choose the infiltrator.
    fn assign_human_roles(&self, m: &mut Match);
    /// Spawn the decoy NPCs.
    fn generate_npcs(&self, m: &mut Match);
    /// Place the tasks.
    fn generate_tasks(&self, m: &mut Match);
}

/// Default population: one infiltrator, `npc_count` look-alike NPCs,
/// three repair tasks and one fuel contest.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomPopulation;

impl Population for RandomPopulation {
    fn assign_human_roles(&self, m: &mut Match) {
        m.assign_infiltrator();
    }

    fn generate_npcs(&self, m: &mut Match) {
        let skin = m
            .infiltrator()
            .map(|p| p.skin_id.clone())
            .unwrap_or_else(|| DEFAULT_SKIN.to_string());
        let half_extent = m.config.island_half_extent;
        let speed = m.config.npc_movement_speed;

        for i in 0..m.config.npc_count {
            let id = m.next_npc_id();
            let position = m.rng.random_island_position(half_extent);
            // Every other decoy wears the infiltrator theme
            m.add_npc(Npc::new(id, skin.clone(), position, speed, i % 2 == 0));
        }
        debug!("Match {}: {} NPCs spawned", m.code(), m.npcs().len());
    }

    fn generate_tasks(&self, m: &mut Match) {
        let half_extent = m.config.island_half_extent;

        for speed in 1..=REPAIR_TASK_COUNT as u32 {
            let id = m.next_task_id();
            let location = m.rng.random_island_position(half_extent);
            m.add_task(ProgressTask::new(id, location, speed));
        }

        let id = m.next_task_id();
        let location = m.rng.random_island_position(half_extent);
        m.add_task(ContestTask::new(id, location, None));
        debug!("Match {}: {} tasks placed", m.code(), m.tasks().len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::position::Position;
    use crate::game::avatar::{Avatar, Player, NPC_ID_BASE};
    use crate::game::task::Task;

    fn lobby() -> Match {
        let mut m = Match::new(7, "POPUL8");
        for id in 1..=5 {
            m.add_player(Player::new(id, format!("p{}", id), format!("skin{}", id), Position::ORIGIN));
        }
        m
    }

    #[test]
    fn test_npcs_mirror_infiltrator() {
        let mut m = lobby();
        RandomPopulation.assign_human_roles(&mut m);
        RandomPopulation.generate_npcs(&mut m);

        let skin = m.infiltrator().unwrap().skin_id.clone();
        assert_eq!(m.npcs().len(), m.config().npc_count);
        for (i, npc) in m.npcs().iter().enumerate() {
            assert_eq!(npc.id, NPC_ID_BASE + i as u64);
            assert_eq!(npc.skin_id, skin);
            assert!(npc.is_present());
            assert!(npc.position.x.abs() <= m.config().island_half_extent);
            assert!(npc.position.y.abs() <= m.config().island_half_extent);
        }
    }

    #[test]
    fn test_npcs_without_infiltrator_use_default_skin() {
        let mut m = lobby();
        RandomPopulation.generate_npcs(&mut m);
        assert!(m.npcs().iter().all(|n| n.skin_id == DEFAULT_SKIN));
    }

    #[test]
    fn test_task_layout() {
        let mut m = lobby();
        RandomPopulation.generate_tasks(&mut m);

        let repairs = m.tasks().iter().filter(|t| matches!(t, Task::Progress(_))).count();
        let contests = m.tasks().iter().filter(|t| matches!(t, Task::Contest(_))).count();
        assert_eq!(repairs, REPAIR_TASK_COUNT);
        assert_eq!(contests, 1);
    }

    #[test]
    fn test_same_seed_same_island() {
        let mut a = lobby();
        let mut b = lobby();
        for m in [&mut a, &mut b] {
            RandomPopulation.assign_human_roles(m);
            RandomPopulation.generate_npcs(m);
        }
        assert_eq!(a.infiltrator_id(), b.infiltrator_id());
        assert_eq!(a.npcs(), b.npcs());
    }
}
