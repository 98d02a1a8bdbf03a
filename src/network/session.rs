//! Match Registry
//!
//! In-memory store of every match owned by this process. Each match sits
//! behind its own lock, so work on one match never waits on another.
//! The registry lock is held only for lookup, insert and removal.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::MatchConfig;
use crate::game::avatar::Player;
use crate::game::state::{Match, MatchId};

/// Length of a join code in hex characters.
pub const CODE_LENGTH: usize = 6;

/// Shared handle to one match.
#[derive(Clone, Debug)]
pub struct MatchHandle {
    /// Match id.
    pub id: MatchId,
    /// Join code.
    pub code: String,
    /// The match, guarded by its own lock.
    pub state: Arc<RwLock<Match>>,
}

/// Render a join code from fresh entropy.
pub fn join_code(entropy: &[u8; 16]) -> String {
    hex::encode_upper(&entropy[..CODE_LENGTH / 2])
}

/// Owns all matches, keyed by join code.
pub struct MatchRegistry {
    /// Active matches.
    matches: RwLock<BTreeMap<String, MatchHandle>>,
    /// Next match id.
    next_id: AtomicU64,
    /// Rules for new matches.
    config: MatchConfig,
}

impl MatchRegistry {
    /// Create an empty registry.
    pub fn new(config: MatchConfig) -> Self {
        Self {
            matches: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Create a match hosted by `owner` under a fresh join code.
    pub async fn create_match(&self, owner: Player) -> MatchHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut matches = self.matches.write().await;

        let (code, entropy) = loop {
            let entropy = uuid::Uuid::new_v4().into_bytes();
            let code = join_code(&entropy);
            if !matches.contains_key(&code) {
                break (code, entropy);
            }
        };

        let mut state = Match::with_config(id, code.clone(), self.config.clone(), entropy);
        info!("Match {} created by {}", code, owner.username);
        state.add_player(owner);

        let handle = MatchHandle {
            id,
            code: code.clone(),
            state: Arc::new(RwLock::new(state)),
        };
        matches.insert(code, handle.clone());
        handle
    }

    /// Get a match by join code (case-insensitive).
    pub async fn get_match_by_code(&self, code: &str) -> Option<MatchHandle> {
        let matches = self.matches.read().await;
        matches.get(&code.to_ascii_uppercase()).cloned()
    }

    /// Remove a match.
    pub async fn remove_match(&self, code: &str) -> Option<MatchHandle> {
        let mut matches = self.matches.write().await;
        matches.remove(&code.to_ascii_uppercase())
    }

    /// Number of matches held.
    pub async fn match_count(&self) -> usize {
        let matches = self.matches.read().await;
        matches.len()
    }

    /// Drop finished matches. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let handles: Vec<MatchHandle> = self.matches.read().await.values().cloned().collect();

        let mut finished = Vec::new();
        for handle in handles {
            if handle.state.read().await.is_finished() {
                finished.push(handle.code);
            }
        }

        let mut matches = self.matches.write().await;
        for code in &finished {
            matches.remove(code);
        }
        if !finished.is_empty() {
            info!("Removed {} finished matches", finished.len());
        }
        finished.len()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new(MatchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::position::Position;

    fn owner() -> Player {
        Player::new(1, "ana", "skin", Position::ORIGIN)
    }

    #[test]
    fn test_join_code_format() {
        let code = join_code(&[0xab; 16]);
        assert_eq!(code, "ABABAB");
        assert_eq!(code.len(), CODE_LENGTH);
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let registry = MatchRegistry::default();
        let handle = registry.create_match(owner()).await;

        assert_eq!(handle.code.len(), CODE_LENGTH);
        assert!(handle.code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));

        let found = registry.get_match_by_code(&handle.code.to_lowercase()).await.unwrap();
        assert_eq!(found.id, handle.id);

        let state = found.state.read().await;
        assert_eq!(state.host().map(|p| p.username.as_str()), Some("ana"));
        assert_eq!(state.code(), handle.code);
    }

    #[tokio::test]
    async fn test_unique_codes_and_ids() {
        let registry = MatchRegistry::default();
        let a = registry.create_match(owner()).await;
        let b = registry.create_match(owner()).await;

        assert_ne!(a.id, b.id);
        assert_ne!(a.code, b.code);
        assert_eq!(registry.match_count().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_code() {
        let registry = MatchRegistry::default();
        assert!(registry.get_match_by_code("ZZZZZZ").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_match() {
        let registry = MatchRegistry::default();
        let handle = registry.create_match(owner()).await;

        assert!(registry.remove_match(&handle.code).await.is_some());
        assert_eq!(registry.match_count().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_drops_finished() {
        let registry = MatchRegistry::default();
        let done = registry.create_match(owner()).await;
        let open = registry.create_match(owner()).await;

        done.state.write().await.end_match();

        assert_eq!(registry.cleanup().await, 1);
        assert!(registry.get_match_by_code(&done.code).await.is_none());
        assert!(registry.get_match_by_code(&open.code).await.is_some());
    }
}
