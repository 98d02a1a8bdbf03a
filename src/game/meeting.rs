//! Meetings and Voting
//!
//! A meeting is the voting session of a match: a chat transcript plus
//! one live vote per voter. It only exists while voting is active.

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::game::avatar::AvatarId;
use crate::game::tally;

/// Meeting identifier, unique within a match.
pub type MeetingId = u64;

/// One line of meeting chat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message identifier.
    pub id: u64,
    /// Author.
    pub sender_id: AvatarId,
    /// Body, stored verbatim.
    pub text: String,
    /// When the server received it.
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a message stamped with the current time.
    pub fn new(id: u64, sender_id: AvatarId, text: impl Into<String>) -> Self {
        Self {
            id,
            sender_id,
            text: text.into(),
            sent_at: Utc::now(),
        }
    }
}

/// A live voting session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    /// Meeting identifier.
    pub id: MeetingId,
    /// Player who called the meeting, if any.
    pub convener: Option<AvatarId>,
    /// Seconds before the vote is forced.
    pub duration_seconds: u32,
    /// Chat in arrival order.
    pub chat: Vec<ChatMessage>,
    /// Voter key to chosen target.
    pub votes: BTreeMap<String, AvatarId>,
}

impl Meeting {
    /// Open a meeting with an empty transcript and no votes.
    pub fn new(id: MeetingId, convener: Option<AvatarId>, duration_seconds: u32) -> Self {
        info!(
            "Meeting {} opened by {:?} for {} seconds",
            id, convener, duration_seconds
        );
        Self {
            id,
            convener,
            duration_seconds,
            chat: Vec::new(),
            votes: BTreeMap::new(),
        }
    }

    /// Append a chat line.
    pub fn add_chat(&mut self, message: ChatMessage) {
        debug!("[meeting {}] {}: {}", self.id, message.sender_id, message.text);
        self.chat.push(message);
    }

    /// Record a vote, replacing any earlier vote from the same voter.
    pub fn cast_vote(&mut self, voter_key: impl Into<String>, target: AvatarId) {
        let voter_key = voter_key.into();
        debug!("{} voted for {} in meeting {}", voter_key, target, self.id);
        self.votes.insert(voter_key, target);
    }

    /// Has this voter a live vote.
    pub fn has_voted(&self, voter_key: &str) -> bool {
        self.votes.contains_key(voter_key)
    }

    /// Votes per target.
    pub fn vote_counts(&self) -> BTreeMap<AvatarId, u32> {
        tally::count(self.votes.values().copied())
    }

    /// Most voted target, or `None` on a tie or when nobody voted.
    pub fn tally_votes(&self) -> Option<AvatarId> {
        let result = tally::strict_max(self.vote_counts());
        match result {
            Some(target) => info!("Meeting {} selected {}", self.id, target),
            None if self.votes.is_empty() => info!("Meeting {} closed without votes", self.id),
            None => info!("Meeting {} ended in a tie", self.id),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meeting() -> Meeting {
        Meeting::new(1, Some(1), 60)
    }

    #[test]
    fn test_new_meeting_is_empty() {
        let m = meeting();
        assert_eq!(m.convener, Some(1));
        assert_eq!(m.duration_seconds, 60);
        assert!(m.chat.is_empty());
        assert!(m.votes.is_empty());
    }

    #[test]
    fn test_chat_keeps_order() {
        let mut m = meeting();
        m.add_chat(ChatMessage::new(1, 2, "First"));
        m.add_chat(ChatMessage::new(2, 3, "Second"));
        m.add_chat(ChatMessage::new(3, 1, "Third"));

        let texts: Vec<_> = m.chat.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["First", "Second", "Third"]);
    }

    #[test]
    fn test_revote_overwrites() {
        let mut m = meeting();
        m.cast_vote("ana", 100);
        m.cast_vote("ana", 101);
        assert_eq!(m.votes.len(), 1);
        assert_eq!(m.votes.get("ana"), Some(&101));
    }

    #[test]
    fn test_tally_majority() {
        let mut m = meeting();
        m.cast_vote("ana", 100);
        m.cast_vote("ben", 101);
        m.cast_vote("cai", 100);
        assert_eq!(m.tally_votes(), Some(100));
    }

    #[test]
    fn test_tally_tie_is_none() {
        let mut m = meeting();
        m.cast_vote("ana", 100);
        m.cast_vote("ben", 101);
        assert_eq!(m.tally_votes(), None);
    }

    #[test]
    fn test_tally_tie_ignores_last_vote() {
        let mut m = meeting();
        m.cast_vote("ana", 100);
        m.cast_vote("ben", 101);
        m.cast_vote("cai", 101);
        m.cast_vote("dan", 100);
        assert_eq!(m.tally_votes(), None);
    }

    #[test]
    fn test_tally_empty_is_none() {
        assert_eq!(meeting().tally_votes(), None);
    }
}
