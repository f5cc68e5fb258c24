//! FIFO matchmaking queue
//!
//! Every operation takes the queue lock once, so enqueue, pairing and removal
//! are linearizable: an entry handed out by [`MatchmakingQueue::try_dequeue_pair`]
//! can never also be returned by [`MatchmakingQueue::remove`].

use std::collections::VecDeque;

use arena_battle::Combatant;
use arena_protocol::{ConnectionId, TeamId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// A player waiting for an opponent
#[derive(Debug, Clone)]
pub struct MatchmakingEntry {
    pub user_id: UserId,
    pub username: String,
    pub team_id: TeamId,

    /// Team already loaded, so pairing never waits on storage
    pub team: Vec<Combatant>,

    pub connection_id: ConnectionId,

    /// Carried for display and Elo; pairing ignores it
    pub rating: i32,

    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    entries: Mutex<VecDeque<MatchmakingEntry>>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. An earlier entry for the same user is dropped
    /// first; returns true if one was replaced.
    pub fn enqueue(&self, entry: MatchmakingEntry) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.user_id != entry.user_id);
        let replaced = entries.len() != before;
        entries.push_back(entry);
        replaced
    }

    /// Take the two oldest entries, or nothing if fewer than two wait
    pub fn try_dequeue_pair(&self) -> Option<(MatchmakingEntry, MatchmakingEntry)> {
        let mut entries = self.entries.lock();
        if entries.len() < 2 {
            return None;
        }
        let first = entries.pop_front()?;
        let second = entries.pop_front()?;
        Some((first, second))
    }

    /// Remove every entry for `user_id`, keeping the others in order.
    /// Returns how many were removed.
    pub fn remove(&self, user_id: UserId) -> usize {
        self.remove_where(|e| e.user_id == user_id)
    }

    /// Remove entries queued from one connection
    pub fn remove_connection(&self, connection_id: ConnectionId) -> usize {
        self.remove_where(|e| e.connection_id == connection_id)
    }

    fn remove_where(&self, pred: impl Fn(&MatchmakingEntry) -> bool) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| !pred(e));
        before - entries.len()
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.entries.lock().iter().any(|e| e.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
