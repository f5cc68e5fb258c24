//! In-memory stores. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use arena_battle::{BattleStatus, UserRating};
use arena_protocol::{BattleId, TeamId, UserId};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::{
    BattleHistoryStore, BattleRecord, NewBattleRecord, RatingStore, SessionRecord, SessionStore,
    TeamRecord, TeamStore,
};

#[derive(Debug)]
pub struct InMemoryTeamStore {
    teams: RwLock<HashMap<TeamId, TeamRecord>>,
    next_id: AtomicU64,
}

impl Default for InMemoryTeamStore {
    fn default() -> Self {
        Self {
            teams: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl InMemoryTeamStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TeamStore for InMemoryTeamStore {
    async fn create_team(&self, owner: UserId, name: String, document: Value) -> Result<TeamRecord> {
        let now = Utc::now();
        let record = TeamRecord {
            id: TeamId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            owner,
            name,
            document,
            created_at: now,
            updated_at: now,
        };
        self.teams.write().insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_team(&self, owner: UserId, team_id: TeamId) -> Result<Option<TeamRecord>> {
        Ok(self
            .teams
            .read()
            .get(&team_id)
            .filter(|t| t.owner == owner)
            .cloned())
    }

    async fn list_teams(&self, owner: UserId) -> Result<Vec<TeamRecord>> {
        let mut teams: Vec<_> = self
            .teams
            .read()
            .values()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        teams.sort_by_key(|t| t.id);
        Ok(teams)
    }

    async fn update_team(
        &self,
        owner: UserId,
        team_id: TeamId,
        name: Option<String>,
        document: Option<Value>,
    ) -> Result<Option<TeamRecord>> {
        let mut teams = self.teams.write();
        let Some(team) = teams.get_mut(&team_id).filter(|t| t.owner == owner) else {
            return Ok(None);
        };

        if let Some(name) = name {
            team.name = name;
        }
        if let Some(document) = document {
            team.document = document;
        }
        team.updated_at = Utc::now();
        Ok(Some(team.clone()))
    }

    async fn delete_team(&self, owner: UserId, team_id: TeamId) -> Result<bool> {
        let mut teams = self.teams.write();
        if teams.get(&team_id).is_some_and(|t| t.owner == owner) {
            teams.remove(&team_id);
            return Ok(true);
        }
        Ok(false)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBattleHistoryStore {
    records: Mutex<Vec<BattleRecord>>,
}

impl InMemoryBattleHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl BattleHistoryStore for InMemoryBattleHistoryStore {
    async fn save_battle_result(&self, battle: NewBattleRecord) -> Result<BattleRecord> {
        let mut records = self.records.lock();
        let record = BattleRecord {
            id: records.len() as u64 + 1,
            battle,
            created_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn get_battle(&self, id: u64) -> Result<Option<BattleRecord>> {
        Ok(self.records.lock().iter().find(|r| r.id == id).cloned())
    }

    async fn list_user_battles(&self, user_id: UserId) -> Result<Vec<BattleRecord>> {
        Ok(self
            .records
            .lock()
            .iter()
            .rev()
            .filter(|r| r.battle.player1_id == user_id || r.battle.player2_id == user_id)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRatingStore {
    ratings: DashMap<UserId, UserRating>,
}

impl InMemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RatingStore for InMemoryRatingStore {
    async fn get_or_create_rating(&self, user_id: UserId) -> Result<UserRating> {
        Ok(self
            .ratings
            .entry(user_id)
            .or_insert_with(|| UserRating::new(user_id))
            .clone())
    }

    async fn update_rating(
        &self,
        user_id: UserId,
        won: bool,
        opponent_rating: i32,
    ) -> Result<UserRating> {
        let mut rating = self
            .ratings
            .entry(user_id)
            .or_insert_with(|| UserRating::new(user_id));
        rating.apply_result(won, opponent_rating);
        Ok(rating.clone())
    }

    async fn record_draw(&self, user_id: UserId) -> Result<UserRating> {
        let mut rating = self
            .ratings
            .entry(user_id)
            .or_insert_with(|| UserRating::new(user_id));
        rating.record_draw();
        Ok(rating.clone())
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<UserRating>> {
        let mut all: Vec<UserRating> = self.ratings.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| b.rating.cmp(&a.rating).then(a.user_id.cmp(&b.user_id)));
        all.truncate(limit);
        Ok(all)
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<BattleId, SessionRecord>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: SessionRecord) -> Result<()> {
        self.sessions.insert(session.battle_id.clone(), session);
        Ok(())
    }

    async fn get_session(&self, battle_id: &BattleId) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.get(battle_id).map(|s| s.value().clone()))
    }

    async fn update_session(&self, session: SessionRecord) -> Result<bool> {
        match self.sessions.get_mut(&session.battle_id) {
            Some(mut existing) => {
                *existing = session;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_session(&self, battle_id: &BattleId) -> Result<bool> {
        Ok(self.sessions.remove(battle_id).is_some())
    }

    async fn list_expired_waiting_sessions(
        &self,
        older_than_minutes: i64,
    ) -> Result<Vec<SessionRecord>> {
        let Some(cutoff) = Duration::try_minutes(older_than_minutes)
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(Vec::new());
        };
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.status == BattleStatus::Waiting && s.created_at <= cutoff)
            .map(|s| s.value().clone())
            .collect())
    }
}
