//! Storage collaborators
//!
//! The arena only needs create/read/update calls from its stores. They are
//! traits so a database-backed implementation can replace the in-memory ones
//! in [`memory`] without touching the battle flow. Every call may fail with
//! an opaque transient error.

mod memory;

use std::sync::Arc;

use anyhow::{Context, Result};
use arena_battle::{BattleStatus, UserRating, Winner};
use arena_protocol::{BattleId, ConnectionId, TeamId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use memory::{
    InMemoryBattleHistoryStore, InMemoryRatingStore, InMemorySessionStore, InMemoryTeamStore,
};

/// A user's saved team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRecord {
    pub id: TeamId,
    pub owner: UserId,
    pub name: String,

    /// Loosely-typed member list, read by `arena_team::load_value`
    pub document: Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn create_team(&self, owner: UserId, name: String, document: Value) -> Result<TeamRecord>;

    /// `None` if the team does not exist or belongs to someone else
    async fn get_team(&self, owner: UserId, team_id: TeamId) -> Result<Option<TeamRecord>>;

    async fn list_teams(&self, owner: UserId) -> Result<Vec<TeamRecord>>;

    /// Replace the given fields. `None` if the team is not the owner's.
    async fn update_team(
        &self,
        owner: UserId,
        team_id: TeamId,
        name: Option<String>,
        document: Option<Value>,
    ) -> Result<Option<TeamRecord>>;

    async fn delete_team(&self, owner: UserId, team_id: TeamId) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleResult {
    Player1Win,
    Player2Win,
    Draw,
}

impl From<Winner> for BattleResult {
    fn from(winner: Winner) -> Self {
        match winner {
            Winner::Player1 => BattleResult::Player1Win,
            Winner::Player2 => BattleResult::Player2Win,
            Winner::Draw => BattleResult::Draw,
        }
    }
}

/// Everything written when a battle ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBattleRecord {
    pub player1_id: UserId,
    pub player2_id: UserId,
    pub player1_team_id: TeamId,
    pub player2_team_id: TeamId,

    /// Absent on a draw
    pub winner_id: Option<UserId>,
    pub result: BattleResult,
    pub total_turns: u32,

    /// JSON array of log entries
    pub battle_log: String,

    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleRecord {
    pub id: u64,
    #[serde(flatten)]
    pub battle: NewBattleRecord,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait BattleHistoryStore: Send + Sync {
    async fn save_battle_result(&self, record: NewBattleRecord) -> Result<BattleRecord>;

    async fn get_battle(&self, id: u64) -> Result<Option<BattleRecord>>;

    /// Battles the user played in, newest first
    async fn list_user_battles(&self, user_id: UserId) -> Result<Vec<BattleRecord>>;
}

#[async_trait]
pub trait RatingStore: Send + Sync {
    async fn get_or_create_rating(&self, user_id: UserId) -> Result<UserRating>;

    /// Apply a decisive result against an opponent's pre-battle rating
    async fn update_rating(&self, user_id: UserId, won: bool, opponent_rating: i32)
    -> Result<UserRating>;

    /// Counters only; the rating does not move
    async fn record_draw(&self, user_id: UserId) -> Result<UserRating>;

    /// Highest ratings first
    async fn leaderboard(&self, limit: usize) -> Result<Vec<UserRating>>;
}

/// Durable mirror of a registered battle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub battle_id: BattleId,
    pub player1_id: UserId,
    pub player1_connection: ConnectionId,
    pub player1_team_id: TeamId,
    pub player2_id: Option<UserId>,
    pub player2_connection: Option<ConnectionId>,
    pub player2_team_id: Option<TeamId>,
    pub status: BattleStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: SessionRecord) -> Result<()>;

    async fn get_session(&self, battle_id: &BattleId) -> Result<Option<SessionRecord>>;

    /// Replace an existing session. Returns false, writing nothing, if it is
    /// gone.
    async fn update_session(&self, session: SessionRecord) -> Result<bool>;

    /// Returns false if there was nothing to delete
    async fn delete_session(&self, battle_id: &BattleId) -> Result<bool>;

    /// Waiting sessions created more than `older_than_minutes` ago
    async fn list_expired_waiting_sessions(&self, older_than_minutes: i64)
    -> Result<Vec<SessionRecord>>;
}

/// The set of stores the arena talks to
#[derive(Clone)]
pub struct Collaborators {
    pub teams: Arc<dyn TeamStore>,
    pub history: Arc<dyn BattleHistoryStore>,
    pub ratings: Arc<dyn RatingStore>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Collaborators {
    /// Fresh in-memory stores
    pub fn in_memory() -> Self {
        Self {
            teams: Arc::new(InMemoryTeamStore::new()),
            history: Arc::new(InMemoryBattleHistoryStore::new()),
            ratings: Arc::new(InMemoryRatingStore::new()),
            sessions: Arc::new(InMemorySessionStore::new()),
        }
    }
}

/// One entry of a team seed file
#[derive(Debug, Clone, Deserialize)]
pub struct TeamSeed {
    pub owner: UserId,
    pub name: String,
    pub team: Value,
}

/// Load `[{"owner": 1, "name": "...", "team": [...]}, ...]` into a team store.
/// Returns the created records in file order.
pub async fn seed_teams(store: &dyn TeamStore, document: &str) -> Result<Vec<TeamRecord>> {
    let seeds: Vec<TeamSeed> =
        serde_json::from_str(document).context("Team seed file is not a list of teams")?;

    let mut created = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let record = store
            .create_team(seed.owner, seed.name, seed.team)
            .await
            .context("Failed to store seeded team")?;
        created.push(record);
    }
    Ok(created)
}
