//! Shared types for battle protocol messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BattleId, ConnectionId, UserId};

/// Which seat a player occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Player1,
    Player2,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Side::Player1 => Side::Player2,
            Side::Player2 => Side::Player1,
        }
    }
}

/// Outcome of a finished battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    Player1,
    Player2,
    Draw,
}

impl From<Side> for Winner {
    fn from(side: Side) -> Self {
        match side {
            Side::Player1 => Winner::Player1,
            Side::Player2 => Winner::Player2,
        }
    }
}

/// Battle lifecycle. Transitions only run forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleStatus {
    Waiting,
    Active,
    Finished,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatantStatus {
    #[default]
    Normal,
    Fainted,
}

/// Physical/special split. Status moves deal damage through the special path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageClass {
    Physical,
    #[default]
    Special,
    Status,
}

impl DamageClass {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "physical" => Some(DamageClass::Physical),
            "special" => Some(DamageClass::Special),
            "status" => Some(DamageClass::Status),
            _ => None,
        }
    }

    pub fn is_physical(self) -> bool {
        self == DamageClass::Physical
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogKind {
    Info,
    Damage,
    Switch,
    Turn,
    Win,
    Invalid,
}

/// One timestamped line of the battle log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub kind: LogKind,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            kind,
        }
    }
}

/// The six battle stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    Hp,
    Attack,
    Defense,
    SpecialAttack,
    SpecialDefense,
    Speed,
}

impl Stat {
    pub const ALL: [Stat; 6] = [
        Stat::Hp,
        Stat::Attack,
        Stat::Defense,
        Stat::SpecialAttack,
        Stat::SpecialDefense,
        Stat::Speed,
    ];

    /// Key used by species documents (`stats[].stat.name`)
    pub fn key(self) -> &'static str {
        match self {
            Stat::Hp => "hp",
            Stat::Attack => "attack",
            Stat::Defense => "defense",
            Stat::SpecialAttack => "special-attack",
            Stat::SpecialDefense => "special-defense",
            Stat::Speed => "speed",
        }
    }

    /// Key used by IV/EV spreads
    pub fn camel_key(self) -> &'static str {
        match self {
            Stat::Hp => "hp",
            Stat::Attack => "attack",
            Stat::Defense => "defense",
            Stat::SpecialAttack => "specialAttack",
            Stat::SpecialDefense => "specialDefense",
            Stat::Speed => "speed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Stat::ALL
            .into_iter()
            .find(|stat| stat.key() == s || stat.camel_key() == s)
    }
}

/// A value per stat. Used for base stats, IVs, EVs and derived stats alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatBlock {
    pub hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub special_attack: i32,
    pub special_defense: i32,
    pub speed: i32,
}

impl StatBlock {
    /// Every stat set to the same value
    pub fn splat(value: i32) -> Self {
        Self {
            hp: value,
            attack: value,
            defense: value,
            special_attack: value,
            special_defense: value,
            speed: value,
        }
    }

    pub fn get(&self, stat: Stat) -> i32 {
        match stat {
            Stat::Hp => self.hp,
            Stat::Attack => self.attack,
            Stat::Defense => self.defense,
            Stat::SpecialAttack => self.special_attack,
            Stat::SpecialDefense => self.special_defense,
            Stat::Speed => self.speed,
        }
    }

    pub fn set(&mut self, stat: Stat, value: i32) {
        match stat {
            Stat::Hp => self.hp = value,
            Stat::Attack => self.attack = value,
            Stat::Defense => self.defense = value,
            Stat::SpecialAttack => self.special_attack = value,
            Stat::SpecialDefense => self.special_defense = value,
            Stat::Speed => self.speed = value,
        }
    }
}

/// A move as known to the battle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveInfo {
    pub name: String,

    /// Base power; `None` for moves the source data leaves unset
    pub power: Option<i32>,

    #[serde(rename = "type")]
    pub move_type: Option<String>,

    pub damage_class: DamageClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatantSnapshot {
    pub name: String,
    pub species: String,
    pub types: Vec<String>,
    pub level: i32,
    pub current_hp: i32,
    pub max_hp: i32,
    pub status: CombatantStatus,
    pub stats: StatBlock,
    pub moves: Vec<MoveInfo>,
    pub ability: String,
    pub item: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub user_id: UserId,
    pub username: String,
    pub connection_id: ConnectionId,
    pub team: Vec<CombatantSnapshot>,
    pub active_index: usize,
}

/// Everything a client needs to render a battle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleSnapshot {
    pub battle_id: BattleId,
    pub player1: PlayerSnapshot,
    pub player2: Option<PlayerSnapshot>,
    pub current_turn: Side,
    pub turn_number: u32,
    pub log: Vec<LogEntry>,
    pub status: BattleStatus,
    pub winner: Option<Winner>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}
