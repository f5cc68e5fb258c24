mod battle;

use serde::{Deserialize, Serialize};

use crate::ParseError;
use crate::ids::BattleId;

pub use battle::{
    BattleSnapshot, BattleStatus, CombatantSnapshot, CombatantStatus, DamageClass, LogEntry,
    LogKind, MoveInfo, PlayerSnapshot, Side, Stat, StatBlock, Winner,
};

/// Events pushed to a single connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServerEvent {
    /// A battle became Active; sent to both players
    BattleJoined(Box<BattleSnapshot>),

    /// A turn resolved and the battle continues
    BattleUpdated(Box<BattleSnapshot>),

    /// Terminal state of a battle
    BattleFinished(Box<BattleSnapshot>),

    /// Reply to the creator of a private battle
    #[serde(rename_all = "camelCase")]
    BattleCreated { battle_id: BattleId },

    OpponentDisconnected,

    Error(String),
}

impl ServerEvent {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::BattleJoined(_) => "BattleJoined",
            ServerEvent::BattleUpdated(_) => "BattleUpdated",
            ServerEvent::BattleFinished(_) => "BattleFinished",
            ServerEvent::BattleCreated { .. } => "BattleCreated",
            ServerEvent::OpponentDisconnected => "OpponentDisconnected",
            ServerEvent::Error(_) => "Error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(message.into())
    }

    /// Snapshot carried by the event, if any
    pub fn snapshot(&self) -> Option<&BattleSnapshot> {
        match self {
            ServerEvent::BattleJoined(s)
            | ServerEvent::BattleUpdated(s)
            | ServerEvent::BattleFinished(s) => Some(s),
            _ => None,
        }
    }

    /// Serialize to one JSON text frame
    pub fn to_wire_format(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Parse a server frame (used by test clients and tooling)
pub fn parse_server_event(frame: &str) -> Result<ServerEvent, ParseError> {
    let frame = frame.trim();

    if frame.is_empty() {
        return Err(ParseError::EmptyMessage);
    }

    serde_json::from_str(frame).map_err(|e| ParseError::InvalidFormat(e.to_string()))
}
