use serde::{Deserialize, Serialize};

use crate::ParseError;
use crate::ids::{BattleId, TeamId, UserId};

/// Commands that clients can send to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Bind the connection to an identity authenticated upstream
    Identify { user_id: UserId, username: String },

    JoinMatchmaking { team_id: TeamId },

    LeaveMatchmaking,

    CreatePrivateBattle { team_id: TeamId },

    JoinPrivateBattle { battle_id: BattleId, team_id: TeamId },

    PerformAction { battle_id: BattleId, action: BattleAction },
}

/// A single turn decision
///
/// Indices are signed on the wire so that a misbehaving client's negative
/// index reaches the battle as an invalid selection rather than a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BattleAction {
    /// Use the move in this slot of the active combatant
    Move { index: i32 },

    /// Bring in the combatant at this team slot
    Switch { index: i32 },

    Forfeit,
}

impl ClientCommand {
    /// Serialize command to wire format
    pub fn to_wire_format(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Parse one text frame from a client
pub fn parse_client_command(frame: &str) -> Result<ClientCommand, ParseError> {
    let frame = frame.trim();

    if frame.is_empty() {
        return Err(ParseError::EmptyMessage);
    }

    let value: serde_json::Value =
        serde_json::from_str(frame).map_err(|e| ParseError::InvalidFormat(e.to_string()))?;

    if value.get("type").is_none() {
        return Err(ParseError::MissingField("type".to_string()));
    }

    serde_json::from_value(value).map_err(|e| ParseError::InvalidFormat(e.to_string()))
}
