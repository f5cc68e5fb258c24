use thiserror::Error;

pub mod client;
pub mod ids;
pub mod server;

pub use client::{BattleAction, ClientCommand, parse_client_command};
pub use ids::{BATTLE_ID_ALPHABET, BATTLE_ID_LEN, BattleId, ConnectionId, TeamId, UserId};
pub use server::{
    BattleSnapshot, BattleStatus, CombatantSnapshot, CombatantStatus, DamageClass, LogEntry,
    LogKind, MoveInfo, PlayerSnapshot, ServerEvent, Side, Stat, StatBlock, Winner,
    parse_server_event,
};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Empty message")]
    EmptyMessage,
}
