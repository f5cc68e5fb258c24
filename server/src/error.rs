use arena_battle::ActionError;
use arena_protocol::{BattleId, TeamId};
use arena_team::TeamLoadError;
use thiserror::Error;

/// Failures reported back to the connection that caused them
#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("Team not found: {0}")]
    TeamNotFound(TeamId),

    #[error("Invalid team: {0}")]
    InvalidTeam(#[from] TeamLoadError),

    #[error("Battle not found: {0}")]
    BattleNotFound(BattleId),

    #[error("Battle already started")]
    BattleAlreadyStarted,

    #[error("Battle is not active")]
    BattleNotActive,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("You are not a player in this battle")]
    NotAParticipant,

    #[error("You are already in this battle")]
    AlreadyInBattle,

    #[error("{0}")]
    InvalidAction(String),

    #[error("Connection has not identified")]
    Unidentified,

    #[error("Connection already identified")]
    AlreadyIdentified,

    #[error("Storage error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl From<ActionError> for ArenaError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::NotActive | ActionError::OpponentMissing => ArenaError::BattleNotActive,
            ActionError::AlreadyStarted => ArenaError::BattleAlreadyStarted,
            ActionError::NotYourTurn => ArenaError::NotYourTurn,
            ActionError::NotAParticipant => ArenaError::NotAParticipant,
            ActionError::AlreadyParticipant => ArenaError::AlreadyInBattle,
        }
    }
}

pub type Result<T, E = ArenaError> = std::result::Result<T, E>;
