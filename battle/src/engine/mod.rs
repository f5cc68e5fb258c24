//! Turn-based battle state machine
//!
//! ```text
//! Waiting ──join──> Active ──all fainted / forfeit──> Finished
//!                     │ ▲
//!                     └─┘ resolved action
//! ```
//!
//! A battle only ever moves forward through these states. All mutation goes
//! through [`BattleState::perform_action`], which callers must serialize per
//! battle.

mod action;
mod state;

use thiserror::Error;

pub use action::ActionOutcome;
pub use state::{BattlePlayer, BattleState};

/// Reasons an action is refused without touching the battle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Battle is not active")]
    NotActive,

    #[error("Battle already started")]
    AlreadyStarted,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("You are not a player in this battle")]
    NotAParticipant,

    #[error("You are already a player in this battle")]
    AlreadyParticipant,

    #[error("Battle has no opponent")]
    OpponentMissing,
}
