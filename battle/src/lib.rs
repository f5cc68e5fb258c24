//! Battle resolution for the real-time arena.
//!
//! # Overview
//!
//! `arena-battle` sits between `arena-protocol` (wire format) and the server:
//!
//! ```text
//! arena-protocol (wire format)
//!        │
//!        ▼
//! arena-battle (stats, damage, state machine) ← THIS CRATE
//!        │
//!        ├─> arena-team (stored team documents -> combatants)
//!        └─> arena-server (registry, matchmaking, connections)
//! ```
//!
//! Everything here is synchronous and free of I/O. Randomness is injected
//! through [`rand::Rng`] so the server can keep the engine deterministic in
//! tests.
//!
//! # Main Types
//!
//! - [`Combatant`] - one battle-ready Pokemon with derived stats
//! - [`BattleState`] - a battle, its players and its log
//! - [`BattleAction`] - move / switch / forfeit
//! - [`UserRating`] - Elo rating record
//!
//! # Example Usage
//!
//! ```ignore
//! use arena_battle::{BattleAction, BattleState};
//!
//! let mut battle = BattleState::active(player1, player2);
//! let outcome = battle.perform_action(player1_id, BattleAction::Move { index: 0 }, &mut rng)?;
//! ```

pub mod damage;
pub mod engine;
pub mod rating;
pub mod types;

// Re-export main types at crate root for convenience
pub use damage::{compute_damage, compute_damage_with_roll};
pub use engine::{ActionError, ActionOutcome, BattlePlayer, BattleState};
pub use rating::{Rank, UserRating};
pub use types::{
    Combatant, CombatantBuild, derive_stat, derive_stats, format_move_name, struggle_move,
};

// Re-export commonly used protocol types
pub use arena_protocol::{
    BattleAction, BattleStatus, CombatantStatus, DamageClass, LogEntry, LogKind, MoveInfo, Side,
    Stat, StatBlock, Winner,
};
