//! Domain types for battle resolution

mod combatant;
mod stats;

pub use combatant::{Combatant, CombatantBuild, format_move_name, struggle_move};
pub use stats::{derive_stat, derive_stats};
