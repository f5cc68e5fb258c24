//! Stored team documents and conversion into battle-ready combatants.
//!
//! Teams are stored as loosely-typed JSON lists. [`load`] turns one into a
//! list of [`Combatant`](arena_battle::Combatant)s, degrading malformed fields
//! to safe defaults instead of failing.

pub mod document;
mod loader;

pub use document::StoredMember;
pub use loader::{TeamLoadError, build_member, load, load_builds, load_value};
