//! Stored team -> combatants

use arena_battle::{Combatant, CombatantBuild};
use serde_json::Value;
use thiserror::Error;

use crate::document::{
    StoredMember, extract_ability, extract_base_stats, extract_evs, extract_item, extract_ivs,
    extract_level, extract_moves, extract_nickname, extract_species, extract_types,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TeamLoadError {
    #[error("Team data is not valid JSON: {0}")]
    Unparseable(String),

    #[error("Team data is not a list of Pokemon")]
    NotAList,

    #[error("Team is empty")]
    Empty,
}

/// Build every member of a stored team document.
///
/// Only a document that is not a JSON list, or an empty list, fails.
/// Malformed fields inside an entry fall back to their defaults.
pub fn load(document: &str) -> Result<Vec<Combatant>, TeamLoadError> {
    let value: Value =
        serde_json::from_str(document).map_err(|e| TeamLoadError::Unparseable(e.to_string()))?;
    load_value(&value)
}

/// Same as [`load`] for an already-parsed document
pub fn load_value(document: &Value) -> Result<Vec<Combatant>, TeamLoadError> {
    Ok(load_builds(document)?
        .into_iter()
        .map(Combatant::from_build)
        .collect())
}

/// Extract the builds without deriving stats
pub fn load_builds(document: &Value) -> Result<Vec<CombatantBuild>, TeamLoadError> {
    let entries = document.as_array().ok_or(TeamLoadError::NotAList)?;

    if entries.is_empty() {
        return Err(TeamLoadError::Empty);
    }

    Ok(entries
        .iter()
        .map(|entry| build_member(&StoredMember::from_value(entry)))
        .collect())
}

/// Extract one member, field by field
pub fn build_member(member: &StoredMember) -> CombatantBuild {
    CombatantBuild {
        species: extract_species(member),
        nickname: extract_nickname(member),
        types: extract_types(member),
        level: extract_level(member),
        base_stats: extract_base_stats(member),
        ivs: extract_ivs(member),
        evs: extract_evs(member),
        moves: extract_moves(member),
        ability: extract_ability(member),
        item: extract_item(member),
    }
}
