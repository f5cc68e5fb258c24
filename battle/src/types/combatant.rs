//! Combatant types

use arena_protocol::{CombatantSnapshot, CombatantStatus, DamageClass, MoveInfo, StatBlock};

use super::stats::derive_stats;

/// Everything needed to build a combatant, before stats are derived
#[derive(Debug, Clone, PartialEq)]
pub struct CombatantBuild {
    /// Species name (e.g., "pikachu")
    pub species: String,

    pub nickname: Option<String>,

    pub types: Vec<String>,

    /// Level (1-100)
    pub level: i32,

    pub base_stats: StatBlock,
    pub ivs: StatBlock,
    pub evs: StatBlock,

    pub moves: Vec<MoveInfo>,
    pub ability: String,
    pub item: Option<String>,
}

/// One battle-ready Pokemon
///
/// Stats are derived once at construction and never change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Combatant {
    pub species: String,
    pub nickname: Option<String>,
    pub types: Vec<String>,
    pub level: i32,

    // === HP ===
    pub current_hp: i32,
    pub max_hp: i32,

    pub status: CombatantStatus,

    /// Derived stat block (hp included)
    pub stats: StatBlock,

    pub moves: Vec<MoveInfo>,
    pub ability: String,
    pub item: Option<String>,
}

impl Combatant {
    /// Derive stats and create a combatant at full HP
    pub fn from_build(build: CombatantBuild) -> Self {
        let stats = derive_stats(&build.base_stats, &build.ivs, &build.evs, build.level);

        Self {
            species: build.species,
            nickname: build.nickname,
            types: build.types,
            level: build.level,
            current_hp: stats.hp,
            max_hp: stats.hp,
            status: CombatantStatus::Normal,
            stats,
            moves: build.moves,
            ability: build.ability,
            item: build.item,
        }
    }

    /// Get display name (nickname or species)
    pub fn name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.species)
    }

    pub fn is_fainted(&self) -> bool {
        self.status == CombatantStatus::Fainted
    }

    pub fn is_alive(&self) -> bool {
        !self.is_fainted()
    }

    /// Check whether this combatant has a type (case-insensitive)
    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.iter().any(|t| t.eq_ignore_ascii_case(type_name))
    }

    /// Apply damage, clamping HP at zero and marking a faint.
    /// Returns true if this damage caused the faint.
    pub fn take_damage(&mut self, amount: i32) -> bool {
        if amount <= 0 || self.is_fainted() {
            return false;
        }

        self.current_hp = (self.current_hp - amount).max(0);

        if self.current_hp == 0 {
            self.status = CombatantStatus::Fainted;
            return true;
        }
        false
    }

    pub fn snapshot(&self) -> CombatantSnapshot {
        CombatantSnapshot {
            name: self.name().to_string(),
            species: self.species.clone(),
            types: self.types.clone(),
            level: self.level,
            current_hp: self.current_hp,
            max_hp: self.max_hp,
            status: self.status,
            stats: self.stats,
            moves: self.moves.clone(),
            ability: self.ability.clone(),
            item: self.item.clone(),
        }
    }
}

/// The harmless fallback move used when move data is unusable
pub fn struggle_move() -> MoveInfo {
    MoveInfo {
        name: "struggle".to_string(),
        power: Some(40),
        move_type: Some("normal".to_string()),
        damage_class: DamageClass::Physical,
    }
}

/// Title-case a hyphenated move name ("thunder-punch" -> "Thunder Punch")
pub fn format_move_name(name: &str) -> String {
    name.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
