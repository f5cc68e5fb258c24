//! Stored team document shape and defaulted field extraction
//!
//! Team data comes from a loosely-typed store. Species blocks follow the
//! PokeAPI layout (`stats[].base_stat`, `types[].type.name`, ...), but older
//! teams were saved with camelCase keys or flattened values, so every
//! extractor accepts the common variants and falls back to a default on
//! anything else.

use arena_battle::{DamageClass, MoveInfo, Stat, StatBlock, struggle_move};
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_SPECIES: &str = "Unknown";
pub const DEFAULT_ABILITY: &str = "Unknown";
pub const DEFAULT_LEVEL: i32 = 50;
pub const DEFAULT_BASE_STAT: i32 = 50;
pub const DEFAULT_IV: i32 = 31;
pub const DEFAULT_EV: i32 = 0;

pub const MAX_LEVEL: i32 = 100;
pub const MAX_BASE_STAT: i32 = 255;
pub const MAX_IV: i32 = 31;
pub const MAX_EV: i32 = 252;

/// One team entry as stored. Every field is optional and untyped.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoredMember {
    /// Species document
    pub pokemon: Option<Value>,
    /// Flat species name, used when `pokemon` is missing
    pub species: Option<Value>,
    pub nickname: Option<Value>,
    pub level: Option<Value>,
    pub ability: Option<Value>,
    pub item: Option<Value>,
    pub moves: Option<Value>,
    pub evs: Option<Value>,
    pub ivs: Option<Value>,
}

impl StoredMember {
    /// Read an entry; a non-object entry becomes an all-default member
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

/// A string, or an object carrying a string `name`
fn name_of(value: &Value) -> Option<&str> {
    let name = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("name").and_then(Value::as_str),
        _ => None,
    };
    name.map(str::trim).filter(|s| !s.is_empty())
}

/// An integral number (floats with no fraction are accepted)
fn int_of(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

fn clamp_i32(value: i64, min: i32, max: i32) -> i32 {
    value.clamp(i64::from(min), i64::from(max)) as i32
}

/// Look up a key under its hyphenated, camelCase or snake_case spelling
fn stat_field(map: &serde_json::Map<String, Value>, stat: Stat) -> Option<&Value> {
    let snake = stat.key().replace('-', "_");
    map.get(stat.key())
        .or_else(|| map.get(stat.camel_key()))
        .or_else(|| map.get(snake.as_str()))
}

pub fn extract_species(member: &StoredMember) -> String {
    member
        .pokemon
        .as_ref()
        .and_then(name_of)
        .or_else(|| member.species.as_ref().and_then(name_of))
        .unwrap_or(DEFAULT_SPECIES)
        .to_string()
}

pub fn extract_nickname(member: &StoredMember) -> Option<String> {
    member
        .nickname
        .as_ref()
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Types from `types: ["fire"]` or `types: [{"slot":1,"type":{"name":"fire"}}]`.
/// Defaults to no types.
pub fn extract_types(member: &StoredMember) -> Vec<String> {
    let Some(types) = member
        .pokemon
        .as_ref()
        .and_then(|p| p.get("types"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    types
        .iter()
        .filter_map(|entry| entry.get("type").and_then(name_of).or_else(|| name_of(entry)))
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

/// Level in 1..=100, default 50
pub fn extract_level(member: &StoredMember) -> i32 {
    member
        .level
        .as_ref()
        .and_then(int_of)
        .map(|l| clamp_i32(l, 1, MAX_LEVEL))
        .unwrap_or(DEFAULT_LEVEL)
}

/// One base stat clamped to 255; 50 if absent, non-numeric or not positive
pub fn extract_base_stat(member: &StoredMember, stat: Stat) -> i32 {
    let Some(stats) = member.pokemon.as_ref().and_then(|p| p.get("stats")) else {
        return DEFAULT_BASE_STAT;
    };

    let raw = match stats {
        // [{"base_stat": 45, "stat": {"name": "hp"}}]
        Value::Array(entries) => entries
            .iter()
            .find(|e| {
                e.get("stat")
                    .and_then(name_of)
                    .and_then(Stat::parse)
                    .is_some_and(|s| s == stat)
            })
            .and_then(|e| e.get("base_stat").or_else(|| e.get("baseStat"))),
        // {"hp": 45, "special-attack": 65}
        Value::Object(map) => stat_field(map, stat),
        _ => None,
    };

    raw.and_then(int_of)
        .filter(|v| *v > 0)
        .map(|v| clamp_i32(v, 1, MAX_BASE_STAT))
        .unwrap_or(DEFAULT_BASE_STAT)
}

pub fn extract_base_stats(member: &StoredMember) -> StatBlock {
    let mut block = StatBlock::default();
    for stat in Stat::ALL {
        block.set(stat, extract_base_stat(member, stat));
    }
    block
}

fn extract_spread(spread: Option<&Value>, default: i32, max: i32) -> StatBlock {
    let mut block = StatBlock::splat(default);
    let Some(map) = spread.and_then(Value::as_object) else {
        return block;
    };

    for stat in Stat::ALL {
        if let Some(value) = stat_field(map, stat).and_then(int_of) {
            block.set(stat, clamp_i32(value, 0, max));
        }
    }
    block
}

/// IVs clamped to 0..=31, default 31
pub fn extract_ivs(member: &StoredMember) -> StatBlock {
    extract_spread(member.ivs.as_ref(), DEFAULT_IV, MAX_IV)
}

/// EVs clamped to 0..=252, default 0
pub fn extract_evs(member: &StoredMember) -> StatBlock {
    extract_spread(member.evs.as_ref(), DEFAULT_EV, MAX_EV)
}

/// Parse one move entry; `None` if it is unusable
pub fn parse_move(entry: &Value) -> Option<MoveInfo> {
    let map = entry.as_object()?;
    let name = map.get("name").and_then(name_of)?.to_string();

    let power = map
        .get("power")
        .and_then(int_of)
        .map(|p| p.clamp(0, i64::from(i32::MAX)) as i32);

    let move_type = map
        .get("type")
        .and_then(name_of)
        .map(str::to_ascii_lowercase);

    let damage_class = map
        .get("damage_class")
        .or_else(|| map.get("damageClass"))
        .and_then(name_of)
        .and_then(DamageClass::parse)
        .unwrap_or_default();

    Some(MoveInfo {
        name,
        power,
        move_type,
        damage_class,
    })
}

/// Moves in order; malformed entries become Struggle, and a missing or
/// empty list becomes a single Struggle
pub fn extract_moves(member: &StoredMember) -> Vec<MoveInfo> {
    let moves: Vec<MoveInfo> = member
        .moves
        .as_ref()
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|e| parse_move(e).unwrap_or_else(struggle_move))
                .collect()
        })
        .unwrap_or_default();

    if moves.is_empty() {
        vec![struggle_move()]
    } else {
        moves
    }
}

/// Ability from `"static"`, `{"name":"static"}` or `{"ability":{"name":"static"}}`
pub fn extract_ability(member: &StoredMember) -> String {
    member
        .ability
        .as_ref()
        .and_then(|a| name_of(a).or_else(|| a.get("ability").and_then(name_of)))
        .unwrap_or(DEFAULT_ABILITY)
        .to_string()
}

pub fn extract_item(member: &StoredMember) -> Option<String> {
    member
        .item
        .as_ref()
        .and_then(name_of)
        .map(str::to_string)
}
