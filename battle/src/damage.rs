//! Damage calculation
//!
//! Only the base formula, random variance and same-type bonus are modeled.
//! There is no type chart, no critical hits and no status modifier.

use arena_protocol::MoveInfo;
use rand::Rng;

use crate::types::Combatant;

/// Power used when a move leaves it unset
pub const DEFAULT_POWER: i32 = 50;

/// Lower bound of the random damage roll
pub const MIN_ROLL: f64 = 0.85;

/// Upper bound of the random damage roll
pub const MAX_ROLL: f64 = 1.0;

/// Same-type attack bonus
pub const STAB_MULTIPLIER: f64 = 1.5;

/// Draw a uniform damage roll in `[0.85, 1.0]`
pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(MIN_ROLL..=MAX_ROLL)
}

/// Compute damage with a freshly drawn roll
pub fn compute_damage<R: Rng + ?Sized>(
    attacker: &Combatant,
    defender: &Combatant,
    mv: &MoveInfo,
    rng: &mut R,
) -> i32 {
    compute_damage_with_roll(attacker, defender, mv, roll(rng))
}

/// Compute damage for a fixed roll
///
/// Steps are applied in order: power, physical/special stat pick, base
/// formula, roll, same-type bonus, floor. Never negative.
pub fn compute_damage_with_roll(
    attacker: &Combatant,
    defender: &Combatant,
    mv: &MoveInfo,
    roll: f64,
) -> i32 {
    let power = mv.power.unwrap_or(DEFAULT_POWER);
    if power <= 0 {
        return 0;
    }

    let (attack, defense) = if mv.damage_class.is_physical() {
        (attacker.stats.attack, defender.stats.defense)
    } else {
        (attacker.stats.special_attack, defender.stats.special_defense)
    };
    if attack <= 0 || defense <= 0 {
        return 0;
    }

    let level = f64::from(attacker.level);
    let ratio = f64::from(attack) / f64::from(defense);
    let mut damage = ((2.0 * level / 5.0 + 2.0) * f64::from(power) * ratio) / 50.0 + 2.0;

    damage *= roll;

    if mv
        .move_type
        .as_deref()
        .is_some_and(|t| attacker.has_type(t))
    {
        damage *= STAB_MULTIPLIER;
    }

    let damage = damage.floor();
    if damage.is_finite() && damage > 0.0 {
        damage.min(f64::from(i32::MAX)) as i32
    } else {
        0
    }
}
