//! Derived stat calculation

use arena_protocol::{Stat, StatBlock};

/// Derive one in-battle stat from its base value, IV, EV and level.
///
/// `floor((2*base + iv + floor(ev/4)) * level / 100) + (level + 10 if hp else 5)`
///
/// Computed in `i64` and saturated to the `i32` range.
pub fn derive_stat(base: i32, iv: i32, ev: i32, level: i32, is_hp: bool) -> i32 {
    let (base, iv, ev, level) = (i64::from(base), i64::from(iv), i64::from(ev), i64::from(level));
    let core = (2 * base + iv + ev.div_euclid(4)) * level;
    let scaled = core.div_euclid(100);

    let stat = if is_hp {
        scaled + level + 10
    } else {
        scaled + 5
    };
    stat.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Derive all six stats at once
pub fn derive_stats(base: &StatBlock, ivs: &StatBlock, evs: &StatBlock, level: i32) -> StatBlock {
    let mut derived = StatBlock::default();

    for stat in Stat::ALL {
        derived.set(
            stat,
            derive_stat(
                base.get(stat),
                ivs.get(stat),
                evs.get(stat),
                level,
                stat == Stat::Hp,
            ),
        );
    }

    derived
}
