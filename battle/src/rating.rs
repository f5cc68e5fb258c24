//! Elo ratings

use arena_protocol::UserId;
use chrono::{DateTime, Utc};

/// K-factor for every rated battle
pub const K_FACTOR: f64 = 32.0;

/// Rating assigned to a new player
pub const STARTING_RATING: i32 = 1000;

/// Probability that `rating` beats `opponent_rating`
pub fn expected_score(rating: i32, opponent_rating: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf(f64::from(opponent_rating - rating) / 400.0))
}

/// Rating change after a decisive battle. Halves round to even.
pub fn rating_delta(rating: i32, opponent_rating: i32, won: bool) -> i32 {
    let actual = if won { 1.0 } else { 0.0 };
    (K_FACTOR * (actual - expected_score(rating, opponent_rating))).round_ties_even() as i32
}

/// Rank tiers by rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rank {
    Beginner,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Master,
}

impl Rank {
    pub fn for_rating(rating: i32) -> Self {
        match rating {
            r if r >= 2400 => Rank::Master,
            r if r >= 2200 => Rank::Diamond,
            r if r >= 2000 => Rank::Platinum,
            r if r >= 1800 => Rank::Gold,
            r if r >= 1600 => Rank::Silver,
            r if r >= 1400 => Rank::Bronze,
            _ => Rank::Beginner,
        }
    }
}

/// A player's rating record
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct UserRating {
    pub user_id: UserId,
    pub rating: i32,
    pub peak: i32,
    pub total_battles: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,

    /// Positive for a win streak, negative for a loss streak
    pub current_streak: i32,
    pub longest_win_streak: i32,

    pub last_battle_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl UserRating {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            rating: STARTING_RATING,
            peak: STARTING_RATING,
            total_battles: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            current_streak: 0,
            longest_win_streak: 0,
            last_battle_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Apply a decisive result. Returns the rating change.
    pub fn apply_result(&mut self, won: bool, opponent_rating: i32) -> i32 {
        let delta = rating_delta(self.rating, opponent_rating, won);

        self.rating += delta;
        self.total_battles += 1;

        if won {
            self.wins += 1;
            self.current_streak = if self.current_streak > 0 {
                self.current_streak + 1
            } else {
                1
            };
            self.longest_win_streak = self.longest_win_streak.max(self.current_streak);
        } else {
            self.losses += 1;
            self.current_streak = if self.current_streak < 0 {
                self.current_streak - 1
            } else {
                -1
            };
        }

        self.peak = self.peak.max(self.rating);
        self.touch();
        delta
    }

    /// A draw only moves the counters; the rating stays put
    pub fn record_draw(&mut self) {
        self.total_battles += 1;
        self.draws += 1;
        self.current_streak = 0;
        self.touch();
    }

    /// Win percentage (0-100)
    pub fn win_rate(&self) -> f64 {
        if self.total_battles == 0 {
            return 0.0;
        }
        f64::from(self.wins) / f64::from(self.total_battles) * 100.0
    }

    pub fn rank(&self) -> Rank {
        Rank::for_rating(self.rating)
    }

    fn touch(&mut self) {
        let now = Utc::now();
        self.last_battle_at = Some(now);
        self.updated_at = now;
    }
}
