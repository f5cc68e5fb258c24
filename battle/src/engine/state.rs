//! BattleState - one live battle between two players

use arena_protocol::{
    BattleId, BattleSnapshot, BattleStatus, ConnectionId, LogEntry, LogKind, PlayerSnapshot, Side,
    UserId, Winner,
};
use chrono::{DateTime, Utc};

use super::ActionError;
use crate::types::Combatant;

/// One player's side of the battle
#[derive(Debug, Clone, PartialEq)]
pub struct BattlePlayer {
    pub user_id: UserId,

    /// Player's display name
    pub username: String,

    /// Connection that receives this player's events
    pub connection_id: ConnectionId,

    /// Team in party order. Fainted combatants stay in place.
    pub team: Vec<Combatant>,

    /// Index of the combatant on the field; always a valid slot
    pub active_index: usize,
}

impl BattlePlayer {
    /// Create a player. Returns `None` for an empty team, which could never
    /// satisfy the active-slot invariant.
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        connection_id: ConnectionId,
        team: Vec<Combatant>,
    ) -> Option<Self> {
        if team.is_empty() {
            return None;
        }

        Some(Self {
            user_id,
            username: username.into(),
            connection_id,
            team,
            active_index: 0,
        })
    }

    pub fn active(&self) -> &Combatant {
        &self.team[self.active_index]
    }

    pub fn active_mut(&mut self) -> &mut Combatant {
        &mut self.team[self.active_index]
    }

    /// Count non-fainted combatants
    pub fn alive_count(&self) -> usize {
        self.team.iter().filter(|c| c.is_alive()).count()
    }

    pub fn all_fainted(&self) -> bool {
        self.alive_count() == 0
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            user_id: self.user_id,
            username: self.username.clone(),
            connection_id: self.connection_id,
            team: self.team.iter().map(Combatant::snapshot).collect(),
            active_index: self.active_index,
        }
    }
}

/// A battle and its full history
#[derive(Debug, Clone, PartialEq)]
pub struct BattleState {
    /// Assigned by the registry on insertion
    pub battle_id: BattleId,

    pub player1: BattlePlayer,

    /// Empty while the battle is waiting for a challenger
    pub player2: Option<BattlePlayer>,

    /// Whose decision the battle is waiting on
    pub current_turn: Side,

    /// Starts at 1 and increments once per resolved action
    pub turn_number: u32,

    /// Append-only event log
    pub log: Vec<LogEntry>,

    pub status: BattleStatus,

    /// Set once finished; stays `None` for an abandoned battle
    pub winner: Option<Winner>,

    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl BattleState {
    /// A private battle waiting for its second player
    pub fn waiting(player1: BattlePlayer) -> Self {
        Self {
            battle_id: BattleId::default(),
            player1,
            player2: None,
            current_turn: Side::Player1,
            turn_number: 1,
            log: Vec::new(),
            status: BattleStatus::Waiting,
            winner: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// A battle that starts immediately (matchmaking pair)
    pub fn active(player1: BattlePlayer, player2: BattlePlayer) -> Self {
        let mut state = Self::waiting(player1);
        state.start(player2);
        state
    }

    /// Seat the second player and move Waiting -> Active
    pub fn join(&mut self, player2: BattlePlayer) -> Result<(), ActionError> {
        if self.status != BattleStatus::Waiting || self.player2.is_some() {
            return Err(ActionError::AlreadyStarted);
        }
        if player2.user_id == self.player1.user_id {
            return Err(ActionError::AlreadyParticipant);
        }

        self.start(player2);
        Ok(())
    }

    fn start(&mut self, player2: BattlePlayer) {
        let message = format!(
            "Battle started between {} and {}!",
            self.player1.username, player2.username
        );
        self.player2 = Some(player2);
        self.status = BattleStatus::Active;
        self.push_log(LogKind::Turn, message);
    }

    pub fn is_waiting(&self) -> bool {
        self.status == BattleStatus::Waiting
    }

    pub fn is_active(&self) -> bool {
        self.status == BattleStatus::Active
    }

    pub fn is_finished(&self) -> bool {
        self.status == BattleStatus::Finished
    }

    /// Which side a user plays, if any
    pub fn side_of(&self, user_id: UserId) -> Option<Side> {
        if self.player1.user_id == user_id {
            Some(Side::Player1)
        } else if self.player2.as_ref().is_some_and(|p| p.user_id == user_id) {
            Some(Side::Player2)
        } else {
            None
        }
    }

    pub fn player(&self, side: Side) -> Option<&BattlePlayer> {
        match side {
            Side::Player1 => Some(&self.player1),
            Side::Player2 => self.player2.as_ref(),
        }
    }

    pub fn player_mut(&mut self, side: Side) -> Option<&mut BattlePlayer> {
        match side {
            Side::Player1 => Some(&mut self.player1),
            Side::Player2 => self.player2.as_mut(),
        }
    }

    /// Iterate over the seated players
    pub fn players(&self) -> impl Iterator<Item = &BattlePlayer> {
        std::iter::once(&self.player1).chain(self.player2.as_ref())
    }

    /// Connections of every seated player
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.players().map(|p| p.connection_id).collect()
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.side_of(user_id).is_some()
    }

    /// Winner's user id; `None` for a draw or unfinished battle
    pub fn winner_id(&self) -> Option<UserId> {
        match self.winner? {
            Winner::Player1 => Some(self.player1.user_id),
            Winner::Player2 => self.player2.as_ref().map(|p| p.user_id),
            Winner::Draw => None,
        }
    }

    pub(crate) fn push_log(&mut self, kind: LogKind, message: impl Into<String>) {
        self.log.push(LogEntry::new(kind, message));
    }

    /// Move to Finished with a decided outcome
    pub(crate) fn finish(&mut self, winner: Winner) {
        let message = match winner {
            Winner::Draw => "No one wins the battle!".to_string(),
            side => {
                let name = match side {
                    Winner::Player1 => Some(self.player1.username.clone()),
                    _ => self.player2.as_ref().map(|p| p.username.clone()),
                };
                format!("{} wins the battle!", name.unwrap_or_default())
            }
        };

        self.status = BattleStatus::Finished;
        self.winner = Some(winner);
        self.ended_at = Some(Utc::now());
        self.push_log(LogKind::Win, message);
    }

    /// Force-terminate without a winner (a player left).
    /// Returns false if the battle was already finished.
    pub fn abandon(&mut self, leaver: UserId) -> bool {
        if self.is_finished() {
            return false;
        }

        let name = self
            .players()
            .find(|p| p.user_id == leaver)
            .map(|p| p.username.clone())
            .unwrap_or_else(|| "A player".to_string());

        self.status = BattleStatus::Finished;
        self.winner = None;
        self.ended_at = Some(Utc::now());
        self.push_log(
            LogKind::Info,
            format!("{name} disconnected. The battle was abandoned."),
        );
        true
    }

    /// Close a battle that never found a challenger.
    /// Returns false unless the battle was still waiting.
    pub fn expire(&mut self) -> bool {
        if !self.is_waiting() {
            return false;
        }

        self.status = BattleStatus::Finished;
        self.ended_at = Some(Utc::now());
        self.push_log(LogKind::Info, "The battle expired before anyone joined.");
        true
    }

    pub fn snapshot(&self) -> BattleSnapshot {
        BattleSnapshot {
            battle_id: self.battle_id.clone(),
            player1: self.player1.snapshot(),
            player2: self.player2.as_ref().map(BattlePlayer::snapshot),
            current_turn: self.current_turn,
            turn_number: self.turn_number,
            log: self.log.clone(),
            status: self.status,
            winner: self.winner,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}
