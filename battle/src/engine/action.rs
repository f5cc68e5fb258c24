//! Action resolution for BattleState

use arena_protocol::{BattleAction, LogKind, Side, UserId, Winner};
use rand::Rng;

use super::ActionError;
use super::state::{BattlePlayer, BattleState};
use crate::damage::compute_damage;
use crate::types::format_move_name;

/// Result of an accepted action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Resolved; the turn passed to the other side
    Continued,

    /// Resolved and the battle is over
    Finished(Winner),

    /// Bad selection. An `Invalid` log entry was appended and the turn did
    /// not advance.
    Rejected(String),
}

enum Resolution {
    Resolved,
    Forfeited,
    Rejected(String),
}

impl BattleState {
    /// Validate and apply one action from `actor`.
    ///
    /// Errors leave the battle untouched. A bad move or switch index is not
    /// an error: it is logged and reported as [`ActionOutcome::Rejected`].
    pub fn perform_action<R: Rng + ?Sized>(
        &mut self,
        actor: UserId,
        action: BattleAction,
        rng: &mut R,
    ) -> Result<ActionOutcome, ActionError> {
        if !self.is_active() {
            return Err(ActionError::NotActive);
        }

        let side = self.side_of(actor).ok_or(ActionError::NotAParticipant)?;
        if side != self.current_turn {
            return Err(ActionError::NotYourTurn);
        }
        if self.player2.is_none() {
            return Err(ActionError::OpponentMissing);
        }

        let resolution = match action {
            BattleAction::Move { index } => self.resolve_move(side, index, rng),
            BattleAction::Switch { index } => self.resolve_switch(side, index),
            BattleAction::Forfeit => self.resolve_forfeit(side),
        };

        match resolution {
            Resolution::Rejected(reason) => {
                self.push_log(LogKind::Invalid, reason.clone());
                Ok(ActionOutcome::Rejected(reason))
            }
            Resolution::Forfeited => {
                let winner = Winner::from(side.opponent());
                self.finish(winner);
                Ok(ActionOutcome::Finished(winner))
            }
            Resolution::Resolved => Ok(self.advance()),
        }
    }

    /// Split the battle into (acting player, opposing player)
    fn sides_mut(&mut self, side: Side) -> Option<(&mut BattlePlayer, &mut BattlePlayer)> {
        let player2 = self.player2.as_mut()?;
        Some(match side {
            Side::Player1 => (&mut self.player1, player2),
            Side::Player2 => (player2, &mut self.player1),
        })
    }

    fn resolve_move<R: Rng + ?Sized>(&mut self, side: Side, index: i32, rng: &mut R) -> Resolution {
        let Some((attacker, defender)) = self.sides_mut(side) else {
            return Resolution::Rejected("Battle has no opponent".to_string());
        };

        let user = attacker.active();
        if user.is_fainted() {
            return Resolution::Rejected(format!(
                "Invalid move: {} has fainted. Switch to another Pokemon.",
                user.name()
            ));
        }

        let Some(mv) = usize::try_from(index)
            .ok()
            .and_then(|i| user.moves.get(i))
            .cloned()
        else {
            return Resolution::Rejected(format!("Invalid move selection: {index}"));
        };

        let mut entries = vec![(
            LogKind::Info,
            format!("{} used {}!", user.name(), format_move_name(&mv.name)),
        )];

        let damage = compute_damage(user, defender.active(), &mv, rng);

        if damage > 0 {
            let target = defender.active_mut();
            let fainted = target.take_damage(damage);

            entries.push((
                LogKind::Damage,
                format!("Dealt {damage} damage to {}!", target.name()),
            ));
            if fainted {
                entries.push((LogKind::Info, format!("{} fainted!", target.name())));
            }
        }

        for (kind, message) in entries {
            self.push_log(kind, message);
        }
        Resolution::Resolved
    }

    fn resolve_switch(&mut self, side: Side, index: i32) -> Resolution {
        let Some(player) = self.player_mut(side) else {
            return Resolution::Rejected("Battle has no opponent".to_string());
        };

        let target = usize::try_from(index)
            .ok()
            .filter(|&i| i != player.active_index)
            .filter(|&i| player.team.get(i).is_some_and(|c| c.is_alive()));

        let Some(target) = target else {
            return Resolution::Rejected(format!("Invalid switch selection: {index}"));
        };

        player.active_index = target;
        let message = format!(
            "{} switched to {}!",
            player.username,
            player.active().name()
        );

        self.push_log(LogKind::Switch, message);
        Resolution::Resolved
    }

    fn resolve_forfeit(&mut self, side: Side) -> Resolution {
        if let Some(player) = self.player(side) {
            let message = format!("{} forfeited the battle!", player.username);
            self.push_log(LogKind::Win, message);
        }
        Resolution::Forfeited
    }

    /// After a resolved move or switch: finish if a side is wiped out,
    /// otherwise pass the turn.
    fn advance(&mut self) -> ActionOutcome {
        let player1_alive = !self.player1.all_fainted();
        let player2_alive = self.player2.as_ref().is_some_and(|p| !p.all_fainted());

        if player1_alive && player2_alive {
            self.current_turn = self.current_turn.opponent();
            self.turn_number += 1;
            return ActionOutcome::Continued;
        }

        let winner = match (player1_alive, player2_alive) {
            (true, false) => Winner::Player1,
            (false, true) => Winner::Player2,
            _ => Winner::Draw,
        };
        self.finish(winner);
        ActionOutcome::Finished(winner)
    }
}
