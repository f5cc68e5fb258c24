//! The arena: every client-facing operation, wired to the queue, the
//! registry, the connection directory and the stores.
//!
//! # Locking
//!
//! Each battle is guarded by its own mutex. Anything that ends a battle
//! (final knockout, forfeit, disconnect, expiry) checks the status, marks it
//! Finished and removes it from the registry while holding that lock, so a
//! battle is finished exactly once no matter which path gets there first.
//! Storage calls happen after the lock is released; their failures are
//! logged and never undo the in-memory outcome.

#[cfg(test)]
mod tests;

use arena_battle::{
    ActionOutcome, BattleAction, BattlePlayer, BattleState, BattleStatus, Combatant, LogEntry,
    rating::STARTING_RATING,
};
use arena_protocol::{
    BattleId, BattleSnapshot, ClientCommand, ConnectionId, ServerEvent, TeamId, UserId,
};
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::config::ArenaConfig;
use crate::directory::{ConnectionDirectory, ConnectionHandle, EventSender};
use crate::error::{ArenaError, Result};
use crate::matchmaking::{MatchmakingEntry, MatchmakingQueue};
use crate::registry::{BattleRegistry, LiveBattle};
use crate::store::{BattleResult, Collaborators, NewBattleRecord, SessionRecord};

/// What a finished battle leaves behind for storage
struct FinishedBattle {
    battle_id: BattleId,
    record: Option<NewBattleRecord>,
}

pub struct Arena {
    directory: ConnectionDirectory,
    queue: MatchmakingQueue,
    registry: BattleRegistry,
    stores: Collaborators,
    session_expiry_minutes: i64,
    rng: Mutex<StdRng>,
}

impl Arena {
    pub fn new(stores: Collaborators, config: &ArenaConfig) -> Self {
        Self::with_rng(stores, config, StdRng::from_entropy())
    }

    /// Use a fixed damage-roll source
    pub fn with_rng(stores: Collaborators, config: &ArenaConfig, rng: StdRng) -> Self {
        Self {
            directory: ConnectionDirectory::new(),
            queue: MatchmakingQueue::new(),
            registry: BattleRegistry::new(),
            stores,
            session_expiry_minutes: config.session_expiry_minutes,
            rng: Mutex::new(rng),
        }
    }

    pub fn directory(&self) -> &ConnectionDirectory {
        &self.directory
    }

    pub fn queue(&self) -> &MatchmakingQueue {
        &self.queue
    }

    pub fn registry(&self) -> &BattleRegistry {
        &self.registry
    }

    pub fn stores(&self) -> &Collaborators {
        &self.stores
    }

    /// Register an authenticated connection
    pub fn connect(&self, user_id: UserId, username: String, tx: EventSender) -> ConnectionId {
        let handle = self.directory.register(user_id, username, tx);
        info!(connection = %handle.id, user_id = %user_id, username = %handle.username, "Connection identified");
        handle.id
    }

    /// Tear down everything a closed connection was part of
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let Some(handle) = self.directory.remove(connection_id) else {
            return;
        };
        info!(connection = %connection_id, user_id = %handle.user_id, "Connection closed");

        if self.queue.remove_connection(connection_id) > 0 {
            info!(user_id = %handle.user_id, "Removed from matchmaking on disconnect");
        }

        let mut abandoned = Vec::new();
        for (battle_id, shared) in self.registry.handles() {
            let mut battle = shared.lock().await;
            let seated_here = battle
                .state
                .players()
                .any(|p| p.user_id == handle.user_id && p.connection_id == connection_id);

            if seated_here && self.abandon_locked(&battle_id, &mut battle.state, handle.user_id) {
                abandoned.push(battle_id);
            }
        }

        for battle_id in abandoned {
            self.delete_session(&battle_id).await;
        }
    }

    /// Mark a battle abandoned, unregister it and tell the other player.
    /// Must be called with the battle locked.
    fn abandon_locked(&self, battle_id: &BattleId, state: &mut BattleState, leaver: UserId) -> bool {
        if !state.abandon(leaver) {
            return false;
        }
        self.registry.remove(battle_id);

        for player in state.players().filter(|p| p.user_id != leaver) {
            self.directory
                .notify(player.connection_id, ServerEvent::OpponentDisconnected);
        }

        info!(battle_id = %battle_id, user_id = %leaver, "Battle abandoned");
        true
    }

    /// Abandon a battle whose player dropped while it was being set up.
    /// Must be called with the battle locked, after it was registered.
    fn abandon_if_orphaned(&self, battle_id: &BattleId, state: &mut BattleState) -> bool {
        let gone = state
            .players()
            .find(|p| !self.directory.is_live(p.connection_id))
            .map(|p| p.user_id);

        match gone {
            Some(user_id) => self.abandon_locked(battle_id, state, user_id),
            None => false,
        }
    }

    fn identify(&self, connection_id: ConnectionId) -> Result<ConnectionHandle> {
        self.directory
            .get(connection_id)
            .ok_or(ArenaError::Unidentified)
    }

    /// Read and convert one of the user's teams
    async fn load_team(&self, user_id: UserId, team_id: TeamId) -> Result<Vec<Combatant>> {
        let record = self
            .stores
            .teams
            .get_team(user_id, team_id)
            .await?
            .ok_or(ArenaError::TeamNotFound(team_id))?;

        Ok(arena_team::load_value(&record.document)?)
    }

    fn seat(handle: &ConnectionHandle, team: Vec<Combatant>) -> Result<BattlePlayer> {
        BattlePlayer::new(handle.user_id, handle.username.clone(), handle.id, team)
            .ok_or(ArenaError::InvalidTeam(arena_team::TeamLoadError::Empty))
    }

    async fn is_in_live_battle(&self, user_id: UserId) -> bool {
        for (_, shared) in self.registry.handles() {
            let battle = shared.lock().await;
            if battle.state.is_active() && battle.state.is_participant(user_id) {
                return true;
            }
        }
        false
    }

    /// Queue for a random opponent. Pairs immediately if someone is waiting.
    pub async fn join_matchmaking(&self, connection_id: ConnectionId, team_id: TeamId) -> Result<()> {
        let handle = self.identify(connection_id)?;

        if self.is_in_live_battle(handle.user_id).await {
            return Err(ArenaError::AlreadyInBattle);
        }

        let team = self.load_team(handle.user_id, team_id).await?;

        let rating = match self.stores.ratings.get_or_create_rating(handle.user_id).await {
            Ok(rating) => rating.rating,
            Err(e) => {
                warn!(user_id = %handle.user_id, error = %e, "Rating lookup failed, using starting rating");
                STARTING_RATING
            }
        };

        let entry = MatchmakingEntry {
            user_id: handle.user_id,
            username: handle.username.clone(),
            team_id,
            team,
            connection_id,
            rating,
            enqueued_at: Utc::now(),
        };

        if self.queue.enqueue(entry) {
            info!(user_id = %handle.user_id, "Replaced earlier matchmaking entry");
        }
        if !self.directory.is_live(connection_id) {
            // Closed while the team was loading; disconnect already swept the queue
            self.queue.remove_connection(connection_id);
            return Err(ArenaError::Unidentified);
        }
        info!(user_id = %handle.user_id, team_id = %team_id, rating, queued = self.queue.len(), "Joined matchmaking");

        if let Some((first, second)) = self.queue.try_dequeue_pair() {
            self.start_matched_battle(first, second).await;
        }
        Ok(())
    }

    async fn start_matched_battle(&self, first: MatchmakingEntry, second: MatchmakingEntry) {
        let (Some(player1), Some(player2)) = (
            BattlePlayer::new(first.user_id, first.username, first.connection_id, first.team),
            BattlePlayer::new(second.user_id, second.username, second.connection_id, second.team),
        ) else {
            warn!("Dropping a match with an empty team");
            return;
        };

        let live = LiveBattle {
            state: BattleState::active(player1, player2),
            player1_team: first.team_id,
            player2_team: Some(second.team_id),
        };
        let (battle_id, shared) = self.registry.create(live);

        let now = Utc::now();
        self.create_session(SessionRecord {
            battle_id: battle_id.clone(),
            player1_id: first.user_id,
            player1_connection: first.connection_id,
            player1_team_id: first.team_id,
            player2_id: Some(second.user_id),
            player2_connection: Some(second.connection_id),
            player2_team_id: Some(second.team_id),
            status: BattleStatus::Active,
            created_at: now,
            started_at: Some(now),
            updated_at: None,
        })
        .await;

        let orphaned = {
            let mut battle = shared.lock().await;
            if battle.state.is_finished() {
                // A disconnect already closed it
                return;
            }
            if self.abandon_if_orphaned(&battle_id, &mut battle.state) {
                true
            } else {
                self.broadcast(&battle.state, |s| ServerEvent::BattleJoined(Box::new(s)));
                false
            }
        };

        if orphaned {
            self.delete_session(&battle_id).await;
            return;
        }

        info!(
            battle_id = %battle_id,
            player1 = %first.user_id,
            player2 = %second.user_id,
            "Match formed"
        );
    }

    /// Leave the queue. Returns how many entries were removed.
    pub fn leave_matchmaking(&self, user_id: UserId) -> usize {
        let removed = self.queue.remove(user_id);
        if removed > 0 {
            info!(user_id = %user_id, "Left matchmaking");
        }
        removed
    }

    /// Open a battle that waits for a challenger with the id
    pub async fn create_private_battle(
        &self,
        connection_id: ConnectionId,
        team_id: TeamId,
    ) -> Result<BattleId> {
        let handle = self.identify(connection_id)?;
        let team = self.load_team(handle.user_id, team_id).await?;
        let player = Self::seat(&handle, team)?;

        let (battle_id, shared) = self
            .registry
            .create(LiveBattle::new(BattleState::waiting(player), team_id));

        self.create_session(SessionRecord {
            battle_id: battle_id.clone(),
            player1_id: handle.user_id,
            player1_connection: connection_id,
            player1_team_id: team_id,
            player2_id: None,
            player2_connection: None,
            player2_team_id: None,
            status: BattleStatus::Waiting,
            created_at: Utc::now(),
            started_at: None,
            updated_at: None,
        })
        .await;

        let orphaned = {
            let mut battle = shared.lock().await;
            !battle.state.is_finished() && self.abandon_if_orphaned(&battle_id, &mut battle.state)
        };
        if orphaned {
            self.delete_session(&battle_id).await;
            return Err(ArenaError::Unidentified);
        }

        info!(battle_id = %battle_id, user_id = %handle.user_id, "Private battle created");
        Ok(battle_id)
    }

    /// Take the second seat of a waiting private battle
    pub async fn join_private_battle(
        &self,
        connection_id: ConnectionId,
        battle_id: &BattleId,
        team_id: TeamId,
    ) -> Result<()> {
        let handle = self.identify(connection_id)?;
        let shared = self
            .registry
            .get(battle_id)
            .ok_or_else(|| ArenaError::BattleNotFound(battle_id.clone()))?;

        let team = self.load_team(handle.user_id, team_id).await?;
        let player = Self::seat(&handle, team)?;

        let orphaned = {
            let mut battle = shared.lock().await;
            if battle.state.is_finished() {
                return Err(ArenaError::BattleNotFound(battle_id.clone()));
            }
            battle.state.join(player)?;
            battle.player2_team = Some(team_id);

            if self.abandon_if_orphaned(battle_id, &mut battle.state) {
                true
            } else {
                self.broadcast(&battle.state, |s| ServerEvent::BattleJoined(Box::new(s)));
                false
            }
        };

        if orphaned {
            self.delete_session(battle_id).await;
            return Err(ArenaError::BattleNotFound(battle_id.clone()));
        }

        info!(battle_id = %battle_id, user_id = %handle.user_id, "Private battle joined");
        self.mark_session_started(battle_id, &handle, team_id).await;
        Ok(())
    }

    /// Resolve one turn decision
    pub async fn perform_action(
        &self,
        connection_id: ConnectionId,
        battle_id: &BattleId,
        action: BattleAction,
    ) -> Result<ActionOutcome> {
        let handle = self.identify(connection_id)?;
        let shared = self
            .registry
            .get(battle_id)
            .ok_or_else(|| ArenaError::BattleNotFound(battle_id.clone()))?;

        let (outcome, finished) = {
            let mut battle = shared.lock().await;

            let outcome = {
                let mut rng = self.rng.lock();
                battle
                    .state
                    .perform_action(handle.user_id, action, &mut *rng)?
            };

            match &outcome {
                ActionOutcome::Rejected(reason) => {
                    debug!(battle_id = %battle_id, user_id = %handle.user_id, reason = %reason, "Action rejected");
                    return Err(ArenaError::InvalidAction(reason.clone()));
                }
                ActionOutcome::Continued => {
                    self.broadcast(&battle.state, |s| ServerEvent::BattleUpdated(Box::new(s)));
                    (outcome, None)
                }
                ActionOutcome::Finished(_) => {
                    let finished = self.finish_locked(&battle);
                    (outcome, Some(finished))
                }
            }
        };

        if let Some(finished) = finished {
            self.persist_finished(finished).await;
        }
        Ok(outcome)
    }

    /// Unregister a battle that just finished and tell both players.
    /// Must be called with the battle locked.
    fn finish_locked(&self, battle: &LiveBattle) -> FinishedBattle {
        let state = &battle.state;
        self.registry.remove(&state.battle_id);
        self.broadcast(state, |s| ServerEvent::BattleFinished(Box::new(s)));

        info!(
            battle_id = %state.battle_id,
            winner = ?state.winner,
            turns = state.turn_number,
            "Battle finished"
        );

        let record = match (&state.player2, battle.player2_team, state.winner) {
            (Some(player2), Some(player2_team), Some(winner)) => Some(NewBattleRecord {
                player1_id: state.player1.user_id,
                player2_id: player2.user_id,
                player1_team_id: battle.player1_team,
                player2_team_id: player2_team,
                winner_id: state.winner_id(),
                result: BattleResult::from(winner),
                total_turns: state.turn_number,
                battle_log: serialize_log(&state.log),
                started_at: state.started_at,
                ended_at: state.ended_at.unwrap_or_else(Utc::now),
            }),
            _ => None,
        };

        FinishedBattle {
            battle_id: state.battle_id.clone(),
            record,
        }
    }

    /// History, ratings and session cleanup for a finished battle
    async fn persist_finished(&self, finished: FinishedBattle) {
        if let Some(record) = finished.record {
            let (player1, player2, result) = (record.player1_id, record.player2_id, record.result);

            match self.stores.history.save_battle_result(record).await {
                Ok(saved) => debug!(battle_id = %finished.battle_id, record_id = saved.id, "Battle result saved"),
                Err(e) => warn!(battle_id = %finished.battle_id, error = %e, "Failed to save battle result"),
            }

            match result {
                BattleResult::Player1Win => self.update_ratings(player1, player2).await,
                BattleResult::Player2Win => self.update_ratings(player2, player1).await,
                BattleResult::Draw => {
                    for user_id in [player1, player2] {
                        if let Err(e) = self.stores.ratings.record_draw(user_id).await {
                            warn!(user_id = %user_id, error = %e, "Failed to record draw");
                        }
                    }
                }
            }
        }

        self.delete_session(&finished.battle_id).await;
    }

    /// Elo update for both players against each other's pre-battle rating
    async fn update_ratings(&self, winner: UserId, loser: UserId) {
        let ratings = &self.stores.ratings;
        let (winner_rating, loser_rating) = match (
            ratings.get_or_create_rating(winner).await,
            ratings.get_or_create_rating(loser).await,
        ) {
            (Ok(w), Ok(l)) => (w.rating, l.rating),
            (Err(e), _) | (_, Err(e)) => {
                warn!(winner = %winner, loser = %loser, error = %e, "Failed to read ratings");
                return;
            }
        };

        if let Err(e) = ratings.update_rating(winner, true, loser_rating).await {
            warn!(user_id = %winner, error = %e, "Failed to update rating");
        }
        if let Err(e) = ratings.update_rating(loser, false, winner_rating).await {
            warn!(user_id = %loser, error = %e, "Failed to update rating");
        }
    }

    /// Remove battles that waited longer than the expiry threshold.
    /// Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let Some(cutoff) = Duration::try_minutes(self.session_expiry_minutes)
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            warn!(minutes = self.session_expiry_minutes, "Session expiry out of range, skipping sweep");
            return 0;
        };

        let mut candidates = self.registry.stale_waiting(cutoff).await;
        match self
            .stores
            .sessions
            .list_expired_waiting_sessions(self.session_expiry_minutes)
            .await
        {
            Ok(sessions) => {
                for session in sessions {
                    if !candidates.contains(&session.battle_id) {
                        candidates.push(session.battle_id);
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to list expired sessions"),
        }

        let mut removed = 0;
        for battle_id in candidates {
            let expired = match self.registry.get(&battle_id) {
                Some(shared) => {
                    let mut battle = shared.lock().await;
                    if battle.state.expire() {
                        self.registry.remove(&battle_id);
                        true
                    } else {
                        false
                    }
                }
                // Session left behind with no live battle
                None => true,
            };

            if expired {
                info!(battle_id = %battle_id, "Expired waiting battle");
                self.delete_session(&battle_id).await;
                removed += 1;
            }
        }
        removed
    }

    /// Dispatch one client command. Failures are sent back to the caller as
    /// an `Error` event as well as returned.
    pub async fn handle_command(
        &self,
        connection_id: ConnectionId,
        command: ClientCommand,
    ) -> Result<()> {
        let result = self.dispatch(connection_id, command).await;

        if let Err(e) = &result {
            debug!(connection = %connection_id, error = %e, "Command failed");
            self.directory
                .notify(connection_id, ServerEvent::error(e.to_string()));
        }
        result
    }

    async fn dispatch(&self, connection_id: ConnectionId, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::Identify { .. } => {
                self.identify(connection_id)?;
                Err(ArenaError::AlreadyIdentified)
            }
            ClientCommand::JoinMatchmaking { team_id } => {
                self.join_matchmaking(connection_id, team_id).await
            }
            ClientCommand::LeaveMatchmaking => {
                let handle = self.identify(connection_id)?;
                self.leave_matchmaking(handle.user_id);
                Ok(())
            }
            ClientCommand::CreatePrivateBattle { team_id } => {
                let battle_id = self.create_private_battle(connection_id, team_id).await?;
                self.directory
                    .notify(connection_id, ServerEvent::BattleCreated { battle_id });
                Ok(())
            }
            ClientCommand::JoinPrivateBattle { battle_id, team_id } => {
                self.join_private_battle(connection_id, &battle_id, team_id)
                    .await
            }
            ClientCommand::PerformAction { battle_id, action } => self
                .perform_action(connection_id, &battle_id, action)
                .await
                .map(|_| ()),
        }
    }

    /// Send a fresh snapshot to every seated player
    fn broadcast(&self, state: &BattleState, event: impl Fn(BattleSnapshot) -> ServerEvent) {
        let snapshot = state.snapshot();
        for connection in state.connections() {
            self.directory.notify(connection, event(snapshot.clone()));
        }
    }

    async fn create_session(&self, session: SessionRecord) {
        let battle_id = session.battle_id.clone();
        if let Err(e) = self.stores.sessions.create_session(session).await {
            warn!(battle_id = %battle_id, error = %e, "Failed to create battle session");
        }
    }

    async fn mark_session_started(&self, battle_id: &BattleId, handle: &ConnectionHandle, team_id: TeamId) {
        let sessions = &self.stores.sessions;
        let session = match sessions.get_session(battle_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                warn!(battle_id = %battle_id, "No session to update for started battle");
                return;
            }
            Err(e) => {
                warn!(battle_id = %battle_id, error = %e, "Failed to read battle session");
                return;
            }
        };

        let now = Utc::now();
        let session = SessionRecord {
            player2_id: Some(handle.user_id),
            player2_connection: Some(handle.id),
            player2_team_id: Some(team_id),
            status: BattleStatus::Active,
            started_at: Some(now),
            updated_at: Some(now),
            ..session
        };
        match sessions.update_session(session).await {
            Ok(true) => {}
            // Finished or abandoned before the update landed
            Ok(false) => debug!(battle_id = %battle_id, "Session already removed"),
            Err(e) => warn!(battle_id = %battle_id, error = %e, "Failed to update battle session"),
        }
    }

    async fn delete_session(&self, battle_id: &BattleId) {
        if let Err(e) = self.stores.sessions.delete_session(battle_id).await {
            warn!(battle_id = %battle_id, error = %e, "Failed to delete battle session");
        }
    }
}

fn serialize_log(log: &[LogEntry]) -> String {
    serde_json::to_string(log).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to serialize battle log");
        "[]".to_string()
    })
}
