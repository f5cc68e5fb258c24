use std::sync::Arc;

use anyhow::anyhow;
use arena_battle::{LogKind, Side, Winner};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::*;
use crate::store::{
    BattleHistoryStore, BattleRecord, InMemoryBattleHistoryStore, InMemoryRatingStore,
    InMemorySessionStore, InMemoryTeamStore, RatingStore, SessionStore, TeamStore,
};

/// One-hit knockout against `fodder`
fn powerhouse() -> Value {
    json!([{
        "pokemon": {
            "name": "mewtwo",
            "types": [{"slot": 1, "type": {"name": "psychic"}}],
            "stats": {"hp": 106, "attack": 110, "defense": 90, "special-attack": 154, "special-defense": 90, "speed": 130}
        },
        "level": 100,
        "moves": [{"name": "psystrike", "power": 250, "type": "psychic", "damage_class": "special"}]
    }])
}

/// Level 1 with a move that never deals damage
fn fodder() -> Value {
    json!([{
        "pokemon": {
            "name": "magikarp",
            "stats": {"hp": 1, "attack": 1, "defense": 1, "special-attack": 1, "special-defense": 1, "speed": 1}
        },
        "level": 1,
        "moves": [{"name": "splash", "power": 0, "type": "water", "damage_class": "status"}]
    }])
}

/// Takes several hits to knock out
fn sturdy() -> Value {
    json!([{
        "pokemon": {"name": "snorlax", "stats": {"hp": 100, "attack": 100, "defense": 100, "special-attack": 100, "special-defense": 100, "speed": 100}},
        "level": 50,
        "moves": [{"name": "tackle", "power": 40, "type": "normal", "damage_class": "physical"}]
    }])
}

struct FailingHistory;

#[async_trait]
impl BattleHistoryStore for FailingHistory {
    async fn save_battle_result(&self, _record: NewBattleRecord) -> anyhow::Result<BattleRecord> {
        Err(anyhow!("database unavailable"))
    }

    async fn get_battle(&self, _id: u64) -> anyhow::Result<Option<BattleRecord>> {
        Err(anyhow!("database unavailable"))
    }

    async fn list_user_battles(&self, _user_id: UserId) -> anyhow::Result<Vec<BattleRecord>> {
        Err(anyhow!("database unavailable"))
    }
}

struct Client {
    conn: ConnectionId,
    user: UserId,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Client {
    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

fn count(events: &[ServerEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}

struct Harness {
    arena: Arc<Arena>,
    teams: Arc<InMemoryTeamStore>,
    history: Arc<InMemoryBattleHistoryStore>,
    ratings: Arc<InMemoryRatingStore>,
    sessions: Arc<InMemorySessionStore>,
}

impl Harness {
    fn new() -> Self {
        Self::build(None)
    }

    fn build(history_override: Option<Arc<dyn BattleHistoryStore>>) -> Self {
        let teams = Arc::new(InMemoryTeamStore::new());
        let history = Arc::new(InMemoryBattleHistoryStore::new());
        let ratings = Arc::new(InMemoryRatingStore::new());
        let sessions = Arc::new(InMemorySessionStore::new());

        let default_history: Arc<dyn BattleHistoryStore> = history.clone();
        let stores = Collaborators {
            teams: teams.clone(),
            history: history_override.unwrap_or(default_history),
            ratings: ratings.clone(),
            sessions: sessions.clone(),
        };
        let arena = Arena::with_rng(stores, &ArenaConfig::default(), StdRng::seed_from_u64(9));

        Self {
            arena: Arc::new(arena),
            teams,
            history,
            ratings,
            sessions,
        }
    }

    fn client(&self, user: u64, name: &str) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = self.arena.connect(UserId(user), name.to_string(), tx);
        Client {
            conn,
            user: UserId(user),
            rx,
        }
    }

    async fn team(&self, client: &Client, document: Value) -> TeamId {
        self.teams
            .create_team(client.user, "team".into(), document)
            .await
            .unwrap()
            .id
    }

    /// Pair `first` (player 1) and `second` through matchmaking
    async fn matched(&self, first: &mut Client, first_team: Value, second: &mut Client, second_team: Value) -> BattleId {
        let t1 = self.team(first, first_team).await;
        let t2 = self.team(second, second_team).await;
        self.arena.join_matchmaking(first.conn, t1).await.unwrap();
        self.arena.join_matchmaking(second.conn, t2).await.unwrap();

        let events = first.drain();
        second.drain();
        events[0].snapshot().unwrap().battle_id.clone()
    }

    async fn state(&self, id: &BattleId) -> BattleState {
        self.arena.registry().get(id).unwrap().lock().await.state.clone()
    }
}

#[tokio::test]
async fn test_matchmaking_pairs_and_notifies_both() {
    let h = Harness::new();
    let mut ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    let t1 = h.team(&ash, sturdy()).await;
    let t2 = h.team(&gary, sturdy()).await;

    h.arena.join_matchmaking(ash.conn, t1).await.unwrap();
    assert_eq!(h.arena.queue().len(), 1);
    assert!(ash.drain().is_empty());

    h.arena.join_matchmaking(gary.conn, t2).await.unwrap();
    assert!(h.arena.queue().is_empty());
    assert_eq!(h.arena.registry().len(), 1);

    let ash_events = ash.drain();
    let gary_events = gary.drain();
    assert_eq!(count(&ash_events, "BattleJoined"), 1);
    assert_eq!(count(&gary_events, "BattleJoined"), 1);

    let snapshot = ash_events[0].snapshot().unwrap();
    assert_eq!(snapshot.status, BattleStatus::Active);
    assert_eq!(snapshot.player1.user_id, ash.user);
    assert_eq!(snapshot.player2.as_ref().unwrap().user_id, gary.user);
    assert!(snapshot.battle_id.is_well_formed());

    let session = h.sessions.get_session(&snapshot.battle_id).await.unwrap().unwrap();
    assert_eq!(session.status, BattleStatus::Active);
    assert_eq!(session.player2_team_id, Some(t2));
}

#[tokio::test]
async fn test_knockout_finishes_once_and_persists_once() {
    let h = Harness::new();
    let mut ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    let id = h.matched(&mut ash, powerhouse(), &mut gary, fodder()).await;

    let outcome = h
        .arena
        .perform_action(ash.conn, &id, BattleAction::Move { index: 0 })
        .await
        .unwrap();
    assert_eq!(outcome, ActionOutcome::Finished(Winner::Player1));

    let ash_events = ash.drain();
    let gary_events = gary.drain();
    assert_eq!(ash_events.len(), 1);
    assert_eq!(count(&ash_events, "BattleFinished"), 1);
    assert_eq!(count(&gary_events, "BattleFinished"), 1);
    assert_eq!(ash_events[0].snapshot().unwrap().winner, Some(Winner::Player1));

    assert!(h.arena.registry().get(&id).is_none());
    assert!(h.sessions.get_session(&id).await.unwrap().is_none());

    assert_eq!(h.history.len(), 1);
    let record = &h.history.list_user_battles(ash.user).await.unwrap()[0];
    assert_eq!(record.battle.winner_id, Some(ash.user));
    assert_eq!(record.battle.result, BattleResult::Player1Win);
    let log: Vec<LogEntry> = serde_json::from_str(&record.battle.battle_log).unwrap();
    assert!(log.iter().any(|e| e.message == "magikarp fainted!"));

    assert_eq!(h.ratings.get_or_create_rating(ash.user).await.unwrap().rating, 1016);
    assert_eq!(h.ratings.get_or_create_rating(gary.user).await.unwrap().rating, 984);

    // A late action on the removed battle
    let err = h
        .arena
        .perform_action(gary.conn, &id, BattleAction::Move { index: 0 })
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::BattleNotFound(_)));
}

#[tokio::test]
async fn test_resolved_move_passes_turn_and_updates_both() {
    let h = Harness::new();
    let mut ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    let id = h.matched(&mut ash, sturdy(), &mut gary, sturdy()).await;

    let outcome = h
        .arena
        .perform_action(ash.conn, &id, BattleAction::Move { index: 0 })
        .await
        .unwrap();
    assert_eq!(outcome, ActionOutcome::Continued);
    assert_eq!(count(&ash.drain(), "BattleUpdated"), 1);
    assert_eq!(count(&gary.drain(), "BattleUpdated"), 1);

    let state = h.state(&id).await;
    assert_eq!(state.current_turn, Side::Player2);
    assert_eq!(state.turn_number, 2);
    let target = state.player2.as_ref().unwrap().active();
    assert!(target.current_hp < target.max_hp);
}

#[tokio::test]
async fn test_out_of_turn_and_invalid_index_only_reach_the_caller() {
    let h = Harness::new();
    let mut ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    let id = h.matched(&mut ash, sturdy(), &mut gary, sturdy()).await;
    let before = h.state(&id).await;

    let command = ClientCommand::PerformAction {
        battle_id: id.clone(),
        action: BattleAction::Move { index: 0 },
    };
    let err = h.arena.handle_command(gary.conn, command).await.unwrap_err();
    assert!(matches!(err, ArenaError::NotYourTurn));
    assert_eq!(gary.drain(), vec![ServerEvent::error("Not your turn")]);

    let command = ClientCommand::PerformAction {
        battle_id: id.clone(),
        action: BattleAction::Move { index: 7 },
    };
    let err = h.arena.handle_command(ash.conn, command).await.unwrap_err();
    assert!(matches!(err, ArenaError::InvalidAction(_)));
    assert_eq!(ash.drain(), vec![ServerEvent::error("Invalid move selection: 7")]);
    assert!(gary.drain().is_empty());

    let after = h.state(&id).await;
    assert_eq!(after.current_turn, Side::Player1);
    assert_eq!(after.turn_number, before.turn_number);
    assert_eq!(after.player2.as_ref().unwrap().active().current_hp, before.player2.as_ref().unwrap().active().current_hp);
    assert_eq!(after.log.len(), before.log.len() + 1);
    assert_eq!(after.log.last().unwrap().kind, LogKind::Invalid);
}

#[tokio::test]
async fn test_forfeit_awards_opponent() {
    let h = Harness::new();
    let mut ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    let id = h.matched(&mut ash, sturdy(), &mut gary, sturdy()).await;

    let outcome = h
        .arena
        .perform_action(ash.conn, &id, BattleAction::Forfeit)
        .await
        .unwrap();
    assert_eq!(outcome, ActionOutcome::Finished(Winner::Player2));

    let events = gary.drain();
    let snapshot = events[0].snapshot().unwrap();
    assert_eq!(events[0].name(), "BattleFinished");
    assert!(snapshot.player1.team.iter().all(|c| c.current_hp == c.max_hp));
    assert!(snapshot.player2.as_ref().unwrap().team.iter().all(|c| c.current_hp == c.max_hp));

    let record = &h.history.list_user_battles(gary.user).await.unwrap()[0];
    assert_eq!(record.battle.winner_id, Some(gary.user));
    assert_eq!(h.ratings.get_or_create_rating(gary.user).await.unwrap().rating, 1016);
    assert!(h.arena.registry().is_empty());
    ash.drain();
}

#[tokio::test]
async fn test_disconnect_abandons_without_result() {
    let h = Harness::new();
    let mut ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    let id = h.matched(&mut ash, sturdy(), &mut gary, sturdy()).await;

    h.arena.disconnect(ash.conn).await;

    assert_eq!(gary.drain(), vec![ServerEvent::OpponentDisconnected]);
    assert!(h.arena.registry().get(&id).is_none());
    assert!(h.sessions.is_empty());
    assert!(h.history.is_empty());
    for user in [ash.user, gary.user] {
        let rating = h.ratings.get_or_create_rating(user).await.unwrap();
        assert_eq!(rating.rating, 1000);
        assert_eq!(rating.total_battles, 0);
    }

    // Closing twice changes nothing
    h.arena.disconnect(ash.conn).await;
    assert!(gary.drain().is_empty());

    let err = h
        .arena
        .perform_action(gary.conn, &id, BattleAction::Move { index: 0 })
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::BattleNotFound(_)));
}

#[tokio::test]
async fn test_disconnect_after_finish_sends_nothing() {
    let h = Harness::new();
    let mut ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    let id = h.matched(&mut ash, powerhouse(), &mut gary, fodder()).await;

    h.arena
        .perform_action(ash.conn, &id, BattleAction::Move { index: 0 })
        .await
        .unwrap();
    ash.drain();

    h.arena.disconnect(gary.conn).await;
    assert!(ash.drain().is_empty());
    assert_eq!(h.history.len(), 1);
}

#[tokio::test]
async fn test_disconnect_leaves_the_queue() {
    let h = Harness::new();
    let ash = h.client(1, "ash");
    let t1 = h.team(&ash, sturdy()).await;
    h.arena.join_matchmaking(ash.conn, t1).await.unwrap();

    h.arena.disconnect(ash.conn).await;
    assert!(h.arena.queue().is_empty());
    assert!(h.arena.directory().is_empty());
}

#[tokio::test]
async fn test_private_battle_flow() {
    let h = Harness::new();
    let mut ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    let mut brock = h.client(3, "brock");
    let t1 = h.team(&ash, sturdy()).await;
    let t2 = h.team(&gary, sturdy()).await;
    let t3 = h.team(&brock, sturdy()).await;

    h.arena
        .handle_command(ash.conn, ClientCommand::CreatePrivateBattle { team_id: t1 })
        .await
        .unwrap();
    let events = ash.drain();
    let ServerEvent::BattleCreated { battle_id: id } = &events[0] else {
        panic!("expected BattleCreated, got {events:?}");
    };
    let id = id.clone();

    assert!(h.state(&id).await.is_waiting());
    let session = h.sessions.get_session(&id).await.unwrap().unwrap();
    assert_eq!(session.status, BattleStatus::Waiting);
    assert_eq!(session.player2_id, None);

    let err = h.arena.join_private_battle(ash.conn, &id, t1).await.unwrap_err();
    assert!(matches!(err, ArenaError::AlreadyInBattle));

    h.arena.join_private_battle(gary.conn, &id, t2).await.unwrap();
    assert_eq!(count(&ash.drain(), "BattleJoined"), 1);
    assert_eq!(count(&gary.drain(), "BattleJoined"), 1);

    let state = h.state(&id).await;
    assert!(state.is_active());
    assert_eq!(state.log[0].message, "Battle started between ash and gary!");

    let session = h.sessions.get_session(&id).await.unwrap().unwrap();
    assert_eq!(session.status, BattleStatus::Active);
    assert_eq!(session.player2_id, Some(gary.user));
    assert_eq!(session.player2_team_id, Some(t2));
    assert!(session.started_at.is_some());

    let err = h.arena.join_private_battle(brock.conn, &id, t3).await.unwrap_err();
    assert!(matches!(err, ArenaError::BattleAlreadyStarted));

    let err = h
        .arena
        .join_private_battle(brock.conn, &BattleId::new("ZZZZZZ"), t3)
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::BattleNotFound(_)));
    brock.drain();
}

#[tokio::test]
async fn test_team_errors() {
    let h = Harness::new();
    let mut ash = h.client(1, "ash");
    let gary = h.client(2, "gary");
    let garys_team = h.team(&gary, sturdy()).await;
    let broken = h.team(&ash, json!({"not": "a list"})).await;

    let err = h
        .arena
        .handle_command(ash.conn, ClientCommand::JoinMatchmaking { team_id: garys_team })
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::TeamNotFound(t) if t == garys_team));
    assert_eq!(count(&ash.drain(), "Error"), 1);

    let err = h.arena.create_private_battle(ash.conn, broken).await.unwrap_err();
    assert!(matches!(err, ArenaError::InvalidTeam(_)));
    assert!(h.arena.registry().is_empty());
    assert!(h.arena.queue().is_empty());
}

#[tokio::test]
async fn test_sweep_removes_only_stale_waiting() {
    let h = Harness::new();
    let ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    let mut misty = h.client(3, "misty");
    let mut brock = h.client(4, "brock");
    let long_ago = Utc::now() - Duration::minutes(45);

    let t1 = h.team(&ash, sturdy()).await;
    let stale = h.arena.create_private_battle(ash.conn, t1).await.unwrap();
    h.arena.registry().get(&stale).unwrap().lock().await.state.started_at = long_ago;
    let mut session = h.sessions.get_session(&stale).await.unwrap().unwrap();
    session.created_at = long_ago;
    assert!(h.sessions.update_session(session).await.unwrap());

    let t2 = h.team(&gary, sturdy()).await;
    let fresh = h.arena.create_private_battle(gary.conn, t2).await.unwrap();

    let active = h.matched(&mut misty, sturdy(), &mut brock, sturdy()).await;
    h.arena.registry().get(&active).unwrap().lock().await.state.started_at = long_ago;

    assert_eq!(h.arena.sweep_expired().await, 1);

    assert!(!h.arena.registry().contains(&stale));
    assert!(h.sessions.get_session(&stale).await.unwrap().is_none());
    assert!(h.arena.registry().contains(&fresh));
    assert!(h.arena.registry().contains(&active));
    assert_eq!(h.sessions.len(), 2);

    // Nothing left to expire
    assert_eq!(h.arena.sweep_expired().await, 0);
    gary.drain();
}

#[tokio::test]
async fn test_sweep_drops_orphaned_sessions() {
    let h = Harness::new();
    h.sessions
        .create_session(SessionRecord {
            battle_id: BattleId::new("GHOST1"),
            player1_id: UserId(1),
            player1_connection: ConnectionId(1),
            player1_team_id: TeamId(1),
            player2_id: None,
            player2_connection: None,
            player2_team_id: None,
            status: BattleStatus::Waiting,
            created_at: Utc::now() - Duration::minutes(90),
            started_at: None,
            updated_at: None,
        })
        .await
        .unwrap();

    assert_eq!(h.arena.sweep_expired().await, 1);
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn test_history_failure_does_not_undo_the_finish() {
    let h = Harness::build(Some(Arc::new(FailingHistory)));
    let mut ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    let id = h.matched(&mut ash, powerhouse(), &mut gary, fodder()).await;

    let outcome = h
        .arena
        .perform_action(ash.conn, &id, BattleAction::Move { index: 0 })
        .await
        .unwrap();
    assert_eq!(outcome, ActionOutcome::Finished(Winner::Player1));

    assert_eq!(count(&ash.drain(), "BattleFinished"), 1);
    assert_eq!(count(&gary.drain(), "BattleFinished"), 1);
    assert!(h.arena.registry().is_empty());
    assert_eq!(h.ratings.get_or_create_rating(ash.user).await.unwrap().wins, 1);
}

#[tokio::test]
async fn test_leave_and_rejoin_matchmaking() {
    let h = Harness::new();
    let ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    let t1 = h.team(&ash, sturdy()).await;
    let t2 = h.team(&gary, sturdy()).await;

    h.arena.join_matchmaking(ash.conn, t1).await.unwrap();
    h.arena.join_matchmaking(ash.conn, t1).await.unwrap();
    assert_eq!(h.arena.queue().len(), 1);

    h.arena
        .handle_command(ash.conn, ClientCommand::LeaveMatchmaking)
        .await
        .unwrap();
    assert!(h.arena.queue().is_empty());

    h.arena.join_matchmaking(gary.conn, t2).await.unwrap();
    assert!(h.arena.registry().is_empty());
    assert!(gary.drain().is_empty());
}

#[tokio::test]
async fn test_cannot_queue_from_a_live_battle() {
    let h = Harness::new();
    let mut ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    h.matched(&mut ash, sturdy(), &mut gary, sturdy()).await;

    let t1 = h.team(&ash, sturdy()).await;
    let err = h.arena.join_matchmaking(ash.conn, t1).await.unwrap_err();
    assert!(matches!(err, ArenaError::AlreadyInBattle));
    assert!(h.arena.queue().is_empty());
}

#[tokio::test]
async fn test_unidentified_and_repeat_identify() {
    let h = Harness::new();
    let err = h
        .arena
        .handle_command(ConnectionId(999), ClientCommand::LeaveMatchmaking)
        .await
        .unwrap_err();
    assert!(matches!(err, ArenaError::Unidentified));

    let mut ash = h.client(1, "ash");
    let command = ClientCommand::Identify {
        user_id: UserId(1),
        username: "ash".into(),
    };
    let err = h.arena.handle_command(ash.conn, command).await.unwrap_err();
    assert!(matches!(err, ArenaError::AlreadyIdentified));
    assert_eq!(count(&ash.drain(), "Error"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_matchmaking_seats_everyone_once() {
    let h = Harness::new();
    let mut clients = Vec::new();
    for user in 1..=20 {
        let client = h.client(user, &format!("trainer{user}"));
        let team = h.team(&client, sturdy()).await;
        clients.push((client, team));
    }

    let joins: Vec<_> = clients
        .iter()
        .map(|(client, team)| {
            let arena = Arc::clone(&h.arena);
            let (conn, team) = (client.conn, *team);
            tokio::spawn(async move { arena.join_matchmaking(conn, team).await })
        })
        .collect();
    for join in joins {
        join.await.unwrap().unwrap();
    }

    assert!(h.arena.queue().is_empty());
    assert_eq!(h.arena.registry().len(), 10);
    for (client, _) in clients.iter_mut() {
        assert_eq!(count(&client.drain(), "BattleJoined"), 1);
    }
}

#[tokio::test]
async fn test_join_does_not_recreate_a_removed_session() {
    let h = Harness::new();
    let ash = h.client(1, "ash");
    let mut gary = h.client(2, "gary");
    let t1 = h.team(&ash, sturdy()).await;
    let t2 = h.team(&gary, sturdy()).await;

    let id = h.arena.create_private_battle(ash.conn, t1).await.unwrap();
    // Removed by a finish or disconnect racing the join
    assert!(h.sessions.delete_session(&id).await.unwrap());

    h.arena.join_private_battle(gary.conn, &id, t2).await.unwrap();
    assert_eq!(count(&gary.drain(), "BattleJoined"), 1);
    assert!(h.sessions.get_session(&id).await.unwrap().is_none());
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn test_out_of_range_expiry_skips_the_sweep() {
    let config = ArenaConfig {
        session_expiry_minutes: i64::MAX,
        ..ArenaConfig::default()
    };
    let arena = Arena::new(Collaborators::in_memory(), &config);
    assert_eq!(arena.sweep_expired().await, 0);
}
