//! Live battles by id
//!
//! The map itself is sharded and lock-free for readers; each battle sits
//! behind its own async mutex so actions on one battle never wait on another.

use std::sync::Arc;

use arena_battle::BattleState;
use arena_protocol::{BATTLE_ID_ALPHABET, BATTLE_ID_LEN, BattleId, TeamId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use tokio::sync::Mutex;

/// A registered battle plus what the battle record needs at the end
#[derive(Debug, Clone)]
pub struct LiveBattle {
    pub state: BattleState,
    pub player1_team: TeamId,
    pub player2_team: Option<TeamId>,
}

impl LiveBattle {
    pub fn new(state: BattleState, player1_team: TeamId) -> Self {
        Self {
            state,
            player1_team,
            player2_team: None,
        }
    }
}

pub type SharedBattle = Arc<Mutex<LiveBattle>>;

/// Draw a fresh six-character id
pub fn generate_battle_id<R: Rng + ?Sized>(rng: &mut R) -> BattleId {
    let id = (0..BATTLE_ID_LEN)
        .map(|_| char::from(BATTLE_ID_ALPHABET[rng.gen_range(0..BATTLE_ID_ALPHABET.len())]))
        .collect::<String>();
    BattleId::new(id)
}

#[derive(Debug, Default)]
pub struct BattleRegistry {
    battles: DashMap<BattleId, SharedBattle>,
}

impl BattleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a battle under a new unique id
    pub fn create(&self, battle: LiveBattle) -> (BattleId, SharedBattle) {
        self.create_with(battle, &mut rand::thread_rng())
    }

    /// Same as [`create`](Self::create) with a caller-supplied id source.
    /// Ids already in use are redrawn.
    pub fn create_with<R: Rng + ?Sized>(
        &self,
        mut battle: LiveBattle,
        rng: &mut R,
    ) -> (BattleId, SharedBattle) {
        loop {
            let id = generate_battle_id(rng);
            match self.battles.entry(id.clone()) {
                Entry::Occupied(_) => {
                    tracing::debug!(battle_id = %id, "Battle id collision, retrying");
                }
                Entry::Vacant(slot) => {
                    battle.state.battle_id = id.clone();
                    let shared = Arc::new(Mutex::new(battle));
                    slot.insert(Arc::clone(&shared));
                    return (id, shared);
                }
            }
        }
    }

    pub fn get(&self, id: &BattleId) -> Option<SharedBattle> {
        self.battles.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &BattleId) -> Option<SharedBattle> {
        self.battles.remove(id).map(|(_, battle)| battle)
    }

    pub fn contains(&self, id: &BattleId) -> bool {
        self.battles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.battles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.battles.is_empty()
    }

    /// Copy out every handle so callers can lock battles without holding a shard
    pub fn handles(&self) -> Vec<(BattleId, SharedBattle)> {
        self.battles
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Battles still waiting that were created at or before `cutoff`
    pub async fn stale_waiting(&self, cutoff: DateTime<Utc>) -> Vec<BattleId> {
        let mut stale = Vec::new();
        for (id, battle) in self.handles() {
            let battle = battle.lock().await;
            if battle.state.is_waiting() && battle.state.started_at <= cutoff {
                stale.push(id);
            }
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_battle::{BattlePlayer, Combatant, CombatantBuild, StatBlock, struggle_move};
    use arena_protocol::{ConnectionId, UserId};
    use chrono::Duration;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn waiting(user: u64) -> LiveBattle {
        let mon = Combatant::from_build(CombatantBuild {
            species: "pidgey".into(),
            nickname: None,
            types: vec!["normal".into(), "flying".into()],
            level: 10,
            base_stats: StatBlock::splat(40),
            ivs: StatBlock::splat(31),
            evs: StatBlock::default(),
            moves: vec![struggle_move()],
            ability: "keen-eye".into(),
            item: None,
        });
        let player =
            BattlePlayer::new(UserId(user), format!("trainer{user}"), ConnectionId(user), vec![mon])
                .unwrap();
        LiveBattle::new(BattleState::waiting(player), TeamId(user))
    }

    #[test]
    fn test_generated_ids_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(generate_battle_id(&mut rng).is_well_formed());
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_to_state() {
        let registry = BattleRegistry::new();
        let (id, shared) = registry.create(waiting(1));

        assert!(id.is_well_formed());
        assert_eq!(shared.lock().await.state.battle_id, id);
        assert!(registry.contains(&id));
        assert!(Arc::ptr_eq(&registry.get(&id).unwrap(), &shared));
    }

    #[test]
    fn test_colliding_ids_are_redrawn() {
        let registry = BattleRegistry::new();

        // Same seed twice: the second create draws the first id, then retries
        let (first, _) = registry.create_with(waiting(1), &mut StdRng::seed_from_u64(3));
        let (second, _) = registry.create_with(waiting(2), &mut StdRng::seed_from_u64(3));

        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_many_creates_stay_unique() {
        let registry = BattleRegistry::new();
        let ids: HashSet<_> = (0..500).map(|u| registry.create(waiting(u)).0).collect();
        assert_eq!(ids.len(), 500);
        assert_eq!(registry.len(), 500);
    }

    #[test]
    fn test_remove() {
        let registry = BattleRegistry::new();
        let (id, _) = registry.create(waiting(1));

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stale_waiting_skips_fresh_and_started() {
        let registry = BattleRegistry::new();
        let old = Utc::now() - Duration::minutes(45);

        let (stale_id, stale) = registry.create(waiting(1));
        stale.lock().await.state.started_at = old;

        registry.create(waiting(2));

        let (_, started) = registry.create(waiting(3));
        {
            let mut battle = started.lock().await;
            battle.state.started_at = old;
            battle.state.status = arena_battle::BattleStatus::Active;
        }

        let cutoff = Utc::now() - Duration::minutes(30);
        assert_eq!(registry.stale_waiting(cutoff).await, vec![stale_id]);
    }
}
