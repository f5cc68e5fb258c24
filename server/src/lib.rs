//! Real-time battle coordination.
//!
//! ```text
//! websocket ──> transport ──> Arena ──┬─> MatchmakingQueue
//!                                     ├─> BattleRegistry (one lock per battle)
//!                                     ├─> ConnectionDirectory (outbound events)
//!                                     └─> Collaborators (teams, history, ratings, sessions)
//! ```
//!
//! Clients identify once per socket, then queue for a random opponent or open
//! a private battle by id. The [`SessionReaper`] removes battles nobody
//! joined.

pub mod config;
pub mod directory;
pub mod error;
pub mod matchmaking;
pub mod reaper;
pub mod registry;
pub mod service;
pub mod store;
pub mod transport;

pub use config::{ArenaConfig, ConfigError};
pub use directory::{ConnectionDirectory, ConnectionHandle, EventSender};
pub use error::{ArenaError, Result};
pub use matchmaking::{MatchmakingEntry, MatchmakingQueue};
pub use reaper::SessionReaper;
pub use registry::{BattleRegistry, LiveBattle, SharedBattle};
pub use service::Arena;
pub use store::{
    BattleHistoryStore, BattleRecord, BattleResult, Collaborators, NewBattleRecord, RatingStore,
    SessionRecord, SessionStore, TeamRecord, TeamStore,
};
pub use transport::serve;
