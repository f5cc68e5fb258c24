//! Identifier newtypes shared by every layer of the arena

use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of a battle identifier
pub const BATTLE_ID_LEN: usize = 6;

/// Characters a battle identifier is drawn from
pub const BATTLE_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Authenticated user identity, issued upstream and treated as opaque
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Stored team reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub u64);

/// One live client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

/// Six-character battle identifier drawn from `[A-Z0-9]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BattleId(pub String);

impl BattleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the id has the expected length and alphabet
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == BATTLE_ID_LEN
            && self.0.bytes().all(|b| BATTLE_ID_ALPHABET.contains(&b))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl fmt::Display for BattleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battle_id_well_formed() {
        assert!(BattleId::new("AB12CD").is_well_formed());
        assert!(BattleId::new("000000").is_well_formed());
        assert!(!BattleId::new("ab12cd").is_well_formed());
        assert!(!BattleId::new("AB12C").is_well_formed());
        assert!(!BattleId::new("AB12CD7").is_well_formed());
        assert!(!BattleId::new("AB-2CD").is_well_formed());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&UserId(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&BattleId::new("XYZ123")).unwrap(),
            "\"XYZ123\""
        );
    }
}
