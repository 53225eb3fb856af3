//! Strongly-typed identifiers for detoxd

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Process image name of a blocked application (e.g. `game.exe`, `firefox`).
///
/// Equality, ordering and hashing ignore ASCII case so that `Game.exe` and
/// `game.exe` refer to the same target. The name is kept as the user typed it
/// for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AppName(String);

impl AppName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive comparison against a raw process name
    pub fn matches(&self, process_name: &str) -> bool {
        self.0.eq_ignore_ascii_case(process_name.trim())
    }

    fn key(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.bytes().map(|b| b.to_ascii_lowercase())
    }
}

impl PartialEq for AppName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for AppName {}

impl Hash for AppName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.key() {
            state.write_u8(b);
        }
        state.write_u8(0xff);
    }
}

impl PartialOrd for AppName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AppName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(other.key())
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AppName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for AppName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<AppName> for String {
    fn from(name: AppName) -> Self {
        name.0
    }
}

/// Unique identifier for a block entity in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(Uuid);

impl BlockId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the hyphenated string form
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a connected IPC client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};

    #[test]
    fn app_name_ignores_case() {
        let a = AppName::new("Game.exe");
        let b = AppName::new("game.EXE");
        let c = AppName::new("other.exe");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.matches("GAME.exe"));
        assert!(!a.matches("game"));
    }

    #[test]
    fn app_name_hash_and_order_follow_equality() {
        let mut set = HashSet::new();
        set.insert(AppName::new("Firefox"));
        set.insert(AppName::new("firefox"));
        assert_eq!(set.len(), 1);

        let ordered: BTreeSet<AppName> = ["b.exe", "A.exe", "a.EXE"]
            .into_iter()
            .map(AppName::new)
            .collect();
        let names: Vec<_> = ordered.iter().map(|n| n.as_str().to_lowercase()).collect();
        assert_eq!(names, vec!["a.exe", "b.exe"]);
    }

    #[test]
    fn app_name_trims_and_keeps_display_case() {
        let name = AppName::new("  Steam.exe ");
        assert_eq!(name.as_str(), "Steam.exe");
        assert_eq!(name.to_string(), "Steam.exe");
    }

    #[test]
    fn ids_serialize_deserialize() {
        let name = AppName::new("game.exe");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"game.exe\"");
        let parsed: AppName = serde_json::from_str(&json).unwrap();
        assert_eq!(name, parsed);

        let id = BlockId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
        assert_eq!(BlockId::parse(&id.to_string()), Some(id));
    }

    #[test]
    fn client_id_uniqueness() {
        assert_ne!(ClientId::new(), ClientId::new());
    }
}
