//! Session sync state as seen by the editor layer.
//!
//! Transitions:
//!   Disconnected → Loading → Synced
//!   Synced → Dirty (first recorded edit)
//!   Synced | Dirty → Validating → previous
//!   Dirty → Updating → Synced | Dirty (partial failure)
//!   Synced | Dirty | Error → Loading (refresh)
//!   Loading → Error (failed first connect)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Disconnected,
    Loading,
    Synced,
    Dirty,
    Validating,
    Updating,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Loading => "loading",
            Self::Synced => "synced",
            Self::Dirty => "dirty",
            Self::Validating => "validating",
            Self::Updating => "updating",
            Self::Error => "error",
        }
    }

    /// Whether a schema model and annotation baseline are loaded.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Synced | Self::Dirty | Self::Validating)
    }

    /// Whether the baseline may be replaced underneath a reader.
    pub fn excludes_readers(&self) -> bool {
        matches!(self, Self::Loading | Self::Updating)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_states() {
        assert!(SyncState::Synced.is_connected());
        assert!(SyncState::Dirty.is_connected());
        assert!(SyncState::Validating.is_connected());
        assert!(!SyncState::Loading.is_connected());
        assert!(!SyncState::Error.is_connected());
        assert!(!SyncState::Disconnected.is_connected());
    }

    #[test]
    fn reader_exclusion() {
        assert!(SyncState::Loading.excludes_readers());
        assert!(SyncState::Updating.excludes_readers());
        assert!(!SyncState::Validating.excludes_readers());
        assert!(!SyncState::Dirty.excludes_readers());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&SyncState::Validating).unwrap();
        assert_eq!(json, "\"validating\"");
    }
}
