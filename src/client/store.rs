//! Local profile and room history.
//!
//! Everything lives in one JSON file next to the client. The history keeps
//! the most recently joined rooms first, one entry per room.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{Identity, RoomId};
use crate::config::Config;
use crate::Result;

/// Maximum number of rooms kept in the history.
pub const HISTORY_LIMIT: usize = 10;

/// How a room first entered the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomOrigin {
    /// Created locally with a fresh id.
    Created,
    /// Joined from an id or invite code.
    Joined,
}

/// One remembered room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomHistoryEntry {
    /// Room id.
    pub room_id: RoomId,
    /// Name shown in the lobby.
    pub display_name: String,
    /// Logo URI, empty if none.
    #[serde(default)]
    pub logo_ref: String,
    /// Whether the room was created or joined here.
    pub origin: RoomOrigin,
    /// Last time the room was joined.
    pub last_joined_at: DateTime<Utc>,
}

impl RoomHistoryEntry {
    /// Create an entry stamped now. A blank name becomes `Room <id>`.
    pub fn new(room_id: RoomId, display_name: &str, logo_ref: &str, origin: RoomOrigin) -> Self {
        let display_name = match display_name.trim() {
            "" => format!("Room {room_id}"),
            name => name.to_string(),
        };
        Self {
            room_id,
            display_name,
            logo_ref: logo_ref.to_string(),
            origin,
            last_joined_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    profile: Option<Identity>,
    #[serde(default)]
    history: Vec<RoomHistoryEntry>,
}

/// File-backed profile and room history.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    data: StoreData,
}

impl LocalStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut data = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str::<StoreData>(&content)?
        } else {
            StoreData::default()
        };
        data.history.truncate(HISTORY_LIMIT);
        Ok(Self { path, data })
    }

    /// Open the store named in the `[client]` section of `config`.
    pub fn open_with(config: &Config) -> Result<Self> {
        Self::open(&config.client.store_path)
    }

    /// Saved profile, if any.
    pub fn profile(&self) -> Option<&Identity> {
        self.data.profile.as_ref()
    }

    /// Save the profile.
    pub fn save_profile(&mut self, identity: Identity) -> Result<()> {
        self.data.profile = Some(identity.sanitized());
        self.persist()
    }

    /// Remembered rooms, most recent first.
    pub fn history(&self) -> &[RoomHistoryEntry] {
        &self.data.history
    }

    /// Create a room locally: fresh id, recorded as created.
    pub fn create_room(&mut self, display_name: &str, logo_ref: &str) -> Result<RoomId> {
        let room_id = RoomId::generate();
        let entry = RoomHistoryEntry::new(room_id.clone(), display_name, logo_ref, RoomOrigin::Created);
        self.push(entry)?;
        Ok(room_id)
    }

    /// Record a join, moving the room to the front.
    ///
    /// A room created here stays marked as created. Blank name and logo keep
    /// the previously remembered ones.
    pub fn record_join(&mut self, room_id: &RoomId, display_name: &str, logo_ref: &str) -> Result<()> {
        let previous = self.data.history.iter().find(|e| &e.room_id == room_id);

        let origin = previous.map_or(RoomOrigin::Joined, |e| e.origin);
        let display_name = match (display_name.trim(), previous) {
            ("", Some(e)) => e.display_name.clone(),
            (name, _) => name.to_string(),
        };
        let logo_ref = match (logo_ref, previous) {
            ("", Some(e)) => e.logo_ref.clone(),
            (logo, _) => logo.to_string(),
        };

        let entry = RoomHistoryEntry::new(room_id.clone(), &display_name, &logo_ref, origin);
        self.push(entry)
    }

    /// Forget a room.
    pub fn remove_room(&mut self, room_id: &RoomId) -> Result<bool> {
        let before = self.data.history.len();
        self.data.history.retain(|e| &e.room_id != room_id);
        if self.data.history.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn push(&mut self, entry: RoomHistoryEntry) -> Result<()> {
        self.data.history.retain(|e| e.room_id != entry.room_id);
        self.data.history.insert(0, entry);
        self.data.history.truncate(HISTORY_LIMIT);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RoomcastError;
    use tempfile::TempDir;

    fn room(id: &str) -> RoomId {
        RoomId::parse(id).unwrap()
    }

    fn open(dir: &TempDir) -> LocalStore {
        LocalStore::open(dir.path().join("data").join("roomcast.json")).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(store.profile().is_none());
        assert!(store.history().is_empty());
    }

    #[test]
    fn test_profile_persists() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.save_profile(Identity::new("  Alice ", "a.png")).unwrap();

        let reopened = open(&dir);
        let profile = reopened.profile().unwrap();
        assert_eq!(profile.display_name, "Alice");
        assert_eq!(profile.avatar_ref, "a.png");
    }

    #[test]
    fn test_history_newest_first_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.record_join(&room("AAA111"), "First", "").unwrap();
        store.record_join(&room("BBB222"), "", "").unwrap();
        store.record_join(&room("AAA111"), "", "").unwrap();

        let ids: Vec<&str> = store.history().iter().map(|e| e.room_id.as_str()).collect();
        assert_eq!(ids, vec!["AAA111", "BBB222"]);
        assert_eq!(store.history()[0].display_name, "First");
        assert_eq!(store.history()[1].display_name, "Room BBB222");
    }

    #[test]
    fn test_history_capped() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        for i in 0..15 {
            store.record_join(&room(&format!("ROOM{i:02}")), "", "").unwrap();
        }

        let reopened = open(&dir);
        assert_eq!(reopened.history().len(), HISTORY_LIMIT);
        assert_eq!(reopened.history()[0].room_id.as_str(), "ROOM14");
        assert_eq!(reopened.history()[9].room_id.as_str(), "ROOM05");
    }

    #[test]
    fn test_created_room_keeps_origin_on_join() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let id = store.create_room("Book club", "logo.png").unwrap();
        store.record_join(&id, "", "").unwrap();

        let entry = &store.history()[0];
        assert_eq!(entry.origin, RoomOrigin::Created);
        assert_eq!(entry.display_name, "Book club");
        assert_eq!(entry.logo_ref, "logo.png");
        assert_eq!(entry.room_id.as_str().len(), crate::chat::ROOM_ID_LEN);
    }

    #[test]
    fn test_open_with_config_path() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.client.store_path = dir.path().join("store.json").to_string_lossy().into_owned();

        let mut store = LocalStore::open_with(&config).unwrap();
        store.save_profile(Identity::new("Bob", "")).unwrap();
        assert!(dir.path().join("store.json").exists());
    }

    #[test]
    fn test_remove_room() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.record_join(&room("AAA111"), "", "").unwrap();
        assert!(store.remove_room(&room("AAA111")).unwrap());
        assert!(!store.remove_room(&room("AAA111")).unwrap());
        assert!(open(&dir).history().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_json_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roomcast.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(LocalStore::open(&path), Err(RoomcastError::Json(_))));
    }
}
