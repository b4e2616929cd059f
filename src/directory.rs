use std::io;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashSet;

use crate::engine::EngineError;
use crate::model::RoomId;

/// Room existence, owned by the catalog subsystem.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn room_exists(&self, room_id: RoomId) -> Result<bool, EngineError>;
}

/// In-memory catalog snapshot.
#[derive(Debug, Default)]
pub struct StaticRoomDirectory {
    rooms: DashSet<RoomId>,
}

impl StaticRoomDirectory {
    pub fn new(rooms: impl IntoIterator<Item = RoomId>) -> Self {
        Self {
            rooms: rooms.into_iter().collect(),
        }
    }

    /// Load a JSON array of room ULIDs.
    pub fn load(path: &Path) -> io::Result<Self> {
        let raw = std::fs::read(path)?;
        let rooms: Vec<RoomId> = serde_json::from_slice(&raw)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self::new(rooms))
    }

    pub fn add(&self, room_id: RoomId) {
        self.rooms.insert(room_id);
    }

    pub fn remove(&self, room_id: &RoomId) {
        self.rooms.remove(room_id);
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[async_trait]
impl RoomDirectory for StaticRoomDirectory {
    async fn room_exists(&self, room_id: RoomId) -> Result<bool, EngineError> {
        Ok(self.rooms.contains(&room_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn add_and_remove() {
        let room = Ulid::new();
        let dir = StaticRoomDirectory::default();
        assert!(!dir.room_exists(room).await.unwrap());
        dir.add(room);
        assert!(dir.room_exists(room).await.unwrap());
        dir.remove(&room);
        assert!(dir.is_empty());
    }

    #[tokio::test]
    async fn load_json_catalog() {
        let rooms = [Ulid::new(), Ulid::new()];
        let path = std::env::temp_dir().join(format!("hostelres_rooms_{}.json", Ulid::new()));
        std::fs::write(&path, serde_json::to_vec(&rooms).unwrap()).unwrap();

        let dir = StaticRoomDirectory::load(&path).unwrap();
        assert_eq!(dir.len(), 2);
        assert!(dir.room_exists(rooms[1]).await.unwrap());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_rejects_garbage() {
        let path = std::env::temp_dir().join(format!("hostelres_rooms_{}.json", Ulid::new()));
        std::fs::write(&path, b"{not json").unwrap();
        let err = StaticRoomDirectory::load(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let _ = std::fs::remove_file(&path);
    }
}
