use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::background;
use crate::directory::RoomDirectory;
use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;

/// One engine per hostel, each with its own WAL file and background tasks.
pub struct HostelManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    report_interval: Duration,
    directory: Arc<dyn RoomDirectory>,
}

/// Keep only `[A-Za-z0-9_-]` so a hostel name is always a plain file stem.
fn sanitize(name: &str) -> io::Result<String> {
    if name.len() > MAX_HOSTEL_NAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "hostel name too long",
        ));
    }
    let safe: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if safe.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty hostel name",
        ));
    }
    Ok(safe)
}

impl HostelManager {
    pub fn new(
        data_dir: PathBuf,
        compact_threshold: u64,
        report_interval: Duration,
        directory: Arc<dyn RoomDirectory>,
    ) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            report_interval,
            directory,
        }
    }

    /// Get or lazily open the engine for `hostel`.
    pub fn get_or_create(&self, hostel: &str) -> io::Result<Arc<Engine>> {
        let name = sanitize(hostel)?;
        if let Some(engine) = self.engines.get(&name) {
            return Ok(engine.value().clone());
        }
        if self.engines.len() >= MAX_HOSTELS {
            return Err(io::Error::other("too many hostels"));
        }

        let engine = self
            .engines
            .entry(name.clone())
            .or_try_insert_with(|| self.open(&name))?
            .value()
            .clone();
        metrics::gauge!(crate::observability::HOSTELS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }

    fn open(&self, name: &str) -> io::Result<Arc<Engine>> {
        let wal_path = self.data_dir.join(format!("{name}.wal"));
        let engine = Arc::new(Engine::new(
            wal_path,
            self.directory.clone(),
            Arc::new(NotifyHub::new()),
        )?);

        tokio::spawn(background::run_compactor(
            name.to_string(),
            engine.clone(),
            self.compact_threshold,
        ));
        tokio::spawn(background::run_occupancy_reporter(
            name.to_string(),
            engine.clone(),
            self.report_interval,
        ));
        tracing::info!("opened hostel {name}");
        Ok(engine)
    }

    /// Hostel names with an existing WAL in the data directory.
    pub fn discover(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "wal")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
        }
        names.sort();
        Ok(names)
    }

    pub fn hostels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use crate::directory::StaticRoomDirectory;
    use crate::model::NewReservation;
    use std::fs;
    use ulid::Ulid;

    const DAY: i64 = 86_400_000;
    const T0: i64 = 1_767_225_600_000; // 2026-01-01

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("hostelres_test_hostel").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn manager(dir: PathBuf, rooms: &[Ulid]) -> HostelManager {
        HostelManager::new(
            dir,
            1000,
            Duration::from_secs(60),
            Arc::new(StaticRoomDirectory::new(rooms.iter().copied())),
        )
    }

    #[tokio::test]
    async fn hostels_are_isolated() {
        let room = Ulid::new();
        let hm = manager(test_data_dir("isolation"), &[room]);
        let harbour = hm.get_or_create("harbour").unwrap();
        let old_town = hm.get_or_create("old_town").unwrap();

        let guest = Ulid::new();
        let claims = Claims::guest(guest);
        harbour
            .create(&claims, NewReservation::new(room, guest, T0, T0 + DAY))
            .await
            .unwrap();

        // same room id, different hostel: no conflict
        old_town
            .create(&claims, NewReservation::new(room, guest, T0, T0 + DAY))
            .await
            .unwrap();
        assert_eq!(harbour.count_reservations(None, None).await.unwrap(), 1);
        assert_eq!(old_town.count_reservations(None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lazy_open_creates_wal() {
        let dir = test_data_dir("lazy");
        let hm = manager(dir.clone(), &[]);
        assert!(fs::read_dir(&dir).unwrap().next().is_none());

        hm.get_or_create("harbour").unwrap();
        assert!(dir.join("harbour.wal").exists());
        assert_eq!(hm.discover().unwrap(), vec!["harbour".to_string()]);
    }

    #[tokio::test]
    async fn same_engine_returned() {
        let hm = manager(test_data_dir("same"), &[]);
        let a = hm.get_or_create("harbour").unwrap();
        let b = hm.get_or_create("harbour").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn names_are_sanitized() {
        let dir = test_data_dir("sanitize");
        let hm = manager(dir.clone(), &[]);

        let evil = hm.get_or_create("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());
        // same file stem, same engine
        assert!(Arc::ptr_eq(&evil, &hm.get_or_create("evil").unwrap()));

        assert!(hm.get_or_create("../..").is_err());
        assert_eq!(hm.hostels(), vec!["evil".to_string()]);
    }

    #[tokio::test]
    async fn name_too_long_rejected() {
        let hm = manager(test_data_dir("too_long"), &[]);
        let err = hm
            .get_or_create(&"x".repeat(MAX_HOSTEL_NAME_LEN + 1))
            .err()
            .unwrap();
        assert!(err.to_string().contains("hostel name too long"));
    }

    #[tokio::test]
    async fn reopen_replays_reservations() {
        let dir = test_data_dir("reopen");
        let room = Ulid::new();
        let guest = Ulid::new();
        let id = {
            let hm = manager(dir.clone(), &[room]);
            let engine = hm.get_or_create("harbour").unwrap();
            engine
                .create(&Claims::guest(guest), NewReservation::new(room, guest, T0, T0 + DAY))
                .await
                .unwrap()
                .id
        };

        let hm = manager(dir, &[room]);
        let engine = hm.get_or_create("harbour").unwrap();
        assert_eq!(engine.get(id).await.unwrap().subject, guest);
    }
}
