mod error;
mod lifecycle;
mod overlap;
mod queries;

pub use error::EngineError;
pub use overlap::{find_conflict, is_available};
pub(crate) use overlap::now_ms;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::{Generator, Ulid};

use crate::directory::RoomDirectory;
use crate::limits::WAL_CHANNEL_CAPACITY;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;
pub(crate) type RoomGuard = OwnedRwLockWriteGuard<RoomState>;
/// Held shared by every mutation from before its first room lock until its commit lands.
pub(crate) type CommitPermit = OwnedRwLockReadGuard<()>;

/// Bound on re-resolving a reservation that moved rooms while we waited for a lock.
const MAX_LOCK_ATTEMPTS: usize = 8;

// ── Group-commit WAL channel ─────────────────────────────

/// Requests served by the WAL writer task, in arrival order.
pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends that arrive while a flush is pending share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("WAL flush of {} events failed: {e}", batch.len());
        }
        for (_, tx) in batch {
            let _ = tx.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            });
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

/// Durably append a whole batch or none of it.
fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    if let Err(e) = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
    {
        wal.discard_buffered();
        return Err(e);
    }
    wal.flush_sync()
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Send one event to the writer task and wait until it is durable.
async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| EngineError::Unavailable("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::Unavailable("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::Unavailable(e.to_string()))
}

/// Apply an event to the rooms it touches. Caller holds every room's lock.
fn apply_event(
    rooms: &mut [&mut RoomState],
    event: &Event,
    index: &DashMap<ReservationId, RoomId>,
) {
    fn room<'a>(rooms: &'a mut [&mut RoomState], id: RoomId) -> Option<&'a mut RoomState> {
        rooms.iter_mut().find(|r| r.id == id).map(|r| &mut **r)
    }

    match event {
        Event::ReservationCreated { reservation } => {
            if let Some(rs) = room(rooms, reservation.room_id) {
                rs.insert(reservation.clone());
                index.insert(reservation.id, reservation.room_id);
            }
        }
        Event::ReservationRescheduled {
            id,
            from_room,
            to_room,
            span,
            updated_at,
        } => {
            let Some(mut moved) = room(rooms, *from_room).and_then(|rs| rs.remove(*id)) else {
                return;
            };
            moved.room_id = *to_room;
            moved.span = *span;
            moved.updated_at = *updated_at;
            if let Some(rs) = room(rooms, *to_room) {
                rs.insert(moved);
                index.insert(*id, *to_room);
            }
        }
        Event::StatusChanged {
            id,
            room_id,
            to,
            updated_at,
            ..
        } => {
            if let Some(r) = room(rooms, *room_id).and_then(|rs| rs.get_mut(*id)) {
                r.status = *to;
                r.updated_at = *updated_at;
            }
        }
        Event::ReservationDeleted { id, room_id } => {
            if let Some(rs) = room(rooms, *room_id) {
                rs.remove(*id);
            }
            index.remove(id);
        }
    }
}

/// The reservation store and lifecycle controller for one hostel.
///
/// Each room is an independent `RwLock`; every mutation runs its overlap
/// check and its commit under the write lock of the room(s) it touches.
pub struct Engine {
    rooms: DashMap<RoomId, SharedRoomState>,
    /// Reverse lookup: reservation id → room id.
    reservation_to_room: Arc<DashMap<ReservationId, RoomId>>,
    wal_tx: mpsc::Sender<WalCommand>,
    notify: Arc<NotifyHub>,
    directory: Arc<dyn RoomDirectory>,
    ids: Mutex<Generator>,
    /// Compaction takes this exclusively so no commit straddles the log swap.
    compaction_gate: Arc<RwLock<()>>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task.
    pub fn new(
        wal_path: PathBuf,
        directory: Arc<dyn RoomDirectory>,
        notify: Arc<NotifyHub>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let index = Arc::new(DashMap::new());
        let mut replayed: HashMap<RoomId, RoomState> = HashMap::new();
        for event in &events {
            let mut touched: Vec<RoomState> = event
                .rooms()
                .into_iter()
                .map(|id| replayed.remove(&id).unwrap_or_else(|| RoomState::new(id)))
                .collect();
            let mut refs: Vec<&mut RoomState> = touched.iter_mut().collect();
            apply_event(&mut refs, event, &index);
            for rs in touched {
                replayed.insert(rs.id, rs);
            }
        }

        let rooms = DashMap::new();
        for (id, rs) in replayed {
            rooms.insert(id, Arc::new(RwLock::new(rs)));
        }
        tracing::debug!(
            "replayed {} events into {} rooms from {}",
            events.len(),
            rooms.len(),
            wal_path.display()
        );

        Ok(Self {
            rooms,
            reservation_to_room: index,
            wal_tx,
            notify,
            directory,
            ids: Mutex::new(Generator::new()),
            compaction_gate: Arc::new(RwLock::new(())),
        })
    }

    /// Follow committed events touching `room_id`. Only events committed
    /// after this call are delivered.
    pub fn subscribe(&self, room_id: RoomId) -> broadcast::Receiver<Event> {
        self.notify.subscribe(room_id)
    }

    /// Shared state of `id`, if any reservation ever touched it.
    pub(super) fn room(&self, id: &RoomId) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    fn room_or_insert(&self, id: RoomId) -> SharedRoomState {
        self.rooms
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(RoomState::new(id))))
            .value()
            .clone()
    }

    /// Room currently holding reservation `id`.
    pub(super) fn room_of(&self, id: &ReservationId) -> Option<RoomId> {
        self.reservation_to_room.get(id).map(|e| *e.value())
    }

    pub(super) fn all_rooms(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    /// Monotonic, so identifier order is creation order even within one millisecond.
    pub(super) fn next_id(&self) -> Ulid {
        let mut generator = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        generator.generate().unwrap_or_else(|_| Ulid::new())
    }

    /// Taken before any room lock; rooms are always locked after the gate.
    pub(super) async fn commit_permit(&self) -> CommitPermit {
        self.compaction_gate.clone().read_owned().await
    }

    /// Write-lock one room, creating its empty state on first use.
    pub(super) async fn lock_room(&self, id: RoomId) -> RoomGuard {
        self.room_or_insert(id).write_owned().await
    }

    /// Write-lock rooms in ascending id order so two-room moves cannot deadlock.
    pub(super) async fn lock_rooms(&self, ids: &[RoomId]) -> Vec<RoomGuard> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.lock_room(id).await);
        }
        guards
    }

    /// Lock the room currently holding reservation `id`.
    pub(super) async fn lock_reservation(&self, id: ReservationId) -> Result<RoomGuard, EngineError> {
        for _ in 0..MAX_LOCK_ATTEMPTS {
            let room_id = self
                .room_of(&id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            let guard = self.lock_room(room_id).await;
            if guard.contains(id) {
                return Ok(guard);
            }
            // moved or deleted while we waited
        }
        Err(EngineError::ReservationNotFound(id))
    }

    /// Log, apply and publish `event` as one unit.
    ///
    /// Runs detached and owns the guards, so a caller that gives up midway
    /// cannot split the WAL append from the in-memory apply.
    pub(super) async fn commit(
        &self,
        permit: CommitPermit,
        mut guards: Vec<RoomGuard>,
        event: Event,
    ) -> Result<(), EngineError> {
        let wal_tx = self.wal_tx.clone();
        let index = self.reservation_to_room.clone();
        let notify = self.notify.clone();
        let task = tokio::spawn(async move {
            wal_append(&wal_tx, &event).await?;
            let mut rooms: Vec<&mut RoomState> = guards.iter_mut().map(|g| &mut **g).collect();
            apply_event(&mut rooms, &event, &index);
            notify.publish(&event);
            drop(guards);
            drop(permit);
            Ok::<(), EngineError>(())
        });
        task.await
            .map_err(|e| EngineError::Unavailable(format!("commit task failed: {e}")))?
    }

    /// Rewrite the WAL as one creation event per surviving reservation.
    ///
    /// Holds the compaction gate exclusively until the rewritten log is
    /// swapped in, so no commit can land in the old log after the snapshot.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let gate = self.compaction_gate.write().await;
        let mut room_ids: Vec<RoomId> = self.rooms.iter().map(|e| *e.key()).collect();
        room_ids.sort();

        let mut guards = Vec::with_capacity(room_ids.len());
        for id in &room_ids {
            if let Some(rs) = self.room(id) {
                guards.push(rs.read_owned().await);
            }
        }
        let events: Vec<Event> = guards
            .iter()
            .flat_map(|g| g.reservations.iter())
            .map(|r| Event::ReservationCreated {
                reservation: r.clone(),
            })
            .collect();
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        drop(guards);
        drop(gate);

        tracing::info!("compacted WAL to {count} reservations");
        Ok(())
    }

    /// Events durably appended since the last compaction. Zero once the writer is gone.
    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
