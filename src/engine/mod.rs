mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{matches_filters, room_is_free, sort_rooms, RoomOrdering, RoomQuery};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
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
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Owner of all durable state: rooms (each behind its own RwLock), their
/// bookings, and the user table. Mutations are WAL-append → apply; the
/// per-room write lock is held across validate + append + apply, so a
/// successful write is visible to every later read of that room.
pub struct Engine {
    pub state: DashMap<Ulid, SharedRoomState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: booking id → room id.
    pub(super) booking_to_room: DashMap<Ulid, Ulid>,
    /// Unique index: room number → room id.
    pub(super) numbers: DashMap<String, Ulid>,
    pub(super) users: DashMap<Ulid, User>,
    /// Unique index: username → user id.
    pub(super) usernames: DashMap<String, Ulid>,
}

/// Apply a per-room event directly to a RoomState (no locking — caller holds
/// the lock). Cross-room moves and map-level events are handled by the
/// mutation or the replay loop.
fn apply_to_room(rs: &mut RoomState, event: &Event, bookings: &DashMap<Ulid, Ulid>) {
    match event {
        Event::BookingCreated {
            id,
            room_id,
            client,
            span,
        } => {
            rs.insert_booking(BookingRecord {
                id: *id,
                client: *client,
                span: *span,
            });
            bookings.insert(*id, *room_id);
        }
        Event::BookingUpdated {
            id,
            room_id,
            client,
            span,
        } => {
            rs.remove_booking(*id);
            rs.insert_booking(BookingRecord {
                id: *id,
                client: *client,
                span: *span,
            });
            bookings.insert(*id, *room_id);
        }
        Event::BookingCancelled { id, .. } => {
            rs.remove_booking(*id);
            bookings.remove(id);
        }
        Event::RoomUpdated {
            number,
            cost_per_day,
            beds,
            ..
        } => {
            rs.number = number.clone();
            rs.cost_per_day = *cost_per_day;
            rs.beds = *beds;
        }
        // Room create/delete and user events are handled at the map level.
        Event::RoomCreated { .. }
        | Event::RoomDeleted { .. }
        | Event::UserRegistered { .. }
        | Event::UserRenamed { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            booking_to_room: DashMap::new(),
            numbers: DashMap::new(),
            users: DashMap::new(),
            usernames: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::RoomCreated {
                    id,
                    number,
                    cost_per_day,
                    beds,
                } => {
                    let rs = RoomState::new(*id, number.clone(), *cost_per_day, *beds);
                    engine.state.insert(*id, Arc::new(RwLock::new(rs)));
                    engine.numbers.insert(number.clone(), *id);
                }
                Event::RoomDeleted { id } => {
                    if let Some((_, rs)) = engine.state.remove(id) {
                        let guard = rs.try_read().expect("replay: uncontended read");
                        for booking in &guard.bookings {
                            engine.booking_to_room.remove(&booking.id);
                        }
                        engine.numbers.remove(&guard.number);
                    }
                }
                Event::RoomUpdated { id, number, .. } => {
                    if let Some(entry) = engine.state.get(id) {
                        let rs = entry.value().clone();
                        let mut guard = rs.try_write().expect("replay: uncontended write");
                        if guard.number != *number {
                            engine.numbers.remove(&guard.number);
                            engine.numbers.insert(number.clone(), *id);
                        }
                        apply_to_room(&mut guard, event, &engine.booking_to_room);
                    }
                }
                Event::BookingUpdated { id, room_id, .. } => {
                    // May move the booking between rooms.
                    let old_room = engine.booking_to_room.get(id).map(|e| *e.value());
                    if let Some(old_rid) = old_room
                        && old_rid != *room_id
                        && let Some(entry) = engine.state.get(&old_rid) {
                            let rs = entry.value().clone();
                            let mut guard = rs.try_write().expect("replay: uncontended write");
                            guard.remove_booking(*id);
                        }
                    if let Some(entry) = engine.state.get(room_id) {
                        let rs = entry.value().clone();
                        let mut guard = rs.try_write().expect("replay: uncontended write");
                        apply_to_room(&mut guard, event, &engine.booking_to_room);
                    }
                }
                Event::BookingCreated { room_id, .. } | Event::BookingCancelled { room_id, .. } => {
                    if let Some(entry) = engine.state.get(room_id) {
                        let rs = entry.value().clone();
                        let mut guard = rs.try_write().expect("replay: uncontended write");
                        apply_to_room(&mut guard, event, &engine.booking_to_room);
                    }
                }
                Event::UserRegistered {
                    id,
                    username,
                    password_hash,
                    is_superuser,
                } => {
                    engine.users.insert(
                        *id,
                        User {
                            id: *id,
                            username: username.clone(),
                            password_hash: password_hash.clone(),
                            is_superuser: *is_superuser,
                        },
                    );
                    engine.usernames.insert(username.clone(), *id);
                }
                Event::UserRenamed { id, username } => {
                    if let Some(mut user) = engine.users.get_mut(id) {
                        engine.usernames.remove(&user.username);
                        user.username = username.clone();
                        engine.usernames.insert(username.clone(), *id);
                    }
                }
            }
        }

        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(engine.state.len() as f64);
        metrics::gauge!(crate::observability::BOOKINGS_ACTIVE)
            .set(engine.booking_to_room.len() as f64);

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply in one call. Eliminates the repeated pattern.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(rs, event, &self.booking_to_room);
        Ok(())
    }

    /// Lookup booking → room, get room, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .room_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.write_owned().await;
        Ok((room_id, guard))
    }
}
