use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_ACTIVE, ROOMS_ACTIVE};

use super::conflict::{check_future_start, check_no_conflict, now_ms, validate_span};
use super::{Engine, EngineError, WalCommand};

fn validate_room_fields(number: &str, cost_per_day: Cents, beds: u32) -> Result<(), EngineError> {
    if number.is_empty() {
        return Err(EngineError::InvalidField("number must not be empty"));
    }
    if number.len() > MAX_ROOM_NUMBER_LEN {
        return Err(EngineError::LimitExceeded("room number too long"));
    }
    if cost_per_day < 0 {
        return Err(EngineError::InvalidField("cost_per_day must not be negative"));
    }
    if cost_per_day > MAX_COST_CENTS {
        return Err(EngineError::LimitExceeded("cost_per_day too large"));
    }
    if beds == 0 {
        return Err(EngineError::InvalidField("beds must be positive"));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), EngineError> {
    if username.is_empty() {
        return Err(EngineError::InvalidField("username must not be empty"));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(EngineError::LimitExceeded("username too long"));
    }
    Ok(())
}

impl Engine {
    // ── Rooms ────────────────────────────────────────────────

    pub async fn create_room(
        &self,
        id: Ulid,
        number: String,
        cost_per_day: Cents,
        beds: u32,
    ) -> Result<(), EngineError> {
        validate_room_fields(&number, cost_per_day, beds)?;
        if self.state.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.numbers.contains_key(&number) {
            return Err(EngineError::DuplicateNumber(number));
        }

        let event = Event::RoomCreated {
            id,
            number: number.clone(),
            cost_per_day,
            beds,
        };
        self.wal_append(&event).await?;
        let rs = RoomState::new(id, number.clone(), cost_per_day, beds);
        self.state.insert(id, Arc::new(RwLock::new(rs)));
        self.numbers.insert(number, id);
        metrics::gauge!(ROOMS_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }

    pub async fn update_room(
        &self,
        id: Ulid,
        number: String,
        cost_per_day: Cents,
        beds: u32,
    ) -> Result<(), EngineError> {
        validate_room_fields(&number, cost_per_day, beds)?;
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        if let Some(owner) = self.numbers.get(&number)
            && *owner.value() != id {
                return Err(EngineError::DuplicateNumber(number));
            }

        let event = Event::RoomUpdated {
            id,
            number: number.clone(),
            cost_per_day,
            beds,
        };
        self.wal_append(&event).await?;
        if guard.number != number {
            self.numbers.remove(&guard.number);
            self.numbers.insert(number, id);
        }
        super::apply_to_room(&mut guard, &event, &self.booking_to_room);
        Ok(())
    }

    /// Deleting a room cascades to all its bookings.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.write().await;

        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        for booking in &guard.bookings {
            self.booking_to_room.remove(&booking.id);
        }
        self.numbers.remove(&guard.number);
        drop(guard);
        self.state.remove(&id);
        metrics::gauge!(ROOMS_ACTIVE).set(self.state.len() as f64);
        metrics::gauge!(BOOKINGS_ACTIVE).set(self.booking_to_room.len() as f64);
        Ok(())
    }

    // ── Bookings ─────────────────────────────────────────────

    pub async fn create_booking(
        &self,
        id: Ulid,
        room_id: Ulid,
        client: Ulid,
        span: Span,
    ) -> Result<(), EngineError> {
        validate_span(&span)?;
        if !self.users.contains_key(&client) {
            return Err(EngineError::NotFound(client));
        }
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let mut guard = rs.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }

        check_future_start(&span, now_ms())?;
        check_no_conflict(&guard, &span, None)?;

        let event = Event::BookingCreated {
            id,
            room_id,
            client,
            span,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::gauge!(BOOKINGS_ACTIVE).set(self.booking_to_room.len() as f64);
        Ok(())
    }

    /// Full replacement of a booking. Validation is the same as creation,
    /// except the booking's own prior state is excluded from the conflict
    /// set — a booking must not conflict with itself.
    pub async fn update_booking(
        &self,
        id: Ulid,
        room_id: Ulid,
        client: Ulid,
        span: Span,
    ) -> Result<(), EngineError> {
        validate_span(&span)?;
        if !self.users.contains_key(&client) {
            return Err(EngineError::NotFound(client));
        }
        let old_room_id = self.room_for_booking(&id).ok_or(EngineError::NotFound(id))?;

        if old_room_id == room_id {
            let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
            let mut guard = rs.write().await;
            if guard.find_booking(id).is_none() {
                return Err(EngineError::NotFound(id));
            }
            check_future_start(&span, now_ms())?;
            check_no_conflict(&guard, &span, Some(id))?;

            let event = Event::BookingUpdated {
                id,
                room_id,
                client,
                span,
            };
            return self.persist_and_apply(&mut guard, &event).await;
        }

        // Move between rooms: acquire both write locks in sorted id order to
        // prevent deadlocks.
        let old_rs = self
            .get_room(&old_room_id)
            .ok_or(EngineError::NotFound(old_room_id))?;
        let new_rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let (mut old_guard, mut new_guard) = if old_room_id < room_id {
            let old_guard = old_rs.write_owned().await;
            let new_guard = new_rs.write_owned().await;
            (old_guard, new_guard)
        } else {
            let new_guard = new_rs.write_owned().await;
            let old_guard = old_rs.write_owned().await;
            (old_guard, new_guard)
        };

        if old_guard.find_booking(id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        if new_guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }
        check_future_start(&span, now_ms())?;
        check_no_conflict(&new_guard, &span, None)?;

        let event = Event::BookingUpdated {
            id,
            room_id,
            client,
            span,
        };
        self.wal_append(&event).await?;
        old_guard.remove_booking(id);
        new_guard.insert_booking(BookingRecord { id, client, span });
        self.booking_to_room.insert(id, room_id);
        Ok(())
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&id).await?;
        let event = Event::BookingCancelled { id, room_id };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::gauge!(BOOKINGS_ACTIVE).set(self.booking_to_room.len() as f64);
        Ok(room_id)
    }

    // ── Users ────────────────────────────────────────────────

    pub async fn register_user(
        &self,
        id: Ulid,
        username: String,
        password_hash: String,
        is_superuser: bool,
    ) -> Result<(), EngineError> {
        validate_username(&username)?;
        if self.users.len() >= MAX_USERS {
            return Err(EngineError::LimitExceeded("too many users"));
        }
        if self.users.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.usernames.contains_key(&username) {
            return Err(EngineError::DuplicateUsername(username));
        }

        let event = Event::UserRegistered {
            id,
            username: username.clone(),
            password_hash: password_hash.clone(),
            is_superuser,
        };
        self.wal_append(&event).await?;
        self.users.insert(
            id,
            User {
                id,
                username: username.clone(),
                password_hash,
                is_superuser,
            },
        );
        self.usernames.insert(username, id);
        Ok(())
    }

    pub async fn rename_user(&self, id: Ulid, username: String) -> Result<(), EngineError> {
        validate_username(&username)?;
        if !self.users.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        if let Some(owner) = self.usernames.get(&username)
            && *owner.value() != id {
                return Err(EngineError::DuplicateUsername(username));
            }

        let event = Event::UserRenamed {
            id,
            username: username.clone(),
        };
        self.wal_append(&event).await?;
        if let Some(mut user) = self.users.get_mut(&id) {
            self.usernames.remove(&user.username);
            user.username = username.clone();
            self.usernames.insert(username, id);
        }
        Ok(())
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for user in self.users.iter() {
            events.push(Event::UserRegistered {
                id: user.id,
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
                is_superuser: user.is_superuser,
            });
        }

        let rooms: Vec<super::SharedRoomState> =
            self.state.iter().map(|e| e.value().clone()).collect();
        for rs in rooms {
            let guard = rs.read().await;
            events.push(Event::RoomCreated {
                id: guard.id,
                number: guard.number.clone(),
                cost_per_day: guard.cost_per_day,
                beds: guard.beds,
            });
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: booking.id,
                    room_id: guard.id,
                    client: booking.client,
                    span: booking.span,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

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
