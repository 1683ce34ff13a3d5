use ulid::Ulid;

use crate::model::*;

use super::availability::{matches_filters, sort_rooms, RoomQuery};
use super::{Engine, SharedRoomState};

impl Engine {
    /// Rooms matching every present filter of `query`, in the requested
    /// order. The availability window excludes any room with a conflicting
    /// booking; a room with zero bookings is always included.
    pub async fn list_rooms(&self, query: &RoomQuery) -> Vec<RoomInfo> {
        let rooms: Vec<SharedRoomState> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(rooms.len());
        for rs in rooms {
            let guard = rs.read().await;
            if matches_filters(&guard, query) {
                out.push(RoomInfo {
                    id: guard.id,
                    number: guard.number.clone(),
                    cost_per_day: guard.cost_per_day,
                    beds: guard.beds,
                });
            }
        }
        sort_rooms(&mut out, &query.ordering);
        out
    }

    pub async fn get_room_info(&self, id: &Ulid) -> Option<RoomInfo> {
        let rs = self.get_room(id)?;
        let guard = rs.read().await;
        Some(RoomInfo {
            id: guard.id,
            number: guard.number.clone(),
            cost_per_day: guard.cost_per_day,
            beds: guard.beds,
        })
    }

    /// Bookings visible to a principal: pass `Some(client)` to scope to that
    /// client's own bookings, `None` for the superuser view of everything.
    pub async fn list_bookings(&self, client: Option<Ulid>) -> Vec<BookingInfo> {
        let rooms: Vec<SharedRoomState> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for rs in rooms {
            let guard = rs.read().await;
            for booking in &guard.bookings {
                if let Some(client) = client
                    && booking.client != client {
                        continue;
                    }
                out.push(BookingInfo {
                    id: booking.id,
                    room_id: guard.id,
                    client: booking.client,
                    start: booking.span.start,
                    end: booking.span.end,
                });
            }
        }
        // Ulids are creation-ordered; sort for a deterministic listing.
        out.sort_by_key(|b| b.id);
        out
    }

    pub async fn get_booking(&self, id: &Ulid) -> Option<BookingInfo> {
        let room_id = self.room_for_booking(id)?;
        let rs = self.get_room(&room_id)?;
        let guard = rs.read().await;
        guard.find_booking(*id).map(|booking| BookingInfo {
            id: booking.id,
            room_id,
            client: booking.client,
            start: booking.span.start,
            end: booking.span.end,
        })
    }

    // ── Users ────────────────────────────────────────────────

    pub fn get_user(&self, id: &Ulid) -> Option<User> {
        self.users.get(id).map(|u| u.value().clone())
    }

    pub fn find_user(&self, username: &str) -> Option<User> {
        let id = self.usernames.get(username).map(|e| *e.value())?;
        self.get_user(&id)
    }
}
