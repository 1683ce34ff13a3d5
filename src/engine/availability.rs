use std::cmp::Ordering;

use crate::model::*;

// ── Availability filter ───────────────────────────────────────────

/// Sort keys accepted by the room list, each invertible with a `-` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomOrdering {
    Beds,
    BedsDesc,
    CostPerDay,
    CostPerDayDesc,
}

impl RoomOrdering {
    /// Parse one `ordering` token. Unknown keys yield None and are ignored
    /// by callers.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "beds" => Some(RoomOrdering::Beds),
            "-beds" => Some(RoomOrdering::BedsDesc),
            "cost_per_day" => Some(RoomOrdering::CostPerDay),
            "-cost_per_day" => Some(RoomOrdering::CostPerDayDesc),
            _ => None,
        }
    }
}

/// Filters and sort keys for the room list. All filters are optional and
/// compose: a room must match every present filter.
#[derive(Debug, Clone, Default)]
pub struct RoomQuery {
    pub beds: Option<u32>,
    pub cost_per_day: Option<Cents>,
    pub window: Option<Span>,
    pub ordering: Vec<RoomOrdering>,
}

/// A room is free for `window` when none of its bookings shares an instant
/// with it. A room with zero bookings is always free.
pub fn room_is_free(room: &RoomState, window: &Span) -> bool {
    room.conflicting(window).next().is_none()
}

pub fn matches_filters(room: &RoomState, query: &RoomQuery) -> bool {
    if let Some(beds) = query.beds
        && room.beds != beds {
            return false;
        }
    if let Some(cost) = query.cost_per_day
        && room.cost_per_day != cost {
            return false;
        }
    if let Some(window) = &query.window
        && !room_is_free(room, window) {
            return false;
        }
    true
}

/// Sort by the ordering keys in turn, falling back to id order (ulids are
/// creation-ordered) for a deterministic listing.
pub fn sort_rooms(rooms: &mut [RoomInfo], ordering: &[RoomOrdering]) {
    rooms.sort_by(|a, b| {
        for key in ordering {
            let ord = match key {
                RoomOrdering::Beds => a.beds.cmp(&b.beds),
                RoomOrdering::BedsDesc => b.beds.cmp(&a.beds),
                RoomOrdering::CostPerDay => a.cost_per_day.cmp(&b.cost_per_day),
                RoomOrdering::CostPerDayDesc => b.cost_per_day.cmp(&a.cost_per_day),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.id.cmp(&b.id)
    });
}
