use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Money in hundredths of a currency unit. Two decimal places on the wire.
pub type Cents = i64;

/// Closed interval `[start, end]` — both endpoints included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Closed intervals conflict when they share at least one instant,
    /// endpoints included: a booking ending exactly when another starts
    /// is a conflict.
    pub fn conflicts(&self, other: &Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t <= self.end
    }
}

/// A stored booking, kept on its room sorted by `span.start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: Ulid,
    pub client: Ulid,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub number: String,
    pub cost_per_day: Cents,
    pub beds: u32,
    /// All bookings of this room, sorted by `span.start`.
    pub bookings: Vec<BookingRecord>,
}

impl RoomState {
    pub fn new(id: Ulid, number: String, cost_per_day: Cents, beds: u32) -> Self {
        Self {
            id,
            number,
            cost_per_day,
            beds,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: BookingRecord) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Remove a booking by id.
    pub fn remove_booking(&mut self, id: Ulid) -> Option<BookingRecord> {
        if let Some(pos) = self.bookings.iter().position(|b| b.id == id) {
            Some(self.bookings.remove(pos))
        } else {
            None
        }
    }

    pub fn find_booking(&self, id: Ulid) -> Option<&BookingRecord> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Bookings sharing at least one instant with the query window.
    /// Uses binary search to skip bookings starting after `query.end`.
    pub fn conflicting(&self, query: &Span) -> impl Iterator<Item = &BookingRecord> {
        // Everything at index >= right_bound starts after query.end → can't
        // conflict even on the closed boundary.
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start <= query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end >= query.start)
    }
}

/// A registered account. `password_hash` is the `salt$digest` form
/// produced by `auth::hash_password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub username: String,
    pub password_hash: String,
    pub is_superuser: bool,
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        number: String,
        cost_per_day: Cents,
        beds: u32,
    },
    RoomUpdated {
        id: Ulid,
        number: String,
        cost_per_day: Cents,
        beds: u32,
    },
    /// Cascades: all bookings of the room go with it.
    RoomDeleted {
        id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        room_id: Ulid,
        client: Ulid,
        span: Span,
    },
    /// Full replacement; `room_id` may differ from the booking's prior room.
    BookingUpdated {
        id: Ulid,
        room_id: Ulid,
        client: Ulid,
        span: Span,
    },
    BookingCancelled {
        id: Ulid,
        room_id: Ulid,
    },
    UserRegistered {
        id: Ulid,
        username: String,
        password_hash: String,
        is_superuser: bool,
    },
    UserRenamed {
        id: Ulid,
        username: String,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub number: String,
    pub cost_per_day: Cents,
    pub beds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub client: Ulid,
    pub start: Ms,
    pub end: Ms,
}

// ── Money parsing/formatting ─────────────────────────────────────

/// Parse a decimal money string ("100", "100.5", "100.00") into cents.
/// At most two fractional digits; anything else is rejected.
pub fn parse_cents(value: &str) -> Option<Cents> {
    let v = value.trim();
    let (negative, v) = match v.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, v),
    };
    let (int_part, frac_part) = match v.split_once('.') {
        Some((i, f)) => (i, f),
        None => (v, ""),
    };
    if int_part.is_empty() || frac_part.len() > 2 {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let int: i64 = int_part.parse().ok()?;
    let frac: i64 = if frac_part.is_empty() {
        0
    } else {
        let raw: i64 = frac_part.parse().ok()?;
        // "100.5" means 50 cents, not 5.
        raw * 10_i64.pow(2 - frac_part.len() as u32)
    };
    let cents = int.checked_mul(100)?.checked_add(frac)?;
    Some(if negative { -cents } else { cents })
}

/// Render cents as a fixed 2-decimal string, the wire form of `cost_per_day`.
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_spans_conflict_on_shared_endpoint() {
        let a = Span::new(100, 200);
        assert!(a.conflicts(&Span::new(200, 300)));
        assert!(a.conflicts(&Span::new(0, 100)));
        assert!(!a.conflicts(&Span::new(201, 300)));
        assert!(!a.conflicts(&Span::new(0, 99)));
    }

    #[test]
    fn conflicting_iterator_matches_predicate() {
        let mut rs = RoomState::new(Ulid::new(), "1".into(), 10_000, 1);
        let spans = [(100, 200), (300, 400), (600, 700)];
        for (s, e) in spans {
            rs.insert_booking(BookingRecord {
                id: Ulid::new(),
                client: Ulid::new(),
                span: Span::new(s, e),
            });
        }
        let query = Span::new(200, 600);
        let hits: Vec<Span> = rs.conflicting(&query).map(|b| b.span).collect();
        assert_eq!(
            hits,
            vec![Span::new(100, 200), Span::new(300, 400), Span::new(600, 700)]
        );

        let none: Vec<Span> = rs.conflicting(&Span::new(401, 599)).map(|b| b.span).collect();
        assert!(none.is_empty());
    }

    #[test]
    fn insert_booking_keeps_sort_order() {
        let mut rs = RoomState::new(Ulid::new(), "1".into(), 10_000, 1);
        for (s, e) in [(300, 400), (100, 200), (500, 600)] {
            rs.insert_booking(BookingRecord {
                id: Ulid::new(),
                client: Ulid::new(),
                span: Span::new(s, e),
            });
        }
        let starts: Vec<Ms> = rs.bookings.iter().map(|b| b.span.start).collect();
        assert_eq!(starts, vec![100, 300, 500]);
    }

    #[test]
    fn parse_cents_accepts_decimal_forms() {
        assert_eq!(parse_cents("100"), Some(10_000));
        assert_eq!(parse_cents("100.00"), Some(10_000));
        assert_eq!(parse_cents("100.5"), Some(10_050));
        assert_eq!(parse_cents("0.07"), Some(7));
        assert_eq!(parse_cents("-3.25"), Some(-325));
    }

    #[test]
    fn parse_cents_rejects_garbage() {
        assert_eq!(parse_cents(""), None);
        assert_eq!(parse_cents("."), None);
        assert_eq!(parse_cents("1.234"), None);
        assert_eq!(parse_cents("ten"), None);
        assert_eq!(parse_cents("1,50"), None);
    }

    #[test]
    fn format_cents_two_decimals() {
        assert_eq!(format_cents(10_000), "100.00");
        assert_eq!(format_cents(7), "0.07");
        assert_eq!(format_cents(10_050), "100.50");
    }
}
