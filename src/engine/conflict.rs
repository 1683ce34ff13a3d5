use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.end < span.start {
        return Err(EngineError::EndBeforeStart);
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("booking too long"));
    }
    Ok(())
}

/// Creation-time rule: a booking may not start before the wall clock.
/// Applies to create and update, never to availability reads.
pub(crate) fn check_future_start(span: &Span, now: Ms) -> Result<(), EngineError> {
    if span.start < now {
        return Err(EngineError::PastStart);
    }
    Ok(())
}

/// Reject `candidate` if any booking of the room shares an instant with it.
///
/// `exclude` names a booking to skip — the booking being updated must not
/// conflict with its own prior state.
pub(crate) fn check_no_conflict(
    room: &RoomState,
    candidate: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for booking in room.conflicting(candidate) {
        if exclude == Some(booking.id) {
            continue;
        }
        return Err(EngineError::Conflict(booking.id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    fn room_with(spans: &[(Ms, Ms)]) -> (RoomState, Vec<Ulid>) {
        let mut rs = RoomState::new(Ulid::new(), "1".into(), 10_000, 1);
        let mut ids = Vec::new();
        for &(s, e) in spans {
            let id = Ulid::new();
            rs.insert_booking(BookingRecord {
                id,
                client: Ulid::new(),
                span: Span::new(s, e),
            });
            ids.push(id);
        }
        (rs, ids)
    }

    #[test]
    fn conflict_on_equal_span() {
        let (rs, _) = room_with(&[(10 * H, 20 * H)]);
        let result = check_no_conflict(&rs, &Span::new(10 * H, 20 * H), None);
        assert!(matches!(result, Err(EngineError::Conflict(_))));
    }

    #[test]
    fn conflict_when_candidate_contains_existing() {
        let (rs, _) = room_with(&[(10 * H, 20 * H)]);
        let result = check_no_conflict(&rs, &Span::new(5 * H, 25 * H), None);
        assert!(matches!(result, Err(EngineError::Conflict(_))));
    }

    #[test]
    fn conflict_when_existing_contains_candidate() {
        let (rs, _) = room_with(&[(10 * H, 20 * H)]);
        let result = check_no_conflict(&rs, &Span::new(12 * H, 18 * H), None);
        assert!(matches!(result, Err(EngineError::Conflict(_))));
    }

    #[test]
    fn conflict_on_partial_overlap() {
        let (rs, _) = room_with(&[(10 * H, 20 * H)]);
        assert!(check_no_conflict(&rs, &Span::new(5 * H, 15 * H), None).is_err());
        assert!(check_no_conflict(&rs, &Span::new(15 * H, 25 * H), None).is_err());
    }

    #[test]
    fn conflict_on_touching_endpoints() {
        // Closed intervals: ending exactly when another starts IS a conflict.
        let (rs, _) = room_with(&[(10 * H, 20 * H)]);
        assert!(check_no_conflict(&rs, &Span::new(20 * H, 30 * H), None).is_err());
        assert!(check_no_conflict(&rs, &Span::new(0, 10 * H), None).is_err());
    }

    #[test]
    fn no_conflict_when_strictly_disjoint() {
        let (rs, _) = room_with(&[(10 * H, 20 * H)]);
        assert!(check_no_conflict(&rs, &Span::new(0, 10 * H - 1), None).is_ok());
        assert!(check_no_conflict(&rs, &Span::new(20 * H + 1, 30 * H), None).is_ok());
    }

    #[test]
    fn empty_room_never_conflicts() {
        let (rs, _) = room_with(&[]);
        assert!(check_no_conflict(&rs, &Span::new(0, 100 * H), None).is_ok());
    }

    #[test]
    fn exclude_skips_own_prior_state() {
        let (rs, ids) = room_with(&[(10 * H, 20 * H)]);
        // Same span again: conflicts with itself unless excluded.
        assert!(check_no_conflict(&rs, &Span::new(10 * H, 20 * H), Some(ids[0])).is_ok());
        // Shifted but still overlapping its old self: fine once excluded.
        assert!(check_no_conflict(&rs, &Span::new(15 * H, 25 * H), Some(ids[0])).is_ok());
    }

    #[test]
    fn exclude_does_not_skip_other_bookings() {
        let (rs, ids) = room_with(&[(10 * H, 20 * H), (30 * H, 40 * H)]);
        let result = check_no_conflict(&rs, &Span::new(15 * H, 35 * H), Some(ids[0]));
        assert!(matches!(result, Err(EngineError::Conflict(id)) if id == ids[1]));
    }

    #[test]
    fn past_start_rejected() {
        let now = 100 * H;
        assert!(matches!(
            check_future_start(&Span::new(now - 1, now + H), now),
            Err(EngineError::PastStart)
        ));
        assert!(check_future_start(&Span::new(now, now + H), now).is_ok());
        assert!(check_future_start(&Span::new(now + H, now + 2 * H), now).is_ok());
    }

    #[test]
    fn validate_span_bounds() {
        assert!(matches!(
            validate_span(&Span::new(2000, 1000)),
            Err(EngineError::EndBeforeStart)
        ));
        assert!(matches!(
            validate_span(&Span::new(-1, 1000)),
            Err(EngineError::LimitExceeded(_))
        ));
        assert!(matches!(
            validate_span(&Span::new(0, crate::limits::MAX_VALID_TIMESTAMP_MS + 1)),
            Err(EngineError::LimitExceeded(_))
        ));
        // A point booking is a valid closed interval.
        assert!(validate_span(&Span::new(1000, 1000)).is_ok());
    }
}
