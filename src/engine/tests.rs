use std::path::PathBuf;

use super::conflict::now_ms;
use super::*;

const H: Ms = 3_600_000; // 1 hour in ms
const D: Ms = 24 * H; // 1 day in ms

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("roomd_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn test_engine(name: &str) -> Engine {
    Engine::new(test_wal_path(name)).unwrap()
}

async fn seed_user(engine: &Engine) -> Ulid {
    let id = Ulid::new();
    engine
        .register_user(id, format!("user_{id}"), "00$11".into(), false)
        .await
        .unwrap();
    id
}

async fn seed_room(engine: &Engine, number: &str, cost: Cents, beds: u32) -> Ulid {
    let id = Ulid::new();
    engine
        .create_room(id, number.into(), cost, beds)
        .await
        .unwrap();
    id
}

// ── Rooms ────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_room() {
    let engine = test_engine("create_room.wal");
    let id = seed_room(&engine, "111", 10_000, 1).await;

    let info = engine.get_room_info(&id).await.unwrap();
    assert_eq!(info.number, "111");
    assert_eq!(info.cost_per_day, 10_000);
    assert_eq!(info.beds, 1);
}

#[tokio::test]
async fn room_number_must_be_unique() {
    let engine = test_engine("room_unique.wal");
    seed_room(&engine, "111", 10_000, 1).await;

    let result = engine.create_room(Ulid::new(), "111".into(), 20_000, 2).await;
    assert!(matches!(result, Err(EngineError::DuplicateNumber(_))));
}

#[tokio::test]
async fn room_field_validation() {
    let engine = test_engine("room_fields.wal");
    assert!(matches!(
        engine.create_room(Ulid::new(), "".into(), 10_000, 1).await,
        Err(EngineError::InvalidField(_))
    ));
    assert!(matches!(
        engine.create_room(Ulid::new(), "1".into(), -1, 1).await,
        Err(EngineError::InvalidField(_))
    ));
    assert!(matches!(
        engine.create_room(Ulid::new(), "1".into(), 10_000, 0).await,
        Err(EngineError::InvalidField(_))
    ));
    assert!(matches!(
        engine
            .create_room(Ulid::new(), "1".into(), crate::limits::MAX_COST_CENTS + 1, 1)
            .await,
        Err(EngineError::LimitExceeded(_))
    ));
}

#[tokio::test]
async fn update_room_changes_fields_and_number_index() {
    let engine = test_engine("room_update.wal");
    let id = seed_room(&engine, "111", 10_000, 1).await;

    engine.update_room(id, "222".into(), 20_000, 2).await.unwrap();
    let info = engine.get_room_info(&id).await.unwrap();
    assert_eq!(info.number, "222");
    assert_eq!(info.beds, 2);

    // Old number is free again, new one is taken.
    seed_room(&engine, "111", 5_000, 1).await;
    let result = engine.create_room(Ulid::new(), "222".into(), 5_000, 1).await;
    assert!(matches!(result, Err(EngineError::DuplicateNumber(_))));
}

#[tokio::test]
async fn update_room_keeps_own_number() {
    let engine = test_engine("room_update_same.wal");
    let id = seed_room(&engine, "111", 10_000, 1).await;
    // Re-using its own number is not a duplicate.
    engine.update_room(id, "111".into(), 15_000, 1).await.unwrap();
}

#[tokio::test]
async fn delete_room_cascades_to_bookings() {
    let engine = test_engine("room_cascade.wal");
    let client = seed_user(&engine).await;
    let room = seed_room(&engine, "111", 10_000, 1).await;

    let now = now_ms();
    let booking = Ulid::new();
    engine
        .create_booking(booking, room, client, Span::new(now + D, now + 2 * D))
        .await
        .unwrap();

    engine.delete_room(room).await.unwrap();
    assert!(engine.get_room_info(&room).await.is_none());
    assert!(engine.get_booking(&booking).await.is_none());
    assert!(engine.list_bookings(None).await.is_empty());
}

// ── Bookings ─────────────────────────────────────────────

#[tokio::test]
async fn create_booking_and_read_back() {
    let engine = test_engine("booking_create.wal");
    let client = seed_user(&engine).await;
    let room = seed_room(&engine, "111", 10_000, 1).await;

    let now = now_ms();
    let id = Ulid::new();
    engine
        .create_booking(id, room, client, Span::new(now + D, now + 2 * D))
        .await
        .unwrap();

    let info = engine.get_booking(&id).await.unwrap();
    assert_eq!(info.room_id, room);
    assert_eq!(info.client, client);
}

#[tokio::test]
async fn overlapping_booking_rejected() {
    let engine = test_engine("booking_overlap.wal");
    let client = seed_user(&engine).await;
    let room = seed_room(&engine, "111", 10_000, 1).await;

    let now = now_ms();
    engine
        .create_booking(Ulid::new(), room, client, Span::new(now + 10 * D, now + 20 * D))
        .await
        .unwrap();

    // Contained, containing, partial, equal and touching all conflict.
    for (start, end) in [
        (now + 12 * D, now + 15 * D),
        (now + 5 * D, now + 25 * D),
        (now + 15 * D, now + 25 * D),
        (now + 10 * D, now + 20 * D),
        (now + 20 * D, now + 30 * D),
        (now + 5 * D, now + 10 * D),
    ] {
        let result = engine
            .create_booking(Ulid::new(), room, client, Span::new(start, end))
            .await;
        assert!(
            matches!(result, Err(EngineError::Conflict(_))),
            "[{start}, {end}] should conflict"
        );
    }

    // Strictly disjoint is fine.
    engine
        .create_booking(
            Ulid::new(),
            room,
            client,
            Span::new(now + 20 * D + 1, now + 30 * D),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn same_window_free_in_other_room() {
    let engine = test_engine("booking_other_room.wal");
    let client = seed_user(&engine).await;
    let room_1 = seed_room(&engine, "111", 10_000, 1).await;
    let room_2 = seed_room(&engine, "222", 20_000, 2).await;

    let now = now_ms();
    let span = Span::new(now + D, now + 2 * D);
    engine.create_booking(Ulid::new(), room_1, client, span).await.unwrap();
    engine.create_booking(Ulid::new(), room_2, client, span).await.unwrap();
}

#[tokio::test]
async fn past_start_rejected_on_create() {
    let engine = test_engine("booking_past.wal");
    let client = seed_user(&engine).await;
    let room = seed_room(&engine, "111", 10_000, 1).await;

    let now = now_ms();
    let result = engine
        .create_booking(Ulid::new(), room, client, Span::new(now - D, now + D))
        .await;
    assert!(matches!(result, Err(EngineError::PastStart)));
}

#[tokio::test]
async fn booking_requires_existing_room_and_client() {
    let engine = test_engine("booking_refs.wal");
    let client = seed_user(&engine).await;
    let room = seed_room(&engine, "111", 10_000, 1).await;

    let now = now_ms();
    let span = Span::new(now + D, now + 2 * D);
    assert!(matches!(
        engine.create_booking(Ulid::new(), Ulid::new(), client, span).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        engine.create_booking(Ulid::new(), room, Ulid::new(), span).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn update_excludes_own_prior_state() {
    let engine = test_engine("booking_update_self.wal");
    let client = seed_user(&engine).await;
    let room = seed_room(&engine, "111", 10_000, 1).await;

    let now = now_ms();
    let id = Ulid::new();
    engine
        .create_booking(id, room, client, Span::new(now + 10 * D, now + 20 * D))
        .await
        .unwrap();

    // Unchanged times: would conflict with itself under a literal re-check.
    engine
        .update_booking(id, room, client, Span::new(now + 10 * D, now + 20 * D))
        .await
        .unwrap();

    // Shifted but overlapping its old self.
    engine
        .update_booking(id, room, client, Span::new(now + 15 * D, now + 25 * D))
        .await
        .unwrap();

    let info = engine.get_booking(&id).await.unwrap();
    assert_eq!(info.start, now + 15 * D);
    assert_eq!(info.end, now + 25 * D);
}

#[tokio::test]
async fn update_still_conflicts_with_others() {
    let engine = test_engine("booking_update_other.wal");
    let client = seed_user(&engine).await;
    let room = seed_room(&engine, "111", 10_000, 1).await;

    let now = now_ms();
    let id = Ulid::new();
    engine
        .create_booking(id, room, client, Span::new(now + 10 * D, now + 20 * D))
        .await
        .unwrap();
    engine
        .create_booking(Ulid::new(), room, client, Span::new(now + 30 * D, now + 40 * D))
        .await
        .unwrap();

    let result = engine
        .update_booking(id, room, client, Span::new(now + 15 * D, now + 35 * D))
        .await;
    assert!(matches!(result, Err(EngineError::Conflict(_))));
}

#[tokio::test]
async fn update_moves_booking_between_rooms() {
    let engine = test_engine("booking_move.wal");
    let client = seed_user(&engine).await;
    let room_1 = seed_room(&engine, "111", 10_000, 1).await;
    let room_2 = seed_room(&engine, "222", 20_000, 2).await;

    let now = now_ms();
    let id = Ulid::new();
    let span = Span::new(now + 10 * D, now + 20 * D);
    engine.create_booking(id, room_1, client, span).await.unwrap();

    engine.update_booking(id, room_2, client, span).await.unwrap();

    let info = engine.get_booking(&id).await.unwrap();
    assert_eq!(info.room_id, room_2);
    // The old room is free again.
    engine
        .create_booking(Ulid::new(), room_1, client, span)
        .await
        .unwrap();
}

#[tokio::test]
async fn update_into_occupied_room_rejected() {
    let engine = test_engine("booking_move_conflict.wal");
    let client = seed_user(&engine).await;
    let room_1 = seed_room(&engine, "111", 10_000, 1).await;
    let room_2 = seed_room(&engine, "222", 20_000, 2).await;

    let now = now_ms();
    let id = Ulid::new();
    let span = Span::new(now + 10 * D, now + 20 * D);
    engine.create_booking(id, room_1, client, span).await.unwrap();
    engine
        .create_booking(Ulid::new(), room_2, client, Span::new(now + 15 * D, now + 25 * D))
        .await
        .unwrap();

    let result = engine.update_booking(id, room_2, client, span).await;
    assert!(matches!(result, Err(EngineError::Conflict(_))));
    // The booking stayed where it was.
    assert_eq!(engine.get_booking(&id).await.unwrap().room_id, room_1);
}

#[tokio::test]
async fn cancel_booking_frees_the_window() {
    let engine = test_engine("booking_cancel.wal");
    let client = seed_user(&engine).await;
    let room = seed_room(&engine, "111", 10_000, 1).await;

    let now = now_ms();
    let id = Ulid::new();
    let span = Span::new(now + D, now + 2 * D);
    engine.create_booking(id, room, client, span).await.unwrap();

    let freed_room = engine.cancel_booking(id).await.unwrap();
    assert_eq!(freed_room, room);
    assert!(engine.get_booking(&id).await.is_none());

    engine.create_booking(Ulid::new(), room, client, span).await.unwrap();
}

#[tokio::test]
async fn pairwise_non_overlap_invariant_holds() {
    let engine = test_engine("booking_invariant.wal");
    let client = seed_user(&engine).await;
    let room = seed_room(&engine, "111", 10_000, 1).await;

    let now = now_ms();
    // Mix of accepted and rejected candidates.
    for (start, end) in [
        (now + D, now + 3 * D),
        (now + 2 * D, now + 4 * D), // rejected
        (now + 5 * D, now + 7 * D),
        (now + 7 * D, now + 9 * D), // rejected (touching)
        (now + 8 * D, now + 10 * D),
    ] {
        let _ = engine
            .create_booking(Ulid::new(), room, client, Span::new(start, end))
            .await;
    }

    let bookings = engine.list_bookings(None).await;
    for (i, a) in bookings.iter().enumerate() {
        for b in bookings.iter().skip(i + 1) {
            let sa = Span::new(a.start, a.end);
            let sb = Span::new(b.start, b.end);
            assert!(!sa.conflicts(&sb), "stored bookings overlap: {sa:?} {sb:?}");
        }
    }
}

// ── Listing and filtering ────────────────────────────────

#[tokio::test]
async fn list_bookings_scoped_by_client() {
    let engine = test_engine("booking_scope.wal");
    let user_1 = seed_user(&engine).await;
    let user_2 = seed_user(&engine).await;
    let room_1 = seed_room(&engine, "111", 10_000, 1).await;
    let room_2 = seed_room(&engine, "222", 20_000, 2).await;

    let now = now_ms();
    engine
        .create_booking(Ulid::new(), room_1, user_1, Span::new(now + D, now + 2 * D))
        .await
        .unwrap();
    engine
        .create_booking(Ulid::new(), room_2, user_2, Span::new(now + D, now + 2 * D))
        .await
        .unwrap();

    let own = engine.list_bookings(Some(user_1)).await;
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].client, user_1);

    let all = engine.list_bookings(None).await;
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn available_rooms_excludes_conflicted() {
    let engine = test_engine("availability.wal");
    let client = seed_user(&engine).await;
    let room_1 = seed_room(&engine, "111", 10_000, 1).await;
    let room_2 = seed_room(&engine, "222", 20_000, 2).await;

    let now = now_ms();
    engine
        .create_booking(Ulid::new(), room_1, client, Span::new(now + 10 * D, now + 20 * D))
        .await
        .unwrap();

    let busy = RoomQuery {
        window: Some(Span::new(now + 12 * D, now + 14 * D)),
        ..RoomQuery::default()
    };
    let free: Vec<Ulid> = engine.list_rooms(&busy).await.iter().map(|r| r.id).collect();
    assert_eq!(free, vec![room_2]);

    let disjoint = RoomQuery {
        window: Some(Span::new(now + 30 * D, now + 40 * D)),
        ..RoomQuery::default()
    };
    assert_eq!(engine.list_rooms(&disjoint).await.len(), 2);

    // No window: both listed regardless of bookings.
    assert_eq!(engine.list_rooms(&RoomQuery::default()).await.len(), 2);
}

#[tokio::test]
async fn list_rooms_filters_and_orders() {
    let engine = test_engine("room_filters.wal");
    seed_room(&engine, "a", 30_000, 1).await;
    seed_room(&engine, "b", 10_000, 2).await;
    seed_room(&engine, "c", 20_000, 2).await;

    let two_beds = RoomQuery {
        beds: Some(2),
        ..RoomQuery::default()
    };
    assert_eq!(engine.list_rooms(&two_beds).await.len(), 2);

    let exact_cost = RoomQuery {
        cost_per_day: Some(20_000),
        ..RoomQuery::default()
    };
    let rooms = engine.list_rooms(&exact_cost).await;
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].number, "c");

    let by_cost_desc = RoomQuery {
        ordering: vec![RoomOrdering::CostPerDayDesc],
        ..RoomQuery::default()
    };
    let numbers: Vec<String> = engine
        .list_rooms(&by_cost_desc)
        .await
        .into_iter()
        .map(|r| r.number)
        .collect();
    assert_eq!(numbers, vec!["a", "c", "b"]);
}

// ── Users ────────────────────────────────────────────────

#[tokio::test]
async fn usernames_are_unique() {
    let engine = test_engine("user_unique.wal");
    engine
        .register_user(Ulid::new(), "guest".into(), "00$11".into(), false)
        .await
        .unwrap();
    let result = engine
        .register_user(Ulid::new(), "guest".into(), "00$22".into(), false)
        .await;
    assert!(matches!(result, Err(EngineError::DuplicateUsername(_))));
}

#[tokio::test]
async fn rename_user_updates_index() {
    let engine = test_engine("user_rename.wal");
    let id = Ulid::new();
    engine
        .register_user(id, "guest".into(), "00$11".into(), false)
        .await
        .unwrap();

    engine.rename_user(id, "regular".into()).await.unwrap();
    assert!(engine.find_user("guest").is_none());
    assert_eq!(engine.find_user("regular").unwrap().id, id);

    // Renaming to its own name is fine; to a taken one is not.
    engine.rename_user(id, "regular".into()).await.unwrap();
    engine
        .register_user(Ulid::new(), "other".into(), "00$33".into(), false)
        .await
        .unwrap();
    assert!(matches!(
        engine.rename_user(id, "other".into()).await,
        Err(EngineError::DuplicateUsername(_))
    ));
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn replay_restores_full_state() {
    let path = test_wal_path("replay_state.wal");

    let (room_1, room_2, booking, user);
    {
        let engine = Engine::new(path.clone()).unwrap();
        user = Ulid::new();
        engine
            .register_user(user, "guest".into(), "00$11".into(), false)
            .await
            .unwrap();
        room_1 = Ulid::new();
        engine.create_room(room_1, "111".into(), 10_000, 1).await.unwrap();
        room_2 = Ulid::new();
        engine.create_room(room_2, "222".into(), 20_000, 2).await.unwrap();

        let now = now_ms();
        booking = Ulid::new();
        engine
            .create_booking(booking, room_1, user, Span::new(now + D, now + 2 * D))
            .await
            .unwrap();
        engine.update_booking(booking, room_2, user, Span::new(now + D, now + 2 * D)).await.unwrap();
        engine.delete_room(room_1).await.unwrap();
    }

    let engine = Engine::new(path).unwrap();
    assert!(engine.get_room_info(&room_1).await.is_none());
    let info = engine.get_booking(&booking).await.unwrap();
    assert_eq!(info.room_id, room_2);
    assert_eq!(engine.find_user("guest").unwrap().id, user);

    // The replayed number index still enforces uniqueness.
    let result = engine.create_room(Ulid::new(), "222".into(), 5_000, 1).await;
    assert!(matches!(result, Err(EngineError::DuplicateNumber(_))));
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compact_state.wal");

    let engine = Engine::new(path.clone()).unwrap();
    let client = seed_user(&engine).await;
    let room = seed_room(&engine, "111", 10_000, 1).await;

    let now = now_ms();
    // Churn: repeated create/cancel pairs plus one surviving booking.
    for _ in 0..10 {
        let id = Ulid::new();
        engine
            .create_booking(id, room, client, Span::new(now + D, now + 2 * D))
            .await
            .unwrap();
        engine.cancel_booking(id).await.unwrap();
    }
    let keeper = Ulid::new();
    engine
        .create_booking(keeper, room, client, Span::new(now + 5 * D, now + 6 * D))
        .await
        .unwrap();

    engine.compact_wal().await.unwrap();
    assert_eq!(engine.wal_appends_since_compact().await, 0);

    let reopened = Engine::new(path).unwrap();
    let info = reopened.get_booking(&keeper).await.unwrap();
    assert_eq!(info.room_id, room);
    assert_eq!(reopened.list_bookings(None).await.len(), 1);
    assert!(reopened.find_user(&format!("user_{client}")).is_some());
}
