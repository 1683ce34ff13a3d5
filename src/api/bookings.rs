use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::access::{ensure_booking_owner, ensure_booking_update};
use crate::auth::Principal;
use crate::engine::EngineError;
use crate::model::{BookingInfo, Span};
use crate::timefmt;

use super::rooms::parse_id;
use super::{require_principal, ApiError, AppState};

#[derive(Serialize)]
pub(super) struct BookingResponse {
    id: String,
    room: String,
    client: String,
    start_time: String,
    end_time: String,
}

impl From<BookingInfo> for BookingResponse {
    fn from(info: BookingInfo) -> Self {
        Self {
            id: info.id.to_string(),
            room: info.room_id.to_string(),
            client: info.client.to_string(),
            start_time: timefmt::format_wire(info.start),
            end_time: timefmt::format_wire(info.end),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct BookingWrite {
    room: Option<String>,
    client: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
}

/// A related id must name an existing record; both a bad and a missing one
/// are field errors on the write, not a 404 on the endpoint.
fn related_id(field: &str, raw: &str) -> Result<Ulid, ApiError> {
    Ulid::from_string(raw)
        .map_err(|_| ApiError::Validation(format!("{field}: invalid id \"{raw}\".")))
}

fn wire_timestamp(field: &str, raw: &str) -> Result<i64, ApiError> {
    timefmt::parse_wire(raw).ok_or_else(|| {
        ApiError::Validation(format!(
            "{field}: datetime must be in RFC 3339 format (e.g. 2031-05-29T09:10:01Z)."
        ))
    })
}

impl BookingWrite {
    fn room(&self) -> Result<Ulid, ApiError> {
        let raw = self
            .room
            .as_deref()
            .ok_or_else(|| ApiError::Validation("room: this field is required.".into()))?;
        related_id("room", raw)
    }

    /// The client defaults to the requesting principal when omitted.
    fn client(&self, principal: &Principal) -> Result<Ulid, ApiError> {
        match self.client.as_deref() {
            Some(raw) => related_id("client", raw),
            None => Ok(principal.user_id),
        }
    }

    fn span(&self) -> Result<Span, ApiError> {
        let start = self
            .start_time
            .as_deref()
            .ok_or_else(|| ApiError::Validation("start_time: this field is required.".into()))?;
        let end = self
            .end_time
            .as_deref()
            .ok_or_else(|| ApiError::Validation("end_time: this field is required.".into()))?;
        Ok(Span::new(
            wire_timestamp("start_time", start)?,
            wire_timestamp("end_time", end)?,
        ))
    }
}

/// Unknown room/client on a write surfaces as a field error, matching the
/// related-field semantics of the original API.
fn map_write_error(e: EngineError, room: Ulid, client: Ulid) -> ApiError {
    match e {
        EngineError::NotFound(id) if id == room => {
            ApiError::Validation(format!("room: invalid id \"{room}\"."))
        }
        EngineError::NotFound(id) if id == client => {
            ApiError::Validation(format!("client: invalid id \"{client}\"."))
        }
        other => other.into(),
    }
}

pub(super) async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingResponse>>, ApiError> {
    let p = require_principal(&state, &headers)?;
    // Superusers see everything; everyone else only their own bookings.
    let scope = if p.is_superuser { None } else { Some(p.user_id) };
    let bookings = state.engine.list_bookings(scope).await;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

pub(super) async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BookingWrite>,
) -> Result<(StatusCode, Json<BookingResponse>), ApiError> {
    let p = require_principal(&state, &headers)?;

    let room = req.room()?;
    let client = req.client(&p)?;
    let span = req.span()?;

    let id = Ulid::new();
    state
        .engine
        .create_booking(id, room, client, span)
        .await
        .map_err(|e| map_write_error(e, room, client))?;
    let info = state.engine.get_booking(&id).await.ok_or(ApiError::NotFound)?;
    Ok((StatusCode::CREATED, Json(info.into())))
}

pub(super) async fn detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let p = require_principal(&state, &headers)?;
    let id = parse_id(&id)?;
    let info = state.engine.get_booking(&id).await.ok_or(ApiError::NotFound)?;
    ensure_booking_owner(&p, info.client)?;
    Ok(Json(info.into()))
}

pub(super) async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<BookingWrite>,
) -> Result<Json<BookingResponse>, ApiError> {
    let p = require_principal(&state, &headers)?;
    let id = parse_id(&id)?;
    state.engine.get_booking(&id).await.ok_or(ApiError::NotFound)?;
    ensure_booking_update(&p)?;

    let room = req.room()?;
    let client = req.client(&p)?;
    let span = req.span()?;

    state
        .engine
        .update_booking(id, room, client, span)
        .await
        .map_err(|e| map_write_error(e, room, client))?;
    let info = state.engine.get_booking(&id).await.ok_or(ApiError::NotFound)?;
    Ok(Json(info.into()))
}

pub(super) async fn patch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<BookingWrite>,
) -> Result<Json<BookingResponse>, ApiError> {
    let p = require_principal(&state, &headers)?;
    let id = parse_id(&id)?;
    let current = state.engine.get_booking(&id).await.ok_or(ApiError::NotFound)?;
    ensure_booking_update(&p)?;

    // Absent fields keep their current values.
    let room = match req.room.as_deref() {
        Some(raw) => related_id("room", raw)?,
        None => current.room_id,
    };
    let client = match req.client.as_deref() {
        Some(raw) => related_id("client", raw)?,
        None => current.client,
    };
    let start = match req.start_time.as_deref() {
        Some(raw) => wire_timestamp("start_time", raw)?,
        None => current.start,
    };
    let end = match req.end_time.as_deref() {
        Some(raw) => wire_timestamp("end_time", raw)?,
        None => current.end,
    };

    state
        .engine
        .update_booking(id, room, client, Span::new(start, end))
        .await
        .map_err(|e| map_write_error(e, room, client))?;
    let info = state.engine.get_booking(&id).await.ok_or(ApiError::NotFound)?;
    Ok(Json(info.into()))
}

pub(super) async fn destroy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let p = require_principal(&state, &headers)?;
    let id = parse_id(&id)?;
    let info = state.engine.get_booking(&id).await.ok_or(ApiError::NotFound)?;
    ensure_booking_owner(&p, info.client)?;
    state.engine.cancel_booking(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
