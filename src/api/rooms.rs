use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

use crate::access::ensure_room_write;
use crate::engine::{RoomOrdering, RoomQuery};
use crate::model::{format_cents, parse_cents, Cents, RoomInfo, Span};
use crate::timefmt;

use super::{principal, ApiError, AppState};

/// An unparsable id behaves like an unknown one.
pub(super) fn parse_id(raw: &str) -> Result<Ulid, ApiError> {
    Ulid::from_string(raw).map_err(|_| ApiError::NotFound)
}

/// `cost_per_day` is accepted as a 2-decimal string or a JSON number.
fn cents_field(field: &str, value: &Value) -> Result<Cents, ApiError> {
    let parsed = match value {
        Value::String(s) => parse_cents(s),
        Value::Number(n) => parse_cents(&n.to_string()),
        _ => None,
    };
    parsed.ok_or_else(|| ApiError::Validation(format!("{field}: a valid number is required.")))
}

#[derive(Serialize)]
pub(super) struct RoomResponse {
    id: String,
    number: String,
    cost_per_day: String,
    beds: u32,
}

impl From<RoomInfo> for RoomResponse {
    fn from(info: RoomInfo) -> Self {
        Self {
            id: info.id.to_string(),
            number: info.number,
            cost_per_day: format_cents(info.cost_per_day),
            beds: info.beds,
        }
    }
}

// ── Listing with filters ─────────────────────────────────

#[derive(Deserialize, Default)]
pub(super) struct RoomListParams {
    beds: Option<String>,
    cost_per_day: Option<String>,
    available_rooms: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    ordering: Option<String>,
}

fn parse_window_value(field: &str, value: &str) -> Result<i64, ApiError> {
    timefmt::parse_filter(value).ok_or_else(|| {
        ApiError::Validation(format!(
            "{field}: datetime must be in the format YY-MM-DD_hh:mm:ss."
        ))
    })
}

/// Malformed filter values fail loudly; they are never silently ignored.
fn parse_query(params: &RoomListParams) -> Result<RoomQuery, ApiError> {
    let beds = match &params.beds {
        Some(raw) => Some(
            raw.parse::<u32>()
                .map_err(|_| ApiError::Validation("beds: a valid integer is required.".into()))?,
        ),
        None => None,
    };

    let cost_per_day = match &params.cost_per_day {
        Some(raw) => Some(parse_cents(raw).ok_or_else(|| {
            ApiError::Validation("cost_per_day: a valid number is required.".into())
        })?),
        None => None,
    };

    // Either a single comma-separated pair or the start_time/end_time pair.
    let window = if let Some(pair) = &params.available_rooms {
        let (start, end) = pair.split_once(',').ok_or_else(|| {
            ApiError::Validation("available_rooms: expected 'start,end'.".into())
        })?;
        Some(Span::new(
            parse_window_value("available_rooms", start)?,
            parse_window_value("available_rooms", end)?,
        ))
    } else {
        match (&params.start_time, &params.end_time) {
            (Some(start), Some(end)) => Some(Span::new(
                parse_window_value("start_time", start)?,
                parse_window_value("end_time", end)?,
            )),
            (None, None) => None,
            _ => {
                return Err(ApiError::Validation(
                    "start_time and end_time must be provided together.".into(),
                ))
            }
        }
    };
    if let Some(window) = &window {
        if window.end < window.start {
            return Err(ApiError::Validation(
                "end_time must not be before start_time.".into(),
            ));
        }
        if window.duration_ms() > crate::limits::MAX_QUERY_WINDOW_MS {
            return Err(ApiError::Validation("query window too wide.".into()));
        }
    }

    // Unknown ordering keys are ignored, matching the original filter.
    let ordering = params
        .ordering
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|token| RoomOrdering::parse(token.trim()))
        .collect();

    Ok(RoomQuery {
        beds,
        cost_per_day,
        window,
        ordering,
    })
}

pub(super) async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RoomListParams>,
) -> Result<Json<Vec<RoomResponse>>, ApiError> {
    // Reads are open to anyone, but a presented token must still be valid.
    principal(&state, &headers)?;
    let query = parse_query(&params)?;
    let rooms = state.engine.list_rooms(&query).await;
    Ok(Json(rooms.into_iter().map(RoomResponse::from).collect()))
}

pub(super) async fn detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<RoomResponse>, ApiError> {
    principal(&state, &headers)?;
    let id = parse_id(&id)?;
    let info = state.engine.get_room_info(&id).await.ok_or(ApiError::NotFound)?;
    Ok(Json(info.into()))
}

// ── Writes (superuser only) ──────────────────────────────

#[derive(Deserialize)]
pub(super) struct RoomWrite {
    number: Option<String>,
    cost_per_day: Option<Value>,
    beds: Option<u32>,
}

impl RoomWrite {
    fn number(&self) -> Result<String, ApiError> {
        self.number
            .clone()
            .ok_or_else(|| ApiError::Validation("number: this field is required.".into()))
    }

    fn cost_per_day(&self) -> Result<Cents, ApiError> {
        let value = self
            .cost_per_day
            .as_ref()
            .ok_or_else(|| ApiError::Validation("cost_per_day: this field is required.".into()))?;
        cents_field("cost_per_day", value)
    }

    fn beds(&self) -> Result<u32, ApiError> {
        self.beds
            .ok_or_else(|| ApiError::Validation("beds: this field is required.".into()))
    }
}

pub(super) async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RoomWrite>,
) -> Result<(StatusCode, Json<RoomResponse>), ApiError> {
    let p = principal(&state, &headers)?;
    ensure_room_write(p.as_ref())?;

    let id = Ulid::new();
    state
        .engine
        .create_room(id, req.number()?, req.cost_per_day()?, req.beds()?)
        .await?;
    let info = state.engine.get_room_info(&id).await.ok_or(ApiError::NotFound)?;
    Ok((StatusCode::CREATED, Json(info.into())))
}

pub(super) async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RoomWrite>,
) -> Result<Json<RoomResponse>, ApiError> {
    let p = principal(&state, &headers)?;
    ensure_room_write(p.as_ref())?;

    let id = parse_id(&id)?;
    state
        .engine
        .update_room(id, req.number()?, req.cost_per_day()?, req.beds()?)
        .await?;
    let info = state.engine.get_room_info(&id).await.ok_or(ApiError::NotFound)?;
    Ok(Json(info.into()))
}

pub(super) async fn patch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RoomWrite>,
) -> Result<Json<RoomResponse>, ApiError> {
    let p = principal(&state, &headers)?;
    ensure_room_write(p.as_ref())?;

    let id = parse_id(&id)?;
    let current = state.engine.get_room_info(&id).await.ok_or(ApiError::NotFound)?;

    let number = req.number.clone().unwrap_or(current.number);
    let cost_per_day = match &req.cost_per_day {
        Some(value) => cents_field("cost_per_day", value)?,
        None => current.cost_per_day,
    };
    let beds = req.beds.unwrap_or(current.beds);

    state.engine.update_room(id, number, cost_per_day, beds).await?;
    let info = state.engine.get_room_info(&id).await.ok_or(ApiError::NotFound)?;
    Ok(Json(info.into()))
}

pub(super) async fn destroy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let p = principal(&state, &headers)?;
    ensure_room_write(p.as_ref())?;

    let id = parse_id(&id)?;
    state.engine.delete_room(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
