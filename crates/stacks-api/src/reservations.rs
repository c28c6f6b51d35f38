//! Handlers for `/reservations` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/reservations` | Body: `{"borrower_id":…,"title_id":…}` |
//! | `GET`    | `/reservations` | Optional `?title_id=&borrower_id=&status=` |
//! | `GET`    | `/reservations/{id}` | Carries the queue position while waiting |
//! | `POST`   | `/reservations/{id}/fulfill` | Only for an offered, unexpired reservation |
//! | `DELETE` | `/reservations/{id}` | Optional body: `{"reason":"…"}` |
//! | `POST`   | `/reservations/sweep` | Expires lapsed offers now |

use std::sync::Arc;

use axum::{
  Json,
  body::Bytes,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use stacks_core::{
  Circulation,
  circulation::{Cancelled, Fulfilled},
  reservation::{ReservationQuery, ReservationView},
  store::CirculationStore,
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Reserve ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReserveBody {
  pub borrower_id: Uuid,
  pub title_id:    Uuid,
}

/// `POST /reservations`
pub async fn reserve<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Json(body): Json<ReserveBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CirculationStore + 'static,
{
  let view = circ.reserve(body.borrower_id, body.title_id).await?;
  Ok((StatusCode::CREATED, Json(view)))
}

// ─── List / get ───────────────────────────────────────────────────────────────

/// `GET /reservations[?title_id=…]`
pub async fn list<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Query(query): Query<ReservationQuery>,
) -> Result<Json<Vec<ReservationView>>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.reservations(query).await?))
}

/// `GET /reservations/{id}`
pub async fn get_one<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ReservationView>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.reservation(id).await?))
}

// ─── Transitions ──────────────────────────────────────────────────────────────

/// `POST /reservations/{id}/fulfill`
pub async fn fulfill_one<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CirculationStore + 'static,
{
  let fulfilled: Fulfilled = circ.fulfill(id).await?;
  Ok((StatusCode::CREATED, Json(fulfilled)))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
  pub reason: Option<String>,
}

/// `DELETE /reservations/{id}`
///
/// The body is optional; an empty one cancels without a reason.
pub async fn cancel_one<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
  body: Bytes,
) -> Result<Json<Cancelled>, ApiError>
where
  S: CirculationStore + 'static,
{
  let body = if body.iter().all(u8::is_ascii_whitespace) {
    CancelBody::default()
  } else {
    serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
  };
  Ok(Json(circ.cancel(id, body.reason).await?))
}

/// `POST /reservations/sweep`
pub async fn sweep<S>(
  State(circ): State<Arc<Circulation<S>>>,
) -> Result<Json<Vec<Cancelled>>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.sweep().await?))
}
