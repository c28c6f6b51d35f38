//! Handlers for copy and borrower administration.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/copies` | Optional `?title_id=` |
//! | `POST` | `/copies` | Body: `{"title_id":…,"accession_code":"…"}`; may offer to a waiting reservation |
//! | `GET`  | `/copies/{id}` | |
//! | `GET`  | `/borrowers` | |
//! | `POST` | `/borrowers` | Body: `{"borrower_id":…,"role":"student"}` |
//! | `GET`  | `/borrowers/{id}` | |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use stacks_core::{
  Circulation,
  borrower::{Borrower, Role},
  copy::{Copy, NewCopy},
  store::CirculationStore,
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Copies ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CopyParams {
  pub title_id: Option<Uuid>,
}

/// `GET /copies[?title_id=…]`
pub async fn list_copies<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Query(params): Query<CopyParams>,
) -> Result<Json<Vec<Copy>>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.copies(params.title_id).await?))
}

/// `POST /copies`
pub async fn register_copy<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Json(body): Json<NewCopy>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CirculationStore + 'static,
{
  let registered = circ.register_copy(body).await?;
  Ok((StatusCode::CREATED, Json(registered)))
}

/// `GET /copies/{id}`
pub async fn get_copy<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Copy>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.copy(id).await?))
}

// ─── Borrowers ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub borrower_id: Uuid,
  pub role:        Role,
}

/// `GET /borrowers`
pub async fn list_borrowers<S>(
  State(circ): State<Arc<Circulation<S>>>,
) -> Result<Json<Vec<Borrower>>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.borrowers().await?))
}

/// `POST /borrowers`
pub async fn register_borrower<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CirculationStore + 'static,
{
  let borrower = circ.register_borrower(body.borrower_id, body.role).await?;
  Ok((StatusCode::CREATED, Json(borrower)))
}

/// `GET /borrowers/{id}`
pub async fn get_borrower<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Borrower>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.borrower(id).await?))
}
