//! Handlers for `/loans` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/loans` | Body: `{"borrower_id":…,"title_id":…}` |
//! | `GET`  | `/loans` | Optional `?borrower_id=&title_id=&copy_id=&status=&limit=&offset=` |
//! | `GET`  | `/loans/{id}` | Derived status and the fine owed today |
//! | `POST` | `/loans/{id}/return` | Returns the closed loan, any fine, and any offer made |
//! | `POST` | `/loans/{id}/renew` | |

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
  circulation::Returned,
  loan::{Loan, LoanQuery, LoanView},
  store::CirculationStore,
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Issue ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IssueBody {
  pub borrower_id: Uuid,
  pub title_id:    Uuid,
}

/// `POST /loans`
pub async fn issue<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Json(body): Json<IssueBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CirculationStore + 'static,
{
  let loan = circ.issue(body.borrower_id, body.title_id).await?;
  Ok((StatusCode::CREATED, Json(loan)))
}

// ─── List / get ───────────────────────────────────────────────────────────────

/// `GET /loans[?borrower_id=…&status=overdue…]`
pub async fn list<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Query(query): Query<LoanQuery>,
) -> Result<Json<Vec<LoanView>>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.loans(query).await?))
}

/// `GET /loans/{id}`
pub async fn get_one<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<LoanView>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.loan(id).await?))
}

// ─── Transitions ──────────────────────────────────────────────────────────────

/// `POST /loans/{id}/return`
pub async fn return_one<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Returned>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.return_loan(id).await?))
}

/// `POST /loans/{id}/renew`
pub async fn renew_one<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Loan>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.renew(id).await?))
}
