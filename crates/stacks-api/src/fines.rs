//! Handlers for `/fines` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/fines` | Optional `?status=&borrower_id=&loan_id=` |
//! | `POST`   | `/fines` | Manual fine. Body: `{"borrower_id":…,"amount":"5.00","reason":"…"}` |
//! | `GET`    | `/fines/{id}` | |
//! | `PUT`    | `/fines/{id}` | Pending fines only. Body: `{"amount":"…","reason":"…"}` |
//! | `POST`   | `/fines/{id}/pay` | Assigns a receipt code |
//! | `DELETE` | `/fines/{id}` | 204 on success |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use stacks_core::{
  Circulation,
  fine::{Fine, FineQuery},
  store::CirculationStore,
};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /fines[?status=pending…]`
pub async fn list<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Query(query): Query<FineQuery>,
) -> Result<Json<Vec<Fine>>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.fines(query).await?))
}

#[derive(Debug, Deserialize)]
pub struct NewFineBody {
  pub borrower_id: Uuid,
  pub amount:      Decimal,
  pub reason:      String,
}

/// `POST /fines`
pub async fn create<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Json(body): Json<NewFineBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CirculationStore + 'static,
{
  let fine = circ
    .create_fine(body.borrower_id, body.amount, body.reason)
    .await?;
  Ok((StatusCode::CREATED, Json(fine)))
}

/// `GET /fines/{id}`
pub async fn get_one<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Fine>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.fine(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct EditFineBody {
  pub amount: Decimal,
  pub reason: String,
}

/// `PUT /fines/{id}`
pub async fn edit_one<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<EditFineBody>,
) -> Result<Json<Fine>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.edit_fine(id, body.amount, body.reason).await?))
}

/// `POST /fines/{id}/pay`
pub async fn pay_one<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Fine>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.pay_fine(id).await?))
}

/// `DELETE /fines/{id}`
pub async fn delete_one<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: CirculationStore + 'static,
{
  circ.delete_fine(id).await?;
  Ok(StatusCode::NO_CONTENT)
}
