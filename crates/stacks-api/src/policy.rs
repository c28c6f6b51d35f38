//! Handlers for `/holidays` and `/settings`.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/holidays` | |
//! | `POST`   | `/holidays` | Body: `{"name":…,"date":"2024-12-25","recurring":true}` |
//! | `DELETE` | `/holidays/{id}` | 204 on success |
//! | `GET`    | `/settings` | The settings in force |
//! | `POST`   | `/settings` | Full replacement; records a new version |
//! | `GET`    | `/settings/history` | Every recorded version, newest first |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use stacks_core::{
  Circulation,
  holiday::{Holiday, NewHoliday},
  settings::{Settings, SettingsVersion},
  store::CirculationStore,
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Holidays ─────────────────────────────────────────────────────────────────

/// `GET /holidays`
pub async fn list_holidays<S>(
  State(circ): State<Arc<Circulation<S>>>,
) -> Result<Json<Vec<Holiday>>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.holidays().await?))
}

/// `POST /holidays`
pub async fn add_holiday<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Json(body): Json<NewHoliday>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CirculationStore + 'static,
{
  let holiday = circ.add_holiday(body).await?;
  Ok((StatusCode::CREATED, Json(holiday)))
}

/// `DELETE /holidays/{id}`
pub async fn remove_holiday<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: CirculationStore + 'static,
{
  circ.remove_holiday(id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Settings ─────────────────────────────────────────────────────────────────

/// `GET /settings`
pub async fn get_settings<S>(
  State(circ): State<Arc<Circulation<S>>>,
) -> Result<Json<Settings>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.settings().await?))
}

/// `POST /settings`
pub async fn update_settings<S>(
  State(circ): State<Arc<Circulation<S>>>,
  Json(body): Json<Settings>,
) -> Result<Json<SettingsVersion>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.update_settings(body).await?))
}

/// `GET /settings/history`
pub async fn settings_history<S>(
  State(circ): State<Arc<Circulation<S>>>,
) -> Result<Json<Vec<SettingsVersion>>, ApiError>
where
  S: CirculationStore + 'static,
{
  Ok(Json(circ.settings_history().await?))
}
