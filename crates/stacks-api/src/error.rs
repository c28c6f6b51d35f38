//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use stacks_core::ErrorKind;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Circulation(#[from] stacks_core::Error),

  #[error("bad request: {0}")]
  BadRequest(String),
}

impl ApiError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      ApiError::Circulation(e) => e.kind(),
      ApiError::BadRequest(_) => ErrorKind::Invalid,
    }
  }
}

fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::Conflict | ErrorKind::InvalidState => StatusCode::CONFLICT,
    ErrorKind::LimitExceeded => StatusCode::UNPROCESSABLE_ENTITY,
    ErrorKind::Invalid => StatusCode::BAD_REQUEST,
    ErrorKind::Busy => StatusCode::SERVICE_UNAVAILABLE,
    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let kind = self.kind();
    if kind == ErrorKind::Internal {
      tracing::error!(error = %self, "request failed");
    }
    (status_for(kind), Json(json!({ "error": self.to_string(), "kind": kind })))
      .into_response()
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  #[test]
  fn kinds_map_onto_statuses() {
    let cases = [
      (stacks_core::Error::LoanNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
      (stacks_core::Error::ReservationPending(Uuid::nil()), StatusCode::CONFLICT),
      (stacks_core::Error::AlreadyPaid(Uuid::nil()), StatusCode::CONFLICT),
      (
        stacks_core::Error::RenewalLimitExceeded { loan_id: Uuid::nil(), limit: 2 },
        StatusCode::UNPROCESSABLE_ENTITY,
      ),
      (stacks_core::Error::Empty("reason"), StatusCode::BAD_REQUEST),
      (stacks_core::Error::Busy("title".into()), StatusCode::SERVICE_UNAVAILABLE),
    ];
    for (err, status) in cases {
      assert_eq!(ApiError::from(err).into_response().status(), status);
    }
  }

  #[test]
  fn bad_request_is_invalid() {
    let err = ApiError::BadRequest("nope".into());
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
  }
}
