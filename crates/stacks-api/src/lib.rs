//! JSON REST API for Stacks.
//!
//! Exposes an axum [`Router`] over a shared [`Circulation`] service backed by
//! any [`CirculationStore`]. Auth, TLS, and transport concerns are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", stacks_api::api_router(circulation.clone()))
//! ```

pub mod error;
pub mod fines;
pub mod inventory;
pub mod loans;
pub mod policy;
pub mod reservations;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use stacks_core::{Circulation, store::CirculationStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `circulation`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(circulation: Arc<Circulation<S>>) -> Router<()>
where
  S: CirculationStore + 'static,
{
  Router::new()
    // Loans
    .route("/loans", get(loans::list::<S>).post(loans::issue::<S>))
    .route("/loans/{id}", get(loans::get_one::<S>))
    .route("/loans/{id}/return", post(loans::return_one::<S>))
    .route("/loans/{id}/renew", post(loans::renew_one::<S>))
    // Reservations
    .route("/reservations", get(reservations::list::<S>).post(reservations::reserve::<S>))
    .route("/reservations/sweep", post(reservations::sweep::<S>))
    .route(
      "/reservations/{id}",
      get(reservations::get_one::<S>).delete(reservations::cancel_one::<S>),
    )
    .route("/reservations/{id}/fulfill", post(reservations::fulfill_one::<S>))
    // Fines
    .route("/fines", get(fines::list::<S>).post(fines::create::<S>))
    .route(
      "/fines/{id}",
      get(fines::get_one::<S>).put(fines::edit_one::<S>).delete(fines::delete_one::<S>),
    )
    .route("/fines/{id}/pay", post(fines::pay_one::<S>))
    // Policy
    .route("/holidays", get(policy::list_holidays::<S>).post(policy::add_holiday::<S>))
    .route("/holidays/{id}", delete(policy::remove_holiday::<S>))
    .route("/settings", get(policy::get_settings::<S>).post(policy::update_settings::<S>))
    .route("/settings/history", get(policy::settings_history::<S>))
    // Inventory
    .route("/copies", get(inventory::list_copies::<S>).post(inventory::register_copy::<S>))
    .route("/copies/{id}", get(inventory::get_copy::<S>))
    .route(
      "/borrowers",
      get(inventory::list_borrowers::<S>).post(inventory::register_borrower::<S>),
    )
    .route("/borrowers/{id}", get(inventory::get_borrower::<S>))
    .with_state(circulation)
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
  };
  use serde_json::{Value, json};
  use stacks_core::clock::ManualClock;
  use stacks_store_sqlite::SqliteStore;
  use tower::ServiceExt;
  use uuid::Uuid;

  use super::*;

  async fn app() -> (Router, ManualClock) {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let clock = ManualClock::at_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    let circ = Circulation::new(store, Arc::new(clock.clone()), Duration::from_millis(500));
    (api_router(Arc::new(circ)), clock)
  }

  async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = Request::builder().method(method).uri(uri);
    let req = match body {
      Some(b) => req
        .header("content-type", "application/json")
        .body(Body::from(b.to_string()))
        .unwrap(),
      None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  async fn seed(app: &Router, role: &str) -> (Uuid, Uuid) {
    let borrower = Uuid::new_v4();
    let title = Uuid::new_v4();
    let (status, _) = call(
      app,
      Method::POST,
      "/borrowers",
      Some(json!({ "borrower_id": borrower, "role": role })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(
      app,
      Method::POST,
      "/copies",
      Some(json!({ "title_id": title, "accession_code": format!("ACC-{title}") })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    (borrower, title)
  }

  fn id(v: &Value, field: &str) -> String {
    v[field].as_str().unwrap().to_string()
  }

  #[tokio::test]
  async fn issue_and_return_over_http() {
    let (app, _clock) = app().await;
    let (borrower, title) = seed(&app, "student").await;

    let (status, loan) = call(
      &app,
      Method::POST,
      "/loans",
      Some(json!({ "borrower_id": borrower, "title_id": title })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(loan["lifecycle"], "issued");
    assert_eq!(loan["due_date"], "2024-01-15");
    let loan_id = id(&loan, "loan_id");

    let (status, view) = call(&app, Method::GET, &format!("/loans/{loan_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "issued");
    let owed: rust_decimal::Decimal = view["fine_owed"].as_str().unwrap().parse().unwrap();
    assert!(owed.is_zero());

    let (status, returned) =
      call(&app, Method::POST, &format!("/loans/{loan_id}/return"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["loan"]["lifecycle"], "returned");
    assert!(returned["fine"].is_null());
  }

  #[tokio::test]
  async fn errors_carry_kind_and_status() {
    let (app, _clock) = app().await;

    let (status, body) =
      call(&app, Method::GET, &format!("/loans/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
    assert!(body["error"].as_str().unwrap().contains("loan not found"));

    let (borrower, title) = seed(&app, "student").await;
    let (status, body) = call(
      &app,
      Method::POST,
      "/reservations",
      Some(json!({ "borrower_id": borrower, "title_id": title })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
  }

  #[tokio::test]
  async fn reservation_queue_over_http() {
    let (app, _clock) = app().await;
    let (holder, title) = seed(&app, "staff").await;
    let (status, _) = call(
      &app,
      Method::POST,
      "/loans",
      Some(json!({ "borrower_id": holder, "title_id": title })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let mut ids = Vec::new();
    for _ in 0..2 {
      let waiter = Uuid::new_v4();
      call(
        &app,
        Method::POST,
        "/borrowers",
        Some(json!({ "borrower_id": waiter, "role": "student" })),
      )
      .await;
      let (status, view) = call(
        &app,
        Method::POST,
        "/reservations",
        Some(json!({ "borrower_id": waiter, "title_id": title })),
      )
      .await;
      assert_eq!(status, StatusCode::CREATED);
      ids.push(id(&view["reservation"], "reservation_id"));
    }

    let (status, list) =
      call(&app, Method::GET, &format!("/reservations?title_id={title}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let positions: Vec<u64> = list
      .as_array()
      .unwrap()
      .iter()
      .map(|v| v["queue_position"].as_u64().unwrap())
      .collect();
    assert_eq!(positions, vec![1, 2]);

    // Cancelling without a body is allowed; with one the reason is kept.
    let (status, cancelled) =
      call(&app, Method::DELETE, &format!("/reservations/{}", ids[1]), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["reservation"]["status"], "cancelled");

    let (status, cancelled) = call(
      &app,
      Method::DELETE,
      &format!("/reservations/{}", ids[0]),
      Some(json!({ "reason": "changed mind" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["reservation"]["cancel_reason"], "changed mind");

    let (status, swept) = call(&app, Method::POST, "/reservations/sweep", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(swept, json!([]));
  }

  #[tokio::test]
  async fn manual_fines_over_http() {
    let (app, _clock) = app().await;
    let (borrower, _title) = seed(&app, "student").await;

    let (status, fine) = call(
      &app,
      Method::POST,
      "/fines",
      Some(json!({ "borrower_id": borrower, "amount": "5.5", "reason": "lost card" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(fine["amount"], "5.50");
    let fine_id = id(&fine, "fine_id");

    let (status, fine) = call(
      &app,
      Method::PUT,
      &format!("/fines/{fine_id}"),
      Some(json!({ "amount": "7.25", "reason": "lost card, replacement" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fine["amount"], "7.25");

    let (status, fine) = call(&app, Method::POST, &format!("/fines/{fine_id}/pay"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fine["status"], "paid");
    assert!(fine["receipt"].is_string());

    let (status, body) = call(&app, Method::POST, &format!("/fines/{fine_id}/pay"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state");

    let (status, pending) = call(&app, Method::GET, "/fines?status=pending", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending, json!([]));

    let (status, _) = call(&app, Method::DELETE, &format!("/fines/{fine_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
  }

  #[tokio::test]
  async fn settings_and_holidays_over_http() {
    let (app, _clock) = app().await;

    let (status, mut settings) = call(&app, Method::GET, "/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    settings["max_renewal_count"] = json!(5);
    let (status, version) = call(&app, Method::POST, "/settings", Some(settings)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(version["settings"]["max_renewal_count"], 5);

    let (status, history) = call(&app, Method::GET, "/settings/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!history.as_array().unwrap().is_empty());

    let (status, holiday) = call(
      &app,
      Method::POST,
      "/holidays",
      Some(json!({ "name": "Winter break", "date": "2024-12-25", "recurring": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let holiday_id = id(&holiday, "holiday_id");

    let (status, _) = call(&app, Method::DELETE, &format!("/holidays/{holiday_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, holidays) = call(&app, Method::GET, "/holidays", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(holidays, json!([]));
  }
}
