//! Async HTTP client wrapping the Stacks JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use stacks_core::{
  circulation::{Cancelled, Fulfilled, Returned},
  fine::Fine,
  loan::{Loan, LoanView},
  reservation::ReservationView,
};
use uuid::Uuid;

/// Connection settings for the Stacks API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  pub username: String,
  pub password: String,
}

/// The error body every failed API call carries.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
  pub error: String,
  pub kind:  String,
}

/// Async HTTP client for the Stacks JSON REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    if self.config.username.is_empty() {
      req
    } else {
      req.basic_auth(&self.config.username, Some(&self.config.password))
    }
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    self.auth(self.client.request(method, self.url(path)))
  }

  async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
    let resp = req.send().await.with_context(|| format!("{what} failed"))?;
    decode(resp, what).await
  }

  async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
    let what = format!("POST {path}");
    self.send(self.request(Method::POST, path).json(body), &what).await
  }

  // ── Loans ─────────────────────────────────────────────────────────────────

  /// `POST /api/loans`
  pub async fn issue(&self, borrower_id: Uuid, title_id: Uuid) -> Result<Loan> {
    self
      .post("/loans", &json!({ "borrower_id": borrower_id, "title_id": title_id }))
      .await
  }

  /// `POST /api/loans/{id}/return`
  pub async fn return_loan(&self, loan_id: Uuid) -> Result<Returned> {
    self.post(&format!("/loans/{loan_id}/return"), &json!({})).await
  }

  /// `POST /api/loans/{id}/renew`
  pub async fn renew(&self, loan_id: Uuid) -> Result<Loan> {
    self.post(&format!("/loans/{loan_id}/renew"), &json!({})).await
  }

  /// `GET /api/loans?status=overdue[&borrower_id=<id>]`
  pub async fn overdue(&self, borrower_id: Option<Uuid>) -> Result<Vec<LoanView>> {
    let mut query = vec![("status", "overdue".to_string())];
    query.extend(borrower_id.map(|id| ("borrower_id", id.to_string())));
    let req = self.request(Method::GET, "/loans").query(&query);
    self.send(req, "GET /loans").await
  }

  // ── Reservations ──────────────────────────────────────────────────────────

  /// `POST /api/reservations`
  pub async fn reserve(&self, borrower_id: Uuid, title_id: Uuid) -> Result<ReservationView> {
    self
      .post("/reservations", &json!({ "borrower_id": borrower_id, "title_id": title_id }))
      .await
  }

  /// `POST /api/reservations/{id}/fulfill`
  pub async fn fulfill(&self, reservation_id: Uuid) -> Result<Fulfilled> {
    self
      .post(&format!("/reservations/{reservation_id}/fulfill"), &json!({}))
      .await
  }

  /// `DELETE /api/reservations/{id}`
  pub async fn cancel(&self, reservation_id: Uuid, reason: Option<String>) -> Result<Cancelled> {
    let path = format!("/reservations/{reservation_id}");
    let req = self
      .request(Method::DELETE, &path)
      .json(&json!({ "reason": reason }));
    self.send(req, &format!("DELETE {path}")).await
  }

  /// `POST /api/reservations/sweep`
  pub async fn sweep(&self) -> Result<Vec<Cancelled>> {
    self.post("/reservations/sweep", &json!({})).await
  }

  // ── Fines ─────────────────────────────────────────────────────────────────

  /// `POST /api/fines/{id}/pay`
  pub async fn pay(&self, fine_id: Uuid) -> Result<Fine> {
    self.post(&format!("/fines/{fine_id}/pay"), &json!({})).await
  }

  /// `GET /api/fines?status=pending[&borrower_id=<id>]`
  pub async fn pending_fines(&self, borrower_id: Option<Uuid>) -> Result<Vec<Fine>> {
    let mut query = vec![("status", "pending".to_string())];
    query.extend(borrower_id.map(|id| ("borrower_id", id.to_string())));
    let req = self.request(Method::GET, "/fines").query(&query);
    self.send(req, "GET /fines").await
  }
}

/// Turn a response into `T`, or into an error carrying the server's message.
async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
  let status = resp.status();
  if status.is_success() {
    return resp.json().await.with_context(|| format!("deserialising {what} response"));
  }
  let text = resp.text().await.unwrap_or_default();
  Err(describe_failure(what, status.as_u16(), &text))
}

fn describe_failure(what: &str, status: u16, body: &str) -> anyhow::Error {
  match serde_json::from_str::<ErrorBody>(body) {
    Ok(err) => anyhow!("{what} → {status} ({}): {}", err.kind, err.error),
    Err(_) if body.is_empty() => anyhow!("{what} → {status}"),
    Err(_) => anyhow!("{what} → {status}: {body}"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(base: &str) -> ApiClient {
    ApiClient::new(ApiConfig {
      base_url: base.to_string(),
      username: String::new(),
      password: String::new(),
    })
    .unwrap()
  }

  #[test]
  fn urls_are_rooted_under_api() {
    assert_eq!(client("http://lib:8080/").url("/loans"), "http://lib:8080/api/loans");
    assert_eq!(client("http://lib:8080").url("/fines/x/pay"), "http://lib:8080/api/fines/x/pay");
  }

  #[test]
  fn failures_surface_the_server_message() {
    let body = r#"{"error":"loan 1 has reached the renewal limit of 2","kind":"limit_exceeded"}"#;
    let err = describe_failure("POST /loans/1/renew", 422, body).to_string();
    assert!(err.contains("limit_exceeded"));
    assert!(err.contains("renewal limit"));

    let err = describe_failure("GET /loans", 502, "").to_string();
    assert_eq!(err, "GET /loans → 502");
  }
}
