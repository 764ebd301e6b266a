use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, Deserialize)]
pub struct StatusInfo {
    pub authorized: bool,
    pub status_code: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarInfo {
    pub id: String,
    pub title: String,
    pub allows_modifications: bool,
    #[serde(default)]
    pub color_hex: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventInfo {
    pub id: String,
    pub title: String,
    pub start_iso: String,
    pub end_iso: String,
    pub calendar: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Serialize)]
struct AddEventBody<'a> {
    title: &'a str,
    start_iso: String,
    end_iso: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    calendar_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct DeleteResponse {
    deleted: bool,
}

/// HTTP client over the external calendar bridge (`GET /status`,
/// `GET /calendars`, `GET /events`, `POST /add`, `POST /delete`). Every call
/// carries its own timeout, per the fetch/write split in the concurrency
/// model: fetches get the longer of the two budgets, writes the shorter.
pub struct CalendarBridgeClient {
    client: Client,
    base_url: String,
    write_timeout: Duration,
    fetch_timeout: Duration,
}

impl CalendarBridgeClient {
    pub fn new(base_url: impl Into<String>, write_timeout: Duration, fetch_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            write_timeout,
            fetch_timeout,
        }
    }

    pub async fn status(&self) -> Result<StatusInfo, BridgeError> {
        let resp = self.get("/status", self.fetch_timeout).await?;
        resp.json().await.map_err(BridgeError::Request)
    }

    pub async fn calendars(&self) -> Result<Vec<CalendarInfo>, BridgeError> {
        let resp = self.get("/calendars", self.fetch_timeout).await?;
        resp.json().await.map_err(BridgeError::Request)
    }

    /// `days` is clamped to the bridge's documented cap of 365.
    pub async fn events(&self, days: u32, calendar_id: Option<&str>, exclude_holidays: bool) -> Result<Vec<EventInfo>, BridgeError> {
        let days = days.min(365);
        let mut url = format!("{}/events?days={}", self.base_url, days);
        if let Some(id) = calendar_id {
            url.push_str(&format!("&calendar_id={}", urlencoding_lite(id)));
        }
        if exclude_holidays {
            url.push_str("&exclude_holidays=true");
        }

        let t0 = std::time::Instant::now();
        let result = timeout(self.fetch_timeout, self.client.get(&url).send())
            .await
            .map_err(|_| BridgeError::Timeout)
            .and_then(|r| r.map_err(BridgeError::Request));
        let resp = self.log_outcome("GET", "/events", t0, result)?;
        resp.json().await.map_err(BridgeError::Request)
    }

    pub async fn add_event(
        &self,
        title: &str,
        start_iso: String,
        end_iso: String,
        notes: Option<&str>,
        calendar_id: Option<&str>,
    ) -> Result<EventInfo, BridgeError> {
        let body = AddEventBody { title, start_iso, end_iso, notes, calendar_id };
        let url = format!("{}/add", self.base_url);

        let t0 = std::time::Instant::now();
        let result = timeout(self.write_timeout, self.client.post(&url).json(&body).send())
            .await
            .map_err(|_| BridgeError::Timeout)
            .and_then(|r| r.map_err(BridgeError::Request));
        let resp = self.log_outcome("POST", "/add", t0, result)?;
        resp.json().await.map_err(BridgeError::Request)
    }

    /// Returns `true` if the bridge confirmed deletion, `false` if it
    /// reported the event as already gone (404 or `{"deleted": false}`).
    /// Both are treated as success by the caller, not as errors.
    pub async fn delete_event(&self, event_id: &str) -> Result<bool, BridgeError> {
        let url = format!("{}/delete?event_id={}", self.base_url, urlencoding_lite(event_id));

        let t0 = std::time::Instant::now();
        let result = timeout(self.write_timeout, self.client.post(&url).send())
            .await
            .map_err(|_| BridgeError::Timeout)
            .and_then(|r| r.map_err(BridgeError::Request));
        let resp = match result {
            Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                tracing::info!(method = "POST", path = "/delete", status = 404, elapsed_ms = t0.elapsed().as_millis() as u64, "calendar bridge call");
                return Ok(false);
            }
            other => self.log_outcome("POST", "/delete", t0, other)?,
        };
        let parsed: DeleteResponse = resp.json().await.map_err(BridgeError::Request)?;
        Ok(parsed.deleted)
    }

    async fn get(&self, path: &str, to: Duration) -> Result<reqwest::Response, BridgeError> {
        let url = format!("{}{}", self.base_url, path);
        let t0 = std::time::Instant::now();
        let result = timeout(to, self.client.get(&url).send())
            .await
            .map_err(|_| BridgeError::Timeout)
            .and_then(|r| r.map_err(BridgeError::Request));
        self.log_outcome("GET", path, t0, result)
    }

    /// Logs method, path, outcome and latency for one outbound call, then
    /// applies the shared status-code classification.
    fn log_outcome(&self, method: &str, path: &str, t0: std::time::Instant, result: Result<reqwest::Response, BridgeError>) -> Result<reqwest::Response, BridgeError> {
        let elapsed_ms = t0.elapsed().as_millis() as u64;
        match result {
            Ok(resp) => {
                self.check_status(&resp).inspect_err(|e| {
                    tracing::warn!(method, path, status = resp.status().as_u16(), elapsed_ms, error = %e, "calendar bridge call failed");
                })?;
                tracing::info!(method, path, status = resp.status().as_u16(), elapsed_ms, "calendar bridge call");
                Ok(resp)
            }
            Err(e) => {
                tracing::warn!(method, path, elapsed_ms, error = %e, "calendar bridge call failed");
                Err(e)
            }
        }
    }

    fn check_status(&self, resp: &reqwest::Response) -> Result<(), BridgeError> {
        let status = resp.status();
        if status.is_server_error() {
            return Err(BridgeError::Transient(status.as_u16()));
        }
        if status.is_client_error() {
            return Err(BridgeError::Permanent(status.as_u16()));
        }
        Ok(())
    }
}

fn urlencoding_lite(value: &str) -> String {
    value.replace(' ', "%20").replace('&', "%26").replace('#', "%23")
}

#[derive(Debug)]
pub enum BridgeError {
    Timeout,
    Request(reqwest::Error),
    /// 5xx: retryable by the caller.
    Transient(u16),
    /// 4xx: not retryable.
    Permanent(u16),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::Timeout => write!(f, "calendar bridge request timed out"),
            BridgeError::Request(e) => write!(f, "calendar bridge transport error: {e}"),
            BridgeError::Transient(s) => write!(f, "calendar bridge server error ({s})"),
            BridgeError::Permanent(s) => write!(f, "calendar bridge client error ({s})"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl BridgeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Timeout | BridgeError::Request(_) | BridgeError::Transient(_))
    }
}
