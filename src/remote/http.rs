//! HTTP remote store.
//!
//! Thin reqwest wrapper over the server's JSON routes. The session travels
//! as a raw `Cookie` header set once on the client. Response bodies are
//! decoded by the pure `parse_*` functions below so they can be tested
//! without a server.

use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AccountListing, AccountSource, AddRowRequest, BindRequest, RemoteError, RemoteStore, SessionGate};
use crate::config::ClientConfig;
use crate::model::{Board, Row, RowId, WidgetId};

const LOAD_BOARD_PATH: &str = "/api/retrieveWidgets";
const ADD_ROW_PATH: &str = "/api/AddRowToWidgetBoard";
const DELETE_ROW_PATH: &str = "/api/DeleteRowToWidgetBoard";
const BIND_WIDGET_PATH: &str = "/api/SaveWidgetAccount";
const UNBIND_WIDGET_PATH: &str = "/api/DeleteWidgetAccount";
const LIST_ACCOUNTS_PATH: &str = "/api/retrieve_user_account/";
const CHECK_AUTH_PATH: &str = "/api/check_auth/";
const LOGOUT_PATH: &str = "/api/logout/";

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpRemoteStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    /// Build a client with the configured timeouts and session cookie.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ClientBuild`] if the cookie is not a valid
    /// header value or the TLS backend fails to initialize.
    pub fn new(config: &ClientConfig) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.session_cookie {
            let value = HeaderValue::from_str(cookie).map_err(|e| RemoteError::ClientBuild(e.to_string()))?;
            headers.insert(COOKIE, value);
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteError::ClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.clone() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request and return the status and body text.
    async fn send(&self, method: Method, path: &str, body: Option<String>) -> Result<(StatusCode, String), RemoteError> {
        let mut request = self.http.request(method.clone(), self.url(path));
        if let Some(body) = body {
            request = request.header(reqwest::header::CONTENT_TYPE, "application/json").body(body);
        }
        let started = std::time::Instant::now();
        let response = request.send().await.map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| RemoteError::Transport(e.to_string()))?;
        debug!(%method, path, status = status.as_u16(), elapsed_ms = elapsed_ms(started.elapsed()), "remote call");
        Ok((status, text))
    }

    /// Send a request and fail on any non-success status.
    async fn call(&self, method: Method, path: &str, body: Option<String>) -> Result<String, RemoteError> {
        let (status, text) = self.send(method, path, body).await?;
        check_status(status, &text)?;
        Ok(text)
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<String, RemoteError> {
        let json = serde_json::to_string(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.call(Method::POST, path, Some(json)).await
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait::async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn load_board(&self) -> Result<Board, RemoteError> {
        let text = self.call(Method::GET, LOAD_BOARD_PATH, None).await?;
        parse_board(&text)
    }

    async fn add_row(&self, request: AddRowRequest) -> Result<Row, RemoteError> {
        let text = self.post(ADD_ROW_PATH, &request).await?;
        parse_added_row(&text)
    }

    async fn delete_row(&self, row_id: RowId) -> Result<(), RemoteError> {
        self.post(DELETE_ROW_PATH, &RowIdBody { row_id }).await?;
        Ok(())
    }

    async fn bind_widget(&self, request: BindRequest) -> Result<(), RemoteError> {
        self.post(BIND_WIDGET_PATH, &request).await?;
        Ok(())
    }

    async fn unbind_widget(&self, widget_id: WidgetId) -> Result<(), RemoteError> {
        self.post(UNBIND_WIDGET_PATH, &WidgetIdBody { widget_id }).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountSource for HttpRemoteStore {
    async fn list_accounts(&self) -> Result<AccountListing, RemoteError> {
        let text = self.call(Method::GET, LIST_ACCOUNTS_PATH, None).await?;
        parse_listing(&text)
    }
}

#[async_trait::async_trait]
impl SessionGate for HttpRemoteStore {
    async fn is_authenticated(&self) -> bool {
        match self.send(Method::GET, CHECK_AUTH_PATH, None).await {
            Ok((status, _)) => status.is_success(),
            Err(e) => {
                debug!(error = %e, "auth check failed");
                false
            }
        }
    }

    async fn logout(&self) -> Result<(), RemoteError> {
        self.call(Method::POST, LOGOUT_PATH, None).await?;
        Ok(())
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct RowIdBody {
    #[serde(rename = "RowID")]
    row_id: RowId,
}

#[derive(Serialize)]
struct WidgetIdBody {
    #[serde(rename = "WidgetID")]
    widget_id: WidgetId,
}

#[derive(Deserialize)]
struct BoardEnvelope {
    #[serde(rename = "WidgetBoardData")]
    board: Board,
}

#[derive(Deserialize)]
struct AddedRowEnvelope {
    #[serde(rename = "ReturnedRow")]
    row: Row,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

// =============================================================================
// PARSING
// =============================================================================

/// Map a non-success status to a [`RemoteError`], keeping the server's
/// `{"error": ...}` message when it sent one.
fn check_status(status: StatusCode, body: &str) -> Result<(), RemoteError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(RemoteError::Unauthenticated);
    }
    Err(RemoteError::Rejected { status: status.as_u16(), message: parse_error_message(body) })
}

fn parse_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_default()
}

fn parse_board(json: &str) -> Result<Board, RemoteError> {
    let envelope: BoardEnvelope = serde_json::from_str(json).map_err(|e| RemoteError::Decode(e.to_string()))?;
    Ok(envelope.board)
}

fn parse_added_row(json: &str) -> Result<Row, RemoteError> {
    let envelope: AddedRowEnvelope = serde_json::from_str(json).map_err(|e| RemoteError::Decode(e.to_string()))?;
    Ok(envelope.row)
}

fn parse_listing(json: &str) -> Result<AccountListing, RemoteError> {
    serde_json::from_str(json).map_err(|e| RemoteError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
