//! Client configuration parsed from environment variables.

use std::time::Duration;

use crate::binder::BinderConfig;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SUCCESS_DISPLAY_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("WIDGETBOARD_BASE_URL must start with http:// or https:// (got '{0}')")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server origin without a trailing slash.
    pub base_url: String,
    /// Raw `Cookie` header value carrying the session.
    pub session_cookie: Option<String>,
    pub timeouts: Timeouts,
    pub success_display_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            session_cookie: None,
            timeouts: Timeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            success_display_ms: DEFAULT_SUCCESS_DISPLAY_MS,
        }
    }
}

impl ClientConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `WIDGETBOARD_BASE_URL`: default `http://127.0.0.1:8000`
    /// - `WIDGETBOARD_SESSION_COOKIE`: sent verbatim as the `Cookie` header
    /// - `WIDGETBOARD_REQUEST_TIMEOUT_SECS`: default 30
    /// - `WIDGETBOARD_CONNECT_TIMEOUT_SECS`: default 10
    /// - `WIDGETBOARD_SUCCESS_DISPLAY_MS`: default 1000
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] for a non-HTTP base URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`], reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] for a non-HTTP base URL.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("WIDGETBOARD_BASE_URL")
            .map(|raw| raw.trim().trim_end_matches('/').to_owned())
            .filter(|raw| !raw.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(base_url));
        }

        let session_cookie = lookup("WIDGETBOARD_SESSION_COOKIE")
            .map(|raw| raw.trim().to_owned())
            .filter(|raw| !raw.is_empty());

        let parse_u64 = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let timeouts = Timeouts {
            request_secs: parse_u64("WIDGETBOARD_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_u64("WIDGETBOARD_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let success_display_ms = parse_u64("WIDGETBOARD_SUCCESS_DISPLAY_MS", DEFAULT_SUCCESS_DISPLAY_MS);

        Ok(Self { base_url, session_cookie, timeouts, success_display_ms })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.connect_secs)
    }

    /// Binder settings derived from this config.
    #[must_use]
    pub fn binder(&self) -> BinderConfig {
        BinderConfig { success_display: Duration::from_millis(self.success_display_ms) }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
