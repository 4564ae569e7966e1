//! Error handling utilities for route handlers
//!
//! Structural failures (storage, extraction) are logged with context here
//! and mapped to a status code at the boundary; nothing in a request path
//! panics or takes the process down.

use axum::http::StatusCode;

/// Log an error with context and convert it to a response status.
pub trait LogErr<T> {
    /// Map any error to 500 after logging it.
    fn log_500(self, context: &str) -> Result<T, StatusCode>;

    /// Map any error to the given status after logging it.
    fn log_status(self, context: &str, status: StatusCode) -> Result<T, StatusCode>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, StatusCode> {
        self.log_status(context, StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn log_status(self, context: &str, status: StatusCode) -> Result<T, StatusCode> {
        self.map_err(|e| {
            eprintln!("{}: {}", context, e);
            status
        })
    }
}

/// Missing-row lookups become 404s without logging; absence is expected.
pub trait OrNotFound<T> {
    fn or_404(self) -> Result<T, StatusCode>;
}

impl<T> OrNotFound<T> for Option<T> {
    fn or_404(self) -> Result<T, StatusCode> {
        self.ok_or(StatusCode::NOT_FOUND)
    }
}
