//! API error types for the order-processing HTTP surface.
//!
//! Mirrors the corpus's `APIError` shape (status-coded error variants that
//! convert directly into an axum response) but scoped to the handful of
//! error categories the core actually raises (spec.md §7).

use serde::Serialize;
use std::fmt;

/// JSON body returned alongside a non-2xx response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

/// Structured API error with an explicit HTTP status mapping.
#[derive(Debug)]
pub enum ApiError {
	/// Malformed or invalid request body (400).
	BadRequest { error_type: String, message: String },
	/// Required auth header missing or wrong (401).
	Unauthorized { message: String },
	/// Requested resource does not exist (404).
	NotFound { message: String },
	/// Leader is unknown mid-election; caller should retry (503).
	Unavailable { message: String },
	/// Programmer-error class or unexpected failure (500).
	Internal { message: String },
}

impl ApiError {
	pub fn status_code(&self) -> u16 {
		match self {
			ApiError::BadRequest { .. } => 400,
			ApiError::Unauthorized { .. } => 401,
			ApiError::NotFound { .. } => 404,
			ApiError::Unavailable { .. } => 503,
			ApiError::Internal { .. } => 500,
		}
	}

	fn error_type(&self) -> &str {
		match self {
			ApiError::BadRequest { error_type, .. } => error_type,
			ApiError::Unauthorized { .. } => "unauthorized",
			ApiError::NotFound { .. } => "not_found",
			ApiError::Unavailable { .. } => "unavailable",
			ApiError::Internal { .. } => "internal",
		}
	}

	fn message(&self) -> &str {
		match self {
			ApiError::BadRequest { message, .. }
			| ApiError::Unauthorized { message }
			| ApiError::NotFound { message }
			| ApiError::Unavailable { message }
			| ApiError::Internal { message } => message,
		}
	}

	pub fn to_error_response(&self) -> ErrorResponse {
		ErrorResponse {
			error: self.error_type().to_string(),
			message: self.message().to_string(),
		}
	}
}

impl fmt::Display for ApiError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.error_type(), self.message())
	}
}

impl std::error::Error for ApiError {}

impl axum::response::IntoResponse for ApiError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		let body = self.to_error_response();
		(status, Json(body)).into_response()
	}
}
