// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error taxonomies for the store, the accrual client, and the HTTP
//! surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Persistent-store errors.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Unique-constraint violation (SQLSTATE 23505) normalised to a
    /// sentinel the callers can match on.
    #[error("already exists")]
    Conflict,

    /// Debit would take the balance below zero.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Transient-error retry budget spent without a success.
    #[error("after {attempts} attempts, last error: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Accrual-authority client errors.
#[derive(Debug, Error)]
pub enum AccrualError {
    /// The authority has never heard of this order (HTTP 204).
    #[error("order is not registered")]
    NotRegistered,

    /// HTTP 429 carrying the wait the authority asked for.
    #[error("rate limited for {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// A status code outside the documented response grammar.
    #[error("unexpected status code: {code}")]
    UnexpectedStatus { code: u16 },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Handler-facing errors, each mapping to one HTTP response.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid session cookie.
    #[error("unauthorized")]
    Unauthorized,

    /// The session resolves to a login the store no longer knows.
    #[error("user not found")]
    UserNotFound,

    /// Malformed or semantically invalid request body.
    #[error("{0}")]
    BadRequest(&'static str),

    /// Order number failed the Luhn check.
    #[error("order number is not valid")]
    InvalidOrderNumber,

    /// Resource already exists with a different owner.
    #[error("already exists")]
    Conflict,

    /// Balance cannot cover the requested withdrawal.
    #[error("insufficient balance")]
    InsufficientFunds,

    /// Anything unexpected; the message is all that leaves the process.
    #[error("{0}")]
    Internal(String),
}

/// JSON error body: `{error, code}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::UserNotFound => (StatusCode::BAD_REQUEST, "USER_NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::InvalidOrderNumber => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ORDER_NUMBER")
            }
            ApiError::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::InsufficientFunds => (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict => ApiError::Conflict,
            RepoError::InsufficientFunds => ApiError::InsufficientFunds,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_error_display_messages() {
        assert_eq!(RepoError::Conflict.to_string(), "already exists");
        assert_eq!(
            RepoError::InsufficientFunds.to_string(),
            "insufficient funds"
        );

        let wrapped = RepoError::RetriesExhausted {
            attempts: 3,
            source: sqlx::Error::PoolClosed,
        };
        assert!(wrapped
            .to_string()
            .starts_with("after 3 attempts, last error:"));
    }

    #[test]
    fn accrual_error_display_messages() {
        assert_eq!(
            AccrualError::NotRegistered.to_string(),
            "order is not registered"
        );
        assert_eq!(
            AccrualError::UnexpectedStatus { code: 500 }.to_string(),
            "unexpected status code: 500"
        );
    }

    #[test]
    fn repo_sentinels_map_to_api_errors() {
        assert!(matches!(
            ApiError::from(RepoError::Conflict),
            ApiError::Conflict
        ));
        assert!(matches!(
            ApiError::from(RepoError::InsufficientFunds),
            ApiError::InsufficientFunds
        ));
        assert!(matches!(
            ApiError::from(RepoError::Sqlx(sqlx::Error::PoolClosed)),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn retries_exhausted_chains_the_cause() {
        let err = RepoError::RetriesExhausted {
            attempts: 2,
            source: sqlx::Error::PoolClosed,
        };
        assert!(std::error::Error::source(&err).is_some());
    }
}
