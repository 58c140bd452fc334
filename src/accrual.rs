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

//! Client for the external accrual authority.
//!
//! One operation: ask the authority what it decided about an order. The
//! status-code space decodes into [`AccrualError`] variants; the client
//! itself never retries — rate-limit handling belongs to the worker.

use crate::error::AccrualError;
use crate::model::OrderStatus;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// Pause applied when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// The authority's verdict for a single order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderInfo {
    pub order: String,
    pub status: OrderStatus,
    /// Points awarded, in major units. Absent while the authority is still
    /// deciding.
    pub accrual: Option<f64>,
}

/// Outbound accrual interface consumed by the worker.
#[async_trait]
pub trait AccrualApi: Send + Sync {
    /// Fetches the authority's verdict for one order number.
    async fn get_order(&self, number: &str) -> Result<OrderInfo, AccrualError>;
}

/// HTTP client for `GET {base}/api/orders/{number}`.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AccrualApi for Client {
    async fn get_order(&self, number: &str) -> Result<OrderInfo, AccrualError> {
        let url = format!("{}/api/orders/{}", self.base_url, number);
        let response = self.http.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::NO_CONTENT => Err(AccrualError::NotRegistered),
            StatusCode::TOO_MANY_REQUESTS => Err(AccrualError::RateLimited {
                retry_after: parse_retry_after(response.headers().get(RETRY_AFTER)),
            }),
            other => Err(AccrualError::UnexpectedStatus {
                code: other.as_u16(),
            }),
        }
    }
}

/// `Retry-After` as a positive integer second count; anything else falls
/// back to [`DEFAULT_RETRY_AFTER`].
fn parse_retry_after(header: Option<&reqwest::header::HeaderValue>) -> Duration {
    header
        .and_then(|value| value.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|secs| *secs > 0)
        .map(|secs| Duration::from_secs(secs as u64))
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn parses_integer_seconds() {
        let value = HeaderValue::from_static("120");
        assert_eq!(
            parse_retry_after(Some(&value)),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn missing_header_defaults_to_a_minute() {
        assert_eq!(parse_retry_after(None), DEFAULT_RETRY_AFTER);
    }

    #[test]
    fn zero_negative_or_garbage_default_to_a_minute() {
        for raw in ["0", "-5", "soon", "1.5", ""] {
            let value = HeaderValue::from_str(raw).unwrap();
            assert_eq!(parse_retry_after(Some(&value)), DEFAULT_RETRY_AFTER, "{raw:?}");
        }
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = Client::new("http://accrual.local/");
        assert_eq!(client.base_url, "http://accrual.local");
    }

    #[test]
    fn order_info_decodes_optional_accrual() {
        let with: OrderInfo =
            serde_json::from_str(r#"{"order":"101","status":"PROCESSED","accrual":729.98}"#)
                .unwrap();
        assert_eq!(with.status, OrderStatus::Processed);
        assert_eq!(with.accrual, Some(729.98));

        let without: OrderInfo =
            serde_json::from_str(r#"{"order":"101","status":"PROCESSING"}"#).unwrap();
        assert_eq!(without.status, OrderStatus::Processing);
        assert_eq!(without.accrual, None);

        let unknown: OrderInfo =
            serde_json::from_str(r#"{"order":"101","status":"PROCEEDED"}"#).unwrap();
        assert_eq!(unknown.status, OrderStatus::Other("PROCEEDED".to_string()));
    }
}
