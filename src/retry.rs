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

//! Retry policies.
//!
//! Two independent kernels: [`with_backoff`] retries outbound calls under
//! an exponential schedule gated by a caller-supplied predicate, and [`db`]
//! retries database calls under a bounded linear schedule, but only for
//! SQLSTATEs known to be transient.

use crate::error::RepoError;
use std::future::Future;
use std::time::Duration;

/// SQLSTATEs retried by [`db`]: connection_failure, too_many_connections,
/// deadlock_detected.
const TRANSIENT_SQLSTATES: [&str; 3] = ["08006", "53300", "40P01"];

/// Exponential backoff schedule for outbound calls.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    /// Additional attempts after the first.
    pub retries: u32,
    pub multiplier: u32,
}

impl Backoff {
    /// Delay before retry `attempt` (zero-based): `base * multiplier^attempt`,
    /// capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.multiplier.checked_pow(attempt) {
            Some(factor) => self.base.saturating_mul(factor).min(self.max),
            None => self.max,
        }
    }
}

/// Runs `op`, retrying while `should_retry` accepts the error, up to
/// `policy.retries` additional attempts.
///
/// Errors the predicate rejects surface unchanged and immediately, as does
/// the last error once the budget is spent.
pub async fn with_backoff<T, E, F, Fut>(
    policy: Backoff,
    mut op: F,
    should_retry: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !should_retry(&err) || attempt >= policy.retries {
            return Err(err);
        }

        tokio::time::sleep(policy.delay(attempt)).await;
        attempt += 1;
    }
}

/// Linear retry schedule for database calls.
#[derive(Debug, Clone, Copy)]
pub struct DbRetry {
    pub attempts: u32,
    pub base: Duration,
    pub step: Duration,
}

impl Default for DbRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: Duration::from_secs(1),
            step: Duration::from_secs(2),
        }
    }
}

/// Runs `op`, retrying only on transient Postgres failures with a
/// `base + step * (attempt - 1)` sleep between tries.
///
/// Any non-transient error returns immediately as [`RepoError::Sqlx`];
/// exhausting the budget wraps the last error as
/// [`RepoError::RetriesExhausted`].
pub async fn db<T, F, Fut>(policy: DbRetry, mut op: F) -> Result<T, RepoError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1u32;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_transient(&err) {
            return Err(RepoError::Sqlx(err));
        }

        if attempt == attempts {
            return Err(RepoError::RetriesExhausted {
                attempts,
                source: err,
            });
        }

        tokio::time::sleep(policy.base + policy.step * (attempt - 1)).await;
        attempt += 1;
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    let Some(db_err) = err.as_database_error() else {
        return false;
    };
    match db_err.code() {
        Some(code) => TRANSIENT_SQLSTATES.contains(&code.as_ref()),
        None => false,
    }
}
