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

//! Background reconciliation of non-final orders.
//!
//! A single long-lived task polls the store for orders that have not yet
//! reached a terminal state, asks the accrual authority about each one,
//! and dispatches the verdict back into the store:
//!
//! - `PROCESSED` → flip the order and credit its owner, exactly once
//! - `INVALID` → mark the order invalid, once
//! - anything else (including statuses this service does not know) →
//!   non-final status update
//!
//! A 429 from the authority abandons the rest of the batch and pauses all
//! polling until the requested deadline. Everything else is logged and
//! skipped; the next tick will see the order again.

use crate::accrual::AccrualApi;
use crate::error::AccrualError;
use crate::model::OrderStatus;
use crate::money;
use crate::repository::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Periodic poller driving orders to their terminal state.
pub struct AccrualWorker {
    store: Arc<dyn Storage>,
    client: Arc<dyn AccrualApi>,
    poll_every: Duration,
    batch_limit: i64,
    req_timeout: Duration,
}

impl AccrualWorker {
    pub fn new(store: Arc<dyn Storage>, client: Arc<dyn AccrualApi>) -> Self {
        Self {
            store,
            client,
            poll_every: Duration::from_millis(50),
            batch_limit: 100,
            req_timeout: Duration::from_millis(300),
        }
    }

    /// Overrides the polling cadence. Tests poll much faster.
    pub fn with_poll_every(mut self, poll_every: Duration) -> Self {
        self.poll_every = poll_every;
        self
    }

    pub fn with_batch_limit(mut self, batch_limit: i64) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    /// Overrides the per-request deadline on accrual calls. Independent of
    /// the lifetime of the worker itself.
    pub fn with_req_timeout(mut self, req_timeout: Duration) -> Self {
        self.req_timeout = req_timeout;
        self
    }

    /// Runs until `cancel` fires. Cancellation aborts any in-flight
    /// request and exits before the next tick.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.poll_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Task-local rate-limit deadline; only this task touches it.
        let mut pause_until: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("accrual worker: stopping");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if let Some(deadline) = pause_until {
                if Instant::now() < deadline {
                    continue;
                }
                pause_until = None;
            }

            let numbers = match self.store.list_pending_orders(self.batch_limit).await {
                Ok(numbers) => numbers,
                Err(err) => {
                    warn!(err = %err, "accrual worker: listing pending orders");
                    continue;
                }
            };

            for number in numbers {
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("accrual worker: stopping");
                        return;
                    }
                    outcome = self.poll_order(&number) => outcome,
                };

                match outcome {
                    Ok(()) => {}
                    Err(AccrualError::NotRegistered) => continue,
                    Err(AccrualError::RateLimited { retry_after }) => {
                        info!(wait = ?retry_after, "accrual worker: rate limited, pausing");
                        pause_until = Some(Instant::now() + retry_after);
                        break;
                    }
                    Err(err) => {
                        warn!(order = %number, err = %err, "accrual worker: query failed");
                        continue;
                    }
                }
            }
        }
    }

    /// Queries the authority for one order and dispatches the verdict.
    /// Store failures are logged here; the order stays non-final and the
    /// next tick retries it.
    async fn poll_order(&self, number: &str) -> Result<(), AccrualError> {
        let info = match time::timeout(self.req_timeout, self.client.get_order(number)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(order = %number, "accrual worker: request timed out");
                return Ok(());
            }
        };

        match info.status {
            OrderStatus::Processed => {
                let cents = money::to_cents(info.accrual.unwrap_or(0.0));
                if let Err(err) = self.store.apply_order_processed_once(number, cents).await {
                    warn!(order = %number, err = %err, "accrual worker: applying PROCESSED");
                }
            }
            OrderStatus::Invalid => {
                if let Err(err) = self.store.mark_order_invalid_once(number).await {
                    warn!(order = %number, err = %err, "accrual worker: marking INVALID");
                }
            }
            other => {
                if let Err(err) = self
                    .store
                    .update_order_status_non_final(number, other.as_str())
                    .await
                {
                    warn!(order = %number, err = %err, "accrual worker: updating status");
                }
            }
        }

        Ok(())
    }
}
