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

//! Persistent storage: the [`Storage`] contract and its PostgreSQL
//! implementation.
//!
//! The repository owns the connection pool. Every mutation funnels through
//! the linear database-retry policy, and unique-constraint violations
//! normalise to [`RepoError::Conflict`]. Order-state transitions are
//! guarded in SQL (`status NOT IN ('PROCESSED', 'INVALID')`) so terminal
//! rows stay immutable no matter how often the worker retries; the two
//! balance mutations run inside single transactions.

use crate::error::RepoError;
use crate::model::{Balance, Order, OrderStatus, User, UserId, Withdrawal};
use crate::money::Cents;
use crate::retry::{self, DbRetry};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

/// SQLSTATE raised by Postgres for unique-constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Fallback batch size for [`Storage::list_pending_orders`].
const DEFAULT_PENDING_LIMIT: i64 = 100;

/// Persistent operations consumed by the handlers and the accrual worker.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Inserts `(login, password_hash)`; [`RepoError::Conflict`] on a
    /// duplicate login.
    async fn save_user(&self, user: &User) -> Result<(), RepoError>;

    /// Full user row including balance; `None` when the login is unknown.
    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>, RepoError>;

    /// Persists login, password hash and balance by id.
    async fn update_user(&self, user: &User) -> Result<(), RepoError>;

    /// Inserts a new order; [`RepoError::Conflict`] on a duplicate number,
    /// regardless of owner.
    async fn save_order(&self, order: &Order) -> Result<(), RepoError>;

    /// The order if and only if `user` owns it; `None` otherwise.
    async fn get_order_by_number_user(
        &self,
        number: &str,
        user: &User,
    ) -> Result<Option<Order>, RepoError>;

    /// The user's orders, oldest upload first.
    async fn get_orders_by_user(&self, user: &User) -> Result<Vec<Order>, RepoError>;

    /// Appends a withdrawal row; `processed_at` defaults in the store.
    async fn save_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), RepoError>;

    async fn get_withdrawals_by_user(&self, user: &User) -> Result<Vec<Withdrawal>, RepoError>;

    /// Debits `sum` from the user's balance and records the withdrawal,
    /// atomically. [`RepoError::InsufficientFunds`] rolls everything back.
    async fn withdraw(&self, user_id: UserId, number: &str, sum: Cents) -> Result<(), RepoError>;

    /// Numbers of up to `limit` orders in a non-final status, oldest
    /// upload first. A non-positive `limit` falls back to the default.
    async fn list_pending_orders(&self, limit: i64) -> Result<Vec<String>, RepoError>;

    /// Sets `status` unless the row already reached a terminal state;
    /// silent no-op on terminal rows.
    async fn update_order_status_non_final(
        &self,
        number: &str,
        status: &str,
    ) -> Result<(), RepoError>;

    /// Conditional transition to `INVALID`; no-op on terminal rows.
    async fn mark_order_invalid_once(&self, number: &str) -> Result<(), RepoError>;

    /// Flips the order to `PROCESSED` and credits its owner, exactly once.
    /// Re-running against an already-final row commits without touching
    /// the balance.
    async fn apply_order_processed_once(
        &self,
        number: &str,
        accrual: Cents,
    ) -> Result<(), RepoError>;
}

/// PostgreSQL-backed [`Storage`].
pub struct Repo {
    pool: PgPool,
    retry: DbRetry,
}

impl Repo {
    /// Wraps an established pool; see [`Repo::migrate`] for the schema.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: DbRetry::default(),
        }
    }

    /// Applies the embedded migrations from `migrations/`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn withdraw_tx(
        &self,
        user_id: UserId,
        number: &str,
        sum: Cents,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises concurrent withdrawals on the same user; the
        // check and both writes must see the same balance.
        let current: Cents = sqlx::query_scalar("SELECT current FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id.0)
            .fetch_one(&mut *tx)
            .await?;

        if current - sum < 0 {
            return Ok(false); // dropping the transaction rolls it back
        }

        sqlx::query("UPDATE users SET current = current - $1, withdrawn = withdrawn + $1 WHERE id = $2")
            .bind(sum)
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO withdrawals (number, sum, user_id) VALUES ($1, $2, $3)")
            .bind(number)
            .bind(sum)
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn apply_processed_tx(&self, number: &str, accrual: Cents) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE orders \
                SET status = 'PROCESSED', accrual = $2 \
              WHERE number = $1 \
                AND status NOT IN ('PROCESSED', 'INVALID')",
        )
        .bind(number)
        .bind(accrual)
        .execute(&mut *tx)
        .await?;

        // Zero rows: an earlier reconciliation already finalised the order,
        // so the credit must not run again.
        if updated.rows_affected() == 0 {
            return tx.commit().await;
        }

        sqlx::query(
            "UPDATE users \
                SET current = current + $1 \
              WHERE id = (SELECT user_id FROM orders WHERE number = $2)",
        )
        .bind(accrual)
        .bind(number)
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }
}

#[async_trait]
impl Storage for Repo {
    async fn save_user(&self, user: &User) -> Result<(), RepoError> {
        retry::db(self.retry, || async move {
            sqlx::query("INSERT INTO users (login, password) VALUES ($1, $2)")
                .bind(&user.login)
                .bind(&user.password_hash)
                .execute(&self.pool)
                .await
                .map(|_| ())
        })
        .await
        .map_err(normalize_unique)
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>, RepoError> {
        let row = sqlx::query(
            "SELECT id, login, password, current, withdrawn FROM users WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose().map_err(Into::into)
    }

    async fn update_user(&self, user: &User) -> Result<(), RepoError> {
        retry::db(self.retry, || async move {
            sqlx::query(
                "UPDATE users \
                    SET login = $1, password = $2, current = $3, withdrawn = $4 \
                  WHERE id = $5",
            )
            .bind(&user.login)
            .bind(&user.password_hash)
            .bind(user.balance.current)
            .bind(user.balance.withdrawn)
            .bind(user.id.0)
            .execute(&self.pool)
            .await
            .map(|_| ())
        })
        .await
    }

    async fn save_order(&self, order: &Order) -> Result<(), RepoError> {
        retry::db(self.retry, || async move {
            sqlx::query(
                "INSERT INTO orders (number, status, accrual, uploaded_at, user_id) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&order.number)
            .bind(order.status.as_str())
            .bind(order.accrual)
            .bind(order.uploaded_at)
            .bind(order.user_id.0)
            .execute(&self.pool)
            .await
            .map(|_| ())
        })
        .await
        .map_err(normalize_unique)
    }

    async fn get_order_by_number_user(
        &self,
        number: &str,
        user: &User,
    ) -> Result<Option<Order>, RepoError> {
        let row = sqlx::query(
            "SELECT number, status, accrual, uploaded_at, user_id \
               FROM orders \
              WHERE number = $1 AND user_id = $2",
        )
        .bind(number)
        .bind(user.id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose().map_err(Into::into)
    }

    async fn get_orders_by_user(&self, user: &User) -> Result<Vec<Order>, RepoError> {
        let rows = sqlx::query(
            "SELECT number, status, accrual, uploaded_at, user_id \
               FROM orders \
              WHERE user_id = $1 \
              ORDER BY uploaded_at ASC",
        )
        .bind(user.id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(order_from_row)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn save_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), RepoError> {
        retry::db(self.retry, || async move {
            sqlx::query("INSERT INTO withdrawals (number, sum, user_id) VALUES ($1, $2, $3)")
                .bind(&withdrawal.number)
                .bind(withdrawal.sum)
                .bind(withdrawal.user_id.0)
                .execute(&self.pool)
                .await
                .map(|_| ())
        })
        .await
    }

    async fn get_withdrawals_by_user(&self, user: &User) -> Result<Vec<Withdrawal>, RepoError> {
        let rows = sqlx::query(
            "SELECT number, sum, user_id, processed_at \
               FROM withdrawals \
              WHERE user_id = $1 \
              ORDER BY processed_at ASC",
        )
        .bind(user.id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(withdrawal_from_row)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn withdraw(&self, user_id: UserId, number: &str, sum: Cents) -> Result<(), RepoError> {
        let applied = retry::db(self.retry, || self.withdraw_tx(user_id, number, sum)).await?;
        if !applied {
            return Err(RepoError::InsufficientFunds);
        }
        Ok(())
    }

    async fn list_pending_orders(&self, limit: i64) -> Result<Vec<String>, RepoError> {
        let limit = if limit > 0 { limit } else { DEFAULT_PENDING_LIMIT };

        let numbers = sqlx::query_scalar(
            "SELECT number \
               FROM orders \
              WHERE status NOT IN ('PROCESSED', 'INVALID') \
              ORDER BY uploaded_at ASC \
              LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(numbers)
    }

    async fn update_order_status_non_final(
        &self,
        number: &str,
        status: &str,
    ) -> Result<(), RepoError> {
        retry::db(self.retry, || async move {
            sqlx::query(
                "UPDATE orders \
                    SET status = $2 \
                  WHERE number = $1 \
                    AND status NOT IN ('PROCESSED', 'INVALID')",
            )
            .bind(number)
            .bind(status)
            .execute(&self.pool)
            .await
            .map(|_| ())
        })
        .await
    }

    async fn mark_order_invalid_once(&self, number: &str) -> Result<(), RepoError> {
        retry::db(self.retry, || async move {
            sqlx::query(
                "UPDATE orders \
                    SET status = 'INVALID' \
                  WHERE number = $1 \
                    AND status NOT IN ('PROCESSED', 'INVALID')",
            )
            .bind(number)
            .execute(&self.pool)
            .await
            .map(|_| ())
        })
        .await
    }

    async fn apply_order_processed_once(
        &self,
        number: &str,
        accrual: Cents,
    ) -> Result<(), RepoError> {
        retry::db(self.retry, || self.apply_processed_tx(number, accrual)).await
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: UserId(row.try_get("id")?),
        login: row.try_get("login")?,
        password_hash: row.try_get("password")?,
        balance: Balance {
            current: row.try_get("current")?,
            withdrawn: row.try_get("withdrawn")?,
        },
    })
}

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        number: row.try_get("number")?,
        status: OrderStatus::from(status),
        accrual: row.try_get("accrual")?,
        uploaded_at: row.try_get("uploaded_at")?,
        user_id: UserId(row.try_get("user_id")?),
    })
}

fn withdrawal_from_row(row: &PgRow) -> Result<Withdrawal, sqlx::Error> {
    Ok(Withdrawal {
        number: row.try_get("number")?,
        sum: row.try_get("sum")?,
        user_id: UserId(row.try_get("user_id")?),
        processed_at: row.try_get("processed_at")?,
    })
}

/// Maps a unique-constraint violation to the "already exists" sentinel;
/// every other error passes through.
fn normalize_unique(err: RepoError) -> RepoError {
    if let RepoError::Sqlx(sqlx_err) = &err {
        if let Some(db_err) = sqlx_err.as_database_error() {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return RepoError::Conflict;
            }
        }
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct StubDbError {
        code: &'static str,
    }

    impl fmt::Display for StubDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "stub db error ({})", self.code)
        }
    }

    impl StdError for StubDbError {}

    impl sqlx::error::DatabaseError for StubDbError {
        fn message(&self) -> &str {
            "stub db error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    #[test]
    fn unique_violation_becomes_conflict() {
        let err = RepoError::Sqlx(sqlx::Error::Database(Box::new(StubDbError {
            code: UNIQUE_VIOLATION,
        })));
        assert!(matches!(normalize_unique(err), RepoError::Conflict));
    }

    #[test]
    fn other_errors_pass_through() {
        let err = RepoError::Sqlx(sqlx::Error::Database(Box::new(StubDbError {
            code: "40P01",
        })));
        assert!(matches!(normalize_unique(err), RepoError::Sqlx(_)));

        let sentinel = RepoError::InsufficientFunds;
        assert!(matches!(
            normalize_unique(sentinel),
            RepoError::InsufficientFunds
        ));
    }
}
