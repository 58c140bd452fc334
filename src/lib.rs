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

//! # Bonusmart
//!
//! Backend of a loyalty-points service: authenticated users submit
//! purchase order numbers, an external accrual authority decides how many
//! points each order earns, and accumulated points can be spent by
//! withdrawing against new order numbers.
//!
//! ## Core Components
//!
//! - [`Repo`]: PostgreSQL store owning every persistent operation,
//!   including the exactly-once order credit and the transactional
//!   withdrawal
//! - [`AccrualWorker`]: periodic poller reconciling non-final orders under
//!   the authority's rate-limit rules
//! - [`Client`]: typed client for the accrual authority
//! - [`router::router`]: HTTP surface with session-cookie authentication
//!
//! The binary in `src/bin/main.rs` wires these together.
//!
//! ## Example
//!
//! ```
//! use bonusmart::luhn;
//!
//! assert!(luhn::is_valid("79927398713"));
//! assert!(!luhn::is_valid("79927398710"));
//! ```
//!
//! ## Money
//!
//! Balances, accruals and withdrawal sums are integer cents everywhere in
//! process; floating major units appear only at the JSON boundary.

pub mod accrual;
pub mod config;
pub mod error;
pub mod handlers;
pub mod luhn;
pub mod model;
pub mod money;
pub mod repository;
pub mod retry;
pub mod router;
pub mod session;
pub mod worker;

pub use accrual::{AccrualApi, Client, OrderInfo};
pub use error::{AccrualError, ApiError, RepoError};
pub use model::{Balance, Order, OrderStatus, User, UserId, Withdrawal};
pub use repository::{Repo, Storage};
pub use router::AppState;
pub use session::SessionStore;
pub use worker::AccrualWorker;
