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

//! Domain entities and their JSON boundary shapes.
//!
//! Money fields are integer cents in process and floating major units on
//! the wire; timestamps serialize as RFC 3339. The hand-written
//! [`Serialize`] impls below own those conversions, so nothing else in the
//! crate touches floats.

use crate::money::{self, Cents};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use std::fmt;

/// Unique identifier for a registered user, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point balance embedded in every user row.
///
/// Serializes as `{current, withdrawn}` in major units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    pub current: Cents,
    pub withdrawn: Cents,
}

impl Serialize for Balance {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Balance", 2)?;
        state.serialize_field("current", &money::to_major_units(self.current))?;
        state.serialize_field("withdrawn", &money::to_major_units(self.withdrawn))?;
        state.end()
    }
}

/// Registered user with login credentials and point balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub password_hash: String,
    pub balance: Balance,
}

impl User {
    /// A user as it exists before the store assigns an id: zero balance,
    /// placeholder id.
    pub fn new(login: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: UserId(0),
            login: login.into(),
            password_hash: password_hash.into(),
            balance: Balance::default(),
        }
    }
}

/// Lifecycle state of an order.
///
/// `Processed` and `Invalid` are terminal; the repository's conditional
/// updates never transition out of them. Status strings this service does
/// not recognise are preserved verbatim in [`OrderStatus::Other`] and
/// treated as non-final.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum OrderStatus {
    New,
    Registered,
    Processing,
    Processed,
    Invalid,
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "NEW",
            Self::Registered => "REGISTERED",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Invalid => "INVALID",
            Self::Other(s) => s,
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Processed | Self::Invalid)
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "NEW" => Self::New,
            "REGISTERED" => Self::Registered,
            "PROCESSING" => Self::Processing,
            "PROCESSED" => Self::Processed,
            "INVALID" => Self::Invalid,
            _ => Self::Other(s),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Purchase order submitted for accrual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub number: String,
    pub status: OrderStatus,
    pub accrual: Cents,
    pub uploaded_at: DateTime<Utc>,
    pub user_id: UserId,
}

impl Serialize for Order {
    /// `{number, status, accrual?, uploaded_at}` — `accrual` appears only
    /// once the order is `PROCESSED` with a positive amount.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let with_accrual = self.status == OrderStatus::Processed && self.accrual > 0;

        let mut state = serializer.serialize_struct("Order", if with_accrual { 4 } else { 3 })?;
        state.serialize_field("number", &self.number)?;
        state.serialize_field("status", &self.status)?;
        if with_accrual {
            state.serialize_field("accrual", &money::to_major_units(self.accrual))?;
        }
        state.serialize_field(
            "uploaded_at",
            &self.uploaded_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;
        state.end()
    }
}

/// Append-only record of points spent against an order number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Withdrawal {
    pub number: String,
    pub sum: Cents,
    pub user_id: UserId,
    pub processed_at: DateTime<Utc>,
}

impl Serialize for Withdrawal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Withdrawal", 3)?;
        state.serialize_field("order", &self.number)?;
        state.serialize_field("sum", &money::to_major_units(self.sum))?;
        state.serialize_field(
            "processed_at",
            &self.processed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;
        state.end()
    }
}
