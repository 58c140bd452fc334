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

//! Money as integer cents.
//!
//! Balances, accruals and withdrawal sums travel through the system as
//! signed integer hundredths. Floating-point amounts exist only at the two
//! boundaries: the accrual authority's JSON and this service's own JSON
//! responses.

/// Signed integer hundredths of a monetary unit.
pub type Cents = i64;

/// Converts a floating amount in major units to cents, rounding half away
/// from zero.
pub fn to_cents(amount: f64) -> Cents {
    (amount * 100.0).round() as Cents
}

/// Converts cents back to major units for the JSON boundary.
pub fn to_major_units(cents: Cents) -> f64 {
    cents as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_accrual_amounts() {
        assert_eq!(to_cents(729.98), 72998);
        assert_eq!(to_cents(100.0), 10000);
        assert_eq!(to_cents(0.0), 0);
        assert_eq!(to_cents(9999.99), 999999);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(to_cents(0.125), 13);
        assert_eq!(to_cents(-0.125), -13);
        assert_eq!(to_cents(2.5), 250);
        assert_eq!(to_cents(-2.5), -250);
    }

    #[test]
    fn converts_back_to_major_units() {
        assert_eq!(to_major_units(72998), 729.98);
        assert_eq!(to_major_units(100), 1.0);
        assert_eq!(to_major_units(0), 0.0);
    }
}
