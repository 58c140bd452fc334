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

//! Property-based tests for the Luhn validator.
//!
//! These tests verify the checksum properties that should hold for any
//! generated order number, not just the hand-picked fixtures.

use bonusmart::luhn;
use proptest::prelude::*;

/// Appends the check digit that makes `body` a valid Luhn number.
fn with_check_digit(body: &str) -> String {
    let mut sum = 0u32;
    // The check digit will occupy the rightmost (undoubled) slot, so the
    // rightmost body digit lands on a doubled position.
    let mut doubled = true;

    for b in body.bytes().rev() {
        let mut d = u32::from(b - b'0');
        if doubled {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
        doubled = !doubled;
    }

    let check = (10 - sum % 10) % 10;
    format!("{body}{check}")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Any digit string closed with its own check digit passes.
    #[test]
    fn generated_numbers_are_valid(body in "[0-9]{1,18}") {
        let number = with_check_digit(&body);
        prop_assert!(luhn::is_valid(&number));
    }

    /// Perturbing the check digit always breaks the checksum.
    #[test]
    fn wrong_check_digit_is_rejected(body in "[0-9]{1,18}", bump in 1u32..=9) {
        let number = with_check_digit(&body);
        let (head, last) = number.split_at(number.len() - 1);
        let check = last.chars().next().unwrap().to_digit(10).unwrap();
        let wrong = (check + bump) % 10;

        let perturbed = format!("{}{}", head, wrong);
        prop_assert!(!luhn::is_valid(&perturbed));
    }

    /// Spaces and dashes between digit groups never change the verdict.
    #[test]
    fn separators_are_ignored(body in "[0-9]{4,18}", chunk in 1usize..=4, dash in any::<bool>()) {
        let number = with_check_digit(&body);
        let sep = if dash { '-' } else { ' ' };

        let grouped: Vec<String> = number
            .as_bytes()
            .chunks(chunk)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        let spaced = grouped.join(&sep.to_string());

        prop_assert!(luhn::is_valid(&spaced));
    }

    /// Any character outside digits and separators poisons the whole string.
    #[test]
    fn foreign_characters_are_rejected(
        body in "[0-9]{2,18}",
        ch in "[a-zA-Z_.+/]",
        at in any::<prop::sample::Index>(),
    ) {
        let number = with_check_digit(&body);
        let pos = at.index(number.len() + 1);
        let mut poisoned = number.clone();
        poisoned.insert_str(pos, &ch);

        prop_assert!(!luhn::is_valid(&poisoned));
    }

    /// A lone digit is always too short, whatever its value.
    #[test]
    fn single_digits_are_rejected(s in "[0-9]") {
        prop_assert!(!luhn::is_valid(&s));
    }
}

#[test]
fn known_fixtures() {
    assert!(luhn::is_valid("79927398713"));
    assert!(!luhn::is_valid("79927398710"));
    assert!(luhn::is_valid("4539 1488 0343 6467"));
    assert!(!luhn::is_valid("abcd"));
    assert!(!luhn::is_valid(""));
}
