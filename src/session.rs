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

//! In-process session storage.
//!
//! Maps opaque session ids to user logins. Sessions live in memory only
//! and vanish on restart.

use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;

/// Concurrency-safe `session_id → login` map.
///
/// Reads take a shared lock so authenticating requests proceed in
/// parallel; writes are exclusive.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Login bound to `session_id`, if the session exists.
    pub fn get(&self, session_id: &str) -> Option<String> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Binds `session_id` to `login`, replacing any previous binding.
    pub fn add(&self, session_id: String, login: String) {
        self.sessions.write().insert(session_id, login);
    }

    pub fn delete(&self, session_id: &str) {
        self.sessions.write().remove(session_id);
    }
}

/// Opaque session id: 32 CSPRNG bytes, hex-encoded.
pub fn new_session_id() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn get_returns_added_login() {
        let store = SessionStore::new();
        store.add("abc".to_string(), "alice".to_string());

        assert_eq!(store.get("abc"), Some("alice".to_string()));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn add_overwrites_existing_session() {
        let store = SessionStore::new();
        store.add("abc".to_string(), "alice".to_string());
        store.add("abc".to_string(), "bob".to_string());

        assert_eq!(store.get("abc"), Some("bob".to_string()));
    }

    #[test]
    fn delete_removes_session() {
        let store = SessionStore::new();
        store.add("abc".to_string(), "alice".to_string());
        store.delete("abc");

        assert_eq!(store.get("abc"), None);
    }

    #[test]
    fn session_ids_are_64_hex_chars_and_unique() {
        let a = new_session_id();
        let b = new_session_id();

        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let store = Arc::new(SessionStore::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let id = format!("session-{i}-{j}");
                    store.add(id.clone(), format!("user-{i}"));
                    assert_eq!(store.get(&id), Some(format!("user-{i}")));
                    store.delete(&id);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("session-0-0"), None);
    }
}
