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

//! HTTP routing and session authentication.

use crate::error::ApiError;
use crate::handlers;
use crate::repository::Storage;
use crate::session::SessionStore;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Name of the authentication cookie.
pub const SESSION_COOKIE: &str = "session_id";

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn Storage>, sessions: Arc<SessionStore>) -> Self {
        Self { store, sessions }
    }
}

/// Login resolved by [`require_session`], attached to the request for the
/// downstream handler.
#[derive(Debug, Clone)]
pub struct SessionLogin(pub String);

/// Builds the full API surface; everything under `/api/user` except
/// register and login sits behind the session gate.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api/user/orders",
            post(handlers::add_order).get(handlers::get_orders),
        )
        .route("/api/user/balance", get(handlers::get_balance))
        .route("/api/user/balance/withdraw", post(handlers::withdraw))
        .route("/api/user/withdrawals", get(handlers::get_withdrawals))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/api/user/register", post(handlers::register))
        .route("/api/user/login", post(handlers::login))
        .merge(protected)
        .with_state(state)
}

/// Rejects requests without a live session. On success the resolved login
/// rides along as a [`SessionLogin`] extension.
async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let login = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.get(cookie.value()))
        .ok_or(ApiError::Unauthorized)?;

    request.extensions_mut().insert(SessionLogin(login));
    Ok(next.run(request).await)
}
