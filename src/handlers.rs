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

//! Request handlers for the HTTP surface.
//!
//! Handlers translate the store's sentinel errors into status codes and
//! keep money floating only at the JSON edge. Protected handlers receive
//! the session's login as a [`SessionLogin`] extension from the router's
//! auth middleware.

use crate::error::ApiError;
use crate::luhn;
use crate::model::{Order, OrderStatus, User};
use crate::money;
use crate::router::{AppState, SessionLogin, SESSION_COOKIE};
use crate::session;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::Deserialize;

/// Request body for registration and login.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// Request body for spending points against an order number.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WithdrawRequest {
    pub order: String,
    /// Major units; converted to cents before any comparison.
    pub sum: f64,
}

/// `GET /ping` — liveness probe.
pub async fn ping() -> &'static str {
    "ok"
}

/// `POST /api/user/register` — create a user and open a session.
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<(CookieJar, &'static str), ApiError> {
    let Json(creds) = body.map_err(|_| ApiError::BadRequest("bad request body"))?;
    if creds.login.is_empty() || creds.password.is_empty() {
        return Err(ApiError::BadRequest("login and password must be non-empty"));
    }

    let hash = bcrypt::hash(&creds.password, bcrypt::DEFAULT_COST)
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let user = User::new(&creds.login, hash);
    state.store.save_user(&user).await?; // duplicate login → 409

    Ok((open_session(&state, jar, creds.login), "ok"))
}

/// `POST /api/user/login` — verify credentials and open a session.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<(CookieJar, &'static str), ApiError> {
    let Json(creds) = body.map_err(|_| ApiError::BadRequest("bad request body"))?;

    let Some(user) = state.store.get_user_by_login(&creds.login).await? else {
        return Err(ApiError::Unauthorized);
    };

    let verified = bcrypt::verify(&creds.password, &user.password_hash)
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    if !verified {
        return Err(ApiError::Unauthorized);
    }

    Ok((open_session(&state, jar, user.login), "ok"))
}

/// `POST /api/user/orders` — submit an order number (raw text body).
///
/// Re-submission by the owning user answers 200; the same number from
/// anyone else conflicts with 409.
pub async fn add_order(
    State(state): State<AppState>,
    Extension(SessionLogin(login)): Extension<SessionLogin>,
    body: String,
) -> Result<Response, ApiError> {
    let number = body.trim();
    if !luhn::is_valid(number) {
        return Err(ApiError::InvalidOrderNumber);
    }

    let user = current_user(&state, &login).await?;

    if state
        .store
        .get_order_by_number_user(number, &user)
        .await?
        .is_some()
    {
        return Ok((StatusCode::OK, "exists").into_response());
    }

    let order = Order {
        number: number.to_string(),
        status: OrderStatus::New,
        accrual: 0,
        uploaded_at: Utc::now(),
        user_id: user.id,
    };
    state.store.save_order(&order).await?; // other owner's number → 409

    Ok((StatusCode::ACCEPTED, "ok").into_response())
}

/// `GET /api/user/orders` — the user's orders, oldest first; 204 when
/// there are none.
pub async fn get_orders(
    State(state): State<AppState>,
    Extension(SessionLogin(login)): Extension<SessionLogin>,
) -> Result<Response, ApiError> {
    let user = current_user(&state, &login).await?;
    let orders = state.store.get_orders_by_user(&user).await?;

    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(orders).into_response())
}

/// `GET /api/user/balance` — current and withdrawn totals in major units.
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(SessionLogin(login)): Extension<SessionLogin>,
) -> Result<Response, ApiError> {
    let user = current_user(&state, &login).await?;
    Ok(Json(user.balance).into_response())
}

/// `POST /api/user/balance/withdraw` — spend points against an order
/// number. 402 when the balance cannot cover the sum.
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(SessionLogin(login)): Extension<SessionLogin>,
    body: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::BadRequest("bad request body"))?;

    if !luhn::is_valid(&request.order) {
        return Err(ApiError::InvalidOrderNumber);
    }
    if request.sum <= 0.0 {
        return Err(ApiError::BadRequest("sum must be positive"));
    }

    let user = current_user(&state, &login).await?;
    let sum = money::to_cents(request.sum);

    state.store.withdraw(user.id, &request.order, sum).await?; // short balance → 402

    Ok(StatusCode::OK)
}

/// `GET /api/user/withdrawals` — the user's withdrawals; 204 when there
/// are none.
pub async fn get_withdrawals(
    State(state): State<AppState>,
    Extension(SessionLogin(login)): Extension<SessionLogin>,
) -> Result<Response, ApiError> {
    let user = current_user(&state, &login).await?;
    let withdrawals = state.store.get_withdrawals_by_user(&user).await?;

    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(withdrawals).into_response())
}

/// Loads the user the session points at; a vanished user is a 400, not a
/// 401 — the session itself was valid.
async fn current_user(state: &AppState, login: &str) -> Result<User, ApiError> {
    state
        .store
        .get_user_by_login(login)
        .await?
        .ok_or(ApiError::UserNotFound)
}

/// Generates a session id, binds it to `login`, and sets the cookie.
fn open_session(state: &AppState, jar: CookieJar, login: String) -> CookieJar {
    let session_id = session::new_session_id();
    state.sessions.add(session_id.clone(), login);

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    jar.add(cookie)
}
