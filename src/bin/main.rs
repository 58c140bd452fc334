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

use bonusmart::accrual::{AccrualApi, Client};
use bonusmart::config::{self, Config};
use bonusmart::repository::{Repo, Storage};
use bonusmart::retry::{self, Backoff};
use bonusmart::router::{self, AppState};
use bonusmart::session::SessionStore;
use bonusmart::worker::AccrualWorker;
use sqlx::postgres::PgPoolOptions;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("bonusmart=info".parse().expect("static directive")),
        )
        .init();

    let config = Config::load();

    if !config::validate_dsn(&config.dsn) {
        error!(dsn = %config.dsn, "invalid database DSN");
        process::exit(1);
    }

    info!(
        addr = %config.listen_addr(),
        accrual = %config.accrual_addr,
        "starting server"
    );

    // The database may still be coming up alongside us; retry the initial
    // connection under the outbound backoff schedule.
    let connect_policy = Backoff {
        base: Duration::from_secs(1),
        max: Duration::from_secs(5),
        retries: 4,
        multiplier: 2,
    };
    let pool = match retry::with_backoff(
        connect_policy,
        || PgPoolOptions::new().max_connections(10).connect(&config.dsn),
        |_err: &sqlx::Error| true,
    )
    .await
    {
        Ok(pool) => pool,
        Err(err) => {
            error!(err = %err, "connecting to database");
            process::exit(1);
        }
    };

    let repo = Repo::new(pool);
    if let Err(err) = repo.migrate().await {
        error!(err = %err, "running migrations");
        process::exit(1);
    }

    let store: Arc<dyn Storage> = Arc::new(repo);
    let sessions = Arc::new(SessionStore::new());
    let client: Arc<dyn AccrualApi> = Arc::new(Client::new(config.accrual_addr.clone()));

    let cancel = CancellationToken::new();
    let worker = AccrualWorker::new(Arc::clone(&store), client);
    let worker_task = tokio::spawn(worker.run(cancel.clone()));

    let app = router::router(AppState::new(store, sessions));

    let listener = match TcpListener::bind(config.listen_addr()).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(addr = %config.listen_addr(), err = %err, "binding listener");
            process::exit(1);
        }
    };

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(cancel.clone()));
    if let Err(err) = serve.await {
        error!(err = %err, "server error");
    }

    // Stop polling and let any in-flight worker call drain.
    cancel.cancel();
    let _ = worker_task.await;
    info!("server stopped");
}

async fn shutdown_signal(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
    cancel.cancel();
}
