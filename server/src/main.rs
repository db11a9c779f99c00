// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::http::HeaderName;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use server::notification::{Notifier, TracingNotifier};
use server::routes::AppState;
use server::scheduler::{AlarmScheduler, PollingScheduler, TimerScheduler};
use server::{database, jobs, routes};

// Define the DB_URL here for the main application's use.
const MAIN_DB_URL: &str = "sqlite://database/sqlite.db";

// Tick period of the store-backed polling scheduler.
const POLL_TICK_SECS: u64 = 30;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting up the server...");

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| MAIN_DB_URL.to_string());

    let db_pool = match database::establish_connection_pool(&database_url).await {
        Ok(pool) => {
            tracing::info!("Database connection was made successfully.");
            pool
        }
        Err(e) => {
            tracing::error!("Failed to connect with the database: {:?}", e);
            std::process::exit(1);
        }
    };

    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);

    // The host timer strategy is picked per environment: the in-process
    // timer scheduler by default, the store-backed polling scheduler when
    // SCHEDULER_MODE=polling.
    let scheduler: Arc<dyn AlarmScheduler> = match std::env::var("SCHEDULER_MODE").as_deref() {
        Ok("polling") => {
            tracing::info!("Using the store-backed polling scheduler.");
            Arc::new(PollingScheduler::spawn(
                db_pool.clone(),
                Arc::clone(&notifier),
                Duration::from_secs(POLL_TICK_SECS),
            ))
        }
        _ => {
            tracing::info!("Using the in-process timer scheduler.");
            Arc::new(TimerScheduler::new(db_pool.clone(), Arc::clone(&notifier)))
        }
    };

    // Re-arm the persisted alarms before any other scheduler activity.
    // In-process timers did not survive the last shutdown; the store did.
    jobs::reconcile_alarms(&db_pool, scheduler.as_ref()).await;

    // Expired-task cleanup: once now, then once per day.
    jobs::spawn_cleanup_job(db_pool.clone());

    let app_routes = routes::create_router(AppState {
        pool: db_pool,
        scheduler,
    });

    // Configure CORS here, applying it globally to the router
    let cors = CorsLayer::new()
        .allow_methods(Any) // Allow all HTTP methods
        // Explicit list of the headers a frontend might send. Without
        // token authentication, 'authorization' is not needed.
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("accept"),
        ])
        .allow_origin(Any); // Allow all origins

    let app = app_routes.layer(cors); // Apply the CORS layer

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("The server listens on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
