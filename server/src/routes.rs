// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::handlers;
use crate::scheduler::AlarmScheduler;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared application state handed to every handler: the database pool
/// and the process-wide scheduler, both constructed once at startup.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub scheduler: Arc<dyn AlarmScheduler>,
}

/// Creates and configures the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Task CRUD
        .route("/api/tasks", get(handlers::list_tasks))
        .route("/api/tasks", post(handlers::create_task))
        .route("/api/tasks/{id}", put(handlers::update_task))
        .route("/api/tasks/{id}", delete(handlers::delete_task))
        // Completion toggling
        .route("/api/tasks/{id}/complete", post(handlers::complete_task))
        .route("/api/tasks/{id}/complete", delete(handlers::reset_completion))
        // Skip window (weekly tasks only)
        .route("/api/tasks/{id}/skip", post(handlers::skip_task))
        .route("/api/tasks/{id}/skip", delete(handlers::cancel_skip))
        // Scheduled alarms view
        .route("/api/alarms", get(handlers::list_alarms))
        // Notification preferences
        .route("/api/settings", get(handlers::get_settings))
        .route("/api/settings", put(handlers::update_settings))
        // Adds the shared state to the application
        .with_state(state)
}
