// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::database;
use crate::routes::AppState;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use common::{Alarm, CreateTaskPayload, Settings, SkipPayload, Task};
use tracing::{debug, error, info};

/// Handler for listing all tasks.
pub async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = database::get_all_tasks_from_db(&state.pool).await?;
    info!("Successfully retrieved {} tasks.", tasks.len());
    Ok(Json(tasks))
}

/// Handler for creating a new task. The task is validated, persisted and
/// armed with its first alarm in one go.
#[allow(clippy::uninlined_format_args)]
pub async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskPayload>, // Extracting the request body as JSON
) -> Result<(StatusCode, Json<Task>), AppError> {
    debug!("Received request to create task: {}", payload.title);

    if let Err(e) = payload.validate() {
        error!("Validation failed: {}", e);
        return Err(AppError::new(StatusCode::BAD_REQUEST, &e.to_string()));
    }

    let new_task = database::create_task_in_db(&state.pool, payload).await?;
    rearm_task(&state, &new_task).await?;

    info!("Task created successfully with ID: {}", new_task.id);

    // Return a 201 Created status with the new task as JSON.
    Ok((StatusCode::CREATED, Json(new_task)))
}

/// Handler for a wholesale update of a task's schedule fields.
/// The live alarm is replaced by one projected from the new schedule.
#[allow(clippy::uninlined_format_args)]
pub async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(payload): Json<CreateTaskPayload>,
) -> Result<Json<Task>, AppError> {
    debug!("Received request to update task {}.", task_id);

    if let Err(e) = payload.validate() {
        error!("Validation failed: {}", e);
        return Err(AppError::new(StatusCode::BAD_REQUEST, &e.to_string()));
    }

    let Some(updated) = database::update_task_in_db(&state.pool, task_id, payload).await? else {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            &format!("Task with ID {} not found.", task_id),
        ));
    };

    rearm_task(&state, &updated).await?;

    info!("Task {} updated successfully.", task_id);
    Ok(Json(updated))
}

/// Handler for deleting a task by ID. Its alarm and timer go with it.
#[allow(clippy::uninlined_format_args)]
pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>, // Extract task ID from the URL path
) -> Result<StatusCode, AppError> {
    debug!("Attempting to delete task with ID: {}", task_id);

    disarm_task(&state, task_id).await?;
    let deleted = database::delete_task_in_db(&state.pool, task_id).await?;

    if deleted {
        info!("Task with ID {} deleted successfully.", task_id);
        Ok(StatusCode::NO_CONTENT) // 204 No Content for successful deletion
    } else {
        error!("Task with ID {} not found for deletion.", task_id);
        Err(AppError::new(
            StatusCode::NOT_FOUND,
            &format!("Task with ID {} not found for deletion.", task_id),
        ))
    }
}

/// Handler for marking a task completed. A completed task has nothing
/// left to fire, so its live alarm is cancelled.
#[allow(clippy::uninlined_format_args)]
pub async fn complete_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let updated = database::set_task_completed_in_db(&state.pool, task_id, true).await?;
    if !updated {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            &format!("Task with ID {} not found.", task_id),
        ));
    }

    disarm_task(&state, task_id).await?;

    info!("Task {} marked as completed.", task_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for resetting a task's completion. The trigger timestamp is
/// cleared as well, and the task is re-armed for its next occurrence.
#[allow(clippy::uninlined_format_args)]
pub async fn reset_completion(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    let updated = database::set_task_completed_in_db(&state.pool, task_id, false).await?;
    if !updated {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            &format!("Task with ID {} not found.", task_id),
        ));
    }

    let Some(task) = database::get_task_from_db(&state.pool, task_id).await? else {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            &format!("Task with ID {} not found.", task_id),
        ));
    };

    rearm_task(&state, &task).await?;

    info!("Task {} completion reset.", task_id);
    Ok(Json(task))
}

/// Handler for skipping a weekly task up to (and including) a date.
#[allow(clippy::uninlined_format_args)]
pub async fn skip_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(payload): Json<SkipPayload>,
) -> Result<Json<Task>, AppError> {
    let Some(mut task) = database::get_task_from_db(&state.pool, task_id).await? else {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            &format!("Task with ID {} not found.", task_id),
        ));
    };

    // Only weekly tasks can be skipped; the model enforces it.
    if let Err(e) = task.skip(payload.until) {
        error!("Validation failed: {}", e);
        return Err(AppError::new(StatusCode::BAD_REQUEST, &e.to_string()));
    }

    database::set_task_skip_in_db(&state.pool, task_id, Some(payload.until)).await?;
    rearm_task(&state, &task).await?;

    info!("Task {} skipped until {}.", task_id, payload.until);
    Ok(Json(task))
}

/// Handler for cancelling a pending skip.
#[allow(clippy::uninlined_format_args)]
pub async fn cancel_skip(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    let Some(mut task) = database::get_task_from_db(&state.pool, task_id).await? else {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            &format!("Task with ID {} not found.", task_id),
        ));
    };

    task.cancel_skip();
    database::set_task_skip_in_db(&state.pool, task_id, None).await?;
    rearm_task(&state, &task).await?;

    info!("Skip cancelled on task {}.", task_id);
    Ok(Json(task))
}

/// Handler for listing the scheduled (untriggered) alarms.
pub async fn list_alarms(State(state): State<AppState>) -> Result<Json<Vec<Alarm>>, AppError> {
    let alarms = database::get_scheduled_alarms_from_db(&state.pool).await?;
    Ok(Json(alarms))
}

/// Handler for reading the settings snapshot.
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>, AppError> {
    let settings = database::get_settings_from_db(&state.pool).await?;
    Ok(Json(settings))
}

/// Handler for replacing the settings snapshot.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> Result<Json<Settings>, AppError> {
    database::update_settings_in_db(&state.pool, &settings).await?;
    info!("Settings updated.");
    Ok(Json(settings))
}

// --- Arming helpers shared by the task handlers ---

/// Cancels the live alarm of a task and, when the task still has an
/// upcoming occurrence, persists and registers a replacement.
async fn rearm_task(state: &AppState, task: &Task) -> Result<Option<Alarm>, AppError> {
    disarm_task(state, task.id).await?;

    let Some(times) = task.next_occurrence(Utc::now()) else {
        debug!("Task {} has no upcoming occurrence, nothing to arm.", task.id);
        return Ok(None);
    };

    let alarm =
        database::upsert_alarm_in_db(&state.pool, task.id, &times, task.sound_uri.as_deref())
            .await?;
    state.scheduler.schedule(alarm.clone()).await?;

    Ok(Some(alarm))
}

/// Cancels the persisted live alarm of a task together with any host
/// timer registered for it.
async fn disarm_task(state: &AppState, task_id: i64) -> Result<(), AppError> {
    let cancelled = database::cancel_alarms_for_task_in_db(&state.pool, task_id).await?;
    for alarm_id in cancelled {
        state.scheduler.cancel(alarm_id).await;
    }
    Ok(())
}

// --- Custom Error Handling ---
// This is a good practice for transforming our internal errors
// (e.g., from the database) into appropriate HTTP responses.

/// Our custom error type for the application.
#[derive(Debug)]
pub struct AppError {
    code: StatusCode,
    message: String,
}

impl AppError {
    fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

/// Allows converting an `anyhow::Error` (coming from `database.rs` or the
/// scheduler) into our `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Log the internal error for debugging.
        tracing::error!("Internal server error: {:?}", err);
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred.".to_string(),
        }
    }
}

/// Allows Axum to convert our `AppError` into an HTTP `Response`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(
            "Responding with error: status_code={}, message={}",
            self.code.as_u16(),
            self.message
        );
        (
            self.code,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
