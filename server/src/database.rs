// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use common::{Alarm, AlarmTimes, CreateTaskPayload, Settings, Task, TaskType};
use sqlx::types::Json;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool}; // Added MigrateDatabase for database_exists/create_database
use tracing::{debug, info};

/// Establishes the database connection pool.
/// If the database does not exist, it creates it.
/// It also ensures all tables have the correct schema.
pub async fn establish_connection_pool(database_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        info!("Creating database {}", database_url);
        Sqlite::create_database(database_url)
            .await
            .context("Failed to create database")?;
    } else {
        info!("Database already exists.");
    }

    let pool = SqlitePool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    create_schema(&pool).await?;

    info!("Database schema is ready.");

    Ok(pool)
}

/// Creates the `tasks`, `alarms` and `settings` tables and seeds the
/// single settings row. Shared between the server and the test helpers so
/// the schemas can never drift apart.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            task_time TIME NOT NULL,
            minutes_before INTEGER NOT NULL,
            task_type TEXT NOT NULL,
            week_days TEXT NOT NULL,
            is_completed BOOLEAN NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL,
            alarm_triggered_at TIMESTAMP NULL,
            skip_until DATE NULL,
            sound_uri TEXT NULL
        );
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create 'tasks' table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alarms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            scheduled_at TIMESTAMP NOT NULL,
            notify_at TIMESTAMP NOT NULL,
            is_triggered BOOLEAN NOT NULL DEFAULT 0,
            sound_uri TEXT NULL
        );
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create 'alarms' table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            notification_sound_enabled BOOLEAN NOT NULL DEFAULT 1,
            vibration_enabled BOOLEAN NOT NULL DEFAULT 1,
            custom_sound_uri TEXT NULL
        );
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create 'settings' table")?;

    sqlx::query("INSERT OR IGNORE INTO settings (id) VALUES (1)")
        .execute(pool)
        .await
        .context("Failed to seed the settings row")?;

    Ok(())
}

// --- Tasks ---

/// Inserts a new task into the database.
pub async fn create_task_in_db(pool: &SqlitePool, payload: CreateTaskPayload) -> Result<Task> {
    let created_at = Utc::now();
    // Week days only carry meaning for weekly tasks.
    let week_days = match payload.task_type {
        TaskType::WeeklyLoop => payload.week_days,
        TaskType::OneTime => Vec::new(),
    };

    debug!(
        "Insert values: title={}, task_time={}, minutes_before={}, task_type={:?}, week_days={:?}",
        payload.title, payload.task_time, payload.minutes_before, payload.task_type, week_days
    );

    let id = sqlx::query(
        "INSERT INTO tasks (title, task_time, minutes_before, task_type, week_days, is_completed, created_at, alarm_triggered_at, skip_until, sound_uri) \
         VALUES (?, ?, ?, ?, ?, 0, ?, NULL, NULL, ?)",
    )
    .bind(&payload.title)
    .bind(payload.task_time)
    .bind(payload.minutes_before)
    .bind(payload.task_type)
    .bind(Json(&week_days))
    .bind(created_at)
    .bind(&payload.sound_uri)
    .execute(pool)
    .await
    .context("Failed to insert task into DB")?
    .last_insert_rowid();

    let new_task = Task {
        id,
        title: payload.title,
        task_time: payload.task_time,
        minutes_before: payload.minutes_before,
        task_type: payload.task_type,
        week_days: Json(week_days),
        is_completed: false,
        created_at,
        alarm_triggered_at: None,
        skip_until: None,
        sound_uri: payload.sound_uri,
    };

    Ok(new_task)
}

/// Retrieves a single task by ID. A missing task is not an error.
pub async fn get_task_from_db(pool: &SqlitePool, task_id: i64) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(task_id)
        .fetch_optional(pool)
        .await
        .context(format!("Failed to retrieve task {} from DB", task_id))?;

    Ok(task)
}

/// Retrieves all tasks, newest first.
pub async fn get_all_tasks_from_db(pool: &SqlitePool) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>("SELECT * FROM tasks ORDER BY created_at DESC, id DESC")
        .fetch_all(pool)
        .await
        .context("Failed to retrieve tasks from DB")?;

    Ok(tasks)
}

/// Applies a wholesale update to the schedule-defining fields of a task.
/// Completion state, trigger timestamp and skip window are untouched.
/// Returns the updated task, or `None` when no task with the ID exists.
pub async fn update_task_in_db(
    pool: &SqlitePool,
    task_id: i64,
    payload: CreateTaskPayload,
) -> Result<Option<Task>> {
    let week_days = match payload.task_type {
        TaskType::WeeklyLoop => payload.week_days,
        TaskType::OneTime => Vec::new(),
    };

    let result = sqlx::query(
        "UPDATE tasks SET title = ?, task_time = ?, minutes_before = ?, task_type = ?, week_days = ?, sound_uri = ? WHERE id = ?",
    )
    .bind(&payload.title)
    .bind(payload.task_time)
    .bind(payload.minutes_before)
    .bind(payload.task_type)
    .bind(Json(&week_days))
    .bind(&payload.sound_uri)
    .bind(task_id)
    .execute(pool)
    .await
    .context(format!("Failed to update task {} in DB", task_id))?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get_task_from_db(pool, task_id).await
}

/// Sets or clears the completion flag.
/// Clearing it also clears `alarm_triggered_at`, re-arming the task.
pub async fn set_task_completed_in_db(
    pool: &SqlitePool,
    task_id: i64,
    completed: bool,
) -> Result<bool> {
    let query = if completed {
        "UPDATE tasks SET is_completed = 1 WHERE id = ?"
    } else {
        "UPDATE tasks SET is_completed = 0, alarm_triggered_at = NULL WHERE id = ?"
    };

    let result = sqlx::query(query)
        .bind(task_id)
        .execute(pool)
        .await
        .context(format!("Failed to set completion on task {}", task_id))?;

    Ok(result.rows_affected() > 0)
}

/// Sets or clears the skip window of a task.
pub async fn set_task_skip_in_db(
    pool: &SqlitePool,
    task_id: i64,
    skip_until: Option<NaiveDate>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE tasks SET skip_until = ? WHERE id = ?")
        .bind(skip_until)
        .bind(task_id)
        .execute(pool)
        .await
        .context(format!("Failed to set skip window on task {}", task_id))?;

    Ok(result.rows_affected() > 0)
}

/// Deletes a task. Returns `false` when no task with the ID exists.
pub async fn delete_task_in_db(pool: &SqlitePool, task_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task_id)
        .execute(pool)
        .await
        .context(format!("Failed to delete task {}", task_id))?;

    let rows_affected = result.rows_affected();
    info!("Deleted {} row(s) for task ID: {}", rows_affected, task_id);

    Ok(rows_affected > 0)
}

/// Bulk-deletes expired one-time tasks and their alarms.
///
/// A task expires when its alarm fired before `threshold`. Weekly tasks
/// and tasks whose alarm never fired are never selected.
pub async fn delete_expired_tasks_in_db(
    pool: &SqlitePool,
    threshold: DateTime<Utc>,
) -> Result<u64> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to open cleanup transaction")?;

    sqlx::query(
        "DELETE FROM alarms WHERE task_id IN \
         (SELECT id FROM tasks WHERE task_type = ? AND alarm_triggered_at IS NOT NULL AND alarm_triggered_at < ?)",
    )
    .bind(TaskType::OneTime)
    .bind(threshold)
    .execute(&mut *tx)
    .await
    .context("Failed to delete alarms of expired tasks")?;

    let result = sqlx::query(
        "DELETE FROM tasks WHERE task_type = ? AND alarm_triggered_at IS NOT NULL AND alarm_triggered_at < ?",
    )
    .bind(TaskType::OneTime)
    .bind(threshold)
    .execute(&mut *tx)
    .await
    .context("Failed to delete expired tasks")?;

    tx.commit()
        .await
        .context("Failed to commit cleanup transaction")?;

    Ok(result.rows_affected())
}

// --- Alarms ---

/// Replaces the live alarm of a task with a freshly projected one.
/// Any untriggered alarm for the task is removed first, so at most one
/// live alarm per task ever exists.
pub async fn upsert_alarm_in_db(
    pool: &SqlitePool,
    task_id: i64,
    times: &AlarmTimes,
    sound_uri: Option<&str>,
) -> Result<Alarm> {
    sqlx::query("DELETE FROM alarms WHERE task_id = ? AND is_triggered = 0")
        .bind(task_id)
        .execute(pool)
        .await
        .context(format!("Failed to replace live alarm of task {}", task_id))?;

    let id = sqlx::query(
        "INSERT INTO alarms (task_id, scheduled_at, notify_at, is_triggered, sound_uri) \
         VALUES (?, ?, ?, 0, ?)",
    )
    .bind(task_id)
    .bind(times.scheduled_at)
    .bind(times.notify_at)
    .bind(sound_uri)
    .execute(pool)
    .await
    .context(format!("Failed to insert alarm for task {}", task_id))?
    .last_insert_rowid();

    debug!(
        "Armed alarm {} for task {} (notify_at {}).",
        id, task_id, times.notify_at
    );

    Ok(Alarm {
        id,
        task_id,
        scheduled_at: times.scheduled_at,
        notify_at: times.notify_at,
        is_triggered: false,
        sound_uri: sound_uri.map(str::to_string),
    })
}

/// Removes a single alarm. Returns `false` when no alarm with the ID exists.
pub async fn cancel_alarm_in_db(pool: &SqlitePool, alarm_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM alarms WHERE id = ?")
        .bind(alarm_id)
        .execute(pool)
        .await
        .context(format!("Failed to cancel alarm {}", alarm_id))?;

    Ok(result.rows_affected() > 0)
}

/// Removes every live alarm of a task (used on task update/delete).
/// Returns the removed IDs so their host timers can be unregistered too.
pub async fn cancel_alarms_for_task_in_db(pool: &SqlitePool, task_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "DELETE FROM alarms WHERE task_id = ? AND is_triggered = 0 RETURNING id",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context(format!("Failed to cancel alarms of task {}", task_id))?;

    Ok(ids)
}

/// Retrieves the live (untriggered) alarms, ordered by notify time.
pub async fn get_scheduled_alarms_from_db(pool: &SqlitePool) -> Result<Vec<Alarm>> {
    let alarms = sqlx::query_as::<_, Alarm>(
        "SELECT * FROM alarms WHERE is_triggered = 0 ORDER BY notify_at ASC",
    )
    .fetch_all(pool)
    .await
    .context("Failed to retrieve scheduled alarms from DB")?;

    Ok(alarms)
}

/// Retrieves the live alarms whose notify time is at or before `cutoff`.
pub async fn get_due_alarms_from_db(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Alarm>> {
    let alarms = sqlx::query_as::<_, Alarm>(
        "SELECT * FROM alarms WHERE is_triggered = 0 AND notify_at <= ? ORDER BY notify_at ASC",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .context("Failed to retrieve due alarms from DB")?;

    Ok(alarms)
}

/// Marks an alarm as triggered and stamps the owning task's
/// `alarm_triggered_at`, both exactly once. A second call for the same
/// alarm is a no-op and never overwrites the first timestamp.
/// Returns `true` when this call performed the transition.
pub async fn mark_alarm_triggered_in_db(
    pool: &SqlitePool,
    alarm_id: i64,
    triggered_at: DateTime<Utc>,
) -> Result<bool> {
    let result =
        sqlx::query("UPDATE alarms SET is_triggered = 1 WHERE id = ? AND is_triggered = 0")
            .bind(alarm_id)
            .execute(pool)
            .await
            .context(format!("Failed to mark alarm {} as triggered", alarm_id))?;

    if result.rows_affected() == 0 {
        debug!("Alarm {} was already triggered or is gone.", alarm_id);
        return Ok(false);
    }

    sqlx::query(
        "UPDATE tasks SET alarm_triggered_at = ? \
         WHERE id = (SELECT task_id FROM alarms WHERE id = ?) AND alarm_triggered_at IS NULL",
    )
    .bind(triggered_at)
    .bind(alarm_id)
    .execute(pool)
    .await
    .context(format!(
        "Failed to stamp trigger time for the task of alarm {}",
        alarm_id
    ))?;

    Ok(true)
}

// --- Settings ---

/// Retrieves the current settings snapshot, falling back to the defaults
/// when the row is missing.
pub async fn get_settings_from_db(pool: &SqlitePool) -> Result<Settings> {
    let settings = sqlx::query_as::<_, Settings>(
        "SELECT notification_sound_enabled, vibration_enabled, custom_sound_uri FROM settings WHERE id = 1",
    )
    .fetch_optional(pool)
    .await
    .context("Failed to retrieve settings from DB")?;

    Ok(settings.unwrap_or_default())
}

/// Replaces the settings snapshot.
pub async fn update_settings_in_db(pool: &SqlitePool, settings: &Settings) -> Result<()> {
    sqlx::query(
        "UPDATE settings SET notification_sound_enabled = ?, vibration_enabled = ?, custom_sound_uri = ? WHERE id = 1",
    )
    .bind(settings.notification_sound_enabled)
    .bind(settings.vibration_enabled)
    .bind(&settings.custom_sound_uri)
    .execute(pool)
    .await
    .context("Failed to update settings in DB")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime, TimeZone, Weekday};

    /// Helper function to set up an in-memory SQLite database for testing.
    /// This creates a fresh, empty database for each test, ensuring they are isolated.
    async fn setup_test_db() -> Result<SqlitePool> {
        // Use :memory: to create an in-memory database
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        create_schema(&pool).await?;
        Ok(pool)
    }

    fn weekly_payload(title: &str) -> CreateTaskPayload {
        CreateTaskPayload {
            title: title.to_string(),
            task_time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            minutes_before: 5,
            task_type: TaskType::WeeklyLoop,
            week_days: vec![Weekday::Mon, Weekday::Thu],
            sound_uri: None,
        }
    }

    fn one_time_payload(title: &str) -> CreateTaskPayload {
        CreateTaskPayload {
            title: title.to_string(),
            task_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            minutes_before: 10,
            task_type: TaskType::OneTime,
            week_days: vec![],
            sound_uri: None,
        }
    }

    fn times(scheduled_at: DateTime<Utc>, lead_minutes: i64) -> AlarmTimes {
        AlarmTimes {
            scheduled_at,
            notify_at: scheduled_at - Duration::minutes(lead_minutes),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_task() {
        let pool = setup_test_db().await.unwrap();

        // Act: Create a new task in the test database
        let created = create_task_in_db(&pool, weekly_payload("Water the plants"))
            .await
            .unwrap();

        // Assert: The created task has the correct data
        assert!(created.id > 0);
        assert_eq!(created.title, "Water the plants");
        assert_eq!(created.task_type, TaskType::WeeklyLoop);
        assert_eq!(created.week_days.0, vec![Weekday::Mon, Weekday::Thu]);
        assert!(!created.is_completed);

        // Act: Read it back
        let fetched = get_task_from_db(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, created.title);
        assert_eq!(fetched.week_days.0, created.week_days.0);
        assert_eq!(fetched.task_time, created.task_time);
    }

    #[tokio::test]
    async fn test_one_time_task_stores_no_week_days() {
        let pool = setup_test_db().await.unwrap();

        let mut payload = one_time_payload("Dentist");
        // Week days on a one-time payload are ignored, not persisted.
        payload.week_days = vec![Weekday::Fri];

        let created = create_task_in_db(&pool, payload).await.unwrap();
        assert!(created.week_days.0.is_empty());
    }

    #[tokio::test]
    async fn test_update_task_preserves_runtime_state() {
        let pool = setup_test_db().await.unwrap();
        let created = create_task_in_db(&pool, weekly_payload("Old title"))
            .await
            .unwrap();
        set_task_skip_in_db(
            &pool,
            created.id,
            Some(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()),
        )
        .await
        .unwrap();

        // Act: wholesale update of the schedule fields
        let mut payload = weekly_payload("New title");
        payload.minutes_before = 15;
        let updated = update_task_in_db(&pool, created.id, payload)
            .await
            .unwrap()
            .unwrap();

        // Assert: schedule fields changed, runtime state survived
        assert_eq!(updated.title, "New title");
        assert_eq!(updated.minutes_before, 15);
        assert_eq!(
            updated.skip_until,
            Some(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap())
        );

        // Updating a missing task reports None
        let missing = update_task_in_db(&pool, 9999, weekly_payload("x"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_reset_completion_clears_trigger_timestamp() {
        let pool = setup_test_db().await.unwrap();
        let created = create_task_in_db(&pool, one_time_payload("Dentist"))
            .await
            .unwrap();
        let scheduled_at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let alarm = upsert_alarm_in_db(&pool, created.id, &times(scheduled_at, 10), None)
            .await
            .unwrap();
        mark_alarm_triggered_in_db(&pool, alarm.id, scheduled_at)
            .await
            .unwrap();
        set_task_completed_in_db(&pool, created.id, true)
            .await
            .unwrap();

        // Act: reset
        set_task_completed_in_db(&pool, created.id, false)
            .await
            .unwrap();

        let fetched = get_task_from_db(&pool, created.id).await.unwrap().unwrap();
        assert!(!fetched.is_completed);
        assert!(fetched.alarm_triggered_at.is_none());
    }

    #[tokio::test]
    async fn test_upsert_alarm_keeps_a_single_live_alarm() {
        let pool = setup_test_db().await.unwrap();
        let task = create_task_in_db(&pool, weekly_payload("Water the plants"))
            .await
            .unwrap();
        let first_at = Utc.with_ymd_and_hms(2024, 1, 1, 18, 30, 0).unwrap();
        let second_at = Utc.with_ymd_and_hms(2024, 1, 4, 18, 30, 0).unwrap();

        // Act: arm twice
        upsert_alarm_in_db(&pool, task.id, &times(first_at, 5), None)
            .await
            .unwrap();
        let replacement = upsert_alarm_in_db(&pool, task.id, &times(second_at, 5), None)
            .await
            .unwrap();

        // Assert: exactly one live alarm remains, the replacement
        let alarms = get_scheduled_alarms_from_db(&pool).await.unwrap();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].id, replacement.id);
        assert_eq!(alarms[0].scheduled_at, second_at);
    }

    #[tokio::test]
    async fn test_scheduled_alarms_ordered_and_exclude_triggered() {
        let pool = setup_test_db().await.unwrap();
        let early = create_task_in_db(&pool, weekly_payload("Early"))
            .await
            .unwrap();
        let late = create_task_in_db(&pool, weekly_payload("Late"))
            .await
            .unwrap();
        let fired = create_task_in_db(&pool, weekly_payload("Fired"))
            .await
            .unwrap();

        let base = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let late_alarm =
            upsert_alarm_in_db(&pool, late.id, &times(base + Duration::hours(4), 5), None)
                .await
                .unwrap();
        let early_alarm = upsert_alarm_in_db(&pool, early.id, &times(base, 5), None)
            .await
            .unwrap();
        let fired_alarm =
            upsert_alarm_in_db(&pool, fired.id, &times(base + Duration::hours(1), 5), None)
                .await
                .unwrap();
        mark_alarm_triggered_in_db(&pool, fired_alarm.id, base)
            .await
            .unwrap();

        // Assert: ascending notify_at, triggered alarm filtered out
        let alarms = get_scheduled_alarms_from_db(&pool).await.unwrap();
        assert_eq!(alarms.len(), 2);
        assert_eq!(alarms[0].id, early_alarm.id);
        assert_eq!(alarms[1].id, late_alarm.id);
    }

    #[tokio::test]
    async fn test_cancel_alarms_for_task_returns_cancelled_ids() {
        let pool = setup_test_db().await.unwrap();
        let task = create_task_in_db(&pool, weekly_payload("Water the plants"))
            .await
            .unwrap();
        let scheduled_at = Utc.with_ymd_and_hms(2024, 1, 1, 18, 30, 0).unwrap();
        let alarm = upsert_alarm_in_db(&pool, task.id, &times(scheduled_at, 5), None)
            .await
            .unwrap();

        let cancelled = cancel_alarms_for_task_in_db(&pool, task.id).await.unwrap();
        assert_eq!(cancelled, vec![alarm.id]);

        // Second cancel finds nothing
        let cancelled = cancel_alarms_for_task_in_db(&pool, task.id).await.unwrap();
        assert!(cancelled.is_empty());
    }

    #[tokio::test]
    async fn test_mark_alarm_triggered_is_first_write_wins() {
        let pool = setup_test_db().await.unwrap();
        let task = create_task_in_db(&pool, one_time_payload("Dentist"))
            .await
            .unwrap();
        let scheduled_at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let alarm = upsert_alarm_in_db(&pool, task.id, &times(scheduled_at, 10), None)
            .await
            .unwrap();
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 8, 50, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();

        // Act: trigger twice
        assert!(mark_alarm_triggered_in_db(&pool, alarm.id, first)
            .await
            .unwrap());
        assert!(!mark_alarm_triggered_in_db(&pool, alarm.id, second)
            .await
            .unwrap());

        // Assert: the first timestamp stands
        let fetched = get_task_from_db(&pool, task.id).await.unwrap().unwrap();
        assert_eq!(fetched.alarm_triggered_at, Some(first));
    }

    #[tokio::test]
    async fn test_cleanup_deletes_only_expired_one_time_tasks() {
        let pool = setup_test_db().await.unwrap();

        // One-time task whose alarm fired at 08:50 on Jan 1st.
        let expired = create_task_in_db(&pool, one_time_payload("Dentist"))
            .await
            .unwrap();
        let scheduled_at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let fired_at = Utc.with_ymd_and_hms(2024, 1, 1, 8, 50, 0).unwrap();
        let alarm = upsert_alarm_in_db(&pool, expired.id, &times(scheduled_at, 10), None)
            .await
            .unwrap();
        mark_alarm_triggered_in_db(&pool, alarm.id, fired_at)
            .await
            .unwrap();

        // A sweep one minute before the 24h mark deletes nothing...
        let before = Utc.with_ymd_and_hms(2024, 1, 2, 8, 49, 0).unwrap() - Duration::hours(24);
        assert_eq!(delete_expired_tasks_in_db(&pool, before).await.unwrap(), 0);

        // ...one minute after it deletes the task and its alarm.
        let after = Utc.with_ymd_and_hms(2024, 1, 2, 8, 51, 0).unwrap() - Duration::hours(24);
        assert_eq!(delete_expired_tasks_in_db(&pool, after).await.unwrap(), 1);
        assert!(get_task_from_db(&pool, expired.id).await.unwrap().is_none());
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alarms")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_cleanup_never_touches_weekly_or_untriggered_tasks() {
        let pool = setup_test_db().await.unwrap();

        // Weekly task triggered 40 hours ago.
        let weekly = create_task_in_db(&pool, weekly_payload("Water the plants"))
            .await
            .unwrap();
        let fired_at = Utc::now() - Duration::hours(40);
        let alarm = upsert_alarm_in_db(
            &pool,
            weekly.id,
            &times(fired_at + Duration::minutes(5), 5),
            None,
        )
        .await
        .unwrap();
        mark_alarm_triggered_in_db(&pool, alarm.id, fired_at)
            .await
            .unwrap();

        // One-time task whose alarm never fired.
        let untriggered = create_task_in_db(&pool, one_time_payload("Never fired"))
            .await
            .unwrap();

        let deleted = delete_expired_tasks_in_db(&pool, Utc::now()).await.unwrap();

        assert_eq!(deleted, 0);
        assert!(get_task_from_db(&pool, weekly.id).await.unwrap().is_some());
        assert!(get_task_from_db(&pool, untriggered.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_settings_roundtrip_and_defaults() {
        let pool = setup_test_db().await.unwrap();

        // The seeded row matches the defaults.
        let settings = get_settings_from_db(&pool).await.unwrap();
        assert!(settings.notification_sound_enabled);
        assert!(settings.vibration_enabled);
        assert!(settings.custom_sound_uri.is_none());

        // Act: update and read back
        let updated = Settings {
            notification_sound_enabled: false,
            vibration_enabled: true,
            custom_sound_uri: Some("content://sounds/bell".to_string()),
        };
        update_settings_in_db(&pool, &updated).await.unwrap();

        let fetched = get_settings_from_db(&pool).await.unwrap();
        assert!(!fetched.notification_sound_enabled);
        assert_eq!(
            fetched.custom_sound_uri.as_deref(),
            Some("content://sounds/bell")
        );
    }
}
