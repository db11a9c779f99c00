// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use thiserror::Error;

/// Maximum number of characters allowed in a task title.
pub const MAX_TITLE_LEN: usize = 100;

/// Maximum notification lead time, in minutes.
pub const MAX_MINUTES_BEFORE: i64 = 60;

/// One-time tasks expire this many hours after their alarm fired.
pub const EXPIRY_AFTER_TRIGGER_HOURS: i64 = 24;

/// How a task repeats.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "snake_case")]
pub enum TaskType {
    /// Fires once, on the day the task was created.
    OneTime,
    /// Fires every week on the selected week days.
    WeeklyLoop,
}

/// Errors raised when a payload or model violates a constructor invariant.
/// These are rejected before anything is persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title cannot be blank")]
    BlankTitle,
    #[error("title cannot exceed {} characters", MAX_TITLE_LEN)]
    TitleTooLong,
    #[error("minutes_before must be between 0 and {}", MAX_MINUTES_BEFORE)]
    MinutesBeforeOutOfRange,
    #[error("weekly tasks need at least one week day")]
    EmptyWeekDays,
    #[error("only weekly tasks can be skipped")]
    SkipOnOneTimeTask,
    #[error("notify_at cannot fall after scheduled_at")]
    NotifyAfterScheduled,
}

/// Represents a reminder task within the system.
///
/// Derivation attributes (derive):
/// - `Serialize`, `Deserialize`: Allows conversion to/from JSON.
/// - `Debug`: Enables displaying the structure for debugging.
/// - `Clone`: Allows creating copies of the object.
/// - `sqlx::FromRow`: Allows `sqlx` to create a `Task` instance directly
///   from a database result row.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Task {
    #[sqlx(rename = "id")]
    pub id: i64,

    #[sqlx(rename = "title")]
    pub title: String,

    // Time-of-day at which the underlying event occurs, in UTC.
    #[sqlx(rename = "task_time")]
    pub task_time: NaiveTime,

    // Notification lead time: the alarm fires this many minutes
    // before `task_time`.
    #[sqlx(rename = "minutes_before")]
    pub minutes_before: i64,

    #[sqlx(rename = "task_type")]
    pub task_type: TaskType,

    // Non-empty for weekly tasks, empty for one-time tasks.
    // Stored as a JSON array in a TEXT column.
    #[sqlx(rename = "week_days")]
    pub week_days: Json<Vec<Weekday>>,

    #[sqlx(rename = "is_completed")]
    pub is_completed: bool,

    #[sqlx(rename = "created_at")]
    pub created_at: DateTime<Utc>,

    // Stamped exactly once, when the bound alarm fires.
    #[sqlx(rename = "alarm_triggered_at")]
    pub alarm_triggered_at: Option<DateTime<Utc>>,

    // Weekly tasks only: the task is inactive on every date up to and
    // including this one.
    #[sqlx(rename = "skip_until")]
    pub skip_until: Option<NaiveDate>,

    // Custom notification sound carried over to the derived alarm.
    #[sqlx(rename = "sound_uri")]
    pub sound_uri: Option<String>,
}

/// A single scheduled notification occurrence, derived from a task.
///
/// The task is the source of truth; an alarm is a replaceable projection
/// of the task's next firing. At most one live (untriggered) alarm exists
/// per task at any time.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Alarm {
    #[sqlx(rename = "id")]
    pub id: i64,

    #[sqlx(rename = "task_id")]
    pub task_id: i64,

    // When the underlying event occurs.
    #[sqlx(rename = "scheduled_at")]
    pub scheduled_at: DateTime<Utc>,

    // When the notification should fire. Always at or before `scheduled_at`.
    #[sqlx(rename = "notify_at")]
    pub notify_at: DateTime<Utc>,

    #[sqlx(rename = "is_triggered")]
    pub is_triggered: bool,

    #[sqlx(rename = "sound_uri")]
    pub sound_uri: Option<String>,
}

/// The `(scheduled_at, notify_at)` pair for one task occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmTimes {
    pub scheduled_at: DateTime<Utc>,
    pub notify_at: DateTime<Utc>,
}

/// Read-only notification preferences consumed when an alarm fires.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Settings {
    #[sqlx(rename = "notification_sound_enabled")]
    pub notification_sound_enabled: bool,

    #[sqlx(rename = "vibration_enabled")]
    pub vibration_enabled: bool,

    #[sqlx(rename = "custom_sound_uri")]
    pub custom_sound_uri: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notification_sound_enabled: true,
            vibration_enabled: true,
            custom_sound_uri: None,
        }
    }
}

/// Structure used to receive task creation data from the API.
/// It's a good practice to separate database models (`Task`)
/// from API models (`CreateTaskPayload`), as they may have different fields.
/// The same shape is used for wholesale task updates.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateTaskPayload {
    pub title: String,
    pub task_time: NaiveTime,
    pub minutes_before: i64,
    pub task_type: TaskType,
    // Optional in the payload; required non-empty for weekly tasks.
    #[serde(default)]
    pub week_days: Vec<Weekday>,
    pub sound_uri: Option<String>,
}

impl CreateTaskPayload {
    /// Checks the task constructor invariants. Violations are rejected
    /// here, before anything reaches the database.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::BlankTitle);
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong);
        }
        if !(0..=MAX_MINUTES_BEFORE).contains(&self.minutes_before) {
            return Err(ValidationError::MinutesBeforeOutOfRange);
        }
        if self.task_type == TaskType::WeeklyLoop && self.week_days.is_empty() {
            return Err(ValidationError::EmptyWeekDays);
        }
        Ok(())
    }
}

/// Structure used to receive a skip request from the API.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SkipPayload {
    pub until: NaiveDate,
}

impl Task {
    /// Returns `true` when the task is inactive on `date` because of a
    /// pending skip. The boundary date itself is skipped.
    pub fn is_skipped(&self, date: NaiveDate) -> bool {
        matches!(self.skip_until, Some(until) if date <= until)
    }

    /// Decides whether the task is active on a calendar date.
    ///
    /// Completed or skipped tasks are never active. One-time tasks are
    /// active only on the day they were created; weekly tasks are active
    /// on their selected week days.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        if self.is_completed || self.is_skipped(date) {
            return false;
        }
        match self.task_type {
            TaskType::OneTime => date == self.created_at.date_naive(),
            TaskType::WeeklyLoop => self.week_days.0.contains(&date.weekday()),
        }
    }

    pub fn complete(&mut self) {
        self.is_completed = true;
    }

    /// Clears the completion flag and the trigger timestamp, re-arming
    /// the task for its next occurrence.
    pub fn reset_completion(&mut self) {
        self.is_completed = false;
        self.alarm_triggered_at = None;
    }

    /// Deactivates the task up to and including `until`. Only legal on
    /// weekly tasks.
    pub fn skip(&mut self, until: NaiveDate) -> Result<(), ValidationError> {
        if self.task_type != TaskType::WeeklyLoop {
            return Err(ValidationError::SkipOnOneTimeTask);
        }
        self.skip_until = Some(until);
        Ok(())
    }

    pub fn cancel_skip(&mut self) {
        self.skip_until = None;
    }

    /// Sole authority used by the cleanup sweep.
    ///
    /// Weekly tasks are never auto-deleted. A task whose alarm never fired
    /// is never auto-deleted either, however old it is; expiry is keyed to
    /// the firing time so that "expires 24h after it rang" holds even when
    /// the alarm fired late.
    pub fn should_be_deleted(&self, now: DateTime<Utc>) -> bool {
        if self.task_type == TaskType::WeeklyLoop {
            return false;
        }
        match self.alarm_triggered_at {
            None => false,
            Some(triggered_at) => now - triggered_at >= Duration::hours(EXPIRY_AFTER_TRIGGER_HOURS),
        }
    }

    /// Projects the task's next firing after the given instant.
    ///
    /// Returns `None` when the task has nothing left to fire: it is
    /// completed, its one-time occurrence has passed, or no active week
    /// day carries a future notify point.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<AlarmTimes> {
        if self.is_completed {
            return None;
        }
        match self.task_type {
            TaskType::OneTime => {
                let times = self.times_on(self.created_at.date_naive());
                (times.notify_at > after).then_some(times)
            }
            TaskType::WeeklyLoop => {
                let mut start = after.date_naive();
                if let Some(until) = self.skip_until {
                    if until >= start {
                        start = until.succ_opt()?;
                    }
                }
                // Eight days: if today's occurrence has already passed,
                // the same week day next week is the candidate.
                for offset in 0..=7 {
                    let date = start + Duration::days(offset);
                    if !self.is_active_on(date) {
                        continue;
                    }
                    let times = self.times_on(date);
                    if times.notify_at > after {
                        return Some(times);
                    }
                }
                None
            }
        }
    }

    fn times_on(&self, date: NaiveDate) -> AlarmTimes {
        let scheduled_at = date.and_time(self.task_time).and_utc();
        AlarmTimes {
            scheduled_at,
            notify_at: scheduled_at - Duration::minutes(self.minutes_before),
        }
    }
}

impl Alarm {
    /// Checks the alarm invariant. Reconciliation uses this to skip
    /// corrupt rows without aborting the batch.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.notify_at > self.scheduled_at {
            return Err(ValidationError::NotifyAfterScheduled);
        }
        Ok(())
    }
}
