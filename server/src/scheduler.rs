// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::database;
use crate::notification::Notifier;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use common::{Alarm, Settings};
use parking_lot::Mutex;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Title used when the owning task of a firing alarm cannot be found.
pub const FALLBACK_TITLE: &str = "Reminder";

/// Poll-loop alarms older than this are retired without delivery.
const STALE_GRACE_SECS: i64 = 300;

/// Binds alarms to a host timer facility.
///
/// Every implementation obeys the same two rules: scheduling an alarm ID
/// that already holds a timer replaces it, and an alarm whose notify time
/// is already past is silently skipped rather than fired immediately.
#[async_trait]
pub trait AlarmScheduler: Send + Sync {
    async fn schedule(&self, alarm: Alarm) -> Result<()>;

    /// Unregisters any pending timer for the alarm. No-op if absent.
    async fn cancel(&self, alarm_id: i64);
}

/// In-process scheduler: one delayed tokio task per alarm, keyed by alarm
/// ID in a map owned by this instance.
///
/// Timers die with the process; pairing this adapter with the startup
/// reconciliation pass restores them from the store.
pub struct TimerScheduler {
    inner: Arc<TimerSchedulerInner>,
}

struct TimerSchedulerInner {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
    timers: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl TimerScheduler {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(TimerSchedulerInner {
                pool,
                notifier,
                timers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of timers currently registered.
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.lock().len()
    }
}

#[async_trait]
impl AlarmScheduler for TimerScheduler {
    async fn schedule(&self, alarm: Alarm) -> Result<()> {
        let now = Utc::now();
        let alarm_id = alarm.id;

        let mut timers = self.inner.timers.lock();

        // Replace rule: a timer already registered under this ID goes away
        // before anything else happens, so an edited task can never ring twice.
        if let Some(old) = timers.remove(&alarm_id) {
            old.abort();
            debug!("Replaced pending timer for alarm {}.", alarm_id);
        }

        if alarm.notify_at <= now {
            // Stale alarms recovered after downtime are dropped, not fired.
            debug!(
                "Alarm {} is past due (notify_at {}), skipping registration.",
                alarm_id, alarm.notify_at
            );
            return Ok(());
        }

        let delay = (alarm.notify_at - now).to_std().unwrap_or_default();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            // Single winner against a late cancel: the firing only proceeds
            // when its own registration is still present. Once past this
            // point a concurrent cancel can no longer stop the delivery.
            if inner.timers.lock().remove(&alarm_id).is_none() {
                return;
            }
            fire_alarm(&inner.pool, inner.notifier.as_ref(), &alarm).await;
        });

        // The map lock is still held, so the callback cannot observe a
        // missing registration between spawn and insert.
        timers.insert(alarm_id, handle);
        debug!("Registered timer for alarm {} ({:?}).", alarm_id, delay);

        Ok(())
    }

    async fn cancel(&self, alarm_id: i64) {
        if let Some(handle) = self.inner.timers.lock().remove(&alarm_id) {
            handle.abort();
            debug!("Cancelled pending timer for alarm {}.", alarm_id);
        }
    }
}

/// Store-backed scheduler: registrations live only in the repository and a
/// periodic tick fires whatever has come due.
///
/// Nothing is held in process memory, so restarts need no re-arming; the
/// cancel-vs-fire race is delegated to the store's `is_triggered` state.
pub struct PollingScheduler {
    runner: JoinHandle<()>,
}

impl PollingScheduler {
    /// Spawns the tick loop and returns the scheduler handle.
    pub fn spawn(pool: SqlitePool, notifier: Arc<dyn Notifier>, tick: Duration) -> Self {
        let runner = tokio::spawn(async move {
            let mut interval = time::interval(tick);
            loop {
                interval.tick().await;
                if let Err(e) = poll_once(&pool, notifier.as_ref(), STALE_GRACE_SECS).await {
                    error!("Alarm poll pass failed: {:?}", e);
                }
            }
        });
        Self { runner }
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.runner.abort();
    }
}

#[async_trait]
impl AlarmScheduler for PollingScheduler {
    async fn schedule(&self, alarm: Alarm) -> Result<()> {
        // The persisted row is the registration; the tick loop picks it up.
        if alarm.notify_at <= Utc::now() {
            debug!(
                "Alarm {} is past due (notify_at {}), the poll loop will retire it.",
                alarm.id, alarm.notify_at
            );
        }
        Ok(())
    }

    async fn cancel(&self, alarm_id: i64) {
        // Row removal is the cancellation; the tick loop never sees the
        // alarm again.
        debug!("Cancel of alarm {} delegated to the store.", alarm_id);
    }
}

/// One pass of the polling adapter: fire fresh due alarms, retire stale
/// ones. Per-alarm failures are logged and do not stop the pass.
async fn poll_once(pool: &SqlitePool, notifier: &dyn Notifier, grace_secs: i64) -> Result<usize> {
    let now = Utc::now();
    let due = database::get_due_alarms_from_db(pool, now).await?;
    let mut fired = 0;

    for alarm in due {
        if now - alarm.notify_at > chrono::Duration::seconds(grace_secs) {
            // Long-downtime backlog: drop instead of firing a stale burst.
            debug!(
                "Retiring stale alarm {} (notify_at {}).",
                alarm.id, alarm.notify_at
            );
            if let Err(e) = database::cancel_alarm_in_db(pool, alarm.id).await {
                error!("Failed to retire stale alarm {}: {:?}", alarm.id, e);
            }
            continue;
        }
        fire_alarm(pool, notifier, &alarm).await;
        fired += 1;
    }

    Ok(fired)
}

/// The trigger sequence, executed exactly once per firing.
///
/// In order: mark the alarm triggered, look up the owning task (a missing
/// task falls back to a generic title), read the settings snapshot, show
/// the notification. A failing step is logged and never blocks the steps
/// after it; the earlier effects have already committed.
pub(crate) async fn fire_alarm(pool: &SqlitePool, notifier: &dyn Notifier, alarm: &Alarm) {
    let triggered_at = Utc::now();

    if let Err(e) = database::mark_alarm_triggered_in_db(pool, alarm.id, triggered_at).await {
        error!("Failed to mark alarm {} as triggered: {:?}", alarm.id, e);
    }

    let title = match database::get_task_from_db(pool, alarm.task_id).await {
        Ok(Some(task)) => task.title,
        Ok(None) => {
            warn!(
                "Task {} of alarm {} not found, using the fallback title.",
                alarm.task_id, alarm.id
            );
            FALLBACK_TITLE.to_string()
        }
        Err(e) => {
            error!(
                "Failed to load task {} of alarm {}: {:?}",
                alarm.task_id, alarm.id, e
            );
            FALLBACK_TITLE.to_string()
        }
    };

    let settings = match database::get_settings_from_db(pool).await {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to read settings for alarm {}: {:?}", alarm.id, e);
            Settings::default()
        }
    };

    let body = format!("Scheduled for {}.", alarm.scheduled_at.format("%H:%M"));
    let sound_uri = alarm
        .sound_uri
        .as_deref()
        .or(settings.custom_sound_uri.as_deref());
    notifier.show(
        &title,
        &body,
        sound_uri,
        settings.notification_sound_enabled,
        settings.vibration_enabled,
    );

    info!("Alarm {} fired for task {}.", alarm.id, alarm.task_id);
}
