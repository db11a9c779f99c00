// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::database;
use crate::scheduler::AlarmScheduler;
use anyhow::Result;
use chrono::Utc;
use common::EXPIRY_AFTER_TRIGGER_HOURS;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

/// Fixed period of the cleanup sweep.
pub const CLEANUP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Shared guard that keeps overlapping sweep runs from double-executing.
pub type SweepGuard = Arc<Mutex<()>>;

/// Re-registers every untriggered alarm with the live scheduler.
///
/// Run at every process start that may have lost live timers. Each alarm
/// is handled independently: a corrupt row or a failed registration is
/// logged and skipped, never escalated. Safe to invoke repeatedly thanks
/// to the scheduler's replace rule. Returns the number of alarms re-armed.
pub async fn reconcile_alarms(pool: &SqlitePool, scheduler: &dyn AlarmScheduler) -> usize {
    let alarms = match database::get_scheduled_alarms_from_db(pool).await {
        Ok(alarms) => alarms,
        Err(e) => {
            error!("Failed to load scheduled alarms for reconciliation: {:?}", e);
            return 0;
        }
    };

    let mut rearmed = 0;
    for alarm in alarms {
        if let Err(e) = alarm.validate() {
            warn!("Skipping invalid alarm {} during reconciliation: {}", alarm.id, e);
            continue;
        }
        let alarm_id = alarm.id;
        match scheduler.schedule(alarm).await {
            Ok(()) => rearmed += 1,
            Err(e) => warn!("Failed to re-arm alarm {}: {:?}", alarm_id, e),
        }
    }

    info!("Reconciliation re-armed {} alarm(s).", rearmed);
    rearmed
}

/// One deduplicated cleanup run: deletes every one-time task whose alarm
/// fired more than 24 hours ago. When another run already holds the guard
/// the call returns immediately without touching the database.
pub async fn run_cleanup_sweep(pool: &SqlitePool, guard: &SweepGuard) -> Result<u64> {
    let Ok(_lock) = guard.try_lock() else {
        debug!("Cleanup sweep already running, skipping this run.");
        return Ok(0);
    };

    let threshold = Utc::now() - chrono::Duration::hours(EXPIRY_AFTER_TRIGGER_HOURS);
    let deleted = database::delete_expired_tasks_in_db(pool, threshold).await?;

    if deleted > 0 {
        info!("Cleanup sweep deleted {} expired task(s).", deleted);
    } else {
        debug!("Cleanup sweep found nothing to delete.");
    }

    Ok(deleted)
}

/// Spawns the cleanup job: one run at startup, then one per fixed period.
/// Both paths funnel through the same deduplicated sweep, and a failing
/// run is logged without stopping the loop.
pub fn spawn_cleanup_job(pool: SqlitePool) -> JoinHandle<()> {
    let guard: SweepGuard = Arc::new(Mutex::new(()));

    tokio::spawn(async move {
        if let Err(e) = run_cleanup_sweep(&pool, &guard).await {
            error!("Startup cleanup sweep failed: {:?}", e);
        }

        let mut interval = time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));

        // The first tick completes immediately. Skip it to wait for the first interval.
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = run_cleanup_sweep(&pool, &guard).await {
                error!("Periodic cleanup sweep failed: {:?}", e);
            }
        }
    })
}
