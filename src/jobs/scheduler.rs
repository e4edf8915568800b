// Daily maintenance jobs: the retry sweep and yesterday's reconciliation.
// Runs off-peak; both jobs are idempotent, so an extra firing is harmless.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info};

use crate::reconciliation::ReconciliationEngine;
use crate::tracker::TransactionTracker;

#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// UTC hour to execute the daily jobs (0-23)
    pub execution_hour: u32,
}

/// Coordinates the scheduled background jobs.
pub struct JobScheduler {
    config: JobsConfig,
    tracker: Arc<TransactionTracker>,
    reconciliation: Arc<ReconciliationEngine>,
}

impl JobScheduler {
    pub fn new(
        config: JobsConfig,
        tracker: Arc<TransactionTracker>,
        reconciliation: Arc<ReconciliationEngine>,
    ) -> Self {
        Self {
            config,
            tracker,
            reconciliation,
        }
    }

    /// Starts the daily loop in the background.
    pub fn start(&self) -> JoinHandle<()> {
        let config = self.config.clone();
        let tracker = self.tracker.clone();
        let reconciliation = self.reconciliation.clone();

        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next_execution = calculate_next_daily_execution(now, config.execution_hour);
                let wait = next_execution.signed_duration_since(now);

                if wait.num_seconds() > 0 {
                    info!(
                        "Next job cycle scheduled for {} UTC",
                        next_execution.format("%H:%M:%S")
                    );
                    tokio::time::sleep(Duration::from_secs(wait.num_seconds() as u64)).await;
                }

                info!("Starting daily job cycle");

                match tracker.auto_retry_all().await {
                    Ok(sweep) => info!(
                        attempted = sweep.attempted,
                        succeeded = sweep.succeeded,
                        escalated = sweep.escalated,
                        "Retry sweep finished"
                    ),
                    Err(e) => error!("Retry sweep failed: {:?}", e),
                }

                match reconciliation.auto_reconcile().await {
                    Ok(Some(rec)) => info!(
                        date = %rec.recon_date,
                        discrepancies = rec.unmatched_count,
                        "Auto reconciliation finished"
                    ),
                    Ok(None) => info!("Auto reconciliation skipped, date already covered"),
                    Err(e) => error!("Auto reconciliation failed: {:?}", e),
                }

                info!("Daily job cycle completed");
            }
        })
    }
}

/// Next time the daily jobs should fire: today at the configured hour, or
/// tomorrow if that has already passed.
pub fn calculate_next_daily_execution(now: DateTime<Utc>, execution_hour: u32) -> DateTime<Utc> {
    let hour = execution_hour.min(23);
    let today = now.date_naive().and_hms_opt(hour, 0, 0).unwrap();
    let today_dt = Utc.from_utc_datetime(&today);

    if today_dt <= now {
        let tomorrow = (now.date_naive() + chrono::Duration::days(1))
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        Utc.from_utc_datetime(&tomorrow)
    } else {
        today_dt
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn next_execution_is_today_when_hour_is_ahead() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let next = calculate_next_daily_execution(now, 14);
        assert_eq!(next.hour(), 14);
        assert_eq!(next.day(), 4);
    }

    #[test]
    fn next_execution_rolls_to_tomorrow_when_hour_has_passed() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let next = calculate_next_daily_execution(now, 2);
        assert_eq!(next.hour(), 2);
        assert_eq!(next.day(), 5);
    }
}
