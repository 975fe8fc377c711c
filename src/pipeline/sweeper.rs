//! Store watcher. Periodically reclaims abandoned claims and re-emits
//! triggers for records that sit in a precondition status with nobody
//! working on them, so a lost trigger never strands a job.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::PipelineConfig;

use super::dispatcher::Dispatcher;
use super::record::JobRecord;
use super::redrive::reclaim_stale;
use super::status::JobStatus;
use super::store::{JobFilter, JobStore, StoreError};
use super::trigger::Trigger;

const SWEEP_BATCH: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Claims returned to their pre-claim status.
    pub reverted: usize,
    /// Claims failed because their stage had no attempts left.
    pub failed: usize,
    pub reemitted: usize,
}

pub struct Sweeper {
    store: Arc<dyn JobStore>,
    dispatcher: Dispatcher,
    config: PipelineConfig,
}

impl Sweeper {
    pub fn new(store: Arc<dyn JobStore>, dispatcher: Dispatcher, config: PipelineConfig) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    /// Idle time after which a waiting record gets a fresh trigger. Longer
    /// than any scheduled retry, so backoff is not cut short.
    fn idle_after(&self) -> Duration {
        Duration::from_secs(self.config.backoff_max_seconds) + self.config.sweep_interval()
    }

    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        for record in reclaim_stale(self.store.as_ref(), &self.config, now).await? {
            if record.status == JobStatus::Failed {
                report.failed += 1;
            } else {
                report.reverted += 1;
                self.emit(&record);
                report.reemitted += 1;
            }
        }

        if let Some(cutoff) = chrono::Duration::from_std(self.idle_after())
            .ok()
            .and_then(|idle| now.checked_sub_signed(idle))
        {
            for status in [JobStatus::Pending, JobStatus::Transcribed] {
                let filter = JobFilter::default()
                    .with_status(status)
                    .updated_before(cutoff)
                    .with_limit(SWEEP_BATCH);
                for record in self.store.list(&filter).await? {
                    self.emit(&record);
                    report.reemitted += 1;
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                reverted = report.reverted,
                failed = report.failed,
                reemitted = report.reemitted,
                "Sweep finished"
            );
        } else {
            debug!("Sweep found nothing to do");
        }
        Ok(report)
    }

    fn emit(&self, record: &JobRecord) {
        if let Some(trigger) = Trigger::for_record(record) {
            debug!(job_id = %record.job_id, status = %record.status, "Re-emitting trigger");
            self.dispatcher.submit(trigger);
        }
    }

    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval());
        info!(
            "Sweeper started (interval {}s, stale after {}s)",
            self.config.sweep_interval().as_secs(),
            self.config.stale_after_seconds
        );
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_once(Utc::now()).await {
                error!("Sweep failed: {}", e);
            }
        }
    }
}
