//! Periodic reconciliation sweep
//!
//! Picks up transactions whose return and webhook callbacks never arrived (or
//! whose delivery failed) and reconciles them against the processor. Only
//! records last touched between `min_age` and `max_age` ago are considered:
//! newer ones are still likely to resolve through their callbacks, older ones
//! are presumed abandoned.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::database::transaction_record::SweepQuery;
use crate::error::PaymentResult;
use crate::payments::reconcile::ReconciliationEngine;
use crate::payments::types::{STATUS_PAID, TERMINAL_STATUS_CODES};

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
    pub batch_size: i64,
    pub min_age: Duration,
    pub max_age: Duration,
    /// Pause between two records of the same batch
    pub pause: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            batch_size: 10,
            min_age: Duration::from_secs(24 * 60 * 60),
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            pause: Duration::from_millis(50),
        }
    }
}

impl SweepConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.interval = Duration::from_secs(
            std::env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.interval.as_secs()),
        );

        cfg.batch_size = std::env::var("SWEEP_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(cfg.batch_size);

        cfg.min_age = Duration::from_secs(
            std::env::var("SWEEP_MIN_AGE_HOURS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|h| h * 60 * 60)
                .unwrap_or(cfg.min_age.as_secs()),
        );

        cfg.max_age = Duration::from_secs(
            std::env::var("SWEEP_MAX_AGE_HOURS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|h| h * 60 * 60)
                .unwrap_or(cfg.max_age.as_secs()),
        );

        cfg.pause = Duration::from_millis(
            std::env::var("SWEEP_PAUSE_MILLIS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.pause.as_millis() as u64),
        );

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.interval.is_zero() {
            return Err("SWEEP_INTERVAL_SECS must be greater than 0".to_string());
        }
        if self.batch_size <= 0 {
            return Err("SWEEP_BATCH_SIZE must be greater than 0".to_string());
        }
        if self.min_age >= self.max_age {
            return Err("SWEEP_MIN_AGE_HOURS must be less than SWEEP_MAX_AGE_HOURS".to_string());
        }
        Ok(())
    }
}

/// Outcome of one sweep cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub selected: usize,
    pub reconciled: usize,
    pub failed: usize,
}

pub struct SweepWorker {
    engine: Arc<ReconciliationEngine>,
    config: SweepConfig,
}

impl SweepWorker {
    pub fn new(engine: Arc<ReconciliationEngine>, config: SweepConfig) -> Self {
        Self { engine, config }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting reconciliation sweep worker"
        );

        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "sweep cycle failed");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Sweep worker received shutdown signal");
                        break;
                    }
                }
            }
        }

        info!("Sweep worker stopped");
    }

    pub async fn run_cycle(&self) -> PaymentResult<SweepReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle with the window anchored at `now`
    #[instrument(skip(self), name = "reconciliation_sweep_cycle")]
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> PaymentResult<SweepReport> {
        let query = self.query_at(now);
        let candidates = self.engine.store().find_sweep_candidates(&query).await?;

        let mut report = SweepReport {
            selected: candidates.len(),
            ..Default::default()
        };

        if candidates.is_empty() {
            debug!("No transactions to sweep");
            return Ok(report);
        }

        for (i, record) in candidates.into_iter().enumerate() {
            if i > 0 && !self.config.pause.is_zero() {
                tokio::time::sleep(self.config.pause).await;
            }

            let record_id = record.id;
            let transaction_id = record.transaction_id.clone();
            match self.engine.reconcile(None, Some(record)).await {
                Ok(observation) => {
                    report.reconciled += 1;
                    debug!(
                        record_id = %record_id,
                        status_code = observation.status_code,
                        "Swept transaction"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    if e.is_retryable() {
                        warn!(
                            record_id = %record_id,
                            transaction_id = %transaction_id,
                            error = %e,
                            "Sweep reconcile failed; will retry next cycle"
                        );
                    } else {
                        error!(
                            record_id = %record_id,
                            transaction_id = %transaction_id,
                            error = %e,
                            "Sweep reconcile failed"
                        );
                    }
                }
            }
        }

        info!(
            selected = report.selected,
            reconciled = report.reconciled,
            failed = report.failed,
            "Sweep cycle completed"
        );
        Ok(report)
    }

    fn query_at(&self, now: DateTime<Utc>) -> SweepQuery {
        SweepQuery {
            terminal_codes: TERMINAL_STATUS_CODES.to_vec(),
            paid_code: STATUS_PAID,
            max_delivery_attempts: self.engine.config().max_delivery_attempts,
            modified_after: ago(now, self.config.max_age),
            modified_before: ago(now, self.config.min_age),
            limit: self.config.batch_size,
        }
    }
}

fn ago(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
