//! Repricing job orchestration.
//!
//! One run: load products, load rules, select, write markers. A failed read
//! aborts the run before anything is written, so the marker column is never
//! cleared because of a transient API error.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use reprice_common::logging::generate_run_id;
use reprice_common::Error;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Instrument};

use crate::policy::SelectionRules;
use crate::repository::ProductRepository;
use crate::selector::{SelectionReport, Selector};

/// Outcome of one job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub run_id: String,
    /// Reference date for staleness
    pub today: NaiveDate,
    /// Data rows on the products sheet
    pub total_rows: usize,
    pub rules: SelectionRules,
    /// Sheet rows chosen for repricing, in selection order
    pub selected_rows: Vec<usize>,
    pub selection: SelectionReport,
    /// Whether markers were written
    pub committed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl JobReport {
    pub fn duration_secs(&self) -> f64 {
        (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Run {}: {} of {} rows selected (quota {}, policy {}){}",
            self.run_id,
            self.selected_rows.len(),
            self.total_rows,
            self.rules.quota,
            self.rules.policy.kind(),
            if self.committed { "" } else { ", markers not written" }
        )
    }
}

/// Whether a failed run hit a transient sheet error (rate limit, API outage).
pub fn is_retryable(err: &anyhow::Error) -> bool {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .is_some_and(Error::is_retryable)
}

/// The batch job over a product repository.
pub struct RepriceJob<R: ProductRepository> {
    repository: R,
    dry_run: bool,
}

impl<R: ProductRepository> RepriceJob<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            dry_run: false,
        }
    }

    /// Select and log, but leave the sheet untouched.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run once with `today` as the staleness reference date.
    pub async fn run(&self, today: NaiveDate) -> Result<JobReport> {
        let run_id = generate_run_id();
        let span = info_span!("reprice_run", run_id = %run_id, %today);
        self.run_inner(run_id, today).instrument(span).await
    }

    async fn run_inner(&self, run_id: String, today: NaiveDate) -> Result<JobReport> {
        let started_at = Utc::now();
        info!(dry_run = self.dry_run, "Starting repricing run");

        let records = self
            .repository
            .load()
            .await
            .context("Failed to load products")?;
        let total_rows = records.len();

        let rules = self
            .repository
            .load_rules()
            .await
            .context("Failed to load selection rules")?;

        let selector = Selector::new(rules);
        let selection = selector.select(&records, today);

        let committed = if self.dry_run {
            info!(selected = selection.records.len(), "Dry run, markers not written");
            false
        } else {
            self.repository
                .commit(&selection.records, total_rows)
                .await
                .context("Failed to write selection markers")?;
            true
        };

        let report = JobReport {
            run_id,
            today,
            total_rows,
            rules: selector.rules().clone(),
            selected_rows: selection.row_indexes(),
            selection: selection.report,
            committed,
            started_at,
            completed_at: Utc::now(),
        };

        info!(
            duration = format!("{:.1}s", report.duration_secs()),
            "{}",
            report.summary()
        );
        Ok(report)
    }
}
