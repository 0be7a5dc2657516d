//! Repricing selector.
//!
//! Picks at most `quota` rows through a short priority funnel:
//! 1. Prefilter: drop opted-out rows and duplicate (number, brand) pairs
//! 2. No price: rows without a price (stale ones only, for `PriceAware`)
//! 3. Priced and stale: rows whose price is older than the threshold
//! 4. Ratio fill: everything left, by turnover ratio
//!
//! The bucketed policy replaces stages 2-4 with a walk over turnover
//! buckets from the highest key down, each bucket taking its unpriced
//! stale rows and then its priced stale rows.
//!
//! Every ranking is a stable sort on the turnover ratio, descending, so
//! ties keep sheet order. Rows are tracked by position in the input, never
//! by value, so identical rows stay distinct candidates.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::policy::{Prefilter, SelectionRules, StalenessPolicy};
use crate::record::Record;

// ============================================================================
// Selection Stage
// ============================================================================

/// Stage identifier for tracking where rows are picked or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStage {
    /// Rows surviving the rule/dedup pre-pass
    Prefilter,
    /// Rows without a price
    NoPrice,
    /// Rows with an outdated price
    PricedStale,
    /// Remaining rows by turnover ratio
    RatioFill,
    /// One turnover bucket of the bucketed policy
    Bucket(i64),
}

impl fmt::Display for SelectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefilter => write!(f, "prefilter"),
            Self::NoPrice => write!(f, "no price"),
            Self::PricedStale => write!(f, "priced and stale"),
            Self::RatioFill => write!(f, "ratio fill"),
            Self::Bucket(key) => write!(f, "bucket {}", key),
        }
    }
}

// ============================================================================
// Stage Result
// ============================================================================

/// Outcome of one selection stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: SelectionStage,
    /// Rows that qualified for this stage
    pub candidates: usize,
    /// Rows this stage added to the output (for the prefilter: rows kept)
    pub selected: usize,
}

impl StageResult {
    pub fn new(stage: SelectionStage, candidates: usize, selected: usize) -> Self {
        Self {
            stage,
            candidates,
            selected,
        }
    }
}

/// Per-stage accounting of one selection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    /// Rows handed to the selector
    pub input: usize,
    pub quota: usize,
    pub stages: Vec<StageResult>,
    /// Rows in the final selection
    pub selected: usize,
}

impl SelectionReport {
    /// Rows added by a given stage, zero if it did not run.
    pub fn selected_in(&self, stage: SelectionStage) -> usize {
        self.stages
            .iter()
            .filter(|s| s.stage == stage)
            .map(|s| s.selected)
            .sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "Selected {} of {} rows (quota {})",
            self.selected, self.input, self.quota
        )
    }
}

/// Selected rows plus how they were chosen.
#[derive(Debug, Clone)]
pub struct Selection {
    pub records: Vec<Record>,
    pub report: SelectionReport,
}

impl Selection {
    /// Sheet rows of the selected records, in selection order.
    pub fn row_indexes(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.row_index).collect()
    }
}

// ============================================================================
// Selector
// ============================================================================

/// Pick the rows to reprice as of `today`.
pub fn select(records: &[Record], rules: &SelectionRules, today: NaiveDate) -> Vec<Record> {
    Selector::new(rules.clone()).select(records, today).records
}

/// Pick the rows to reprice as of the local calendar date.
pub fn select_now(records: &[Record], rules: &SelectionRules) -> Vec<Record> {
    select(records, rules, Local::now().date_naive())
}

/// Quota-bounded priority selector.
pub struct Selector {
    rules: SelectionRules,
}

impl Selector {
    pub fn new(rules: SelectionRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SelectionRules {
        &self.rules
    }

    /// Run the selection and return the chosen records with a stage report.
    pub fn select(&self, records: &[Record], today: NaiveDate) -> Selection {
        let quota = self.rules.quota;
        let mut run = Run::new(records, quota);

        info!(total = records.len(), quota, policy = %self.rules.policy.kind(), "Selecting rows to reprice");

        if quota == 0 {
            return run.finish();
        }

        let pool = run.prefilter(self.rules.effective_prefilter());

        match &self.rules.policy {
            StalenessPolicy::Flat { stale_days } => {
                let days = *stale_days;
                run.tier(SelectionStage::NoPrice, &pool, |r| !r.has_price());
                run.tier(SelectionStage::PricedStale, &pool, |r| {
                    r.has_price() && r.is_stale(today, days)
                });
                run.tier(SelectionStage::RatioFill, &pool, |_| true);
            }
            StalenessPolicy::PriceAware { stale_days } => {
                let days = *stale_days;
                run.tier(SelectionStage::NoPrice, &pool, |r| {
                    !r.has_price() && r.is_stale(today, days)
                });
                run.tier(SelectionStage::PricedStale, &pool, |r| {
                    r.has_price() && r.is_stale(today, days)
                });
                run.tier(SelectionStage::RatioFill, &pool, |_| true);
            }
            StalenessPolicy::Global => {
                run.tier(SelectionStage::NoPrice, &pool, |r| !r.has_price());
                run.tier(SelectionStage::RatioFill, &pool, |_| true);
            }
            StalenessPolicy::Bucketed { .. } => {
                run.buckets(&pool, &self.rules.policy, today);
            }
        }

        run.finish()
    }
}

/// Mutable state of one selection pass.
struct Run<'a> {
    records: &'a [Record],
    quota: usize,
    taken: Vec<bool>,
    chosen: Vec<usize>,
    report: SelectionReport,
}

impl<'a> Run<'a> {
    fn new(records: &'a [Record], quota: usize) -> Self {
        Self {
            records,
            quota,
            taken: vec![false; records.len()],
            chosen: Vec::new(),
            report: SelectionReport {
                input: records.len(),
                quota,
                ..SelectionReport::default()
            },
        }
    }

    fn remaining(&self) -> usize {
        self.quota.saturating_sub(self.chosen.len())
    }

    /// Positions surviving the rule and dedup pass, in input order.
    fn prefilter(&mut self, prefilter: Prefilter) -> Vec<usize> {
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        let records = self.records;

        let pool: Vec<usize> = (0..records.len())
            .filter(|&i| !(prefilter.exclude_rule && records[i].is_excluded()))
            .filter(|&i| !prefilter.dedup || seen.insert(records[i].key()))
            .collect();

        if prefilter.is_active() {
            info!(
                kept = pool.len(),
                dropped = records.len() - pool.len(),
                exclude_rule = prefilter.exclude_rule,
                dedup = prefilter.dedup,
                "Prefilter complete"
            );
            self.report.stages.push(StageResult::new(
                SelectionStage::Prefilter,
                records.len(),
                pool.len(),
            ));
        }

        pool
    }

    /// Rank the untaken rows matching `matches` and take up to the remaining quota.
    fn tier<F>(&mut self, stage: SelectionStage, pool: &[usize], matches: F)
    where
        F: Fn(&Record) -> bool,
    {
        let remaining = self.remaining();
        if remaining == 0 {
            debug!(stage = %stage, "Quota reached, skipping stage");
            return;
        }

        let records = self.records;
        let mut candidates: Vec<usize> = pool
            .iter()
            .copied()
            .filter(|&i| !self.taken[i] && matches(&records[i]))
            .collect();
        let qualified = candidates.len();

        // Stable: equal ratios keep input order.
        candidates.sort_by(|&a, &b| records[b].rank_value().total_cmp(&records[a].rank_value()));
        candidates.truncate(remaining);

        self.take(&candidates);
        info!(
            stage = %stage,
            qualified,
            selected = candidates.len(),
            total = self.chosen.len(),
            "Stage complete"
        );
        self.report
            .stages
            .push(StageResult::new(stage, qualified, candidates.len()));
    }

    /// Walk turnover buckets from the highest key down.
    fn buckets(&mut self, pool: &[usize], policy: &StalenessPolicy, today: NaiveDate) {
        let records = self.records;
        let keys: BTreeSet<i64> = pool.iter().map(|&i| records[i].bucket()).collect();

        for key in keys.into_iter().rev() {
            let Some(days) = policy.bucket_days(key) else {
                debug!(bucket = key, "No threshold for bucket, skipping");
                continue;
            };

            let stale: Vec<usize> = pool
                .iter()
                .copied()
                .filter(|&i| records[i].bucket() == key && records[i].is_stale(today, days))
                .collect();
            let (unpriced, priced): (Vec<usize>, Vec<usize>) =
                stale.iter().partition(|&&i| !records[i].has_price());

            let first: Vec<usize> = unpriced.iter().copied().take(self.remaining()).collect();
            self.take(&first);
            let second: Vec<usize> = priced.iter().copied().take(self.remaining()).collect();
            self.take(&second);

            let added = first.len() + second.len();
            info!(
                bucket = key,
                stale_days = days,
                unpriced = first.len(),
                priced = second.len(),
                total = self.chosen.len(),
                "Bucket complete"
            );
            self.report
                .stages
                .push(StageResult::new(SelectionStage::Bucket(key), stale.len(), added));

            if self.remaining() == 0 {
                debug!(bucket = key, "Quota reached, stopping bucket walk");
                break;
            }
        }
    }

    fn take(&mut self, positions: &[usize]) {
        for &i in positions {
            self.taken[i] = true;
            self.chosen.push(i);
        }
    }

    fn finish(mut self) -> Selection {
        let records: Vec<Record> = self
            .chosen
            .iter()
            .map(|&i| self.records[i].clone())
            .collect();
        self.report.selected = records.len();
        info!(selected = records.len(), quota = self.quota, "Selection complete");
        Selection {
            records,
            report: self.report,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
