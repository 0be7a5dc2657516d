//! Reprice Job Library
//!
//! Picks the inventory rows whose prices should be refreshed and flags them
//! on the spreadsheet the rows came from.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       reprice-job (batch)                           │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐      │
//! │  │ SheetRepository │─▶│    Selector     │─▶│ SheetRepository │      │
//! │  │  load / rules   │  │ (tiers/buckets) │  │     commit      │      │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Selection tiers
//!
//! 1. **No price**: rows without a price, ranked by turnover ratio
//! 2. **Priced and stale**: rows whose price is older than the threshold
//! 3. **Ratio fill**: every remaining row by turnover ratio
//!
//! The bucketed policy instead walks integer turnover buckets from the top,
//! each with its own staleness threshold.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod job;
pub mod policy;
pub mod record;
pub mod repository;
pub mod selector;
pub mod sheets;

pub use job::{is_retryable, JobReport, RepriceJob};
pub use policy::{Prefilter, RulesSheet, SelectionRules, StalenessPolicy};
pub use record::{Record, DEFAULT_UPDATED_DATE};
pub use repository::{ProductRepository, SheetRepository};
pub use selector::{select, select_now, Selection, SelectionReport, SelectionStage, Selector, StageResult};
