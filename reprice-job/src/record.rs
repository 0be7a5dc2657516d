//! Product records read from the inventory sheet.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date assumed for rows that were never priced.
///
/// Any realistic staleness threshold treats such rows as stale.
pub const DEFAULT_UPDATED_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2024, 1, 1) {
    Some(date) => date,
    None => panic!("invalid default date"),
};

/// Rule column value that excludes a row from repricing.
pub const EXCLUDED_RULE: &str = "0";

/// One product row of the inventory sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Part number
    pub number: String,
    /// Manufacturer
    pub brand: String,
    pub description: String,
    /// Quantity on hand
    pub stock: String,
    /// Current price; `None` when the cell is blank
    pub price: Option<String>,
    /// Date of the last price fetch
    pub updated_date: NaiveDate,
    /// Turnover ratio, higher means reprice sooner
    pub turnover_ratio: f64,
    /// Target stock level
    pub norm_stock: String,
    pub product_group: String,
    /// Price selection rule; "0" opts the row out
    pub rule: String,
    /// Previous value of the marker column
    pub select_flag: String,
    pub id_rule: String,
    /// 1-based row on the source sheet (data starts at row 2)
    pub row_index: usize,
}

impl Record {
    /// Create a record with the ranking fields set and the rest blank.
    pub fn new(number: impl Into<String>, brand: impl Into<String>, row_index: usize) -> Self {
        Self {
            number: number.into(),
            brand: brand.into(),
            description: String::new(),
            stock: String::new(),
            price: None,
            updated_date: DEFAULT_UPDATED_DATE,
            turnover_ratio: 0.0,
            norm_stock: String::new(),
            product_group: String::new(),
            rule: String::new(),
            select_flag: String::new(),
            id_rule: String::new(),
            row_index,
        }
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        let price = price.into();
        self.price = if price.trim().is_empty() { None } else { Some(price) };
        self
    }

    pub fn with_updated_date(mut self, date: NaiveDate) -> Self {
        self.updated_date = date;
        self
    }

    pub fn with_turnover_ratio(mut self, ratio: f64) -> Self {
        self.turnover_ratio = ratio;
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = rule.into();
        self
    }

    /// Whether a price is on file.
    pub fn has_price(&self) -> bool {
        self.price.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    /// Whole days between the last price fetch and `today`.
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.updated_date).num_days()
    }

    /// Whether the price is older than `stale_days`.
    pub fn is_stale(&self, today: NaiveDate, stale_days: i64) -> bool {
        self.age_days(today) > stale_days
    }

    /// Ratio used for ranking, with non-numbers treated as zero.
    pub fn rank_value(&self) -> f64 {
        if self.turnover_ratio.is_finite() {
            self.turnover_ratio
        } else {
            0.0
        }
    }

    /// Integer turnover bucket for bucketed selection.
    pub fn bucket(&self) -> i64 {
        self.rank_value().trunc() as i64
    }

    /// Whether the rule column opts this row out of repricing.
    pub fn is_excluded(&self) -> bool {
        self.rule.trim() == EXCLUDED_RULE
    }

    /// Deduplication key.
    pub fn key(&self) -> (&str, &str) {
        (&self.number, &self.brand)
    }
}
