//! Selection rules: quota, staleness policy and the pre-pass.
//!
//! The numbers come from the rules sheet, the procedure comes from
//! configuration. [`SelectionRules::from_sheet`] joins the two.

use std::collections::BTreeMap;

use reprice_common::config::{PolicyKind, SelectionConfig};
use reprice_common::{Error, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Staleness Policy
// ============================================================================

/// How staleness is judged during selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessPolicy {
    /// Unpriced rows regardless of date, then priced rows older than `stale_days`.
    Flat { stale_days: i64 },
    /// Unpriced rows older than `stale_days`, then priced rows older than `stale_days`.
    PriceAware { stale_days: i64 },
    /// Per-bucket thresholds keyed by the integer part of the turnover ratio.
    Bucketed {
        thresholds: BTreeMap<i64, i64>,
        #[serde(default)]
        default_days: Option<i64>,
    },
    /// Unpriced rows, then everything else by ratio.
    Global,
}

impl StalenessPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::Flat { .. } => PolicyKind::Flat,
            Self::PriceAware { .. } => PolicyKind::PriceAware,
            Self::Bucketed { .. } => PolicyKind::Bucketed,
            Self::Global => PolicyKind::Global,
        }
    }

    /// Threshold for a bucket, falling back to the default.
    pub fn bucket_days(&self, bucket: i64) -> Option<i64> {
        match self {
            Self::Bucketed {
                thresholds,
                default_days,
            } => thresholds.get(&bucket).copied().or(*default_days),
            _ => None,
        }
    }
}

// ============================================================================
// Prefilter
// ============================================================================

/// Exclusion pass applied before ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefilter {
    /// Drop rows whose rule is "0"
    #[serde(default)]
    pub exclude_rule: bool,
    /// Keep only the first row of each (number, brand)
    #[serde(default)]
    pub dedup: bool,
}

impl Prefilter {
    pub const NONE: Prefilter = Prefilter {
        exclude_rule: false,
        dedup: false,
    };

    pub const ALL: Prefilter = Prefilter {
        exclude_rule: true,
        dedup: true,
    };

    pub fn is_active(&self) -> bool {
        self.exclude_rule || self.dedup
    }
}

// ============================================================================
// Selection Rules
// ============================================================================

/// Everything the selector needs besides the records and the date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRules {
    /// Maximum number of rows to select
    pub quota: usize,
    pub policy: StalenessPolicy,
    #[serde(default)]
    pub prefilter: Prefilter,
}

impl SelectionRules {
    pub fn new(quota: usize, policy: StalenessPolicy) -> Self {
        Self {
            quota,
            policy,
            prefilter: Prefilter::NONE,
        }
    }

    pub fn flat(quota: usize, stale_days: i64) -> Self {
        Self::new(quota, StalenessPolicy::Flat { stale_days })
    }

    pub fn price_aware(quota: usize, stale_days: i64) -> Self {
        Self::new(quota, StalenessPolicy::PriceAware { stale_days })
    }

    pub fn bucketed(quota: usize, thresholds: BTreeMap<i64, i64>) -> Self {
        Self::new(
            quota,
            StalenessPolicy::Bucketed {
                thresholds,
                default_days: None,
            },
        )
    }

    pub fn global(quota: usize) -> Self {
        Self::new(quota, StalenessPolicy::Global)
    }

    pub fn with_prefilter(mut self, prefilter: Prefilter) -> Self {
        self.prefilter = prefilter;
        self
    }

    /// Pre-pass actually applied.
    ///
    /// The bucketed procedure always excludes opted-out rows and duplicates.
    pub fn effective_prefilter(&self) -> Prefilter {
        match self.policy {
            StalenessPolicy::Bucketed { .. } => Prefilter::ALL,
            _ => self.prefilter,
        }
    }

    /// Combine the rules-sheet values with the configured procedure.
    pub fn from_sheet(sheet: &RulesSheet, config: &SelectionConfig) -> Result<Self> {
        let require_days = || {
            sheet.stale_days.ok_or_else(|| {
                Error::InvalidInput(format!(
                    "policy '{}' needs a staleness threshold on the rules sheet",
                    config.policy
                ))
            })
        };

        let policy = match config.policy {
            PolicyKind::Flat => StalenessPolicy::Flat {
                stale_days: require_days()?,
            },
            PolicyKind::PriceAware => StalenessPolicy::PriceAware {
                stale_days: require_days()?,
            },
            PolicyKind::Bucketed => {
                let default_days = config.default_bucket_days.or(sheet.stale_days);
                if sheet.buckets.is_empty() && default_days.is_none() {
                    return Err(Error::InvalidInput(
                        "bucketed policy needs a bucket table or a default threshold".into(),
                    ));
                }
                StalenessPolicy::Bucketed {
                    thresholds: sheet.buckets.clone(),
                    default_days,
                }
            }
            PolicyKind::Global => StalenessPolicy::Global,
        };

        Ok(Self {
            quota: sheet.quota,
            policy,
            prefilter: Prefilter {
                exclude_rule: config.exclude_rule,
                dedup: config.dedup,
            },
        })
    }
}

/// Raw values read from the rules sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulesSheet {
    pub quota: usize,
    pub stale_days: Option<i64>,
    /// Bucket key → staleness threshold in days
    pub buckets: BTreeMap<i64, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> RulesSheet {
        RulesSheet {
            quota: 50,
            stale_days: Some(30),
            buckets: BTreeMap::from([(3, 7), (1, 60)]),
        }
    }

    #[test]
    fn test_from_sheet_price_aware() {
        let config = SelectionConfig::default();
        let rules = SelectionRules::from_sheet(&sheet(), &config).unwrap();
        assert_eq!(rules.quota, 50);
        assert_eq!(rules.policy, StalenessPolicy::PriceAware { stale_days: 30 });
        assert_eq!(rules.effective_prefilter(), Prefilter::NONE);
    }

    #[test]
    fn test_from_sheet_missing_days() {
        let config = SelectionConfig {
            policy: PolicyKind::Flat,
            ..Default::default()
        };
        let mut sheet = sheet();
        sheet.stale_days = None;
        let err = SelectionRules::from_sheet(&sheet, &config).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_from_sheet_global_ignores_days() {
        let config = SelectionConfig {
            policy: PolicyKind::Global,
            dedup: true,
            ..Default::default()
        };
        let mut sheet = sheet();
        sheet.stale_days = None;
        let rules = SelectionRules::from_sheet(&sheet, &config).unwrap();
        assert_eq!(rules.policy, StalenessPolicy::Global);
        assert!(rules.prefilter.dedup);
        assert!(!rules.prefilter.exclude_rule);
    }

    #[test]
    fn test_bucketed_thresholds_and_default() {
        let config = SelectionConfig {
            policy: PolicyKind::Bucketed,
            default_bucket_days: Some(90),
            ..Default::default()
        };
        let rules = SelectionRules::from_sheet(&sheet(), &config).unwrap();
        assert_eq!(rules.policy.bucket_days(3), Some(7));
        assert_eq!(rules.policy.bucket_days(1), Some(60));
        assert_eq!(rules.policy.bucket_days(2), Some(90));
        assert_eq!(rules.effective_prefilter(), Prefilter::ALL);
    }

    #[test]
    fn test_bucketed_needs_table_or_default() {
        let config = SelectionConfig {
            policy: PolicyKind::Bucketed,
            ..Default::default()
        };
        let empty = RulesSheet {
            quota: 10,
            stale_days: None,
            buckets: BTreeMap::new(),
        };
        assert!(SelectionRules::from_sheet(&empty, &config).is_err());
    }

    #[test]
    fn test_rules_serialization() {
        let rules = SelectionRules::bucketed(5, BTreeMap::from([(2, 14)]));
        let json = serde_json::to_string(&rules).unwrap();
        assert!(json.contains("\"bucketed\""));
        let parsed: SelectionRules = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rules);
    }
}
