//! Configuration validation for the repricing job.
//!
//! Checks that required values are present and within valid ranges
//! before the job touches the spreadsheet.

use thiserror::Error;

use crate::config::{Config, ObservabilityConfig, PolicyKind, SelectionConfig, SheetsConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.observability.validate(),
            self.sheets.validate(),
            self.selection.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_rotations = ["hourly", "daily", "weekly", "monthly", "never"];
        if !valid_rotations.contains(&self.log_rotation.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_rotation".into(),
                reason: format!("must be one of: {}", valid_rotations.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

impl Validate for SheetsConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.spreadsheet_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "sheets.spreadsheet_id".into(),
            });
        }

        if !is_column_letters(&self.marker_column) {
            return Err(ValidationError::InvalidValue {
                field: "sheets.marker_column".into(),
                reason: format!("'{}' is not a column letter (A..ZZZ)", self.marker_column),
            });
        }

        if self.products_sheet == self.rules_sheet {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "products_sheet and rules_sheet both point at tab {}",
                    self.products_sheet
                ),
            });
        }

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "sheets.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(ValidationError::InvalidValue {
                field: "sheets.api_base_url".into(),
                reason: "must start with http:// or https://".into(),
            });
        }

        Ok(())
    }
}

impl Validate for SelectionConfig {
    fn validate(&self) -> ValidationResult<()> {
        if let Some(days) = self.default_bucket_days {
            if days < 0 {
                return Err(ValidationError::InvalidValue {
                    field: "selection.default_bucket_days".into(),
                    reason: "must not be negative".into(),
                });
            }
            if self.policy != PolicyKind::Bucketed {
                tracing::warn!(
                    policy = %self.policy,
                    "selection.default_bucket_days only applies to the bucketed policy"
                );
            }
        }

        Ok(())
    }
}

fn is_column_letters(column: &str) -> bool {
    (1..=3).contains(&column.len()) && column.chars().all(|c| c.is_ascii_uppercase())
}
