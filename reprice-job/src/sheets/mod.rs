//! Google Sheets adapter.
//!
//! ```text
//! ┌───────────────┐   values.get    ┌──────────────┐   Vec<Record>   ┌──────────┐
//! │ Products tab  │────────────────▶│   mapping    │────────────────▶│ Selector │
//! │ Rules tab     │                 │ (rows ⇄ dom) │◀────────────────│          │
//! └───────────────┘◀────────────────└──────────────┘   selection     └──────────┘
//!                   values.batchUpdate
//! ```

pub mod auth;
pub mod client;
pub mod mapping;

pub use auth::{ServiceAccountKey, ServiceAccountTokenSource, StaticTokenSource, TokenSource};
pub use client::{SheetsClient, ValueRange};
pub use mapping::{
    convert_date, convert_turn_ratio, marker_updates, parse_products, parse_rules,
    PRODUCT_COLUMNS,
};
