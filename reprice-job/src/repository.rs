//! Product repository abstraction.
//!
//! The selector never talks to the spreadsheet directly. A repository loads
//! the records and rules for a run and commits the selection markers.

use std::sync::Arc;

use async_trait::async_trait;
use reprice_common::config::{SelectionConfig, SheetsConfig};
use reprice_common::{Result, ResultExt};
use tracing::info;

use crate::policy::SelectionRules;
use crate::record::Record;
use crate::sheets::mapping::{marker_updates, parse_products, parse_rules, quote_sheet_title};
use crate::sheets::SheetsClient;

/// Storage the job reads products from and writes markers back to.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Every product row, in sheet order.
    async fn load(&self) -> Result<Vec<Record>>;

    /// The selection rules for this run.
    async fn load_rules(&self) -> Result<SelectionRules>;

    /// Mark `selected` and clear every other row of the `total_rows` data rows.
    async fn commit(&self, selected: &[Record], total_rows: usize) -> Result<()>;
}

#[async_trait]
impl<R: ProductRepository + ?Sized> ProductRepository for Arc<R> {
    async fn load(&self) -> Result<Vec<Record>> {
        (**self).load().await
    }

    async fn load_rules(&self) -> Result<SelectionRules> {
        (**self).load_rules().await
    }

    async fn commit(&self, selected: &[Record], total_rows: usize) -> Result<()> {
        (**self).commit(selected, total_rows).await
    }
}

// ============================================================================
// Sheet Repository
// ============================================================================

/// Repository over a Google spreadsheet with a products tab and a rules tab.
pub struct SheetRepository {
    client: SheetsClient,
    sheets: SheetsConfig,
    selection: SelectionConfig,
}

impl SheetRepository {
    pub fn new(client: SheetsClient, sheets: SheetsConfig, selection: SelectionConfig) -> Self {
        Self {
            client,
            sheets,
            selection,
        }
    }

    async fn read_tab(&self, index: usize) -> Result<(String, Vec<Vec<String>>)> {
        let title = self.client.sheet_title(index).await?;
        let rows = self.client.read_values(&quote_sheet_title(&title)).await?;
        Ok((title, rows))
    }
}

#[async_trait]
impl ProductRepository for SheetRepository {
    async fn load(&self) -> Result<Vec<Record>> {
        let (title, rows) = self
            .read_tab(self.sheets.products_sheet)
            .await
            .context("reading products sheet")?;

        let records = parse_products(&rows);
        info!(sheet = %title, records = records.len(), "Loaded products");
        Ok(records)
    }

    async fn load_rules(&self) -> Result<SelectionRules> {
        let (title, rows) = self
            .read_tab(self.sheets.rules_sheet)
            .await
            .context("reading rules sheet")?;

        let sheet = parse_rules(&rows).context(format!("parsing rules sheet '{}'", title))?;
        let rules = SelectionRules::from_sheet(&sheet, &self.selection)?;
        info!(
            sheet = %title,
            quota = rules.quota,
            policy = %rules.policy.kind(),
            "Loaded selection rules"
        );
        Ok(rules)
    }

    async fn commit(&self, selected: &[Record], total_rows: usize) -> Result<()> {
        if total_rows == 0 {
            info!("No data rows, nothing to mark");
            return Ok(());
        }

        let title = self
            .client
            .sheet_title(self.sheets.products_sheet)
            .await
            .context("resolving products sheet")?;
        let updates = marker_updates(&title, &self.sheets.marker_column, selected, total_rows);
        let cells = self
            .client
            .batch_update(&updates)
            .await
            .context("writing selection markers")?;

        info!(
            sheet = %title,
            column = %self.sheets.marker_column,
            marked = selected.len(),
            cells,
            "Selection markers written"
        );
        Ok(())
    }
}
