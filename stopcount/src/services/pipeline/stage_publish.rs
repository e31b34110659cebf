//! publish: merge a date's totals into the durable final record

use super::Pipeline;
use crate::error::DownloaderResult;
use crate::models::FinalRecord;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use stopcount_common::time::format_date;
use tracing::info;

impl Pipeline {
    /// Upsert `date` into the final record
    pub async fn publish(&self, date: NaiveDate) -> DownloaderResult<FinalRecord> {
        let hierarchy = self.data.load_hierarchy()?;
        let totals = self.data.load_totals(date)?;
        info!(date = %format_date(date), parents = totals.len(), "Stage publish");

        self.data.final_store().publish(&hierarchy, &totals, date)
    }

    /// Dates present in the final record, ascending
    pub fn recorded_dates(&self) -> DownloaderResult<BTreeSet<String>> {
        Ok(self.data.final_store().load()?.recorded_dates())
    }
}
