//! aggregate: fold every count record of a date into parent totals

use super::Pipeline;
use crate::error::DownloaderResult;
use crate::models::ParentTotals;
use crate::services::run_aggregator::aggregate;
use chrono::NaiveDate;
use stopcount_common::time::format_date;
use tracing::info;

impl Pipeline {
    /// Aggregate `date` and persist the totals
    pub async fn aggregate(&self, date: NaiveDate) -> DownloaderResult<ParentTotals> {
        let hierarchy = self.data.load_hierarchy()?;
        let batches = self.data.load_count_records(date)?;
        info!(date = %format_date(date), batches = batches.len(), "Stage aggregate");

        let totals = aggregate(&hierarchy, &batches)?;
        self.data.save_totals(date, &totals)?;

        info!(path = %self.data.totals_path(date).display(), "Totals saved");
        Ok(totals)
    }
}
