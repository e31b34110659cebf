//! build-hierarchy: raw stops → parent/children index

use super::Pipeline;
use crate::error::DownloaderResult;
use crate::models::Hierarchy;
use crate::services::hierarchy_builder::build_hierarchy;
use tracing::info;

impl Pipeline {
    /// Build the hierarchy from the downloaded stops and persist it
    ///
    /// Nothing is written when the hierarchy cannot be resolved.
    pub async fn build_hierarchy(&self) -> DownloaderResult<Hierarchy> {
        let stops = self.data.load_stations()?;
        info!(stops = stops.len(), "Stage build-hierarchy");

        let hierarchy = build_hierarchy(&stops)?;
        self.data.save_hierarchy(&hierarchy)?;

        info!(
            parents = hierarchy.len(),
            path = %self.data.hierarchy_path().display(),
            "Hierarchy saved"
        );
        Ok(hierarchy)
    }
}
