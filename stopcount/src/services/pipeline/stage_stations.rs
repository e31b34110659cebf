//! download-stations: fetch every GTFS stop and persist the raw list

use super::Pipeline;
use crate::error::DownloaderResult;
use tracing::info;

impl Pipeline {
    /// Download all stops and write them to the data folder
    ///
    /// # Returns
    /// Number of stops saved
    pub async fn download_stations(&self) -> DownloaderResult<usize> {
        info!("Stage download-stations: fetching GTFS stops");

        let stops = self.stations.fetch_all_stops().await?;
        self.data.save_stations(&stops)?;

        info!(
            stops = stops.len(),
            path = %self.data.stations_path().display(),
            "Stations saved"
        );
        Ok(stops.len())
    }
}
