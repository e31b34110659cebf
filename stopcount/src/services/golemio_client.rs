//! Golemio API client
//!
//! Implements both remote seams over HTTP:
//! - `gtfs/stoptimes/{stop_id}` pages for the wavefront counter
//! - `gtfs/stops` pages for the station list
//!
//! Any non-2xx status is a hard error for that request. There is no retry
//! here: re-paging is the wavefront's job.

use crate::error::TransportError;
use crate::models::StopFeature;
use crate::types::{PageRequest, PageSource, StationSource, StopTime};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use stopcount_common::config::GolemioConfig;
use stopcount_common::time::format_date;

const ACCESS_TOKEN_HEADER: &str = "X-Access-Token";

/// `gtfs/stops` wraps its items in a GeoJSON feature collection
#[derive(Debug, Deserialize)]
struct StopsPage {
    #[serde(default)]
    features: Vec<StopFeature>,
}

/// Golemio API client
pub struct GolemioClient {
    http_client: reqwest::Client,
    base_url: Url,
    access_token: String,
    page_size: u32,
}

impl GolemioClient {
    pub fn new(config: &GolemioConfig, access_token: String) -> Result<Self, TransportError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(format!(
                "{}: cannot be used as a base URL",
                config.base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(stopcount_common::config::get_user_agent())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            access_token,
            page_size: config.page_size,
        })
    }

    /// `base_url` with `segments` appended as percent-encoded path segments
    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// URL of one stop times page
    pub fn stop_times_url(&self, request: &PageRequest) -> Result<Url, TransportError> {
        let mut url = self.endpoint(&["gtfs", "stoptimes", request.stop_id.as_str()])?;
        url.query_pairs_mut()
            .append_pair("date", &format_date(request.date))
            .append_pair("limit", &request.limit.to_string())
            .append_pair("offset", &request.offset.to_string());
        Ok(url)
    }

    /// URL of one stops page
    pub fn stops_url(&self, offset: u64) -> Result<Url, TransportError> {
        let mut url = self.endpoint(&["gtfs", "stops"])?;
        url.query_pairs_mut()
            .append_pair("limit", &self.page_size.to_string())
            .append_pair("offset", &offset.to_string());
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, TransportError> {
        let response = self
            .http_client
            .get(url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PageSource for GolemioClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<StopTime>, TransportError> {
        let url = self.stop_times_url(request)?;
        tracing::debug!(stop_id = %request.stop_id, offset = request.offset, "Requesting stop times page");
        self.get_json(url).await
    }
}

#[async_trait]
impl StationSource for GolemioClient {
    async fn fetch_all_stops(&self) -> Result<Vec<StopFeature>, TransportError> {
        let mut stops = Vec::new();
        let mut offset = 0u64;

        loop {
            let url = self.stops_url(offset)?;
            let page: StopsPage = self.get_json(url).await?;
            if page.features.is_empty() {
                break;
            }

            offset += page.features.len() as u64;
            tracing::debug!(received = page.features.len(), total = offset, "Received stops page");
            stops.extend(page.features);
        }

        tracing::info!(stops = stops.len(), "Downloaded all GTFS stops");
        Ok(stops)
    }
}
