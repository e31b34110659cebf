//! In-memory Golemio API
//!
//! Serves a fixed stop list and scripted stop times pages, so pipeline
//! stages can run end to end without the network.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stopcount::error::TransportError;
use stopcount::models::{StopFeature, StopProperties};
use stopcount::services::chunked_scheduler::{CooldownPolicy, NoCooldown};
use stopcount::types::{PageRequest, PageSource, StationSource, StopTime};
use stopcount::{DataDir, Pipeline};
use stopcount_common::config::GolemioConfig;
use tokio_util::sync::CancellationToken;

/// Raw stop as the stops endpoint would return it
pub fn stop(id: &str, parent: Option<&str>) -> StopFeature {
    StopFeature {
        properties: StopProperties {
            stop_id: id.to_string(),
            stop_name: format!("Station {}", id),
            stop_lat: Some(50.08),
            stop_lon: Some(14.42),
            parent_station: parent.map(str::to_string),
            extra: Default::default(),
        },
    }
}

pub fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()
}

/// Scripted API
#[derive(Default)]
pub struct FakeApi {
    stops: Vec<StopFeature>,
    /// stop id → page lengths, in order; stops not listed return one empty page
    pages: HashMap<String, Vec<u64>>,
    /// Stops whose first request fails
    failing: HashSet<String>,
    /// Cancel this token when the given stop is first requested
    cancel_on: Mutex<Option<(String, CancellationToken)>>,
    requests: AtomicUsize,
    requested_stops: Mutex<HashSet<String>>,
}

impl FakeApi {
    pub fn new(stops: Vec<StopFeature>) -> Self {
        Self {
            stops,
            ..Default::default()
        }
    }

    pub fn with_pages(mut self, stop_id: &str, pages: Vec<u64>) -> Self {
        self.pages.insert(stop_id.to_string(), pages);
        self
    }

    pub fn failing(mut self, stop_id: &str) -> Self {
        self.failing.insert(stop_id.to_string());
        self
    }

    pub fn cancel_when_requested(self, stop_id: &str, token: CancellationToken) -> Self {
        *self.cancel_on.lock().unwrap() = Some((stop_id.to_string(), token));
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn was_requested(&self, stop_id: &str) -> bool {
        self.requested_stops.lock().unwrap().contains(stop_id)
    }

    fn page_len(&self, stop_id: &str, offset: u64) -> u64 {
        let mut start = 0;
        for len in self.pages.get(stop_id).map(Vec::as_slice).unwrap_or(&[]) {
            if start == offset {
                return *len;
            }
            start += len;
        }
        0
    }
}

#[async_trait]
impl PageSource for FakeApi {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<StopTime>, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.requested_stops
            .lock()
            .unwrap()
            .insert(request.stop_id.clone());

        if let Some((stop_id, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if *stop_id == request.stop_id {
                token.cancel();
            }
        }

        if request.offset == 0 && self.failing.contains(&request.stop_id) {
            return Err(TransportError::Network("connection reset".to_string()));
        }

        let len = self.page_len(&request.stop_id, request.offset);
        Ok((0..len)
            .map(|_| StopTime {
                stop_id: Some(request.stop_id.clone()),
            })
            .collect())
    }
}

#[async_trait]
impl StationSource for FakeApi {
    async fn fetch_all_stops(&self) -> Result<Vec<StopFeature>, TransportError> {
        Ok(self.stops.clone())
    }
}

/// Cooldown that only records when it was asked to pause
#[derive(Default)]
pub struct CountingCooldown {
    pub calls: Mutex<Vec<usize>>,
}

#[async_trait]
impl CooldownPolicy for CountingCooldown {
    async fn cooldown(&self, completed_batch: usize) {
        self.calls.lock().unwrap().push(completed_batch);
    }
}

/// Pipeline over `api` with no cooldown
pub fn test_pipeline(data: &std::path::Path, api: Arc<FakeApi>, batch_size: usize) -> Pipeline {
    let config = GolemioConfig {
        batch_size,
        page_size: 1000,
        concurrency: 5,
        cooldown_secs: 0,
        ..Default::default()
    };
    Pipeline::new(DataDir::new(data), api.clone(), api, &config).with_cooldown(Arc::new(NoCooldown))
}
