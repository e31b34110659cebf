//! Remote seams
//!
//! The pipeline talks to the remote API only through these two traits, so
//! stages can be driven by the HTTP client in production and by scripted
//! sources in tests.

use crate::error::TransportError;
use crate::models::StopFeature;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One page request for one stop
///
/// The `stop_id` is the request token: responses are attributed to the stop
/// that was asked for, never to whatever the payload claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub stop_id: String,
    pub date: NaiveDate,
    pub offset: u64,
    pub limit: u32,
}

/// One stop time item of a page
///
/// Only the number of items matters to the counter. `stop_id` is read when
/// present and is never required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopTime {
    #[serde(default)]
    pub stop_id: Option<String>,
}

/// Paginated stop times per stop and date
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page; an empty page means the stop is exhausted
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<StopTime>, TransportError>;
}

/// The full list of GTFS stops
#[async_trait]
pub trait StationSource: Send + Sync {
    async fn fetch_all_stops(&self) -> Result<Vec<StopFeature>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_time_without_stop_id_decodes() {
        let items: Vec<StopTime> = serde_json::from_str(
            r#"[
                {"stop_id": "U1072Z101P", "arrival_time": "10:00:00"},
                {"arrival_time": "10:05:00", "stop_sequence": 4},
                {"stop_id": null}
            ]"#,
        )
        .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].stop_id.as_deref(), Some("U1072Z101P"));
        assert_eq!(items[1].stop_id, None);
        assert_eq!(items[2].stop_id, None);
    }
}
