use super::ElevationLookup;
use crate::model::Coordinates;
use async_trait::async_trait;
use collector_core::{Result, Transport};
use serde::Deserialize;
use std::sync::Arc;

const LOOKUP_URL: &str = "https://api.open-elevation.com/api/v1/lookup";

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    elevation: Option<f64>,
}

pub struct OpenElevation {
    transport: Arc<Transport>,
}

impl OpenElevation {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ElevationLookup for OpenElevation {
    async fn elevation(&self, at: Coordinates) -> Result<Option<f64>> {
        let params = [("locations", format!("{},{}", at.lat, at.lon))];
        let response: LookupResponse = self.transport.get_json(LOOKUP_URL, &params, None).await?;
        Ok(first_elevation(response))
    }
}

fn first_elevation(response: LookupResponse) -> Option<f64> {
    response.results.into_iter().next().and_then(|r| r.elevation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn takes_first_result() {
        let response: LookupResponse = serde_json::from_value(json!({
            "results": [{"latitude": 54.6, "longitude": 25.2, "elevation": 117.0}]
        }))
        .unwrap();
        assert_eq!(first_elevation(response), Some(117.0));
    }

    #[test]
    fn empty_results_yield_none() {
        let response: LookupResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(first_elevation(response), None);
    }
}
