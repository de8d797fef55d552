use super::SourceConnector;
use crate::model::{Coordinates, Place};
use async_trait::async_trait;
use collector_core::{Result, Transport};
use serde_json::{json, Value};
use std::sync::Arc;

const API_URL: &str = "https://api.openaq.org/v2";
const SEARCH_RADIUS_M: u32 = 50_000;

fn first_result(response: &Value) -> Option<Value> {
    response.get("results")?.as_array()?.first().cloned()
}

pub async fn nearest_station(transport: &Transport, at: Coordinates) -> Result<Option<Value>> {
    let params = [
        ("coordinates", format!("{},{}", at.lat, at.lon)),
        ("radius", SEARCH_RADIUS_M.to_string()),
        ("order_by", "distance".to_string()),
        ("limit", "1".to_string()),
    ];
    let response: Value = transport
        .get_json(&format!("{API_URL}/locations"), &params, None)
        .await?;
    Ok(first_result(&response))
}

/// Latest measurements from the closest station, `None` when no station is in range.
pub async fn latest_air_quality(transport: &Transport, at: Coordinates) -> Result<Option<Value>> {
    let Some(station) = nearest_station(transport, at).await? else {
        return Ok(None);
    };
    let Some(id) = station.get("id").cloned() else {
        return Ok(None);
    };

    let params = [
        ("location_id", match id {
            Value::String(id) => id,
            other => other.to_string(),
        }),
        ("limit", "100".to_string()),
        ("order_by", "datetime".to_string()),
        ("sort", "desc".to_string()),
    ];
    let measurements: Value = transport
        .get_json(&format!("{API_URL}/measurements"), &params, None)
        .await?;

    Ok(Some(json!({
        "station": station,
        "measurements": measurements.get("results").cloned().unwrap_or_else(|| json!([])),
    })))
}

pub struct AirQualitySection {
    transport: Arc<Transport>,
}

impl AirQualitySection {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SourceConnector for AirQualitySection {
    fn section(&self) -> &'static str {
        "air_quality"
    }

    async fn fetch(&self, place: &Place) -> Result<Option<Value>> {
        latest_air_quality(&self.transport, place.coordinates).await
    }
}
