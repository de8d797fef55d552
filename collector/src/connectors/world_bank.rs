use super::{country_code, SourceConnector};
use crate::model::Place;
use async_trait::async_trait;
use collector_core::{Result, Transport};
use serde_json::{Map, Value};
use std::sync::Arc;

const API_URL: &str = "https://api.worldbank.org/v2";

const INDICATORS: &[(&str, &str)] = &[
    ("gdp_per_capita_current_usd", "NY.GDP.PCAP.CD"),
    ("unemployment_rate_percent", "SL.UEM.TOTL.ZS"),
];

/// Most recent non-null observation of an indicator, as `(value, year)`.
pub async fn latest_indicator(
    transport: &Transport,
    country_iso2: &str,
    indicator: &str,
) -> Result<Option<(Value, Value)>> {
    let url = format!("{API_URL}/country/{country_iso2}/indicator/{indicator}");
    let params = [("format", "json".to_string()), ("per_page", "120".to_string())];
    let response: Value = transport.get_json(&url, &params, None).await?;
    Ok(latest_observation(&response))
}

// Responses are `[paging, [rows...]]`, newest first.
fn latest_observation(response: &Value) -> Option<(Value, Value)> {
    response
        .get(1)?
        .as_array()?
        .iter()
        .find(|row| row.get("value").is_some_and(|v| !v.is_null()))
        .map(|row| {
            (
                row["value"].clone(),
                row.get("date").cloned().unwrap_or(Value::Null),
            )
        })
}

pub struct EconomySection {
    transport: Arc<Transport>,
}

impl EconomySection {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SourceConnector for EconomySection {
    fn section(&self) -> &'static str {
        "economy"
    }

    fn requires_country_code(&self) -> bool {
        true
    }

    async fn fetch(&self, place: &Place) -> Result<Option<Value>> {
        let cc = country_code(place)?;
        let mut snapshot = Map::new();
        for (key, indicator) in INDICATORS {
            if let Some((value, year)) = latest_indicator(&self.transport, cc, indicator).await? {
                snapshot.insert(key.to_string(), value);
                snapshot.insert(format!("{key}_year"), year);
            }
        }
        Ok(Some(Value::Object(snapshot)))
    }
}
