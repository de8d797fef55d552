use super::Geocoder;
use crate::model::{Coordinates, GeocodeHit};
use async_trait::async_trait;
use collector_core::{Error, Result, Transport};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

const SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: Option<String>,
    boundingbox: Option<Value>,
    #[serde(default)]
    extratags: Option<Map<String, Value>>,
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct Address {
    country_code: Option<String>,
}

pub struct NominatimGeocoder {
    transport: Arc<Transport>,
}

impl NominatimGeocoder {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

pub fn search_query(name: &str, country: Option<&str>) -> String {
    match country {
        Some(country) if !country.trim().is_empty() => format!("{name}, {country}"),
        _ => name.to_string(),
    }
}

fn into_hit(hit: SearchHit) -> Result<GeocodeHit> {
    let parse = |field: &str, raw: &str| {
        raw.parse::<f64>().map_err(|e| Error::Decode {
            url: SEARCH_URL.to_string(),
            details: format!("invalid {field} {raw:?}: {e}"),
        })
    };

    Ok(GeocodeHit {
        coordinates: Coordinates {
            lat: parse("lat", &hit.lat)?,
            lon: parse("lon", &hit.lon)?,
        },
        display_name: hit.display_name,
        bounding_box: hit.boundingbox,
        extra_tags: hit.extratags.unwrap_or_default(),
        country_code: hit
            .address
            .and_then(|a| a.country_code)
            .filter(|cc| !cc.is_empty())
            .map(|cc| cc.to_uppercase()),
    })
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[instrument(skip(self))]
    async fn geocode(&self, name: &str, country: Option<&str>) -> Result<Option<GeocodeHit>> {
        let params = [
            ("q", search_query(name, country)),
            ("format", "jsonv2".to_string()),
            ("addressdetails", "1".to_string()),
            ("extratags", "1".to_string()),
            ("limit", "1".to_string()),
        ];

        let hits: Vec<SearchHit> = self.transport.get_json(SEARCH_URL, &params, None).await?;
        debug!(results = hits.len(), "Geocoding response");

        hits.into_iter().next().map(into_hit).transpose()
    }
}
