//! Airports near a coordinate, from the OurAirports public CSV dump.

use super::{haversine_km, round1, SourceConnector};
use crate::model::{Coordinates, Place};
use async_trait::async_trait;
use collector_core::{Error, Result, Transport};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

const AIRPORTS_URL: &str = "https://ourairports.com/data/airports.csv";
const RADIUS_KM: f64 = 150.0;
const MAX_RESULTS: usize = 20;
// The dump is several megabytes
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct AirportRow {
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    iata_code: Option<String>,
    latitude_deg: f64,
    longitude_deg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyAirport {
    pub name: String,
    pub iata: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub distance_km: f64,
}

#[derive(Debug, Clone)]
struct Airport {
    name: String,
    kind: Option<String>,
    iata: Option<String>,
    at: Coordinates,
}

/// Parses the dump, skipping rows without usable coordinates.
fn parse_airports(csv_text: &str) -> Result<Vec<Airport>> {
    let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
    let headers = reader.headers().map_err(|e| Error::Decode {
        url: AIRPORTS_URL.to_string(),
        details: e.to_string(),
    })?;
    if !headers.iter().any(|h| h == "latitude_deg") {
        return Err(Error::Decode {
            url: AIRPORTS_URL.to_string(),
            details: "missing latitude_deg column".to_string(),
        });
    }

    let mut skipped = 0usize;
    let airports: Vec<Airport> = reader
        .deserialize::<AirportRow>()
        .filter_map(|row| match row {
            Ok(row) => Some(Airport {
                name: row.name,
                kind: row.kind.filter(|k| !k.is_empty()),
                iata: row.iata_code.filter(|c| !c.is_empty()),
                at: Coordinates { lat: row.latitude_deg, lon: row.longitude_deg },
            }),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();

    debug!(airports = airports.len(), skipped, "Parsed airport list");
    Ok(airports)
}

/// Airports within the search radius, closest first.
fn near(airports: &[Airport], at: Coordinates) -> Vec<NearbyAirport> {
    let mut nearby: Vec<NearbyAirport> = airports
        .iter()
        .filter_map(|airport| {
            let distance = haversine_km(at, airport.at);
            (distance <= RADIUS_KM).then(|| NearbyAirport {
                name: airport.name.clone(),
                iata: airport.iata.clone(),
                kind: airport.kind.clone(),
                distance_km: round1(distance),
            })
        })
        .collect();

    nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    nearby.truncate(MAX_RESULTS);
    nearby
}

/// The parsed dump is kept for the life of the process, so batch runs
/// download it once.
pub struct AirportsSection {
    transport: Arc<Transport>,
    airports: OnceCell<Vec<Airport>>,
}

impl AirportsSection {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            airports: OnceCell::new(),
        }
    }

    async fn airports(&self) -> Result<&[Airport]> {
        let airports = self
            .airports
            .get_or_try_init(|| async {
                let text = self
                    .transport
                    .get_text(AIRPORTS_URL, &[], Some(DOWNLOAD_TIMEOUT))
                    .await?;
                parse_airports(&text)
            })
            .await?;
        Ok(airports)
    }
}

#[async_trait]
impl SourceConnector for AirportsSection {
    fn section(&self) -> &'static str {
        "airports_nearby"
    }

    async fn fetch(&self, place: &Place) -> Result<Option<Value>> {
        let airports = self.airports().await?;
        Ok(Some(json!(near(airports, place.coordinates))))
    }
}
