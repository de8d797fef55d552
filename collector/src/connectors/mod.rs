pub mod citybikes;
pub mod exchange_rate;
pub mod nager_date;
pub mod nominatim;
pub mod open_elevation;
pub mod open_meteo;
pub mod openaq;
pub mod ourairports;
pub mod overpass;
pub mod wikidata;
pub mod wikivoyage;
pub mod world_bank;

use crate::model::{Coordinates, GeocodeHit, Place};
use async_trait::async_trait;
use collector_core::{Result, Transport};
use serde_json::Value;
use std::sync::Arc;

/// Resolves a place name to coordinates. Every other section depends on it.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the upstream answered but found no match.
    async fn geocode(&self, name: &str, country: Option<&str>) -> Result<Option<GeocodeHit>>;
}

/// Fallback elevation lookup used when the geocoder carries no `ele` tag.
#[async_trait]
pub trait ElevationLookup: Send + Sync {
    async fn elevation(&self, at: Coordinates) -> Result<Option<f64>>;
}

/// Per-coordinate lookups behind the batch climate enrichment.
#[async_trait]
pub trait ClimateLookup: Send + Sync {
    async fn location_meta(&self, at: Coordinates) -> Result<open_meteo::LocationMeta>;

    async fn monthly_climate(&self, at: Coordinates) -> Result<Vec<open_meteo::MonthlyClimate>>;
}

/// One upstream-specific section of the aggregated record.
///
/// Connectors never retry on their own; the shared `Transport` does. Failures
/// are returned as errors, never embedded in the payload.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Key of the section in the record.
    fn section(&self) -> &'static str;

    /// Sections that only make sense with a resolved country code.
    fn requires_country_code(&self) -> bool {
        false
    }

    /// `Ok(None)` when there is nothing to report for this place.
    async fn fetch(&self, place: &Place) -> Result<Option<Value>>;
}

/// Pulls the country code a connector declared as required.
pub(crate) fn country_code(place: &Place) -> Result<&str> {
    place.country_code.as_deref().ok_or_else(|| {
        collector_core::Error::Validation(format!("{} has no resolved country code", place.name))
    })
}

/// The fixed, ordered section set used for a full aggregation.
pub fn default_sections(
    transport: &Arc<Transport>,
    tourism_enabled: bool,
) -> Vec<Arc<dyn SourceConnector>> {
    let mut sections: Vec<Arc<dyn SourceConnector>> = vec![
        Arc::new(open_meteo::WeatherSection::new(Arc::clone(transport))),
        Arc::new(world_bank::EconomySection::new(Arc::clone(transport))),
        Arc::new(wikidata::CityProfileSection::new(Arc::clone(transport))),
        Arc::new(wikidata::LegalSection::new(Arc::clone(transport))),
        Arc::new(ourairports::AirportsSection::new(Arc::clone(transport))),
        Arc::new(MobilitySection::new(Arc::clone(transport))),
        Arc::new(openaq::AirQualitySection::new(Arc::clone(transport))),
        Arc::new(nager_date::HolidaysSection::new(Arc::clone(transport))),
        Arc::new(exchange_rate::FxSection::new(Arc::clone(transport))),
        Arc::new(wikivoyage::CultureSection::new(Arc::clone(transport))),
    ];

    if tourism_enabled {
        sections.push(Arc::new(wikidata::TourismSection::new(Arc::clone(transport))));
    }

    sections
}

/// Bike share plus walkability and shared-mobility counts.
pub struct MobilitySection {
    transport: Arc<Transport>,
}

impl MobilitySection {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SourceConnector for MobilitySection {
    fn section(&self) -> &'static str {
        "mobility"
    }

    async fn fetch(&self, place: &Place) -> Result<Option<Value>> {
        let nearest = citybikes::nearest_network(&self.transport, place.coordinates).await?;
        let walk_bike = overpass::walk_bike_counts(&self.transport, &place.name).await?;
        let coworking = overpass::coworking_count(&self.transport, &place.name).await?;
        let rentals = overpass::rental_and_carshare_counts(&self.transport, &place.name).await?;

        Ok(Some(serde_json::json!({
            "nearest_bike_share": nearest,
            "walk_bike_counts": walk_bike,
            "coworking_spaces_count": coworking,
            "rental_and_carshare_counts": rentals,
        })))
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    6371.0 * 2.0 * h.sqrt().asin()
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_distance() {
        let vilnius = Coordinates { lat: 54.6872, lon: 25.2797 };
        let kaunas = Coordinates { lat: 54.8985, lon: 23.9036 };
        let d = haversine_km(vilnius, kaunas);
        assert!((d - 92.0).abs() < 2.0, "got {d}");
        assert_eq!(haversine_km(vilnius, vilnius), 0.0);
    }

    #[test]
    fn registers_sections_in_record_order() {
        let transport = Arc::new(Transport::new(&collector_core::Config::default().http).unwrap());

        let names: Vec<&str> = default_sections(&transport, true)
            .iter()
            .map(|s| s.section())
            .collect();

        assert_eq!(
            names,
            vec![
                "weather",
                "economy",
                "city_profile",
                "international_legal",
                "airports_nearby",
                "mobility",
                "air_quality",
                "events_holidays",
                "fx_rates",
                "culture_wikivoyage",
                "tourism",
            ]
        );
        assert!(default_sections(&transport, false)
            .iter()
            .all(|s| s.section() != "tourism"));
    }

    #[test]
    fn rounds_to_one_decimal() {
        assert_eq!(round1(12.345), 12.3);
        assert_eq!(round1(0.05), 0.1);
    }
}
