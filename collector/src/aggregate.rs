//! Composes independent source fetches into one record per place.
//!
//! Only geocoding is fatal. Every other section is isolated: its failure is
//! recorded on the record and the remaining sections still run.

use crate::connectors::{ElevationLookup, Geocoder, SourceConnector};
use crate::model::{GeocodeHit, Place, Record, SourceResult};
use collector_core::config::AggregateConfig;
use collector_core::{Error, Result};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

const DEADLINE_EXCEEDED: &str = "aggregation deadline exceeded";

pub struct Aggregator {
    geocoder: Arc<dyn Geocoder>,
    elevation: Arc<dyn ElevationLookup>,
    sections: Vec<Arc<dyn SourceConnector>>,
    max_concurrency: usize,
    deadline: Duration,
}

impl Aggregator {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        elevation: Arc<dyn ElevationLookup>,
        sections: Vec<Arc<dyn SourceConnector>>,
        config: &AggregateConfig,
    ) -> Self {
        Self {
            geocoder,
            elevation,
            sections,
            max_concurrency: config.max_concurrency.max(1),
            deadline: Duration::from_secs(config.deadline_secs),
        }
    }

    #[instrument(skip(self))]
    pub async fn aggregate(&self, place_name: &str, country: Option<&str>) -> Result<Record> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.deadline;

        let hit = self.resolve(place_name, country).await?;
        let place = Place {
            name: place_name.to_string(),
            country: country.map(str::to_string),
            coordinates: hit.coordinates,
            country_code: hit.country_code.clone(),
        };

        let mut record = Record::new(place);
        self.add_geography(&mut record, &hit, deadline).await;

        // Owned futures: each fetch holds its own connector handle and place.
        let fetches: Vec<BoxFuture<'static, (&'static str, Option<SourceResult>)>> = self
            .sections
            .iter()
            .cloned()
            .map(|connector| {
                let place = record.place.clone();
                async move {
                    let section = connector.section();
                    (section, run_section(connector.as_ref(), &place, deadline).await)
                }
                .boxed()
            })
            .collect();

        // `buffered` keeps section order while running up to `max_concurrency` at once
        let outcomes: Vec<(&'static str, Option<SourceResult>)> = stream::iter(fetches)
            .buffered(self.max_concurrency)
            .collect()
            .await;

        for (section, outcome) in outcomes {
            match outcome {
                Some(result) => record.insert(section, result),
                None => debug!(section, "Section not applicable, skipped"),
            }
        }

        info!(
            place = place_name,
            sections = record.sections.len(),
            errors = record.errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregation finished"
        );
        histogram!("collector_aggregate_duration_ms").record(started.elapsed().as_millis() as f64);

        Ok(record)
    }

    async fn resolve(&self, place_name: &str, country: Option<&str>) -> Result<GeocodeHit> {
        let fatal = |details: String| Error::Geocoding {
            place: match country {
                Some(country) => format!("{place_name}, {country}"),
                None => place_name.to_string(),
            },
            details,
        };

        match self.geocoder.geocode(place_name, country).await {
            Ok(Some(hit)) => Ok(hit),
            Ok(None) => Err(fatal("no match".to_string())),
            Err(e) => Err(fatal(e.to_string())),
        }
    }

    /// Geography comes from the geocoder; elevation falls back to a separate
    /// lookup when the geocoder carries no `ele` tag.
    async fn add_geography(
        &self,
        record: &mut Record,
        hit: &GeocodeHit,
        deadline: tokio::time::Instant,
    ) {
        let mut geography = json!({
            "coordinates": {"lat": hit.coordinates.lat, "lon": hit.coordinates.lon},
            "display_name": hit.display_name,
            "boundingbox": hit.bounding_box,
            "elevation_tag": hit.tag("ele"),
            "timezone_tag": hit.tag("timezone"),
        });

        if hit.tag("ele").is_none() {
            match tokio::time::timeout_at(deadline, self.elevation.elevation(hit.coordinates)).await {
                Ok(Ok(Some(meters))) => geography["elevation_m"] = json!(meters),
                Ok(Ok(None)) => debug!("Elevation lookup returned no value"),
                Ok(Err(e)) => {
                    warn!(error = %e, "Elevation fallback failed");
                    record.record_error("geography.elevation", e.to_string());
                }
                Err(_) => {
                    warn!("Elevation fallback hit the aggregation deadline");
                    record.record_error("geography.elevation", DEADLINE_EXCEEDED);
                }
            }
        }

        record.insert("geography", SourceResult::Ok(geography));
    }
}

/// Runs one connector under the shared deadline. `None` means the section
/// does not apply to this place and was not attempted.
async fn run_section(
    connector: &dyn SourceConnector,
    place: &Place,
    deadline: tokio::time::Instant,
) -> Option<SourceResult> {
    let section = connector.section();
    if connector.requires_country_code() && place.country_code.is_none() {
        return None;
    }

    let started = Instant::now();
    let result = match tokio::time::timeout_at(deadline, connector.fetch(place)).await {
        Ok(Ok(None)) | Ok(Ok(Some(Value::Null))) => SourceResult::Empty,
        Ok(Ok(Some(value))) => SourceResult::Ok(value),
        Ok(Err(e)) => SourceResult::Failed {
            reason: Error::source_failure(section, e).to_string(),
        },
        Err(_) => SourceResult::Failed {
            reason: Error::source_failure(section, DEADLINE_EXCEEDED).to_string(),
        },
    };

    let status = match &result {
        SourceResult::Ok(_) => "ok",
        SourceResult::Empty => "empty",
        SourceResult::Failed { reason } => {
            warn!(section, reason = %reason, "Section failed");
            "failed"
        }
    };
    counter!("collector_sections_total", "section" => section, "status" => status).increment(1);
    histogram!("collector_section_duration_ms", "section" => section)
        .record(started.elapsed().as_millis() as f64);

    Some(result)
}
