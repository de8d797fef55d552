//! In-memory stand-ins for the upstream-facing traits.

use crate::connectors::{ElevationLookup, Geocoder, SourceConnector};
use crate::model::{Coordinates, GeocodeHit, Place};
use async_trait::async_trait;
use collector_core::{Error, Result};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct FakeGeocoder {
    pub hit: Option<GeocodeHit>,
    pub fail: bool,
}

impl FakeGeocoder {
    pub fn found(hit: GeocodeHit) -> Self {
        Self { hit: Some(hit), fail: false }
    }

    pub fn failing() -> Self {
        Self { hit: None, fail: true }
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, _name: &str, _country: Option<&str>) -> Result<Option<GeocodeHit>> {
        if self.fail {
            return Err(Error::Internal("connection reset".into()));
        }
        Ok(self.hit.clone())
    }
}

#[derive(Default)]
pub struct FakeElevation {
    pub calls: AtomicUsize,
    pub fail: bool,
    pub hang: bool,
}

#[async_trait]
impl ElevationLookup for FakeElevation {
    async fn elevation(&self, _at: Coordinates) -> Result<Option<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail {
            Err(Error::Internal("timeout".into()))
        } else {
            Ok(Some(112.0))
        }
    }
}

pub enum Behavior {
    Value(Value),
    Nothing,
    Fail,
    Hang,
}

pub struct FakeSection {
    pub name: &'static str,
    pub behavior: Behavior,
    pub needs_country: bool,
    pub calls: AtomicUsize,
}

impl FakeSection {
    pub fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self { name, behavior, needs_country: false, calls: AtomicUsize::new(0) })
    }

    pub fn needing_country(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior: Behavior::Value(json!({"ok": true})),
            needs_country: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceConnector for FakeSection {
    fn section(&self) -> &'static str {
        self.name
    }

    fn requires_country_code(&self) -> bool {
        self.needs_country
    }

    async fn fetch(&self, _place: &Place) -> Result<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Value(v) => Ok(Some(v.clone())),
            Behavior::Nothing => Ok(None),
            Behavior::Fail => Err(Error::Internal("HTTP 503 Service Unavailable".into())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
        }
    }
}

/// A Vilnius geocoding hit with optional `ele` tag and country code.
pub fn hit(ele: Option<&str>, country_code: Option<&str>) -> GeocodeHit {
    let mut extra_tags = Map::new();
    if let Some(ele) = ele {
        extra_tags.insert("ele".into(), json!(ele));
    }
    GeocodeHit {
        coordinates: Coordinates { lat: 54.6872, lon: 25.2797 },
        display_name: Some("Vilnius, Lithuania".into()),
        bounding_box: None,
        extra_tags,
        country_code: country_code.map(str::to_string),
    }
}

pub fn sections(fakes: Vec<Arc<FakeSection>>) -> Vec<Arc<dyn SourceConnector>> {
    fakes.into_iter().map(|s| s as Arc<dyn SourceConnector>).collect()
}
