use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// The geocoded subject of one aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub country: Option<String>,
    pub coordinates: Coordinates,
    /// Upper-case ISO 3166-1 alpha-2 code, when the geocoder resolved one.
    pub country_code: Option<String>,
}

/// The single best geocoding match for a place query.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub coordinates: Coordinates,
    pub display_name: Option<String>,
    pub bounding_box: Option<Value>,
    pub extra_tags: Map<String, Value>,
    pub country_code: Option<String>,
}

impl GeocodeHit {
    pub fn tag(&self, key: &str) -> Option<&Value> {
        self.extra_tags
            .get(key)
            .filter(|v| !v.is_null() && v.as_str() != Some(""))
    }
}

/// Outcome of invoking one source connector.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceResult {
    Ok(Value),
    /// The connector had nothing to report; the section is left out.
    Empty,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionError {
    pub section: String,
    pub reason: String,
}

/// Record fields that share the JSON object with the flattened sections.
const RESERVED_KEYS: &[&str] = &["place", "generated_at", "errors"];

/// Aggregated output for one place: successful sections by name plus the
/// failures recorded along the way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub place: Place,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub sections: BTreeMap<String, Value>,
    pub errors: Vec<SectionError>,
}

impl Record {
    pub fn new(place: Place) -> Self {
        Self {
            place,
            generated_at: Utc::now(),
            sections: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn insert(&mut self, section: &str, result: SourceResult) {
        if RESERVED_KEYS.iter().any(|key| *key == section) {
            self.record_error(section, "section name collides with a record field");
            return;
        }
        match result {
            SourceResult::Ok(value) => {
                self.sections.insert(section.to_string(), value);
            }
            SourceResult::Empty => {}
            SourceResult::Failed { reason } => self.record_error(section, reason),
        }
    }

    pub fn record_error(&mut self, section: &str, reason: impl Into<String>) {
        self.errors.push(SectionError {
            section: section.to_string(),
            reason: reason.into(),
        });
    }
}

#[cfg(test)]
impl Record {
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    pub fn failed(&self, name: &str) -> bool {
        self.errors.iter().any(|e| e.section == name)
    }
}

/// One entry of the batch master list. Fields other than the key and
/// coordinates are carried through untouched, and enrichment results are
/// written into `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub code: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkItem {
    pub fn new(code: impl Into<String>, name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            lat,
            lng,
            extra: Map::new(),
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lon: self.lng,
        }
    }

    pub fn country(&self) -> Option<&str> {
        self.extra.get("country").and_then(Value::as_str)
    }
}

/// Fields produced for one work item. A `None` value marks a fetch that was
/// attempted and failed and is persisted as `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub fields: Vec<(String, Option<Value>)>,
    failed: bool,
}

impl Enrichment {
    pub fn set(&mut self, key: &str, value: Value) {
        self.fields.push((key.to_string(), Some(value)));
    }

    pub fn fail(&mut self, key: &str) {
        self.failed = true;
        self.fields.push((key.to_string(), None));
    }

    /// Records a failure that prevented the item from being enriched at all.
    pub fn error(&mut self, reason: impl Into<String>) {
        self.failed = true;
        self.fields
            .push(("error".to_string(), Some(Value::String(reason.into()))));
    }

    pub fn has_failures(&self) -> bool {
        self.failed
    }

    pub fn apply(self, item: &mut WorkItem) {
        for (key, value) in self.fields {
            item.extra.insert(key, value.unwrap_or(Value::Null));
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub already_processed: usize,
    pub processed: usize,
    pub with_failures: usize,
    pub chunks_persisted: usize,
}
