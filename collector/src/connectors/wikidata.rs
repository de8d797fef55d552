//! Wikidata SPARQL lookups: city facts, country practicalities and
//! tourism points of interest around a coordinate.

use super::SourceConnector;
use crate::model::{Coordinates, Place};
use async_trait::async_trait;
use collector_core::{Result, Transport};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

const SPARQL_URL: &str = "https://query.wikidata.org/sparql";

const PREFIXES: &str = "PREFIX wd: <http://www.wikidata.org/entity/>
PREFIX wdt: <http://www.wikidata.org/prop/direct/>
PREFIX wikibase: <http://wikiba.se/ontology#>
PREFIX geo: <http://www.opengis.net/ont/geosparql#>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
";

const LABEL_SERVICE: &str =
    r#"SERVICE wikibase:label { bd:serviceParam wikibase:language "[AUTO_LANGUAGE],en". }"#;

type Binding = Map<String, Value>;

pub async fn query(transport: &Transport, sparql: &str) -> Result<Vec<Binding>> {
    let params = [
        ("query", format!("{PREFIXES}{sparql}")),
        ("format", "json".to_string()),
    ];
    let response: Value = transport.get_json(SPARQL_URL, &params, None).await?;
    Ok(bindings(response))
}

fn bindings(response: Value) -> Vec<Binding> {
    response
        .get("results")
        .and_then(|r| r.get("bindings"))
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.as_object().cloned())
                .collect()
        })
        .unwrap_or_default()
}

/// The literal value of a binding column.
fn literal<'a>(row: &'a Binding, key: &str) -> Option<&'a str> {
    row.get(key)?.get("value")?.as_str()
}

fn entity_id(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

pub async fn city_core(transport: &Transport, city: &str, country: &str) -> Result<Option<Value>> {
    let sparql = format!(
        r#"SELECT ?city ?cityLabel ?population ?area ?elevation ?timezoneLabel ?countryLabel WHERE {{
  ?city rdfs:label "{city}"@en.
  ?city wdt:P17 ?countryEntity.
  ?countryEntity rdfs:label "{country}"@en.
  OPTIONAL {{ ?city wdt:P1082 ?population. }}
  OPTIONAL {{ ?city wdt:P2046 ?area. }}
  OPTIONAL {{ ?city wdt:P2044 ?elevation. }}
  OPTIONAL {{ ?city wdt:P421 ?timezone. ?timezone rdfs:label ?timezoneLabel FILTER(LANG(?timezoneLabel)='en'). }}
  {LABEL_SERVICE}
}}
LIMIT 1"#,
        city = escape(city),
        country = escape(country),
    );
    let rows = query(transport, &sparql).await?;
    Ok(rows.first().map(city_facts))
}

fn city_facts(row: &Binding) -> Value {
    json!({
        "qid": literal(row, "city").map(entity_id),
        "name": literal(row, "cityLabel"),
        "population": literal(row, "population"),
        "area_km2": literal(row, "area"),
        "elevation_m": literal(row, "elevation"),
        "timezone": literal(row, "timezoneLabel"),
        "country": literal(row, "countryLabel"),
    })
}

pub async fn country_legal(transport: &Transport, country: &str) -> Result<Option<Value>> {
    let sparql = format!(
        r#"SELECT ?country ?countryLabel ?currencyLabel ?languageLabel ?emergency ?drinkingAge ?plugLabel ?voltage ?drivingSideLabel WHERE {{
  ?country rdfs:label "{country}"@en.
  OPTIONAL {{ ?country wdt:P38 ?currency. }}
  OPTIONAL {{ ?country wdt:P37 ?language. }}
  OPTIONAL {{ ?country wdt:P2852 ?emergency. }}
  OPTIONAL {{ ?country wdt:P8413 ?drinkingAge. }}
  OPTIONAL {{ ?country wdt:P2853 ?plug. ?plug rdfs:label ?plugLabel FILTER(LANG(?plugLabel)='en'). }}
  OPTIONAL {{ ?country wdt:P3348 ?voltage. }}
  OPTIONAL {{ ?country wdt:P1622 ?drivingSide. }}
  {LABEL_SERVICE}
}}"#,
        country = escape(country),
    );
    let rows = query(transport, &sparql).await?;
    Ok(legal_facts(&rows))
}

fn legal_facts(rows: &[Binding]) -> Option<Value> {
    let row = rows.first()?;
    let languages: BTreeSet<&str> = rows.iter().filter_map(|r| literal(r, "languageLabel")).collect();
    Some(json!({
        "currency": literal(row, "currencyLabel"),
        "languages": languages,
        "emergency_number": literal(row, "emergency"),
        "legal_drinking_age": literal(row, "drinkingAge"),
        "plug_type": literal(row, "plugLabel"),
        "voltage": literal(row, "voltage"),
        "driving_side": literal(row, "drivingSideLabel"),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointOfInterest {
    pub id: Option<String>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub coord: Option<String>,
}

fn points_of_interest(rows: &[Binding]) -> Vec<PointOfInterest> {
    rows.iter()
        .map(|row| PointOfInterest {
            id: literal(row, "item").map(|uri| entity_id(uri).to_string()),
            label: literal(row, "itemLabel").map(str::to_string),
            description: literal(row, "itemDescription").map(str::to_string),
            coord: literal(row, "location").map(str::to_string),
        })
        .collect()
}

/// Kind of tourism point searched around a coordinate.
#[derive(Debug, Clone, Copy)]
struct PoiKind {
    key: &'static str,
    pattern: &'static str,
    radius_km: u32,
    limit: u32,
}

const POI_KINDS: &[PoiKind] = &[
    PoiKind { key: "unesco_near", pattern: "?item wdt:P1435 wd:Q9259.", radius_km: 120, limit: 100 },
    PoiKind { key: "tourist_attractions_near", pattern: "?item wdt:P31/wdt:P279* wd:Q570116.", radius_km: 40, limit: 200 },
    PoiKind { key: "national_parks_near", pattern: "?item wdt:P31 wd:Q46169.", radius_km: 200, limit: 200 },
    PoiKind { key: "museums_near", pattern: "?item wdt:P31/wdt:P279* wd:Q33506.", radius_km: 30, limit: 200 },
];

fn around_query(kind: &PoiKind, at: Coordinates) -> String {
    format!(
        r#"SELECT ?item ?itemLabel ?itemDescription ?location WHERE {{
  {pattern}
  SERVICE wikibase:around {{ ?item wdt:P625 ?location . bd:serviceParam wikibase:center "Point({lon} {lat})"^^geo:wktLiteral ; wikibase:radius "{radius}" . }}
  {LABEL_SERVICE}
}}
LIMIT {limit}"#,
        pattern = kind.pattern,
        lon = at.lon,
        lat = at.lat,
        radius = kind.radius_km,
        limit = kind.limit,
    )
}

pub struct CityProfileSection {
    transport: Arc<Transport>,
}

impl CityProfileSection {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SourceConnector for CityProfileSection {
    fn section(&self) -> &'static str {
        "city_profile"
    }

    async fn fetch(&self, place: &Place) -> Result<Option<Value>> {
        let Some(country) = place.country.as_deref() else {
            return Ok(None);
        };
        city_core(&self.transport, &place.name, country).await
    }
}

pub struct LegalSection {
    transport: Arc<Transport>,
}

impl LegalSection {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SourceConnector for LegalSection {
    fn section(&self) -> &'static str {
        "international_legal"
    }

    async fn fetch(&self, place: &Place) -> Result<Option<Value>> {
        let Some(country) = place.country.as_deref() else {
            return Ok(None);
        };
        country_legal(&self.transport, country).await
    }
}

pub struct TourismSection {
    transport: Arc<Transport>,
}

impl TourismSection {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SourceConnector for TourismSection {
    fn section(&self) -> &'static str {
        "tourism"
    }

    async fn fetch(&self, place: &Place) -> Result<Option<Value>> {
        let mut tourism = Map::new();
        for kind in POI_KINDS {
            let rows = query(&self.transport, &around_query(kind, place.coordinates)).await?;
            tourism.insert(kind.key.to_string(), json!(points_of_interest(&rows)));
        }
        Ok(Some(Value::Object(tourism)))
    }
}
