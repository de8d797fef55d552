//! Object counts inside a city's administrative boundary via Overpass QL.

use collector_core::{Result, Transport};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const INTERPRETER_URL: &str = "https://overpass-api.de/api/interpreter";
// Server-side query timeout plus headroom for the response
const QUERY_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalkBikeCounts {
    pub walk_ways: Option<u64>,
    pub bike_ways: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentalCounts {
    pub bicycle_rental: Option<u64>,
    pub car_sharing: Option<u64>,
    pub total: Option<u64>,
}

fn count_query(city: &str, selectors: &[&str]) -> String {
    let city = city.replace('"', "\\\"");
    let mut query = format!(
        "[out:json][timeout:60];\narea[\"name\"=\"{city}\"][\"boundary\"=\"administrative\"][\"admin_level\"~\"^8|9|10$\"]->.a;\n(\n"
    );
    for selector in selectors {
        query.push_str(&format!("  {selector}(area.a);\n"));
    }
    query.push_str(");\nout count;\n");
    query
}

/// Reads `elements[0].tags.total` from an `out count` response.
fn total(response: &Value) -> Option<u64> {
    let raw = response.get("elements")?.get(0)?.get("tags")?.get("total")?;
    match raw {
        Value::String(s) => s.parse().ok(),
        other => other.as_u64(),
    }
}

async fn count(transport: &Transport, city: &str, selectors: &[&str]) -> Result<Option<u64>> {
    let params = [("data", count_query(city, selectors))];
    let response: Value = transport
        .get_json(INTERPRETER_URL, &params, Some(QUERY_TIMEOUT))
        .await?;
    Ok(total(&response))
}

pub async fn walk_bike_counts(transport: &Transport, city: &str) -> Result<WalkBikeCounts> {
    Ok(WalkBikeCounts {
        walk_ways: count(
            transport,
            city,
            &[r#"way["highway"~"footway|pedestrian|living_street"]"#],
        )
        .await?,
        bike_ways: count(transport, city, &[r#"way["highway"="cycleway"]"#]).await?,
    })
}

pub async fn coworking_count(transport: &Transport, city: &str) -> Result<Option<u64>> {
    count(
        transport,
        city,
        &[
            r#"node["amenity"="coworking_space"]"#,
            r#"way["amenity"="coworking_space"]"#,
            r#"relation["amenity"="coworking_space"]"#,
        ],
    )
    .await
}

pub async fn rental_and_carshare_counts(transport: &Transport, city: &str) -> Result<RentalCounts> {
    let rental = r#"node["amenity"="bicycle_rental"]"#;
    let sharing = r#"node["amenity"="car_sharing"]"#;
    Ok(RentalCounts {
        total: count(transport, city, &[rental, sharing]).await?,
        bicycle_rental: count(transport, city, &[rental]).await?,
        car_sharing: count(transport, city, &[sharing]).await?,
    })
}
