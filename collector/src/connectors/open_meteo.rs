use super::{ClimateLookup, SourceConnector};
use crate::model::{Coordinates, Place};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use collector_core::{Error, Result, Transport};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const CLIMATE_URL: &str = "https://climate-api.open-meteo.com/v1/climate";

const CURRENT_VARS: &str =
    "temperature_2m,precipitation,apparent_temperature,weather_code,wind_speed_10m,uv_index";
const DAILY_VARS: &str =
    "sunrise,sunset,uv_index_max,precipitation_sum,temperature_2m_max,temperature_2m_min";
const MONTHLY_VARS: &str = "temperature_2m_mean,temperature_2m_min,temperature_2m_max,precipitation_sum";

// Thirty-year reference period for batch climate normals
const NORMALS_START: &str = "1991-01-01";
const NORMALS_END: &str = "2020-12-31";
const NORMALS_MODEL: &str = "MRI_AGCM3_2_S";
const NORMALS_YEARS: f64 = 30.0;

fn location(at: Coordinates) -> [(&'static str, String); 2] {
    [("latitude", at.lat.to_string()), ("longitude", at.lon.to_string())]
}

pub async fn current_weather(transport: &Transport, at: Coordinates) -> Result<Value> {
    let [lat, lon] = location(at);
    let params = [
        lat,
        lon,
        ("current", CURRENT_VARS.to_string()),
        ("hourly", "relative_humidity_2m".to_string()),
        ("daily", DAILY_VARS.to_string()),
        ("timezone", "auto".to_string()),
    ];
    transport.get_json(FORECAST_URL, &params, None).await
}

pub async fn climate_normals(transport: &Transport, at: Coordinates) -> Result<Value> {
    let [lat, lon] = location(at);
    let params = [lat, lon, ("monthly", MONTHLY_VARS.to_string())];
    transport.get_json(CLIMATE_URL, &params, None).await
}

/// Elevation and timezone reported alongside a forecast.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationMeta {
    pub elevation: Option<f64>,
    pub timezone: Option<String>,
}

pub async fn location_meta(transport: &Transport, at: Coordinates) -> Result<LocationMeta> {
    let [lat, lon] = location(at);
    let params = [lat, lon, ("current_weather", "true".to_string())];
    transport.get_json(FORECAST_URL, &params, None).await
}

#[derive(Debug, Deserialize)]
struct DailyClimate {
    daily: DailySeries,
}

#[derive(Debug, Deserialize)]
struct DailySeries {
    time: Vec<String>,
    temperature_2m_mean: Vec<Option<f64>>,
    precipitation_sum: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyClimate {
    pub month: u32,
    pub avg_temp: Option<f64>,
    /// Mean monthly precipitation total over the reference period.
    pub total_precip: f64,
}

pub async fn monthly_climate(transport: &Transport, at: Coordinates) -> Result<Vec<MonthlyClimate>> {
    let [lat, lon] = location(at);
    let params = [
        lat,
        lon,
        ("start_date", NORMALS_START.to_string()),
        ("end_date", NORMALS_END.to_string()),
        ("models", NORMALS_MODEL.to_string()),
        ("daily", "temperature_2m_mean,precipitation_sum".to_string()),
    ];
    let climate: DailyClimate = transport.get_json(CLIMATE_URL, &params, None).await?;
    summarize_by_month(&climate.daily)
}

/// Open-Meteo forecast and climate APIs as a `ClimateLookup`.
pub struct OpenMeteoClimate {
    transport: Arc<Transport>,
}

impl OpenMeteoClimate {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ClimateLookup for OpenMeteoClimate {
    async fn location_meta(&self, at: Coordinates) -> Result<LocationMeta> {
        location_meta(&self.transport, at).await
    }

    async fn monthly_climate(&self, at: Coordinates) -> Result<Vec<MonthlyClimate>> {
        monthly_climate(&self.transport, at).await
    }
}

fn summarize_by_month(series: &DailySeries) -> Result<Vec<MonthlyClimate>> {
    if series.time.len() != series.temperature_2m_mean.len()
        || series.time.len() != series.precipitation_sum.len()
    {
        return Err(Error::Decode {
            url: CLIMATE_URL.to_string(),
            details: "daily series have mismatched lengths".to_string(),
        });
    }

    // month -> (temperature sum, temperature samples, precipitation sum)
    let mut months: BTreeMap<u32, (f64, usize, f64)> = BTreeMap::new();
    for ((day, temp), precip) in series
        .time
        .iter()
        .zip(&series.temperature_2m_mean)
        .zip(&series.precipitation_sum)
    {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| Error::Decode {
            url: CLIMATE_URL.to_string(),
            details: format!("invalid date {day:?}: {e}"),
        })?;
        let entry = months.entry(date.month()).or_default();
        if let Some(temp) = temp {
            entry.0 += temp;
            entry.1 += 1;
        }
        entry.2 += precip.unwrap_or(0.0);
    }

    Ok(months
        .into_iter()
        .map(|(month, (temp_sum, samples, precip_sum))| MonthlyClimate {
            month,
            avg_temp: (samples > 0).then(|| temp_sum / samples as f64),
            total_precip: precip_sum / NORMALS_YEARS,
        })
        .collect())
}

pub struct WeatherSection {
    transport: Arc<Transport>,
}

impl WeatherSection {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SourceConnector for WeatherSection {
    fn section(&self) -> &'static str {
        "weather"
    }

    async fn fetch(&self, place: &Place) -> Result<Option<Value>> {
        let current = current_weather(&self.transport, place.coordinates).await?;
        let normals = climate_normals(&self.transport, place.coordinates).await?;
        Ok(Some(json!({
            "current_and_daily": current,
            "climate_normals": normals,
        })))
    }
}
