use super::{haversine_km, round1};
use crate::model::Coordinates;
use collector_core::{Result, Transport};
use serde::{Deserialize, Serialize};

const NETWORKS_URL: &str = "https://api.citybik.es/v2/networks";

#[derive(Debug, Deserialize)]
struct NetworksResponse {
    #[serde(default)]
    networks: Vec<Network>,
}

#[derive(Debug, Deserialize)]
struct Network {
    id: String,
    name: String,
    #[serde(default)]
    location: Option<NetworkLocation>,
}

#[derive(Debug, Deserialize)]
struct NetworkLocation {
    latitude: Option<f64>,
    longitude: Option<f64>,
    city: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestNetwork {
    pub id: String,
    pub name: String,
    pub distance_km: f64,
    pub city: Option<String>,
    pub country: Option<String>,
}

pub async fn nearest_network(transport: &Transport, at: Coordinates) -> Result<Option<NearestNetwork>> {
    let response: NetworksResponse = transport.get_json(NETWORKS_URL, &[], None).await?;
    Ok(closest(response.networks, at))
}

fn closest(networks: Vec<Network>, at: Coordinates) -> Option<NearestNetwork> {
    networks
        .into_iter()
        .filter_map(|network| {
            let location = network.location?;
            let here = Coordinates {
                lat: location.latitude?,
                lon: location.longitude?,
            };
            Some(NearestNetwork {
                id: network.id,
                name: network.name,
                distance_km: round1(haversine_km(at, here)),
                city: location.city,
                country: location.country,
            })
        })
        .min_by(|a, b| a.distance_km.total_cmp(&b.distance_km))
}
