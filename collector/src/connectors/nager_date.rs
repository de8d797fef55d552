use super::{country_code, SourceConnector};
use crate::model::Place;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use collector_core::{Result, Transport};
use serde_json::{json, Value};
use std::sync::Arc;

const API_URL: &str = "https://date.nager.at/api/v3";

pub async fn public_holidays(transport: &Transport, country_iso2: &str, year: i32) -> Result<Value> {
    let url = format!("{API_URL}/PublicHolidays/{year}/{country_iso2}");
    transport.get_json(&url, &[], None).await
}

pub struct HolidaysSection {
    transport: Arc<Transport>,
}

impl HolidaysSection {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SourceConnector for HolidaysSection {
    fn section(&self) -> &'static str {
        "events_holidays"
    }

    fn requires_country_code(&self) -> bool {
        true
    }

    async fn fetch(&self, place: &Place) -> Result<Option<Value>> {
        let cc = country_code(place)?;
        let holidays = public_holidays(&self.transport, cc, Utc::now().year()).await?;
        Ok(Some(json!({ "public_holidays": holidays })))
    }
}
