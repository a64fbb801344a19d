use crate::config::ScrapingConfig;
use crate::constants::{MAPS_API_KEY_ENV, MAPS_SOURCE};
use crate::error::{Result, ScraperError};
use crate::types::{LeadSource, RawLead, SearchQuery, SourceKind};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const TEXT_SEARCH_URL: &str = "https://maps.googleapis.com/maps/api/place/textsearch/json";
const DETAILS_URL: &str = "https://maps.googleapis.com/maps/api/place/details/json";

/// Adapter for a Places-style maps API. Text search gives the listing with
/// rating and review counts; a follow-up details call fills in phone and
/// website where the place has them.
pub struct MapsSource {
    client: reqwest::Client,
    api_key: String,
    delay_ms: u64,
}

impl MapsSource {
    pub fn new(config: &ScrapingConfig) -> Result<Self> {
        let api_key = std::env::var(MAPS_API_KEY_ENV)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            delay_ms: config.delay_between_requests_ms,
        })
    }

    async fn text_search(&self, query_text: &str, page_token: Option<&str>) -> Result<Value> {
        let mut request = self.client.get(TEXT_SEARCH_URL).query(&[
            ("query", query_text),
            ("key", self.api_key.as_str()),
        ]);
        if let Some(token) = page_token {
            request = request.query(&[("pagetoken", token)]);
        }

        let body: Value = request.send().await?.json().await?;
        let status = body["status"].as_str().unwrap_or_default();
        if status != "OK" && status != "ZERO_RESULTS" {
            return Err(ScraperError::Api {
                message: format!(
                    "maps text search returned status {}: {}",
                    status,
                    body["error_message"].as_str().unwrap_or("")
                ),
            });
        }
        Ok(body)
    }

    async fn place_details(&self, place_id: &str) -> Result<Value> {
        let body: Value = self
            .client
            .get(DETAILS_URL)
            .query(&[
                ("place_id", place_id),
                ("fields", "formatted_phone_number,website"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        let status = body["status"].as_str().unwrap_or_default();
        if status != "OK" {
            return Err(ScraperError::Api {
                message: format!("maps details returned status {status}"),
            });
        }
        Ok(body)
    }

    fn parse_place(place: &Value, city: &str) -> Result<RawLead> {
        let name = place["name"]
            .as_str()
            .ok_or_else(|| ScraperError::MissingField("name not found".into()))?;
        let address = place["formatted_address"].as_str().unwrap_or_default();

        let mut lead = RawLead::new(SourceKind::Maps, name).with_address(address, city);
        if let (Some(rating), Some(reviews)) = (
            place["rating"].as_f64(),
            place["user_ratings_total"].as_u64(),
        ) {
            lead = lead.with_rating(rating, reviews as u32);
        }
        Ok(lead)
    }

    fn apply_details(lead: RawLead, details: &Value) -> RawLead {
        let result = &details["result"];
        let mut lead = lead;
        if let Some(phone) = result["formatted_phone_number"].as_str() {
            lead = lead.with_phone(phone);
        }
        if let Some(website) = result["website"].as_str() {
            lead = lead.with_website(website);
        }
        lead
    }
}

#[async_trait::async_trait]
impl LeadSource for MapsSource {
    fn source_name(&self) -> &'static str {
        MAPS_SOURCE
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Maps
    }

    #[instrument(skip(self, query), fields(niche = %query.niche, city = %query.city))]
    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<RawLead>> {
        let mut leads = Vec::new();
        let mut seen_places = HashSet::new();

        for keyword in &query.keywords {
            if leads.len() >= query.max_results {
                break;
            }

            let query_text = format!("{} {}", keyword, query.city);
            let mut page_token: Option<String> = None;

            loop {
                let page = self.text_search(&query_text, page_token.as_deref()).await?;
                let results = page["results"].as_array().cloned().unwrap_or_default();
                debug!("Found {} places for '{}'", results.len(), query_text);

                for place in &results {
                    if leads.len() >= query.max_results {
                        break;
                    }
                    let place_id = place["place_id"].as_str().unwrap_or_default();
                    if !place_id.is_empty() && !seen_places.insert(place_id.to_string()) {
                        continue;
                    }

                    let mut lead = match Self::parse_place(place, &query.city) {
                        Ok(lead) => lead,
                        Err(e) => {
                            debug!("Skipping malformed place: {}", e);
                            continue;
                        }
                    };

                    if !place_id.is_empty() {
                        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
                        match self.place_details(place_id).await {
                            Ok(details) => lead = Self::apply_details(lead, &details),
                            Err(e) => warn!("Details lookup failed for {}: {}", lead.name, e),
                        }
                    }
                    leads.push(lead);
                }

                page_token = page["next_page_token"].as_str().map(|t| t.to_string());
                if page_token.is_none() || leads.len() >= query.max_results {
                    break;
                }
                // Page tokens take a moment to become valid server side.
                tokio::time::sleep(Duration::from_millis(self.delay_ms.max(2000))).await;
            }
        }

        info!("Fetched {} places from maps", leads.len());
        Ok(leads)
    }
}
