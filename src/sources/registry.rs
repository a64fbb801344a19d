use crate::config::ScrapingConfig;
use crate::constants::REGISTRY_SOURCE;
use crate::error::{Result, ScraperError};
use crate::types::{LeadSource, RawLead, SearchQuery, SourceKind};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, instrument};

const ARES_SEARCH_URL: &str =
    "https://ares.gov.cz/ekonomicke-subjekty-v-be/rest/ekonomicke-subjekty/vyhledat";
// ARES rejects page sizes above 200.
const PAGE_SIZE: usize = 100;

/// Adapter for the Czech business registry (ARES). Registry records carry
/// the authoritative identifier but no contact details beyond the seat
/// address, so most fields stay empty.
pub struct RegistrySource {
    client: reqwest::Client,
    delay_ms: u64,
}

impl RegistrySource {
    pub fn new(config: &ScrapingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            delay_ms: config.delay_between_requests_ms,
        })
    }

    async fn search_page(&self, keyword: &str, city: &str, start: usize) -> Result<Value> {
        let body = json!({
            "obchodniJmeno": keyword,
            "sidlo": { "textovaAdresa": city },
            "start": start,
            "pocet": PAGE_SIZE,
        });

        debug!("Searching registry for '{}' in {} (start {})", keyword, city, start);
        let response = self.client.post(ARES_SEARCH_URL).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(ScraperError::Api {
                message: format!("registry search returned status {}", response.status()),
            });
        }
        Ok(response.json().await?)
    }

    fn parse_subject(subject: &Value, fallback_city: &str) -> Result<RawLead> {
        let name = subject["obchodniJmeno"]
            .as_str()
            .ok_or_else(|| ScraperError::MissingField("obchodniJmeno not found".into()))?;
        let address = subject["sidlo"]["textovaAdresa"].as_str().unwrap_or_default();
        let city = subject["sidlo"]["nazevObce"]
            .as_str()
            .unwrap_or(fallback_city);

        let mut lead = RawLead::new(SourceKind::Registry, name).with_address(address, city);
        if let Some(ico) = subject["ico"].as_str() {
            lead = lead.with_registry_id(ico);
        }
        Ok(lead)
    }
}

#[async_trait::async_trait]
impl LeadSource for RegistrySource {
    fn source_name(&self) -> &'static str {
        REGISTRY_SOURCE
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Registry
    }

    #[instrument(skip(self, query), fields(niche = %query.niche, city = %query.city))]
    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<RawLead>> {
        let mut leads = Vec::new();
        let mut seen_icos = HashSet::new();

        for keyword in &query.keywords {
            if leads.len() >= query.max_results {
                break;
            }

            let mut start = 0;
            loop {
                let page = self.search_page(keyword, &query.city, start).await?;
                let subjects = page["ekonomickeSubjekty"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default();
                if subjects.is_empty() {
                    break;
                }

                for subject in &subjects {
                    match Self::parse_subject(subject, &query.city) {
                        Ok(lead) => {
                            if let Some(ico) = &lead.registry_id {
                                if !seen_icos.insert(ico.clone()) {
                                    continue;
                                }
                            }
                            leads.push(lead);
                        }
                        Err(e) => debug!("Skipping malformed registry subject: {}", e),
                    }
                    if leads.len() >= query.max_results {
                        break;
                    }
                }

                let total = page["pocetCelkem"].as_u64().unwrap_or(0) as usize;
                start += subjects.len();
                if leads.len() >= query.max_results || start >= total {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }

            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        info!("Fetched {} registry subjects", leads.len());
        Ok(leads)
    }
}
