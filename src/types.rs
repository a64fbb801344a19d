use crate::constants;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Kind of source a record was observed by.
///
/// The trust ranking used for merge conflict resolution is explicit in
/// `trust_rank`, never derived from declaration or string order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Registry,
    Maps,
    Website,
}

impl SourceKind {
    /// Higher rank wins field conflicts during merging.
    pub fn trust_rank(&self) -> u8 {
        match self {
            SourceKind::Registry => 3,
            SourceKind::Maps => 2,
            SourceKind::Website => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Registry => constants::REGISTRY_SOURCE,
            SourceKind::Maps => constants::MAPS_SOURCE,
            SourceKind::Website => constants::WEBSITE_SOURCE,
        }
    }

    pub fn from_name(name: &str) -> Option<SourceKind> {
        match name {
            constants::REGISTRY_SOURCE => Some(SourceKind::Registry),
            constants::MAPS_SOURCE => Some(SourceKind::Maps),
            constants::WEBSITE_SOURCE => Some(SourceKind::Website),
            _ => None,
        }
    }
}

/// One observation of a business from one source, as the source reported it.
/// Immutable once handed to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLead {
    pub source: SourceKind,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub facebook: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u32>,
    /// National business-registry identifier, present on registry records.
    #[serde(default)]
    pub registry_id: Option<String>,
}

impl RawLead {
    pub fn new(source: SourceKind, name: &str) -> Self {
        Self {
            source,
            name: name.to_string(),
            address: String::new(),
            city: String::new(),
            phone: None,
            email: None,
            website: None,
            instagram: None,
            facebook: None,
            rating: None,
            review_count: None,
            registry_id: None,
        }
    }

    pub fn with_address(mut self, address: &str, city: &str) -> Self {
        self.address = address.to_string();
        self.city = city.to_string();
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_website(mut self, website: &str) -> Self {
        self.website = Some(website.to_string());
        self
    }

    pub fn with_instagram(mut self, url: &str) -> Self {
        self.instagram = Some(url.to_string());
        self
    }

    pub fn with_facebook(mut self, url: &str) -> Self {
        self.facebook = Some(url.to_string());
        self
    }

    pub fn with_rating(mut self, rating: f64, review_count: u32) -> Self {
        self.rating = Some(rating);
        self.review_count = Some(review_count);
        self
    }

    pub fn with_registry_id(mut self, registry_id: &str) -> Self {
        self.registry_id = Some(registry_id.to_string());
        self
    }
}

/// One (niche, city) search handed to a source adapter.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub niche: String,
    pub city: String,
    pub keywords: Vec<String>,
    pub max_results: usize,
}

/// Core trait that all lead sources must implement
#[async_trait::async_trait]
pub trait LeadSource: Send + Sync {
    /// Unique identifier for this source
    fn source_name(&self) -> &'static str;

    /// Trust kind stamped on every record this source emits
    fn source_kind(&self) -> SourceKind;

    /// Fetch business listings matching the query
    async fn fetch(&self, query: &SearchQuery) -> Result<Vec<RawLead>>;
}

/// Verdict from the external website-quality collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebsiteQuality {
    Adequate,
    Poor,
}

/// External collaborator judging websites. The pipeline only records the
/// verdict; scoring reads it as an opaque boolean.
#[async_trait::async_trait]
pub trait WebsiteAnalyzer: Send + Sync {
    async fn assess(&self, url: &str) -> Result<WebsiteQuality>;
}
