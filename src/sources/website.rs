use crate::config::ScrapingConfig;
use crate::error::Result;
use crate::types::{WebsiteAnalyzer, WebsiteQuality};
use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, instrument};

static COPYRIGHT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:©|&copy;|copyright)\D{0,10}(\d{4})").unwrap());

const CONTACT_KEYWORDS: &[&str] = &["kontakt", "contact", "rezervace", "reservation"];
// Sites scoring below this are flagged as poor.
const POOR_SCORE_FLOOR: i32 = 50;

/// Judges a business website with a plain GET and cheap body heuristics.
/// An unreachable or broken site counts as poor; the business exists but
/// its web presence is not doing its job.
pub struct HttpWebsiteAnalyzer {
    client: reqwest::Client,
}

impl HttpWebsiteAnalyzer {
    pub fn new(config: &ScrapingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

/// Additive 0-100 signal count over the fetched page.
fn quality_score(url: &str, body: &str) -> i32 {
    let mut score = 0;
    let body_lower = body.to_lowercase();

    if url.starts_with("https://") {
        score += 20;
    }
    if body_lower.contains("viewport") {
        score += 15;
    }
    if CONTACT_KEYWORDS.iter().any(|kw| body_lower.contains(kw)) {
        score += 15;
    }
    if body_lower.contains("bootstrap") || body_lower.contains("tailwind") {
        score += 10;
    }
    if body_lower.matches("<img").count() >= 3 {
        score += 10;
    }
    if body_lower.contains("<article") || body_lower.contains("<section") {
        score += 10;
    }

    let current_year = chrono::Utc::now().year();
    let latest_copyright = COPYRIGHT_RE
        .captures_iter(body)
        .filter_map(|c| c.get(1)?.as_str().parse::<i32>().ok())
        .max();
    if let Some(year) = latest_copyright {
        if year >= current_year - 1 {
            score += 20;
        } else if year >= current_year - 3 {
            score += 10;
        }
    }

    score.min(100)
}

#[async_trait::async_trait]
impl WebsiteAnalyzer for HttpWebsiteAnalyzer {
    #[instrument(skip(self))]
    async fn assess(&self, url: &str) -> Result<WebsiteQuality> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Website unreachable: {}", e);
                return Ok(WebsiteQuality::Poor);
            }
        };
        if !response.status().is_success() {
            debug!("Website returned status {}", response.status());
            return Ok(WebsiteQuality::Poor);
        }

        // Judge the scheme after redirects; http-only sites stay http.
        let final_url = response.url().to_string();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("Website body unreadable: {}", e);
                return Ok(WebsiteQuality::Poor);
            }
        };

        let score = quality_score(&final_url, &body);
        debug!("Website {} scored {}", url, score);
        if score < POOR_SCORE_FLOOR {
            Ok(WebsiteQuality::Poor)
        } else {
            Ok(WebsiteQuality::Adequate)
        }
    }
}
