use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub scraping: ScrapingConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    pub export: ExportConfig,
    pub niches: BTreeMap<String, NicheConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapingConfig {
    pub delay_between_requests_ms: u64,
    pub request_timeout_secs: u64,
    pub max_results_per_niche: usize,
}

/// Thresholds and normalization parameters feeding the deduplicator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub name_similarity_threshold: f64,
    pub address_similarity_threshold: f64,
    pub default_country_code: String,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            name_similarity_threshold: 0.85,
            address_similarity_threshold: 0.75,
            default_country_code: "420".to_string(),
        }
    }
}

/// Weights for the opportunity score and the tier boundaries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub no_website: i32,
    pub poor_website: i32,
    pub no_email: i32,
    pub no_social: i32,
    pub no_reviews: i32,
    pub low_rating_penalty: i32,
    pub low_rating_floor: f64,
    pub local_domain_bonus: i32,
    pub local_tld: String,
    pub high_tier_floor: i32,
    pub medium_tier_floor: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            no_website: 100,
            poor_website: 75,
            no_email: 50,
            no_social: 25,
            no_reviews: 20,
            low_rating_penalty: 10,
            low_rating_floor: 3.5,
            local_domain_bonus: 5,
            local_tld: ".cz".to_string(),
            high_tier_floor: 75,
            medium_tier_floor: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub output_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NicheConfig {
    #[serde(default)]
    pub keywords_cz: Vec<String>,
    #[serde(default)]
    pub keywords_en: Vec<String>,
}

impl NicheConfig {
    /// All keywords for this niche, Czech first.
    pub fn all_keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords_cz
            .iter()
            .chain(self.keywords_en.iter())
            .map(String::as_str)
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects out-of-range values before any record is processed.
    pub fn validate(&self) -> Result<()> {
        let m = &self.matching;
        for (field, value) in [
            ("matching.name_similarity_threshold", m.name_similarity_threshold),
            ("matching.address_similarity_threshold", m.address_similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ScraperError::Config(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    field, value
                )));
            }
        }
        if m.default_country_code.is_empty()
            || !m.default_country_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ScraperError::Config(format!(
                "matching.default_country_code must be digits, got '{}'",
                m.default_country_code
            )));
        }

        let s = &self.scoring;
        for (field, value) in [
            ("scoring.no_website", s.no_website),
            ("scoring.poor_website", s.poor_website),
            ("scoring.no_email", s.no_email),
            ("scoring.no_social", s.no_social),
            ("scoring.no_reviews", s.no_reviews),
            ("scoring.low_rating_penalty", s.low_rating_penalty),
            ("scoring.local_domain_bonus", s.local_domain_bonus),
        ] {
            if value < 0 {
                return Err(ScraperError::Config(format!(
                    "{} must not be negative, got {}",
                    field, value
                )));
            }
        }
        if !(0.0..=5.0).contains(&s.low_rating_floor) {
            return Err(ScraperError::Config(format!(
                "scoring.low_rating_floor must be between 0.0 and 5.0, got {}",
                s.low_rating_floor
            )));
        }
        if s.local_tld.is_empty() || !s.local_tld.starts_with('.') {
            return Err(ScraperError::Config(format!(
                "scoring.local_tld must start with '.', got '{}'",
                s.local_tld
            )));
        }
        if s.medium_tier_floor >= s.high_tier_floor {
            return Err(ScraperError::Config(format!(
                "scoring.medium_tier_floor ({}) must be below scoring.high_tier_floor ({})",
                s.medium_tier_floor, s.high_tier_floor
            )));
        }

        if self.scraping.max_results_per_niche == 0 {
            return Err(ScraperError::Config(
                "scraping.max_results_per_niche must be at least 1".to_string(),
            ));
        }
        if self.export.output_dir.is_empty() {
            return Err(ScraperError::Config(
                "export.output_dir must not be empty".to_string(),
            ));
        }

        if self.niches.is_empty() {
            return Err(ScraperError::Config(
                "at least one niche must be configured".to_string(),
            ));
        }
        for (name, niche) in &self.niches {
            if niche.all_keywords().next().is_none() {
                return Err(ScraperError::Config(format!(
                    "niche '{}' has no keywords",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn niche(&self, name: &str) -> Result<&NicheConfig> {
        self.niches
            .get(name)
            .ok_or_else(|| ScraperError::UnknownNiche(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml() -> String {
        r#"
            [scraping]
            delay_between_requests_ms = 100
            request_timeout_secs = 10
            max_results_per_niche = 50

            [export]
            output_dir = "output"

            [niches.restaurants]
            keywords_cz = ["restaurace"]
            keywords_en = ["restaurant"]
        "#
        .to_string()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(&base_toml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.matching.name_similarity_threshold, 0.85);
        assert_eq!(config.scoring.no_website, 100);
        assert_eq!(config.scoring.local_tld, ".cz");
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let toml_str = format!(
            "{}\n[matching]\nname_similarity_threshold = -0.2",
            base_toml()
        );
        let config: Config = toml::from_str(&toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("name_similarity_threshold"));
    }

    #[test]
    fn test_threshold_above_one_rejected() {
        let toml_str = format!(
            "{}\n[matching]\naddress_similarity_threshold = 1.5",
            base_toml()
        );
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_tier_floors_rejected() {
        let toml_str = format!(
            "{}\n[scoring]\nhigh_tier_floor = 40\nmedium_tier_floor = 60",
            base_toml()
        );
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_local_tld_rejected() {
        let toml_str = format!("{}\n[scoring]\nlocal_tld = \"cz\"", base_toml());
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_niche_without_keywords_rejected() {
        let toml_str = format!("{}\n[niches.empty]\n", base_toml());
        let config: Config = toml::from_str(&toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_unknown_niche_lookup_fails() {
        let config: Config = toml::from_str(&base_toml()).unwrap();
        assert!(config.niche("restaurants").is_ok());
        assert!(config.niche("florists").is_err());
    }
}
