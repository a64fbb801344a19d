use crate::config::MatchingConfig;
use crate::types::{RawLead, SourceKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9._%+-]*@[a-z0-9.-]+\.[a-z]{2,}$").unwrap());
static REGISTRY_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}$").unwrap());

/// Legal-form suffixes stripped from name match keys, longest first.
const LEGAL_SUFFIXES: &[&[&str]] = &[
    &["spol", "s", "r", "o"],
    &["s", "r", "o"],
    &["v", "o", "s"],
    &["a", "s"],
    &["k", "s"],
    &["z", "s"],
];

/// A raw observation with every field canonicalized for comparison.
/// Derived deterministically from exactly one `RawLead`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub source: SourceKind,
    /// Observed name, whitespace-collapsed. Display form.
    pub name: String,
    /// Folded, suffix-stripped matching key for the name.
    pub name_key: String,
    /// Observed address, whitespace-collapsed. Display form.
    pub address: String,
    /// Folded address key with house/postal numbers removed.
    pub street_key: String,
    pub city: String,
    pub city_key: String,
    /// Digits-only phone including the country code.
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub instagram: Option<String>,
    pub facebook: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub registry_id: Option<String>,
    /// Fields cleared or flagged during canonicalization.
    pub warnings: Vec<String>,
}

/// First stage of the pipeline. Pure and deterministic; the only record it
/// refuses is one with no usable name.
pub struct RecordNormalizer {
    matching: MatchingConfig,
}

impl RecordNormalizer {
    pub fn new(matching: MatchingConfig) -> Self {
        Self { matching }
    }

    /// Canonicalize one raw observation. Returns `None` when the record has
    /// no name after trimming; callers count that as a skipped input.
    pub fn normalize(&self, raw: &RawLead) -> Option<NormalizedRecord> {
        let name = collapse_whitespace(&raw.name);
        if name.is_empty() {
            return None;
        }

        let mut warnings = Vec::new();

        let phone = match non_empty(raw.phone.as_deref()) {
            Some(p) => {
                let normalized = normalize_phone(p, &self.matching.default_country_code);
                if normalized.is_none() {
                    warnings.push(format!("unparseable phone '{}' cleared", p));
                }
                normalized
            }
            None => None,
        };

        let email = match non_empty(raw.email.as_deref()) {
            Some(e) => {
                let normalized = normalize_email(e);
                if normalized.is_none() {
                    warnings.push(format!("invalid email '{}' cleared", e));
                }
                normalized
            }
            None => None,
        };

        let website = match non_empty(raw.website.as_deref()) {
            Some(w) => {
                let normalized = normalize_website(w);
                if normalized.is_none() {
                    warnings.push(format!("invalid website '{}' cleared", w));
                }
                normalized
            }
            None => None,
        };

        let registry_id = match non_empty(raw.registry_id.as_deref()) {
            Some(id) => {
                let cleaned: String = id.chars().filter(|c| !c.is_whitespace()).collect();
                if !REGISTRY_ID_RE.is_match(&cleaned) {
                    warnings.push(format!("malformed registry id '{}' cleared", id));
                    None
                } else {
                    // The registry is authoritative for its own identifiers,
                    // so a failed checksum is surfaced but the id is kept.
                    if !ico_checksum_ok(&cleaned) {
                        warnings.push(format!("registry id '{}' fails checksum", cleaned));
                    }
                    Some(cleaned)
                }
            }
            None => None,
        };

        let address = collapse_whitespace(&raw.address);
        let city = collapse_whitespace(&raw.city);

        if !warnings.is_empty() {
            debug!(name = %name, warnings = ?warnings, "normalization cleared fields");
        }

        Some(NormalizedRecord {
            source: raw.source,
            name_key: name_key(&name),
            street_key: street_key(&address),
            city_key: match_key(&city),
            name,
            address,
            city,
            phone,
            email,
            website,
            instagram: non_empty(raw.instagram.as_deref()).map(|s| s.to_string()),
            facebook: non_empty(raw.facebook.as_deref()).map(|s| s.to_string()),
            rating: raw.rating,
            review_count: raw.review_count,
            registry_id,
            warnings,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace Czech diacritics with their ASCII base letters. Input is
/// expected to be lower-cased already.
pub fn fold_diacritics(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' => 'a',
            'č' => 'c',
            'ď' => 'd',
            'é' => 'e',
            'ě' => 'e',
            'í' => 'i',
            'ň' => 'n',
            'ó' => 'o',
            'ř' => 'r',
            'š' => 's',
            'ť' => 't',
            'ú' => 'u',
            'ů' => 'u',
            'ý' => 'y',
            'ž' => 'z',
            other => other,
        })
        .collect()
}

/// Lower-case, fold diacritics, map punctuation to spaces and collapse.
pub fn match_key(text: &str) -> String {
    let folded = fold_diacritics(&text.to_lowercase());
    let spaced: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&spaced)
}

/// Name match key: folded key with at most one trailing legal-form suffix
/// removed, so "Kavárna Nová s.r.o." and "kavarna nova" compare equal.
pub fn name_key(name: &str) -> String {
    let key = match_key(name);
    let tokens: Vec<&str> = key.split(' ').filter(|t| !t.is_empty()).collect();
    for suffix in LEGAL_SUFFIXES {
        if tokens.len() > suffix.len() && tokens.ends_with(suffix) {
            return tokens[..tokens.len() - suffix.len()].join(" ");
        }
    }
    tokens.join(" ")
}

/// Street match key: folded address with house and postal numbers dropped.
pub fn street_key(address: &str) -> String {
    match_key(address)
        .split(' ')
        .filter(|t| !t.is_empty() && !t.chars().any(|c| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn first_token(key: &str) -> &str {
    key.split(' ').next().unwrap_or("")
}

/// Reduce a phone number to digits with the country code prepended.
/// Accepts bare nine-digit national numbers and numbers already carrying
/// the country code (with or without 00/+); anything else is unparseable.
pub fn normalize_phone(phone: &str, country_code: &str) -> Option<String> {
    let mut digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if let Some(rest) = digits.strip_prefix("00") {
        digits = rest.to_string();
    }
    if let Some(rest) = digits.strip_prefix(country_code) {
        digits = rest.to_string();
    }
    if digits.len() == 9 {
        Some(format!("{}{}", country_code, digits))
    } else {
        None
    }
}

pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    if EMAIL_RE.is_match(&email) {
        Some(email)
    } else {
        None
    }
}

/// Normalize a website URL: default the scheme to https, lower-case the
/// host, require a dotted http(s) host.
pub fn normalize_website(website: &str) -> Option<String> {
    let trimmed = website.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let parsed = Url::parse(&with_scheme).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    let host = parsed.host_str()?;
    if !host.contains('.') {
        return None;
    }
    Some(parsed.to_string())
}

/// Host part of an already-normalized website URL.
pub fn website_host(website: &str) -> Option<String> {
    let parsed = Url::parse(website).ok()?;
    parsed.host_str().map(|h| h.to_lowercase())
}

/// Mod-11 checksum over the first seven digits of an eight-digit IČO.
pub fn ico_checksum_ok(ico: &str) -> bool {
    let digits: Vec<u32> = ico.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 8 {
        return false;
    }
    let weights = [8, 7, 6, 5, 4, 3, 2];
    let sum: u32 = digits[..7].iter().zip(weights).map(|(d, w)| d * w).sum();
    let check = (11 - (sum % 11)) % 10;
    digits[7] == check
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> RecordNormalizer {
        RecordNormalizer::new(MatchingConfig::default())
    }

    #[test]
    fn test_name_key_folds_diacritics_and_suffix() {
        assert_eq!(name_key("Kavárna Nová s.r.o."), "kavarna nova");
        assert_eq!(name_key("Restaurace U Kostela"), "restaurace u kostela");
        assert_eq!(name_key("Pekařství Novák, a.s."), "pekarstvi novak");
        assert_eq!(name_key("U Fleků spol. s r.o."), "u fleku");
    }

    #[test]
    fn test_name_key_keeps_suffix_only_names() {
        // A name that is nothing but a legal form must not collapse to "".
        assert_eq!(name_key("A.S."), "a s");
    }

    #[test]
    fn test_street_key_drops_numbers() {
        assert_eq!(street_key("Vodičkova 704/36, Praha 1"), "vodickova praha");
        assert_eq!(street_key("Náměstí Míru 12"), "namesti miru");
        assert_eq!(street_key(""), "");
    }

    #[test]
    fn test_phone_normalization_variants() {
        for input in ["+420 777 123 456", "00420777123456", "777 123 456", "420777123456"] {
            assert_eq!(
                normalize_phone(input, "420").as_deref(),
                Some("420777123456"),
                "input: {}",
                input
            );
        }
        assert_eq!(normalize_phone("12345", "420"), None);
        assert_eq!(normalize_phone("", "420"), None);
    }

    #[test]
    fn test_email_normalization() {
        assert_eq!(
            normalize_email("  Info@Firma.CZ "),
            Some("info@firma.cz".to_string())
        );
        assert_eq!(normalize_email("not-an-email"), None);
        assert_eq!(normalize_email("@firma.cz"), None);
    }

    #[test]
    fn test_website_normalization() {
        assert_eq!(
            normalize_website("Firma.cz"),
            Some("https://firma.cz/".to_string())
        );
        assert_eq!(
            normalize_website("http://www.firma.cz/kontakt"),
            Some("http://www.firma.cz/kontakt".to_string())
        );
        assert_eq!(normalize_website("ftp://firma.cz"), None);
        assert_eq!(normalize_website("localhost"), None);
    }

    #[test]
    fn test_website_host() {
        assert_eq!(
            website_host("https://www.firma.cz/kontakt"),
            Some("www.firma.cz".to_string())
        );
    }

    #[test]
    fn test_ico_checksum() {
        assert!(ico_checksum_ok("25596641"));
        assert!(ico_checksum_ok("26168685"));
        assert!(!ico_checksum_ok("12345678"));
    }

    #[test]
    fn test_nameless_record_skipped() {
        let raw = RawLead::new(SourceKind::Maps, "   ");
        assert!(normalizer().normalize(&raw).is_none());
    }

    #[test]
    fn test_malformed_fields_cleared_not_fatal() {
        let raw = RawLead::new(SourceKind::Maps, "Kavárna Nová")
            .with_phone("call us!")
            .with_email("nope")
            .with_registry_id("1234");
        let record = normalizer().normalize(&raw).unwrap();
        assert_eq!(record.phone, None);
        assert_eq!(record.email, None);
        assert_eq!(record.registry_id, None);
        assert_eq!(record.warnings.len(), 3);
    }

    #[test]
    fn test_checksum_failure_keeps_registry_id() {
        let raw = RawLead::new(SourceKind::Registry, "Test s.r.o.").with_registry_id("123 456 78");
        let record = normalizer().normalize(&raw).unwrap();
        assert_eq!(record.registry_id.as_deref(), Some("12345678"));
        assert_eq!(record.warnings.len(), 1);
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let raw = RawLead::new(SourceKind::Maps, "Restaurace  U  Kostela ")
            .with_address("Kostelní   12,  Praha 7", "Praha")
            .with_phone("+420 777 123 456");
        let a = normalizer().normalize(&raw).unwrap();
        let b = normalizer().normalize(&raw).unwrap();
        assert_eq!(a.name, "Restaurace U Kostela");
        assert_eq!(a.name_key, b.name_key);
        assert_eq!(a.street_key, "kostelni praha");
        assert_eq!(a.phone, b.phone);
    }
}
