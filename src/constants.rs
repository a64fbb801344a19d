/// Source name constants to ensure consistency across the codebase
/// These constants define the canonical names used in CLI arguments,
/// provenance lists and stored rows

// User-facing source names (used in CLI and config)
pub const REGISTRY_SOURCE: &str = "registry";
pub const MAPS_SOURCE: &str = "maps";
pub const WEBSITE_SOURCE: &str = "website";

/// Get all source names selectable from the CLI
pub fn get_supported_sources() -> Vec<&'static str> {
    vec![REGISTRY_SOURCE, MAPS_SOURCE]
}

/// Environment variable holding the maps API key
pub const MAPS_API_KEY_ENV: &str = "MAPS_API_KEY";

/// Environment variable enabling the Prometheus exporter
pub const METRICS_PORT_ENV: &str = "LEADS_METRICS_PORT";
