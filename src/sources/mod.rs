// Source adapters: each one turns an external catalog into RawLead batches

pub mod maps;
pub mod registry;
pub mod website;

pub use maps::MapsSource;
pub use registry::RegistrySource;
pub use website::HttpWebsiteAnalyzer;
