// Lead reconciliation pipeline: normalize, merge, dedup, prioritize, categorize

pub mod categorize;
pub mod dedup;
pub mod merge;
pub mod normalize;
pub mod prioritize;

pub use categorize::{CategorizedLeads, Categorizer, PriorityTier, RunSummary};
pub use dedup::Deduplicator;
pub use merge::{ConsolidatedLead, FieldConflict, LeadIdentity, Merger};
pub use normalize::{NormalizedRecord, RecordNormalizer};
pub use prioritize::Prioritizer;

use crate::config::Config;
use crate::error::Result;
use crate::storage::LeadStore;
use crate::types::{RawLead, WebsiteAnalyzer};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub niche: String,
    pub city: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub raw_records: usize,
    pub skipped_no_name: usize,
    pub stored_leads_in: usize,
    pub leads_after_merge: usize,
    pub duplicates_collapsed: usize,
    pub summary: RunSummary,
}

pub struct RunOutcome {
    pub report: RunReport,
    pub categorized: CategorizedLeads,
}

/// Runs one (niche, city) batch through every stage in order. The store and
/// the website analyzer are optional collaborators; without them the run is
/// a pure in-memory reconciliation.
pub struct LeadPipeline {
    config: Config,
    store: Option<Arc<dyn LeadStore>>,
    analyzer: Option<Arc<dyn WebsiteAnalyzer>>,
}

impl LeadPipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            analyzer: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn LeadStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn WebsiteAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Run the complete pipeline for one batch of raw records
    #[instrument(skip(self, raw), fields(niche = %niche, city = %city))]
    pub async fn run(&self, niche: &str, city: &str, raw: Vec<RawLead>) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("🚀 Starting lead pipeline for {}/{}", niche, city);
        println!("🚀 Starting lead pipeline for {niche}/{city}");
        counter!("leads_pipeline_runs_total", "niche" => niche.to_string()).increment(1);
        let t_pipeline = std::time::Instant::now();
        histogram!("leads_raw_records_per_run", "niche" => niche.to_string())
            .record(raw.len() as f64);

        // Step 1: Normalize raw records, dropping the nameless ones
        let normalizer = RecordNormalizer::new(self.config.matching.clone());
        let mut records = Vec::new();
        let mut skipped_no_name = 0;
        for raw_lead in &raw {
            match normalizer.normalize(raw_lead) {
                Some(record) => {
                    for warning in &record.warnings {
                        warn!("{} record '{}': {}", record.source.name(), record.name, warning);
                    }
                    records.push(record);
                }
                None => {
                    skipped_no_name += 1;
                    warn!("Skipping {} record without a business name", raw_lead.source.name());
                }
            }
        }
        info!(
            "🔧 Normalized {} records ({} skipped)",
            records.len(),
            skipped_no_name
        );
        println!("🔧 Normalized {} records ({} skipped)", records.len(), skipped_no_name);
        counter!("leads_records_skipped_total", "niche" => niche.to_string())
            .increment(skipped_no_name as u64);

        // Step 2: Merge observations of the same business
        let merger = Merger::new(self.config.matching.clone());
        let merged = merger.merge(niche, city, records);
        let leads_after_merge = merged.len();
        info!("✅ Merged into {} leads", leads_after_merge);
        println!("✅ Merged into {leads_after_merge} leads");

        // Step 3: Fold in previously stored leads and sweep for duplicates
        let mut pool = merged;
        let mut stored_leads_in = 0;
        if let Some(store) = &self.store {
            let stored = store.load(niche, city).await?;
            stored_leads_in = stored.len();
            pool.extend(stored);
        }
        let deduplicator = Deduplicator::new(self.config.matching.clone());
        let (mut leads, duplicates_collapsed) = deduplicator.collapse(pool);
        if duplicates_collapsed > 0 {
            info!("🧹 Collapsed {} duplicate leads", duplicates_collapsed);
            println!("🧹 Collapsed {duplicates_collapsed} duplicate leads");
        }
        counter!("leads_duplicates_collapsed_total", "niche" => niche.to_string())
            .increment(duplicates_collapsed as u64);

        // Step 4: Ask the analyzer for website verdicts where there is one
        if let Some(analyzer) = &self.analyzer {
            let t_checks = std::time::Instant::now();
            for lead in leads.iter_mut() {
                let url = match lead.website.clone() {
                    Some(url) => url,
                    None => continue,
                };
                match analyzer.assess(&url).await {
                    Ok(verdict) => lead.website_quality = Some(verdict),
                    Err(e) => warn!("Website check failed for {}: {}", url, e),
                }
            }
            histogram!("leads_website_checks_duration_seconds", "niche" => niche.to_string())
                .record(t_checks.elapsed().as_secs_f64());
        }

        // Step 5: Score and rank
        let prioritizer = Prioritizer::new(self.config.scoring.clone());
        prioritizer.prioritize(&mut leads);

        // Step 6: Slice into the output views
        let categorizer = Categorizer::new(self.config.scoring.clone());
        let categorized = categorizer.categorize(leads);
        let summary = categorizer.summarize(&categorized);

        if let Some(store) = &self.store {
            store.save(niche, city, &categorized.all).await?;
            info!("💾 Saved {} leads to the store", categorized.all.len());
            println!("💾 Saved {} leads to the store", categorized.all.len());
        }

        let total_secs = t_pipeline.elapsed().as_secs_f64();
        histogram!("leads_pipeline_duration_seconds", "niche" => niche.to_string())
            .record(total_secs);
        histogram!("leads_per_run", "niche" => niche.to_string())
            .record(categorized.all.len() as f64);

        info!(
            "✅ Pipeline finished: {} leads ({} without website, {} high priority)",
            summary.total, summary.no_website, summary.high
        );
        println!(
            "✅ Pipeline finished: {} leads ({} without website, {} high priority)",
            summary.total, summary.no_website, summary.high
        );

        let report = RunReport {
            run_id,
            niche: niche.to_string(),
            city: city.to_string(),
            started_at,
            finished_at: Utc::now(),
            raw_records: raw.len(),
            skipped_no_name,
            stored_leads_in,
            leads_after_merge,
            duplicates_collapsed,
            summary,
        };

        Ok(RunOutcome { report, categorized })
    }
}
