use crate::config::ScoringConfig;
use crate::pipeline::merge::ConsolidatedLead;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Score band a lead falls into. Floors are inclusive and configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

/// The ranked set sliced along the two axes consumers ask for:
/// website presence and score tier. Every view preserves rank order,
/// and the views of one axis partition `all` between them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorizedLeads {
    pub all: Vec<ConsolidatedLead>,
    pub no_website: Vec<ConsolidatedLead>,
    pub has_website: Vec<ConsolidatedLead>,
    pub high: Vec<ConsolidatedLead>,
    pub medium: Vec<ConsolidatedLead>,
    pub low: Vec<ConsolidatedLead>,
}

/// Per-run rollup persisted alongside the exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub no_website: usize,
    pub has_website: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub mean_score: f64,
}

pub struct Categorizer {
    scoring: ScoringConfig,
}

impl Categorizer {
    pub fn new(scoring: ScoringConfig) -> Self {
        Self { scoring }
    }

    pub fn tier(&self, score: i32) -> PriorityTier {
        if score >= self.scoring.high_tier_floor {
            PriorityTier::High
        } else if score >= self.scoring.medium_tier_floor {
            PriorityTier::Medium
        } else {
            PriorityTier::Low
        }
    }

    pub fn categorize(&self, leads: Vec<ConsolidatedLead>) -> CategorizedLeads {
        let mut out = CategorizedLeads {
            all: leads,
            ..Default::default()
        };
        for lead in &out.all {
            if lead.has_website {
                out.has_website.push(lead.clone());
            } else {
                out.no_website.push(lead.clone());
            }
            match self.tier(lead.priority_score) {
                PriorityTier::High => out.high.push(lead.clone()),
                PriorityTier::Medium => out.medium.push(lead.clone()),
                PriorityTier::Low => out.low.push(lead.clone()),
            }
        }
        debug!(
            total = out.all.len(),
            no_website = out.no_website.len(),
            high = out.high.len(),
            "categorized leads"
        );
        out
    }

    pub fn summarize(&self, categorized: &CategorizedLeads) -> RunSummary {
        let total = categorized.all.len();
        let mean_score = if total == 0 {
            0.0
        } else {
            let sum: i64 = categorized.all.iter().map(|l| l.priority_score as i64).sum();
            sum as f64 / total as f64
        };
        RunSummary {
            total,
            no_website: categorized.no_website.len(),
            has_website: categorized.has_website.len(),
            high: categorized.high.len(),
            medium: categorized.medium.len(),
            low: categorized.low.len(),
            mean_score,
        }
    }
}
