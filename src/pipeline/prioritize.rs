use crate::config::ScoringConfig;
use crate::pipeline::merge::ConsolidatedLead;
use crate::pipeline::normalize::website_host;
use crate::types::WebsiteQuality;
use std::cmp::Ordering;
use tracing::debug;

/// Fourth stage of the pipeline: additive opportunity scoring over the
/// final consolidated fields. The poor-website verdict is injected by the
/// analysis collaborator; everything else is read straight off the lead.
pub struct Prioritizer {
    scoring: ScoringConfig,
}

impl Prioritizer {
    pub fn new(scoring: ScoringConfig) -> Self {
        Self { scoring }
    }

    /// Score one lead. Returns the unclamped score and which signals fired.
    pub fn score(&self, lead: &ConsolidatedLead) -> (i32, Vec<String>) {
        let mut score = 0;
        let mut notes = Vec::new();

        if !lead.has_website {
            score += self.scoring.no_website;
            notes.push("no website".to_string());
        } else if lead.website_quality == Some(WebsiteQuality::Poor) {
            // Mutually exclusive with the no-website signal.
            score += self.scoring.poor_website;
            notes.push("poor website".to_string());
        }

        if lead.emails.is_empty() {
            score += self.scoring.no_email;
            notes.push("no email".to_string());
        }

        if !lead.has_social() {
            score += self.scoring.no_social;
            notes.push("no social presence".to_string());
        }

        if lead.review_count == Some(0) {
            score += self.scoring.no_reviews;
            notes.push("no reviews".to_string());
        }

        if let Some(rating) = lead.rating {
            if rating < self.scoring.low_rating_floor {
                score -= self.scoring.low_rating_penalty;
                notes.push(format!("low rating {:.1}", rating));
            }
        }

        if let Some(website) = lead.website.as_deref() {
            if let Some(host) = website_host(website) {
                if host.ends_with(&self.scoring.local_tld) {
                    score += self.scoring.local_domain_bonus;
                    notes.push("local domain".to_string());
                }
            }
        }

        (score, notes)
    }

    /// Assign every lead its score and order the set for output.
    pub fn prioritize(&self, leads: &mut [ConsolidatedLead]) {
        for lead in leads.iter_mut() {
            let (score, notes) = self.score(lead);
            debug!(lead = %lead.name, score, signals = notes.len(), "scored lead");
            lead.priority_score = score;
            lead.score_notes = notes;
        }
        leads.sort_by(Self::rank_cmp);
    }

    /// Score descending; ties broken by provenance count (better
    /// corroborated first), then identity for a stable order.
    pub fn rank_cmp(a: &ConsolidatedLead, b: &ConsolidatedLead) -> Ordering {
        b.priority_score
            .cmp(&a.priority_score)
            .then_with(|| b.provenance_count().cmp(&a.provenance_count()))
            .then_with(|| a.identity.as_key().cmp(&b.identity.as_key()))
    }
}
