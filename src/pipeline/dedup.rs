use crate::config::MatchingConfig;
use crate::pipeline::merge::ConsolidatedLead;
use crate::pipeline::normalize::{first_token, NormalizedRecord};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// The comparable subset of a record or a consolidated lead.
#[derive(Debug, Clone, Copy)]
pub struct MatchFields<'a> {
    pub registry_id: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub name_key: &'a str,
    pub street_key: &'a str,
}

impl<'a> From<&'a NormalizedRecord> for MatchFields<'a> {
    fn from(record: &'a NormalizedRecord) -> Self {
        Self {
            registry_id: record.registry_id.as_deref(),
            phone: record.phone.as_deref(),
            name_key: &record.name_key,
            street_key: &record.street_key,
        }
    }
}

/// Token-set overlap between two folded keys (intersection over union).
pub fn token_set_overlap(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<&str> = a.split(' ').filter(|t| !t.is_empty()).collect();
    let tokens_b: HashSet<&str> = b.split(' ').filter(|t| !t.is_empty()).collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    intersection as f64 / union as f64
}

/// Similarity between two folded keys. Blend of token-set overlap and an
/// edit-distance ratio, taking the stronger signal, so word reorderings and
/// small typos both land high. Symmetric by construction.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    token_set_overlap(a, b).max(strsim::jaro_winkler(a, b))
}

/// Decides whether two observations describe the same business, and sweeps
/// consolidated leads for duplicates the merge buckets missed.
pub struct Deduplicator {
    matching: MatchingConfig,
}

impl Deduplicator {
    pub fn new(matching: MatchingConfig) -> Self {
        Self { matching }
    }

    pub fn name_similarity(&self, a: &str, b: &str) -> f64 {
        text_similarity(a, b)
    }

    pub fn address_similarity(&self, a: &str, b: &str) -> f64 {
        text_similarity(a, b)
    }

    /// Decision rule, applied in order, first match wins:
    /// equal registry ids, equal phones, then fuzzy name plus address.
    /// A rule that does not fire falls through to the next one. An empty
    /// address on either side fails the fuzzy rule outright.
    pub fn same_business(&self, a: &MatchFields, b: &MatchFields) -> bool {
        if let (Some(x), Some(y)) = (a.registry_id, b.registry_id) {
            if !x.is_empty() && x == y {
                return true;
            }
        }

        if let (Some(x), Some(y)) = (a.phone, b.phone) {
            if !x.is_empty() && x == y {
                return true;
            }
        }

        if a.street_key.is_empty() || b.street_key.is_empty() {
            return false;
        }
        self.name_similarity(a.name_key, b.name_key) >= self.matching.name_similarity_threshold
            && self.address_similarity(a.street_key, b.street_key)
                >= self.matching.address_similarity_threshold
    }

    /// Collapse duplicates across the consolidated lead set. Candidate pairs
    /// come from registry-id, phone and name-token indexes, so the sweep
    /// stays far from O(n²); each candidate pair still has to pass
    /// `same_business`. Returns the surviving leads and the number of leads
    /// folded away.
    pub fn collapse(&self, mut leads: Vec<ConsolidatedLead>) -> (Vec<ConsolidatedLead>, usize) {
        let before = leads.len();
        if before < 2 {
            return (leads, 0);
        }

        // Canonical order makes the fold below permutation-invariant.
        leads.sort_by(ConsolidatedLead::canonical_cmp);

        let mut by_registry: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut by_phone: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut by_name_token: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, lead) in leads.iter().enumerate() {
            if let Some(id) = lead.registry_id.as_deref() {
                by_registry.entry(id).or_default().push(i);
            }
            if let Some(phone) = lead.phone.as_deref() {
                by_phone.entry(phone).or_default().push(i);
            }
            let token = first_token(&lead.name_key);
            if !token.is_empty() {
                by_name_token.entry(token).or_default().push(i);
            }
        }

        let mut candidate_pairs: Vec<(usize, usize)> = Vec::new();
        for index in [&by_registry, &by_phone, &by_name_token] {
            for indices in index.values() {
                for (pos, &i) in indices.iter().enumerate() {
                    for &j in &indices[pos + 1..] {
                        candidate_pairs.push((i, j));
                    }
                }
            }
        }

        let mut uf = UnionFind::new(leads.len());
        for (i, j) in candidate_pairs {
            if uf.find(i) != uf.find(j)
                && self.same_business(&leads[i].match_fields(), &leads[j].match_fields())
            {
                uf.union(i, j);
            }
        }

        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..leads.len() {
            groups.entry(uf.find(i)).or_default().push(i);
        }
        let mut roots: Vec<usize> = groups.keys().copied().collect();
        roots.sort_unstable();

        let mut members: Vec<Option<ConsolidatedLead>> = leads.into_iter().map(Some).collect();
        let mut collapsed = Vec::with_capacity(roots.len());
        for root in roots {
            let mut indices = groups.remove(&root).unwrap_or_default();
            indices.sort_unstable();
            let mut iter = indices.into_iter();
            let mut lead = match iter.next().and_then(|i| members[i].take()) {
                Some(lead) => lead,
                None => continue,
            };
            for i in iter {
                if let Some(other) = members[i].take() {
                    debug!(
                        kept = %lead.identity.as_key(),
                        folded = %other.identity.as_key(),
                        "collapsing duplicate lead"
                    );
                    lead.absorb(other);
                }
            }
            collapsed.push(lead);
        }

        let removed = before - collapsed.len();
        (collapsed, removed)
    }
}

pub(crate) struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    pub(crate) fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    pub(crate) fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        // Lower root wins so group representatives follow canonical order.
        if ra < rb {
            self.parent[rb] = ra;
        } else if rb < ra {
            self.parent[ra] = rb;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedup() -> Deduplicator {
        Deduplicator::new(MatchingConfig::default())
    }

    fn fields<'a>(
        registry_id: Option<&'a str>,
        phone: Option<&'a str>,
        name_key: &'a str,
        street_key: &'a str,
    ) -> MatchFields<'a> {
        MatchFields {
            registry_id,
            phone,
            name_key,
            street_key,
        }
    }

    #[test]
    fn test_equal_registry_ids_match() {
        let a = fields(Some("12345678"), None, "kavarna nova", "vodickova");
        let b = fields(Some("12345678"), None, "uplne jiny podnik", "karlova");
        assert!(dedup().same_business(&a, &b));
    }

    #[test]
    fn test_differing_registry_ids_fall_through_to_later_rules() {
        // Unequal ids only fail the first rule; the shared phone line still
        // folds the pair.
        let a = fields(Some("12345678"), Some("420777123456"), "kavarna nova", "vodickova");
        let b = fields(Some("87654321"), Some("420777123456"), "kava klub", "karlova");
        assert!(dedup().same_business(&a, &b));

        // With no phone and nothing fuzzy left to match, they stay apart.
        let c = fields(Some("12345678"), None, "kavarna nova", "vodickova");
        let d = fields(Some("87654321"), None, "autoservis pesek", "karlova");
        assert!(!dedup().same_business(&c, &d));
    }

    #[test]
    fn test_equal_phones_match() {
        let a = fields(None, Some("420777123456"), "kavarna nova", "vodickova");
        let b = fields(None, Some("420777123456"), "cafe nova", "");
        assert!(dedup().same_business(&a, &b));
    }

    #[test]
    fn test_fuzzy_name_and_address_match() {
        let a = fields(None, None, "restaurace u kostela", "kostelni praha");
        let b = fields(None, None, "restaurace u kostela", "kostelni praha");
        assert!(dedup().same_business(&a, &b));
    }

    #[test]
    fn test_empty_address_blocks_fuzzy_match() {
        let a = fields(None, None, "restaurace u kostela", "");
        let b = fields(None, None, "restaurace u kostela", "kostelni praha");
        assert!(!dedup().same_business(&a, &b));
    }

    #[test]
    fn test_dissimilar_names_do_not_match() {
        let a = fields(None, None, "kavarna nova", "vodickova praha");
        let b = fields(None, None, "autoservis pesek", "vodickova praha");
        assert!(!dedup().same_business(&a, &b));
    }

    #[test]
    fn test_symmetry() {
        let pairs = [
            (
                fields(Some("12345678"), None, "kavarna nova", "vodickova"),
                fields(None, Some("420777123456"), "kavarna nova", "vodickova"),
            ),
            (
                fields(None, Some("420777123456"), "kavarna nova", ""),
                fields(None, Some("420777123456"), "cafe nova", "karlova"),
            ),
            (
                fields(None, None, "restaurace u kostela", "kostelni"),
                fields(None, None, "restaurace u kostela", "kostelni"),
            ),
            (
                fields(None, None, "kavarna nova", ""),
                fields(None, None, "kavarna nova", "vodickova"),
            ),
        ];
        let d = dedup();
        for (a, b) in &pairs {
            assert_eq!(d.same_business(a, b), d.same_business(b, a));
        }
    }

    #[test]
    fn test_similarity_is_symmetric_and_bounded() {
        let samples = [
            ("kavarna nova", "nova kavarna"),
            ("restaurace u kostela", "restaurace u kostela"),
            ("pekarstvi novak", "cukrarna novotna"),
            ("", "kavarna"),
        ];
        for (a, b) in samples {
            let forward = text_similarity(a, b);
            let backward = text_similarity(b, a);
            assert_eq!(forward, backward);
            assert!((0.0..=1.0).contains(&forward));
        }
    }

    #[test]
    fn test_token_overlap_handles_reordering() {
        // Pure edit distance would punish swapped words; the token blend
        // keeps them identical.
        assert_eq!(text_similarity("kavarna nova", "nova kavarna"), 1.0);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let a = fields(None, None, "kavarna nova", "vodickova praha");
        let b = fields(None, None, "kava klub", "vodickova praha");
        assert!(!dedup().same_business(&a, &b));

        let loose = Deduplicator::new(MatchingConfig {
            name_similarity_threshold: 0.3,
            ..MatchingConfig::default()
        });
        assert!(loose.same_business(&a, &b));
    }
}
