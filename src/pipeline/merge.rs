use crate::config::MatchingConfig;
use crate::pipeline::dedup::{Deduplicator, MatchFields, UnionFind};
use crate::pipeline::normalize::{first_token, match_key, NormalizedRecord};
use crate::types::{SourceKind, WebsiteQuality};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

/// Stable identity of a lead: the registry id when one is known, otherwise
/// a digest of the normalized name, street and city.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeadIdentity {
    Registry(String),
    Composite(String),
}

impl LeadIdentity {
    pub fn as_key(&self) -> String {
        match self {
            LeadIdentity::Registry(id) => format!("ico:{}", id),
            LeadIdentity::Composite(digest) => format!("key:{}", digest),
        }
    }

    fn composite(name_key: &str, street_key: &str, city_key: &str) -> Self {
        let canonical = format!("{}|{}|{}", name_key, street_key, city_key);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        LeadIdentity::Composite(hex::encode(hasher.finalize()))
    }
}

/// A field disagreement recorded during merging. The kept value won by
/// trust rank or canonical order; the losing value stays auditable here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub kept: String,
    pub discarded: String,
    pub source: SourceKind,
}

/// The deduplicated, consolidated view of one real business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedLead {
    pub identity: LeadIdentity,
    pub niche: String,
    pub city: String,
    pub name: String,
    pub name_key: String,
    pub address: String,
    pub street_key: String,
    pub phone: Option<String>,
    /// Union of every distinct email contributed by any source.
    pub emails: Vec<String>,
    pub website: Option<String>,
    pub instagram: Option<String>,
    pub facebook: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub registry_id: Option<String>,
    pub has_website: bool,
    /// Verdict injected by the website-analysis collaborator.
    pub website_quality: Option<WebsiteQuality>,
    pub priority_score: i32,
    /// Which scoring signals fired, in scoring order.
    pub score_notes: Vec<String>,
    /// Distinct source kinds that contributed, highest trust first.
    pub provenance: Vec<SourceKind>,
    pub conflicts: Vec<FieldConflict>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ConsolidatedLead {
    fn from_record(niche: &str, city: &str, record: NormalizedRecord, now: DateTime<Utc>) -> Self {
        let city_key = if record.city_key.is_empty() {
            match_key(city)
        } else {
            record.city_key.clone()
        };
        let identity = match record.registry_id.as_deref() {
            Some(id) => LeadIdentity::Registry(id.to_string()),
            None => LeadIdentity::composite(&record.name_key, &record.street_key, &city_key),
        };
        let has_website = record.website.is_some();
        Self {
            identity,
            niche: niche.to_string(),
            city: city.to_string(),
            name: record.name,
            name_key: record.name_key,
            address: record.address,
            street_key: record.street_key,
            phone: record.phone,
            emails: record.email.into_iter().collect(),
            website: record.website,
            instagram: record.instagram,
            facebook: record.facebook,
            rating: record.rating,
            review_count: record.review_count,
            registry_id: record.registry_id,
            has_website,
            website_quality: None,
            priority_score: 0,
            score_notes: Vec::new(),
            provenance: vec![record.source],
            conflicts: Vec::new(),
            first_seen: now,
            last_seen: now,
        }
    }

    /// Fold one more record into this lead. Records arrive in canonical
    /// order (highest trust first), so an occupied field is always the
    /// authoritative one; later disagreeing values are only recorded.
    fn fold_record(&mut self, record: NormalizedRecord) {
        if record.name != self.name {
            self.push_conflict("name", &record.name, record.source);
        }
        if self.address.is_empty() && !record.address.is_empty() {
            self.address = record.address;
            self.street_key = record.street_key;
        } else if !record.address.is_empty() && record.address != self.address {
            self.push_conflict("address", &record.address, record.source);
        }
        match (&self.phone, record.phone) {
            (None, Some(phone)) => self.phone = Some(phone),
            (Some(kept), Some(phone)) if *kept != phone => {
                self.push_conflict("phone", &phone, record.source);
            }
            _ => {}
        }
        match (&self.website, record.website) {
            (None, Some(website)) => {
                self.website = Some(website);
            }
            (Some(kept), Some(website)) if *kept != website => {
                self.push_conflict("website", &website, record.source);
            }
            _ => {}
        }
        if let Some(email) = record.email {
            if !self.emails.contains(&email) {
                self.emails.push(email);
            }
        }
        if self.instagram.is_none() {
            self.instagram = record.instagram;
        }
        if self.facebook.is_none() {
            self.facebook = record.facebook;
        }
        if self.rating.is_none() {
            self.rating = record.rating;
        }
        if self.review_count.is_none() {
            self.review_count = record.review_count;
        }
        match (&self.registry_id, record.registry_id) {
            (None, Some(id)) => self.registry_id = Some(id),
            (Some(kept), Some(id)) if *kept != id => {
                self.push_conflict("registry_id", &id, record.source);
            }
            _ => {}
        }
        if !self.provenance.contains(&record.source) {
            self.provenance.push(record.source);
        }
        self.refresh_derived();
    }

    /// Union another consolidated lead into this one. Used by the
    /// deduplication sweep and for previously stored leads re-entering a
    /// run; the caller folds in canonical order so first-seen wins ties.
    pub fn absorb(&mut self, other: ConsolidatedLead) {
        let other_kind = other.top_source();
        if other.name != self.name {
            self.push_conflict("name", &other.name, other_kind);
        }
        if self.address.is_empty() && !other.address.is_empty() {
            self.address = other.address;
            self.street_key = other.street_key;
        } else if !other.address.is_empty() && other.address != self.address {
            self.push_conflict("address", &other.address, other_kind);
        }
        match (&self.phone, other.phone) {
            (None, Some(phone)) => self.phone = Some(phone),
            (Some(kept), Some(phone)) if *kept != phone => {
                self.push_conflict("phone", &phone, other_kind);
            }
            _ => {}
        }
        match (&self.website, other.website) {
            (None, Some(website)) => self.website = Some(website),
            (Some(kept), Some(website)) if *kept != website => {
                self.push_conflict("website", &website, other_kind);
            }
            _ => {}
        }
        for email in other.emails {
            if !self.emails.contains(&email) {
                self.emails.push(email);
            }
        }
        if self.instagram.is_none() {
            self.instagram = other.instagram;
        }
        if self.facebook.is_none() {
            self.facebook = other.facebook;
        }
        if self.rating.is_none() {
            self.rating = other.rating;
        }
        if self.review_count.is_none() {
            self.review_count = other.review_count;
        }
        match (&self.registry_id, other.registry_id) {
            (None, Some(id)) => self.registry_id = Some(id),
            (Some(kept), Some(id)) if *kept != id => {
                self.push_conflict("registry_id", &id, other_kind);
            }
            _ => {}
        }
        for source in other.provenance {
            if !self.provenance.contains(&source) {
                self.provenance.push(source);
            }
        }
        self.conflicts.extend(other.conflicts);
        if self.website_quality.is_none() {
            self.website_quality = other.website_quality;
        }
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
        self.refresh_derived();
    }

    fn push_conflict(&mut self, field: &str, discarded: &str, source: SourceKind) {
        let kept = match field {
            "name" => self.name.clone(),
            "address" => self.address.clone(),
            "phone" => self.phone.clone().unwrap_or_default(),
            "website" => self.website.clone().unwrap_or_default(),
            _ => self.registry_id.clone().unwrap_or_default(),
        };
        self.conflicts.push(FieldConflict {
            field: field.to_string(),
            kept,
            discarded: discarded.to_string(),
            source,
        });
    }

    fn refresh_derived(&mut self) {
        self.has_website = self.website.is_some();
        self.provenance
            .sort_by(|a, b| b.trust_rank().cmp(&a.trust_rank()));
        if let (LeadIdentity::Composite(_), Some(id)) = (&self.identity, &self.registry_id) {
            self.identity = LeadIdentity::Registry(id.clone());
        }
    }

    pub fn match_fields(&self) -> MatchFields<'_> {
        MatchFields {
            registry_id: self.registry_id.as_deref(),
            phone: self.phone.as_deref(),
            name_key: &self.name_key,
            street_key: &self.street_key,
        }
    }

    pub fn top_source(&self) -> SourceKind {
        // Provenance is kept sorted by trust and is never empty.
        self.provenance.first().copied().unwrap_or(SourceKind::Website)
    }

    pub fn max_trust(&self) -> u8 {
        self.top_source().trust_rank()
    }

    pub fn provenance_count(&self) -> usize {
        self.provenance.len()
    }

    pub fn has_social(&self) -> bool {
        self.instagram.is_some() || self.facebook.is_some()
    }

    /// Total order used whenever leads are folded together, so results do
    /// not depend on arrival order.
    pub fn canonical_cmp(a: &Self, b: &Self) -> Ordering {
        b.max_trust()
            .cmp(&a.max_trust())
            .then_with(|| a.identity.as_key().cmp(&b.identity.as_key()))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.address.cmp(&b.address))
            .then_with(|| a.phone.cmp(&b.phone))
            .then_with(|| a.website.cmp(&b.website))
    }
}

/// Second stage of the pipeline: groups the run's records into one lead per
/// real business.
pub struct Merger {
    dedup: Deduplicator,
}

impl Merger {
    pub fn new(matching: MatchingConfig) -> Self {
        Self {
            dedup: Deduplicator::new(matching),
        }
    }

    /// Group the run's normalized records and consolidate each group.
    ///
    /// Records with a registry id group by that id alone. The rest bucket
    /// by (first name token, first street token) and only in-bucket pairs
    /// are tested, which keeps the comparison cost bounded. Duplicates
    /// spanning those buckets are the deduplication sweep's job.
    pub fn merge(
        &self,
        niche: &str,
        city: &str,
        records: Vec<NormalizedRecord>,
    ) -> Vec<ConsolidatedLead> {
        let now = Utc::now();
        let total = records.len();
        let mut uf = UnionFind::new(total);

        let mut by_registry: HashMap<&str, usize> = HashMap::new();
        let mut approx: HashMap<(&str, &str), Vec<usize>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            match record.registry_id.as_deref() {
                Some(id) => match by_registry.entry(id) {
                    Entry::Occupied(entry) => uf.union(*entry.get(), i),
                    Entry::Vacant(entry) => {
                        entry.insert(i);
                    }
                },
                None => {
                    let key = (first_token(&record.name_key), first_token(&record.street_key));
                    approx.entry(key).or_default().push(i);
                }
            }
        }

        for indices in approx.values() {
            for (pos, &i) in indices.iter().enumerate() {
                for &j in &indices[pos + 1..] {
                    if uf.find(i) != uf.find(j)
                        && self.dedup.same_business(
                            &MatchFields::from(&records[i]),
                            &MatchFields::from(&records[j]),
                        )
                    {
                        uf.union(i, j);
                    }
                }
            }
        }

        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..total {
            groups.entry(uf.find(i)).or_default().push(i);
        }
        let mut roots: Vec<usize> = groups.keys().copied().collect();
        roots.sort_unstable();

        let mut slots: Vec<Option<NormalizedRecord>> = records.into_iter().map(Some).collect();
        let mut leads = Vec::with_capacity(roots.len());
        for root in roots {
            let indices = groups.remove(&root).unwrap_or_default();
            let mut group: Vec<NormalizedRecord> =
                indices.into_iter().filter_map(|i| slots[i].take()).collect();
            group.sort_by(canonical_record_cmp);
            let mut iter = group.into_iter();
            let mut lead = match iter.next() {
                Some(record) => ConsolidatedLead::from_record(niche, city, record, now),
                None => continue,
            };
            for record in iter {
                lead.fold_record(record);
            }
            leads.push(lead);
        }

        leads.sort_by(ConsolidatedLead::canonical_cmp);
        debug!(records = total, leads = leads.len(), "merged records into leads");
        leads
    }
}

/// Total order over record content. Trust rank leads so that folding a
/// group front-to-back always hands the authoritative source the first
/// claim on each field; the remaining keys pin down equal-trust ties for
/// any input permutation.
fn canonical_record_cmp(a: &NormalizedRecord, b: &NormalizedRecord) -> Ordering {
    b.source
        .trust_rank()
        .cmp(&a.source.trust_rank())
        .then_with(|| a.source.name().cmp(b.source.name()))
        .then_with(|| a.name_key.cmp(&b.name_key))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.street_key.cmp(&b.street_key))
        .then_with(|| a.address.cmp(&b.address))
        .then_with(|| a.city.cmp(&b.city))
        .then_with(|| a.phone.cmp(&b.phone))
        .then_with(|| a.email.cmp(&b.email))
        .then_with(|| a.website.cmp(&b.website))
        .then_with(|| a.instagram.cmp(&b.instagram))
        .then_with(|| a.facebook.cmp(&b.facebook))
        .then_with(|| a.rating.map(f64::to_bits).cmp(&b.rating.map(f64::to_bits)))
        .then_with(|| a.review_count.cmp(&b.review_count))
        .then_with(|| a.registry_id.cmp(&b.registry_id))
}
