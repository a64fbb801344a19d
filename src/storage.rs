use crate::error::Result;
use crate::pipeline::merge::ConsolidatedLead;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Storage trait for persisting consolidated leads per (niche, city) scope.
/// Loaded leads feed back through the duplicate sweep on the next run, so
/// a store never needs its own update or conflict logic.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn load(&self, niche: &str, city: &str) -> Result<Vec<ConsolidatedLead>>;
    async fn save(&self, niche: &str, city: &str, leads: &[ConsolidatedLead]) -> Result<()>;
}

/// Keep the earliest first_seen for any identity already in the store.
fn preserve_first_seen(
    existing: &HashMap<String, DateTime<Utc>>,
    leads: &[ConsolidatedLead],
) -> Vec<ConsolidatedLead> {
    leads
        .iter()
        .map(|lead| {
            let mut lead = lead.clone();
            if let Some(seen) = existing.get(&lead.identity.as_key()) {
                lead.first_seen = lead.first_seen.min(*seen);
            }
            lead
        })
        .collect()
}

/// In-memory store implementation for development/testing
pub struct InMemoryLeadStore {
    leads: Arc<Mutex<HashMap<(String, String), Vec<ConsolidatedLead>>>>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self {
            leads: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryLeadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn load(&self, niche: &str, city: &str) -> Result<Vec<ConsolidatedLead>> {
        let leads = self.leads.lock().unwrap();
        let scoped = leads
            .get(&(niche.to_string(), city.to_string()))
            .cloned()
            .unwrap_or_default();
        debug!("Loaded {} stored leads for {}/{}", scoped.len(), niche, city);
        Ok(scoped)
    }

    async fn save(&self, niche: &str, city: &str, incoming: &[ConsolidatedLead]) -> Result<()> {
        let mut leads = self.leads.lock().unwrap();
        let key = (niche.to_string(), city.to_string());
        let existing: HashMap<String, DateTime<Utc>> = leads
            .get(&key)
            .map(|scoped| {
                scoped
                    .iter()
                    .map(|l| (l.identity.as_key(), l.first_seen))
                    .collect()
            })
            .unwrap_or_default();

        let saved = preserve_first_seen(&existing, incoming);
        debug!("Saved {} leads for {}/{}", saved.len(), niche, city);
        leads.insert(key, saved);
        Ok(())
    }
}

/// SQLite-backed store. One row per consolidated lead; the full lead rides
/// in a JSON payload column and a few scalar columns make the table
/// inspectable with plain SQL.
pub struct SqliteLeadStore {
    conn: Mutex<Connection>,
}

impl SqliteLeadStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS leads (
                identity        TEXT NOT NULL,
                niche           TEXT NOT NULL,
                city            TEXT NOT NULL,
                name            TEXT NOT NULL,
                priority_score  INTEGER NOT NULL,
                first_seen      TEXT NOT NULL,
                last_seen       TEXT NOT NULL,
                payload         TEXT NOT NULL,
                PRIMARY KEY (identity, niche, city)
            );
            CREATE INDEX IF NOT EXISTS idx_leads_scope ON leads (niche, city);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl LeadStore for SqliteLeadStore {
    async fn load(&self, niche: &str, city: &str) -> Result<Vec<ConsolidatedLead>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT payload FROM leads WHERE niche = ?1 AND city = ?2 ORDER BY identity",
        )?;
        let mut rows = stmt.query(params![niche, city])?;
        let mut leads = Vec::new();
        while let Some(row) = rows.next()? {
            let payload: String = row.get(0)?;
            leads.push(serde_json::from_str(&payload)?);
        }
        debug!("Loaded {} stored leads for {}/{}", leads.len(), niche, city);
        Ok(leads)
    }

    async fn save(&self, niche: &str, city: &str, incoming: &[ConsolidatedLead]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: HashMap<String, DateTime<Utc>> = {
            let mut stmt = tx
                .prepare("SELECT identity, first_seen FROM leads WHERE niche = ?1 AND city = ?2")?;
            let mut rows = stmt.query(params![niche, city])?;
            let mut seen = HashMap::new();
            while let Some(row) = rows.next()? {
                let identity: String = row.get(0)?;
                let first_seen: String = row.get(1)?;
                if let Ok(ts) = DateTime::parse_from_rfc3339(&first_seen) {
                    seen.insert(identity, ts.with_timezone(&Utc));
                }
            }
            seen
        };

        // Replace the whole scope so leads gone from the batch drop out.
        tx.execute(
            "DELETE FROM leads WHERE niche = ?1 AND city = ?2",
            params![niche, city],
        )?;

        let saved = preserve_first_seen(&existing, incoming);
        for lead in &saved {
            tx.execute(
                "INSERT INTO leads (identity, niche, city, name, priority_score, first_seen, last_seen, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    lead.identity.as_key(),
                    niche,
                    city,
                    lead.name,
                    lead.priority_score,
                    lead.first_seen.to_rfc3339(),
                    lead.last_seen.to_rfc3339(),
                    serde_json::to_string(lead)?,
                ],
            )?;
        }

        tx.commit()?;
        debug!("Saved {} leads for {}/{}", saved.len(), niche, city);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchingConfig;
    use crate::pipeline::merge::Merger;
    use crate::pipeline::normalize::RecordNormalizer;
    use crate::types::{RawLead, SourceKind};
    use chrono::Duration;

    fn create_test_lead(name: &str, street: &str) -> ConsolidatedLead {
        let raw = RawLead::new(SourceKind::Maps, name).with_address(street, "Brno");
        let normalizer = RecordNormalizer::new(MatchingConfig::default());
        let records = normalizer.normalize(&raw).into_iter().collect();
        Merger::new(MatchingConfig::default())
            .merge("cafes", "Brno", records)
            .remove(0)
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryLeadStore::new();
        let lead = create_test_lead("Kavárna Nová", "Vodičkova 12");

        store.save("cafes", "Brno", &[lead.clone()]).await.unwrap();
        let loaded = store.load("cafes", "Brno").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].identity, lead.identity);
        assert_eq!(loaded[0].name, "Kavárna Nová");
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let store = InMemoryLeadStore::new();
        let lead = create_test_lead("Kavárna Nová", "Vodičkova 12");

        store.save("cafes", "Brno", &[lead]).await.unwrap();
        assert!(store.load("cafes", "Praha").await.unwrap().is_empty());
        assert!(store.load("fitness", "Brno").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_seen_survives_resave() {
        let store = InMemoryLeadStore::new();
        let mut lead = create_test_lead("Kavárna Nová", "Vodičkova 12");
        let original = lead.first_seen;

        store.save("cafes", "Brno", &[lead.clone()]).await.unwrap();

        lead.first_seen = original + Duration::hours(6);
        lead.last_seen = original + Duration::hours(6);
        store.save("cafes", "Brno", &[lead]).await.unwrap();

        let loaded = store.load("cafes", "Brno").await.unwrap();
        assert_eq!(loaded[0].first_seen, original);
        assert_eq!(loaded[0].last_seen, original + Duration::hours(6));
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteLeadStore::open(dir.path().join("leads.db")).unwrap();

        let alfa = create_test_lead("Kavárna Alfa", "Vodičkova 12");
        let beta = create_test_lead("Kavárna Beta", "Dlouhá 9");
        store
            .save("cafes", "Brno", &[alfa.clone(), beta.clone()])
            .await
            .unwrap();

        let loaded = store.load("cafes", "Brno").await.unwrap();
        assert_eq!(loaded.len(), 2);
        let names: Vec<&str> = loaded.iter().map(|l| l.name.as_str()).collect();
        assert!(names.contains(&"Kavárna Alfa"));
        assert!(names.contains(&"Kavárna Beta"));
    }

    #[tokio::test]
    async fn test_sqlite_save_replaces_scope() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteLeadStore::open(dir.path().join("leads.db")).unwrap();

        let alfa = create_test_lead("Kavárna Alfa", "Vodičkova 12");
        let beta = create_test_lead("Kavárna Beta", "Dlouhá 9");
        store
            .save("cafes", "Brno", &[alfa.clone(), beta])
            .await
            .unwrap();
        store.save("cafes", "Brno", &[alfa]).await.unwrap();

        let loaded = store.load("cafes", "Brno").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Kavárna Alfa");
    }

    #[tokio::test]
    async fn test_sqlite_preserves_first_seen() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteLeadStore::open(dir.path().join("leads.db")).unwrap();

        let mut lead = create_test_lead("Kavárna Nová", "Vodičkova 12");
        let original = lead.first_seen;
        store.save("cafes", "Brno", &[lead.clone()]).await.unwrap();

        lead.first_seen = original + Duration::days(3);
        store.save("cafes", "Brno", &[lead]).await.unwrap();

        let loaded = store.load("cafes", "Brno").await.unwrap();
        assert_eq!(loaded[0].first_seen, original);
    }

    #[tokio::test]
    async fn test_sqlite_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.db");

        {
            let store = SqliteLeadStore::open(&path).unwrap();
            let lead = create_test_lead("Kavárna Nová", "Vodičkova 12");
            store.save("cafes", "Brno", &[lead]).await.unwrap();
        }

        let store = SqliteLeadStore::open(&path).unwrap();
        let loaded = store.load("cafes", "Brno").await.unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
