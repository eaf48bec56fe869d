use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ImportResult, ResultStore, StoreError};
use crate::domain::{normalize_company, JobRecord};

/// Process-local store keyed by identity key
#[derive(Default)]
pub struct MemoryResultStore {
    records: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_company(record: &JobRecord, company_key: Option<&str>) -> bool {
    company_key.map_or(true, |key| record.company_key() == normalize_company(key))
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn import(&self, records: Vec<JobRecord>) -> Result<ImportResult, StoreError> {
        let mut stored = self.records.lock().await;
        let mut result = ImportResult::default();

        for record in records {
            match stored.entry(record.identity_key()) {
                Entry::Occupied(_) => result.skipped += 1,
                Entry::Vacant(slot) => {
                    slot.insert(record);
                    result.inserted += 1;
                }
            }
        }

        debug!(
            inserted = result.inserted,
            skipped = result.skipped,
            "Import completed"
        );
        Ok(result)
    }

    async fn list(&self, company_key: Option<&str>) -> Result<Vec<JobRecord>, StoreError> {
        let stored = self.records.lock().await;
        let mut records: Vec<JobRecord> = stored
            .values()
            .filter(|r| matches_company(r, company_key))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.scraped_at.cmp(&b.scraped_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn clear(&self, company_key: Option<&str>) -> Result<u64, StoreError> {
        let mut stored = self.records.lock().await;
        let before = stored.len();
        stored.retain(|_, r| !matches_company(r, company_key));
        Ok((before - stored.len()) as u64)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut stored = self.records.lock().await;
        let before = stored.len();
        stored.retain(|_, r| r.id != id);
        Ok(stored.len() < before)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<u64, StoreError> {
        let mut stored = self.records.lock().await;
        let before = stored.len();
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        stored.retain(|_, r| !doomed.contains(r.id.as_str()));
        Ok((before - stored.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(company: &str, title: &str, location: &str) -> JobRecord {
        JobRecord::new(company, title, location, "https://example.com/jobs", Utc::now())
    }

    fn batch() -> Vec<JobRecord> {
        vec![
            record("OpenAI", "Research Engineer", "San Francisco"),
            record("OpenAI", "Software Engineer", "San Francisco"),
            record("Anthropic", "Software Engineer", "Remote"),
        ]
    }

    #[tokio::test]
    async fn test_reimport_is_idempotent() {
        let store = MemoryResultStore::new();

        let first = store.import(batch()).await.unwrap();
        let second = store.import(batch()).await.unwrap();

        assert_eq!(first, ImportResult { inserted: 3, skipped: 0 });
        assert_eq!(second, ImportResult { inserted: 0, skipped: 3 });
        assert_eq!(store.list(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_duplicates_within_one_batch_are_skipped() {
        let store = MemoryResultStore::new();
        let result = store
            .import(vec![
                record("OpenAI", "Software Engineer", "SF"),
                record("openai", "software engineer", "sf"),
            ])
            .await
            .unwrap();
        assert_eq!(result, ImportResult { inserted: 1, skipped: 1 });
    }

    #[tokio::test]
    async fn test_list_and_clear_by_company() {
        let store = MemoryResultStore::new();
        store.import(batch()).await.unwrap();

        assert_eq!(store.list(Some("openai")).await.unwrap().len(), 2);
        assert_eq!(store.list(Some("OpenAI")).await.unwrap().len(), 2);

        let removed = store.clear(Some("openai")).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.list(None).await.unwrap().len(), 1);

        assert_eq!(store.clear(None).await.unwrap(), 1);
        assert!(store.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let store = MemoryResultStore::new();
        store.import(batch()).await.unwrap();
        let id = store.list(Some("anthropic")).await.unwrap()[0].id.clone();

        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
        assert!(store.list(Some("anthropic")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_many_removes_only_listed_ids() {
        let store = MemoryResultStore::new();
        store.import(batch()).await.unwrap();
        let mut ids: Vec<String> = store
            .list(Some("openai"))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.push("missing".to_string());
        ids.push(ids[0].clone());

        assert_eq!(store.delete_many(&ids).await.unwrap(), 2);
        assert_eq!(store.delete_many(&ids).await.unwrap(), 0);
        let left = store.list(None).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].company_key(), "anthropic");
    }
}
