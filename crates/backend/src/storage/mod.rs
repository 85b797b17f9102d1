use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use georoute_shared::models::{PlanId, ReportPayload, Route, RouteRequest};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};

/// Entries keyed by request id.
const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("backlog_entries");
/// Insertion order: sequence number to request id.
const ORDER_TABLE: TableDefinition<u64, &str> = TableDefinition::new("backlog_order");

/// Audit record of one successful route generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogEntry {
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    pub plan_id: PlanId,
    pub request: RouteRequest,
    pub routes: Vec<Route>,
    #[serde(default)]
    pub report: Option<ReportPayload>,
    /// Position in the insertion order, assigned on append.
    #[serde(default)]
    pub sequence: u64,
}

pub struct Storage {
    db: Database,
    max_entries: usize,
}

impl Storage {
    pub fn open(path: &Path, max_entries: usize) -> Result<Arc<Self>, String> {
        let db = Database::create(path)
            .map_err(|e| format!("Failed to open database at {}: {}", path.display(), e))?;

        let write_txn = db.begin_write().map_err(|e| e.to_string())?;
        {
            write_txn.open_table(ENTRIES_TABLE).map_err(|e| e.to_string())?;
            write_txn.open_table(ORDER_TABLE).map_err(|e| e.to_string())?;
        }
        write_txn.commit().map_err(|e| e.to_string())?;

        Ok(Arc::new(Storage {
            db,
            max_entries: max_entries.max(1),
        }))
    }

    /// Store `entry` as the newest record, replacing any record with the same
    /// request id, then evict the oldest records beyond capacity. Returns how
    /// many records were evicted.
    pub fn append(&self, entry: &BacklogEntry) -> Result<usize, String> {
        let write_txn = self.db.begin_write().map_err(|e| e.to_string())?;
        let evicted = {
            let mut entries = write_txn.open_table(ENTRIES_TABLE).map_err(|e| e.to_string())?;
            let mut order = write_txn.open_table(ORDER_TABLE).map_err(|e| e.to_string())?;

            let previous = entries
                .get(entry.request_id.as_str())
                .map_err(|e| e.to_string())?
                .map(|v| v.value().to_vec());
            if let Some(bytes) = previous {
                let old: BacklogEntry =
                    serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
                order.remove(old.sequence).map_err(|e| e.to_string())?;
            }

            let sequence = order
                .last()
                .map_err(|e| e.to_string())?
                .map(|(k, _)| k.value() + 1)
                .unwrap_or(1);
            let stored = BacklogEntry {
                sequence,
                ..entry.clone()
            };
            let json = serde_json::to_vec(&stored).map_err(|e| e.to_string())?;
            entries
                .insert(entry.request_id.as_str(), json.as_slice())
                .map_err(|e| e.to_string())?;
            order
                .insert(sequence, entry.request_id.as_str())
                .map_err(|e| e.to_string())?;

            let mut evicted = 0;
            while order.len().map_err(|e| e.to_string())? > self.max_entries as u64 {
                let oldest = order
                    .pop_first()
                    .map_err(|e| e.to_string())?
                    .map(|(_, id)| id.value().to_string());
                match oldest {
                    Some(id) => {
                        entries.remove(id.as_str()).map_err(|e| e.to_string())?;
                        evicted += 1;
                    }
                    None => break,
                }
            }
            evicted
        };
        write_txn.commit().map_err(|e| e.to_string())?;
        Ok(evicted)
    }

    pub fn get(&self, request_id: &str) -> Result<Option<BacklogEntry>, String> {
        let read_txn = self.db.begin_read().map_err(|e| e.to_string())?;
        let table = read_txn.open_table(ENTRIES_TABLE).map_err(|e| e.to_string())?;

        match table.get(request_id).map_err(|e| e.to_string())? {
            Some(value) => {
                let entry = serde_json::from_slice(value.value()).map_err(|e| e.to_string())?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Newest first. `since` keeps entries created at or after the instant.
    pub fn list(
        &self,
        limit: usize,
        offset: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<BacklogEntry>, String> {
        let read_txn = self.db.begin_read().map_err(|e| e.to_string())?;
        let order = read_txn.open_table(ORDER_TABLE).map_err(|e| e.to_string())?;
        let entries = read_txn.open_table(ENTRIES_TABLE).map_err(|e| e.to_string())?;

        let mut matched = Vec::new();
        let mut skipped = 0;
        for row in order.iter().map_err(|e| e.to_string())?.rev() {
            if matched.len() >= limit {
                break;
            }
            let (_, request_id) = row.map_err(|e| e.to_string())?;
            let Some(value) = entries
                .get(request_id.value())
                .map_err(|e| e.to_string())?
            else {
                continue;
            };
            let entry: BacklogEntry =
                serde_json::from_slice(value.value()).map_err(|e| e.to_string())?;
            if since.is_some_and(|t| entry.created_at < t) {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            matched.push(entry);
        }
        Ok(matched)
    }

    pub fn count(&self, since: Option<DateTime<Utc>>) -> Result<u64, String> {
        match since {
            None => {
                let read_txn = self.db.begin_read().map_err(|e| e.to_string())?;
                let table = read_txn.open_table(ENTRIES_TABLE).map_err(|e| e.to_string())?;
                table.len().map_err(|e| e.to_string())
            }
            Some(_) => Ok(self.list(usize::MAX, 0, since)?.len() as u64),
        }
    }

    pub fn clear(&self) -> Result<(), String> {
        let write_txn = self.db.begin_write().map_err(|e| e.to_string())?;
        {
            let mut entries = write_txn.open_table(ENTRIES_TABLE).map_err(|e| e.to_string())?;
            entries.retain(|_, _| false).map_err(|e| e.to_string())?;
            let mut order = write_txn.open_table(ORDER_TABLE).map_err(|e| e.to_string())?;
            order.retain(|_, _| false).map_err(|e| e.to_string())?;
        }
        write_txn.commit().map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use georoute_shared::models::{AnalysisDepth, GeoBounds, TacticalUnit};

    fn open_temp(max_entries: usize) -> (tempfile::TempDir, Arc<Storage>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&dir.path().join("test.redb"), max_entries).unwrap();
        (dir, storage)
    }

    fn unit(lat: f64, is_friendly: bool) -> TacticalUnit {
        TacticalUnit {
            lat,
            lon: 46.70,
            is_friendly,
            unit_id: None,
        }
    }

    fn entry(request_id: &str, plan_id: PlanId) -> BacklogEntry {
        BacklogEntry {
            request_id: request_id.to_string(),
            created_at: Utc::now(),
            plan_id,
            request: RouteRequest {
                request_id: request_id.to_string(),
                soldiers: vec![unit(24.70, true)],
                enemies: vec![unit(24.71, false)],
                bounds: GeoBounds::new(24.6, 46.6, 24.8, 46.8),
                zoom: 17,
                no_go_zones: vec![],
                analysis_depth: AnalysisDepth::Full,
            },
            routes: vec![],
            report: None,
            sequence: 0,
        }
    }

    fn ids(entries: &[BacklogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.request_id.as_str()).collect()
    }

    #[test]
    fn test_append_and_get() {
        let (_dir, storage) = open_temp(10);
        storage.append(&entry("a", 1)).unwrap();
        let loaded = storage.get("a").unwrap().unwrap();
        assert_eq!(loaded.plan_id, 1);
        assert_eq!(loaded.sequence, 1);
        assert!(storage.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first_with_paging() {
        let (_dir, storage) = open_temp(10);
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            storage.append(&entry(id, i as PlanId + 1)).unwrap();
        }
        assert_eq!(ids(&storage.list(10, 0, None).unwrap()), vec!["d", "c", "b", "a"]);
        assert_eq!(ids(&storage.list(2, 1, None).unwrap()), vec!["c", "b"]);
        assert!(storage.list(5, 10, None).unwrap().is_empty());
    }

    #[test]
    fn test_oldest_evicted_beyond_cap() {
        let (_dir, storage) = open_temp(3);
        for id in ["a", "b", "c"] {
            assert_eq!(storage.append(&entry(id, 1)).unwrap(), 0);
        }
        assert_eq!(storage.append(&entry("d", 2)).unwrap(), 1);
        assert_eq!(storage.count(None).unwrap(), 3);
        assert!(storage.get("a").unwrap().is_none());
        assert_eq!(ids(&storage.list(10, 0, None).unwrap()), vec!["d", "c", "b"]);
    }

    #[test]
    fn test_same_request_id_moves_to_newest() {
        let (_dir, storage) = open_temp(10);
        storage.append(&entry("a", 1)).unwrap();
        storage.append(&entry("b", 2)).unwrap();
        storage.append(&entry("a", 3)).unwrap();
        assert_eq!(storage.count(None).unwrap(), 2);
        assert_eq!(ids(&storage.list(10, 0, None).unwrap()), vec!["a", "b"]);
        assert_eq!(storage.get("a").unwrap().unwrap().plan_id, 3);
    }

    #[test]
    fn test_since_filter() {
        let (_dir, storage) = open_temp(10);
        let mut old = entry("old", 1);
        old.created_at = Utc::now() - chrono::Duration::hours(2);
        storage.append(&old).unwrap();
        storage.append(&entry("new", 2)).unwrap();
        let cutoff = Some(Utc::now() - chrono::Duration::hours(1));
        assert_eq!(ids(&storage.list(10, 0, cutoff).unwrap()), vec!["new"]);
        assert_eq!(storage.count(cutoff).unwrap(), 1);
        assert_eq!(storage.count(None).unwrap(), 2);
    }

    #[test]
    fn test_clear() {
        let (_dir, storage) = open_temp(10);
        storage.append(&entry("a", 1)).unwrap();
        storage.clear().unwrap();
        assert_eq!(storage.count(None).unwrap(), 0);
        storage.append(&entry("b", 2)).unwrap();
        assert_eq!(storage.list(10, 0, None).unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backlog.redb");
        {
            let storage = Storage::open(&path, 10).unwrap();
            storage.append(&entry("a", 1)).unwrap();
        }
        let storage = Storage::open(&path, 10).unwrap();
        assert_eq!(storage.count(None).unwrap(), 1);
        storage.append(&entry("b", 2)).unwrap();
        assert_eq!(storage.get("b").unwrap().unwrap().sequence, 2);
    }
}
