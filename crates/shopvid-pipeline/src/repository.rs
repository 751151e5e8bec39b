//! Video record repository.
//!
//! The coordinator, review form and statistics read and write records through
//! [`VideoRepository`] instead of a shared global store. Writers never move a
//! record's status backwards.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::{debug, warn};

use shopvid_models::{VideoId, VideoRecord};

/// Store of the video records known to this client.
pub trait VideoRepository: Send + Sync {
    /// Every record, in no particular order.
    fn snapshot(&self) -> Vec<VideoRecord>;

    fn records_for_order(&self, order_id: &str) -> Vec<VideoRecord>;

    fn get(&self, id: &VideoId) -> Option<VideoRecord>;

    /// Insert or merge a record. Returns `false` if the incoming status was
    /// dropped because it would regress the stored one.
    fn upsert(&self, record: VideoRecord) -> bool;

    /// Replace everything known about an order with a fresh listing.
    fn replace_order(&self, order_id: &str, records: Vec<VideoRecord>);
}

/// In-process [`VideoRepository`].
#[derive(Debug, Default)]
pub struct InMemoryVideoRepository {
    records: RwLock<HashMap<VideoId, VideoRecord>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = VideoRecord>) -> Self {
        let repo = Self::new();
        for record in records {
            repo.upsert(record);
        }
        repo
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn merge_into(map: &mut HashMap<VideoId, VideoRecord>, record: VideoRecord) -> bool {
    match map.get_mut(&record.id) {
        Some(existing) => {
            let from = existing.status;
            let to = record.status;
            let accepted = existing.absorb(record);
            if !accepted {
                warn!(
                    video_id = %existing.id,
                    from = %from,
                    to = %to,
                    "Ignoring status regression"
                );
            }
            accepted
        }
        None => {
            map.insert(record.id.clone(), record);
            true
        }
    }
}

impl VideoRepository for InMemoryVideoRepository {
    fn snapshot(&self) -> Vec<VideoRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn records_for_order(&self, order_id: &str) -> Vec<VideoRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect()
    }

    fn get(&self, id: &VideoId) -> Option<VideoRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn upsert(&self, record: VideoRecord) -> bool {
        let mut map = self.records.write().unwrap_or_else(PoisonError::into_inner);
        merge_into(&mut map, record)
    }

    fn replace_order(&self, order_id: &str, records: Vec<VideoRecord>) {
        let mut map = self.records.write().unwrap_or_else(PoisonError::into_inner);

        let keep: Vec<VideoId> = records.iter().map(|r| r.id.clone()).collect();
        map.retain(|id, r| r.order_id != order_id || keep.contains(id));

        let count = records.len();
        for record in records {
            merge_into(&mut map, record);
        }
        debug!(order_id, count, "Replaced order records");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopvid_models::VideoStatus;

    fn record(id: &str, order: &str, status: VideoStatus) -> VideoRecord {
        let mut r = VideoRecord::new(id, order);
        r.status = status;
        r
    }

    #[test]
    fn test_upsert_never_regresses_status() {
        let repo = InMemoryVideoRepository::new();
        assert!(repo.upsert(record("1", "A", VideoStatus::Processing)));

        let mut stale = record("1", "A", VideoStatus::Uploaded);
        stale.problem_label = Some("Brake noise".into());
        assert!(!repo.upsert(stale));

        let stored = repo.get(&"1".into()).unwrap();
        assert_eq!(stored.status, VideoStatus::Processing);
        assert_eq!(stored.problem_label.as_deref(), Some("Brake noise"));

        assert!(repo.upsert(record("1", "A", VideoStatus::Completed)));
        assert!(!repo.upsert(record("1", "A", VideoStatus::Failed)));
        assert_eq!(repo.get(&"1".into()).unwrap().status, VideoStatus::Completed);
    }

    #[test]
    fn test_replace_order_drops_missing_records_only_for_that_order() {
        let repo = InMemoryVideoRepository::with_records([
            record("1", "A", VideoStatus::Uploaded),
            record("2", "A", VideoStatus::Uploaded),
            record("3", "B", VideoStatus::Completed),
        ]);

        repo.replace_order("A", vec![record("2", "A", VideoStatus::Processing)]);

        assert!(repo.get(&"1".into()).is_none());
        assert_eq!(repo.get(&"2".into()).unwrap().status, VideoStatus::Processing);
        assert!(repo.get(&"3".into()).is_some());
        assert_eq!(repo.records_for_order("A").len(), 1);
        assert_eq!(repo.len(), 2);
    }
}
