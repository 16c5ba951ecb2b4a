use crate::errors::{JobError, Result};
use crate::record::JobRecord;
use crate::types::{JobId, JobParameters};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Holds the authoritative state of every job.
///
/// Updates to one record are atomic with respect to every other reader and writer of that record.
/// Records with different ids may be accessed concurrently.
pub trait JobStore: Send + Sync + 'static {
    /// Create a pending record and return its freshly assigned id.
    fn create(&self, parameters: JobParameters) -> JobId;

    fn get(&self, id: &JobId) -> Result<JobRecord>;

    /// Apply `update` to the record atomically and return the record as it was left.
    fn mutate(&self, id: &JobId, update: &mut dyn FnMut(&mut JobRecord)) -> Result<JobRecord>;

    fn delete(&self, id: &JobId) -> Result<JobRecord>;

    /// Delete the record only if `condition` holds for it, checked under the same lock as the
    /// removal. Returns `None` when the record was kept.
    fn delete_if(
        &self,
        id: &JobId,
        condition: &mut dyn FnMut(&JobRecord) -> bool,
    ) -> Result<Option<JobRecord>>;

    /// Up to `limit` records, most recently created first.
    fn list(&self, limit: usize) -> Vec<JobRecord>;
}

/// A process-local [`JobStore`].
///
/// The outer map is only locked long enough to find a record; each record has its own lock.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<JobRecord>>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &JobId) -> Result<Arc<Mutex<JobRecord>>> {
        self.jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
            .ok_or(JobError::NotFound)
    }

    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, parameters: JobParameters) -> JobId {
        let mut jobs = self
            .jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // v4 collisions are practically impossible, but ids must never be reused
        let mut id = uuid::Uuid::new_v4();
        while jobs.contains_key(&id) {
            id = uuid::Uuid::new_v4();
        }
        jobs.insert(id, Arc::new(Mutex::new(JobRecord::new(id, parameters))));
        id
    }

    fn get(&self, id: &JobId) -> Result<JobRecord> {
        let entry = self.entry(id)?;
        let record = entry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        Ok(record)
    }

    fn mutate(&self, id: &JobId, update: &mut dyn FnMut(&mut JobRecord)) -> Result<JobRecord> {
        let entry = self.entry(id)?;
        let mut record = entry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        update(&mut record);
        Ok(record.clone())
    }

    fn delete(&self, id: &JobId) -> Result<JobRecord> {
        let entry = self
            .jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id)
            .ok_or(JobError::NotFound)?;
        let record = entry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        Ok(record)
    }

    fn delete_if(
        &self,
        id: &JobId,
        condition: &mut dyn FnMut(&JobRecord) -> bool,
    ) -> Result<Option<JobRecord>> {
        // map lock before record lock; `mutate` never holds the map lock while it waits on a record
        let mut jobs = self
            .jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = jobs.get(id).cloned().ok_or(JobError::NotFound)?;
        let record = entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !condition(&record) {
            return Ok(None);
        }
        let removed = record.clone();
        drop(record);
        jobs.remove(id);
        Ok(Some(removed))
    }

    fn list(&self, limit: usize) -> Vec<JobRecord> {
        let entries: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        let mut records: Vec<JobRecord> = entries
            .iter()
            .map(|entry| {
                entry
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone()
            })
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        records
    }
}
