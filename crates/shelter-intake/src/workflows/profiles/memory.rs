//! In-process stores backing the service binary, demos and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::audit::{AuditCursor, AuditEntry, AuditFilter};
use super::domain::{ActorId, Profile, ProfileId, ProfilePatch, ProfileQuery, ProfileStatus};
use super::rate_limit::{RateLimitRecord, RateLimitedAction};
use super::repository::{AuditStore, ProfileRepository, RateLimitStore, RepositoryError};

const DEFAULT_LIST_LIMIT: usize = 100;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryProfileRepository {
    records: Arc<Mutex<HashMap<ProfileId, Profile>>>,
}

impl ProfileRepository for InMemoryProfileRepository {
    fn insert(&self, profile: Profile) -> Result<Profile, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.contains_key(&profile.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    fn fetch(&self, id: &ProfileId) -> Result<Option<Profile>, RepositoryError> {
        let guard = lock(&self.records)?;
        Ok(guard.get(id).cloned())
    }

    fn compare_and_patch(
        &self,
        id: &ProfileId,
        expected: ProfileStatus,
        patch: ProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<Profile, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let profile = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if profile.status != expected {
            return Err(RepositoryError::StatusChanged {
                actual: profile.status,
            });
        }
        profile.apply(patch, now);
        Ok(profile.clone())
    }

    fn patch(
        &self,
        id: &ProfileId,
        patch: ProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<Profile, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let profile = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        profile.apply(patch, now);
        Ok(profile.clone())
    }

    fn remove(&self, id: &ProfileId) -> Result<Option<Profile>, RepositoryError> {
        let mut guard = lock(&self.records)?;
        Ok(guard.remove(id))
    }

    fn list(&self, query: &ProfileQuery) -> Result<Vec<Profile>, RepositoryError> {
        let guard = lock(&self.records)?;
        let mut matches: Vec<Profile> = guard
            .values()
            .filter(|profile| query.status.map_or(true, |status| profile.status == status))
            .filter(|profile| {
                query
                    .created_by
                    .as_ref()
                    .map_or(true, |author| profile.created_by.actor.as_ref() == Some(author))
            })
            .cloned()
            .collect();

        newest_first(&mut matches);
        matches.truncate(query.limit.unwrap_or(DEFAULT_LIST_LIMIT));
        Ok(matches)
    }

    fn search(&self, term: &str, limit: usize) -> Result<Vec<Profile>, RepositoryError> {
        let needle = term.to_lowercase();
        let guard = lock(&self.records)?;
        let mut matches: Vec<Profile> = guard
            .values()
            .filter(|profile| {
                [&profile.name, &profile.category, &profile.location]
                    .into_iter()
                    .any(|value| value.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();

        newest_first(&mut matches);
        matches.truncate(limit);
        Ok(matches)
    }
}

fn newest_first(profiles: &mut [Profile]) {
    profiles.sort_by(|a, b| {
        b.created_by
            .at
            .cmp(&a.created_by.at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Entries keyed by `(timestamp, sequence)` so newest-first scans are ordered.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditStore {
    entries: Arc<Mutex<BTreeMap<(DateTime<Utc>, u64), AuditEntry>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryAuditStore {
    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, mut entry: AuditEntry) -> Result<AuditEntry, RepositoryError> {
        entry.sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let mut guard = lock(&self.entries)?;
        guard.insert((entry.at, entry.sequence), entry.clone());
        Ok(entry)
    }

    fn query(
        &self,
        filter: &AuditFilter,
        cursor: Option<&AuditCursor>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, RepositoryError> {
        let guard = lock(&self.entries)?;
        Ok(guard
            .values()
            .rev()
            .filter(|entry| cursor.map_or(true, |cursor| entry.is_before(cursor)))
            .filter(|entry| filter.matches(entry))
            .take(limit)
            .cloned()
            .collect())
    }

    fn since(&self, from: DateTime<Utc>) -> Result<Vec<AuditEntry>, RepositoryError> {
        let guard = lock(&self.entries)?;
        Ok(guard
            .range((from, 0)..)
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryRateLimitStore {
    records: Arc<Mutex<Vec<RateLimitRecord>>>,
}

impl InMemoryRateLimitStore {
    pub fn len(&self) -> usize {
        self.records.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn record(&self, record: RateLimitRecord) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        guard.push(record);
        Ok(())
    }

    fn timestamps_after(
        &self,
        actor: &ActorId,
        action: RateLimitedAction,
        from: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, RepositoryError> {
        let guard = lock(&self.records)?;
        let mut timestamps: Vec<DateTime<Utc>> = guard
            .iter()
            .filter(|record| &record.actor == actor && record.action == action && record.at > from)
            .map(|record| record.at)
            .collect();
        timestamps.sort();
        Ok(timestamps)
    }

    fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let before = guard.len();
        guard.retain(|record| record.at >= cutoff);
        Ok(before - guard.len())
    }
}
