//! Timeline cache keyed by source id.
//!
//! Owned by the composition root and handed to request handlers through the
//! server state; there is no global map. Concurrent misses on the same key
//! share a single in-flight computation (per-entry `OnceCell`), and the map
//! is bounded by an LRU entry cap so a long-running process cannot grow it
//! without limit.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::analysis::FeatureTimeline;
use crate::source::SourceId;

struct CacheSlot {
    cell: Arc<OnceCell<Arc<FeatureTimeline>>>,
    created_at: Instant,
    last_access: Instant,
}

pub struct AnalysisCache {
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheSlot>>,
}

impl AnalysisCache {
    pub fn new(max_entries: usize) -> AnalysisCache {
        AnalysisCache {
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached timeline for `id`, computing it with `compute` on
    /// a miss. The first caller for a given id runs the computation; callers
    /// arriving while it is in flight await the same result instead of
    /// recomputing.
    pub async fn get_or_compute<F, Fut>(&self, id: &SourceId, compute: F) -> Arc<FeatureTimeline>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FeatureTimeline>,
    {
        let cell = {
            let mut entries = self.entries.lock().unwrap();
            let now = Instant::now();

            if let Some(slot) = entries.get_mut(id.as_str()) {
                slot.last_access = now;
                slot.cell.clone()
            } else {
                if entries.len() >= self.max_entries {
                    evict_least_recently_used(&mut entries);
                }
                let cell = Arc::new(OnceCell::new());
                entries.insert(
                    id.as_str().to_string(),
                    CacheSlot {
                        cell: cell.clone(),
                        created_at: now,
                        last_access: now,
                    },
                );
                cell
            }
        };

        cell.get_or_init(|| async move { Arc::new(compute().await) })
            .await
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Age of the oldest entry, for the health report.
    pub fn oldest_entry_age(&self) -> Option<std::time::Duration> {
        let entries = self.entries.lock().unwrap();
        entries
            .values()
            .map(|slot| slot.created_at.elapsed())
            .max()
    }
}

/// Drop the least recently used completed entry. In-flight computations are
/// never evicted; their waiters hold the cell anyway.
fn evict_least_recently_used(entries: &mut HashMap<String, CacheSlot>) {
    let victim = entries
        .iter()
        .filter(|(_, slot)| slot.cell.initialized())
        .min_by_key(|(_, slot)| slot.last_access)
        .map(|(key, _)| key.clone());

    if let Some(key) = victim {
        debug!("Evicting cached timeline for {}", key);
        entries.remove(&key);
    }
}
