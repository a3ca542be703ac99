//! Rubric autosave.
//!
//! While a coordinator edits a rubric, each edit reschedules a single save that
//! fires once the edits have been quiet for a while. Only the latest version
//! of a rubric is ever written.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::settle_item_ids;
use crate::error::StoreError;
use crate::model::{Rubric, RubricKey};
use crate::traits::ReviewStore;

/// Default quiet period before a pending rubric is written.
pub const DEFAULT_QUIET: Duration = Duration::from_millis(1500);

/// Result of a fired autosave.
#[derive(Debug)]
pub enum AutosaveEvent {
    Saved { key: RubricKey, items: usize },
    Failed { key: RubricKey, error: StoreError },
}

struct PendingSave {
    generation: u64,
    rubric: Rubric,
    task: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<RubricKey, PendingSave>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<RubricKey, PendingSave>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Debounces rubric saves per (coordinator, program).
///
/// Must be used from within a tokio runtime.
pub struct AutosaveScheduler {
    store: Arc<dyn ReviewStore>,
    quiet: Duration,
    pending: PendingMap,
    events: Option<mpsc::UnboundedSender<AutosaveEvent>>,
    generation: AtomicU64,
}

impl AutosaveScheduler {
    pub fn new(store: Arc<dyn ReviewStore>, quiet: Duration) -> Self {
        Self {
            store,
            quiet,
            pending: Arc::new(Mutex::new(HashMap::new())),
            events: None,
            generation: AtomicU64::new(0),
        }
    }

    /// Report every fired save on the returned channel.
    pub fn with_events(mut self) -> (Self, mpsc::UnboundedReceiver<AutosaveEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        (self, rx)
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Schedule `rubric` to be saved after the quiet period, replacing any
    /// save still waiting for the same key.
    ///
    /// A save that has already started writing is left to finish. Item
    /// identifiers are settled against the stored rubric when the save fires.
    pub fn schedule(&self, rubric: Rubric) {
        let key = rubric.key();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.remove(&key) {
            previous.task.abort();
            tracing::trace!(rubric = %key, "autosave rescheduled");
        }

        let task = tokio::spawn(fire_after(
            Arc::clone(&self.store),
            Arc::clone(&self.pending),
            self.events.clone(),
            key.clone(),
            generation,
            self.quiet,
        ));
        pending.insert(
            key,
            PendingSave {
                generation,
                rubric,
                task,
            },
        );
    }

    /// Write the pending rubric for `key` now instead of waiting.
    ///
    /// Returns `Ok(false)` when nothing was pending. Flushed saves are not
    /// reported on the event channel.
    pub async fn flush(&self, key: &RubricKey) -> Result<bool, StoreError> {
        let save = lock(&self.pending).remove(key);
        let Some(save) = save else {
            return Ok(false);
        };
        save.task.abort();
        write_rubric(self.store.as_ref(), save.rubric).await?;
        Ok(true)
    }

    /// Drop the pending save for `key` without writing it.
    pub fn cancel(&self, key: &RubricKey) -> bool {
        match lock(&self.pending).remove(key) {
            Some(save) => {
                save.task.abort();
                true
            }
            None => false,
        }
    }

    /// Keys with a save still waiting for its quiet period.
    pub fn pending_keys(&self) -> Vec<RubricKey> {
        let mut keys: Vec<RubricKey> = lock(&self.pending).keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Drop for AutosaveScheduler {
    fn drop(&mut self) {
        for (_, save) in lock(&self.pending).drain() {
            save.task.abort();
        }
    }
}

async fn fire_after(
    store: Arc<dyn ReviewStore>,
    pending: PendingMap,
    events: Option<mpsc::UnboundedSender<AutosaveEvent>>,
    key: RubricKey,
    generation: u64,
    quiet: Duration,
) {
    tokio::time::sleep(quiet).await;

    // Claim the save; a newer schedule for this key may have replaced us.
    let rubric = {
        let mut pending = lock(&pending);
        match pending.get(&key) {
            Some(save) if save.generation == generation => {
                pending.remove(&key).map(|save| save.rubric)
            }
            _ => None,
        }
    };
    let Some(rubric) = rubric else {
        return;
    };

    let result = write_rubric(store.as_ref(), rubric).await;
    if let Some(events) = events {
        let _ = events.send(event_for(key, result));
    }
}

async fn write_rubric(store: &dyn ReviewStore, mut rubric: Rubric) -> Result<usize, StoreError> {
    let key = rubric.key();
    let result = match settle_item_ids(store, &mut rubric).await {
        Ok(_) => {
            rubric.updated_at = Some(Utc::now());
            store
                .put_rubric(&rubric.coordinator_id, &rubric.program, &rubric)
                .await
        }
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            tracing::debug!(rubric = %key, items = rubric.items.len(), "rubric autosaved");
            Ok(rubric.items.len())
        }
        Err(e) => {
            tracing::warn!(rubric = %key, "rubric autosave failed: {e}");
            Err(e)
        }
    }
}

fn event_for(key: RubricKey, result: Result<usize, StoreError>) -> AutosaveEvent {
    match result {
        Ok(items) => AutosaveEvent::Saved { key, items },
        Err(error) => AutosaveEvent::Failed { key, error },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, RecordedWrite};
    use crate::model::{RubricItem, StageCriterion};

    fn rubric(items: usize) -> Rubric {
        Rubric::new("coord", "BE").with_items(
            (0..items)
                .map(|i| {
                    RubricItem::new(
                        StageCriterion::new(format!("item {i}"), 10),
                        StageCriterion::new(format!("item {i}"), 10),
                        StageCriterion::new(format!("item {i}"), 10),
                    )
                })
                .collect(),
        )
    }

    fn scheduler() -> (Arc<MemoryStore>, AutosaveScheduler) {
        let store = Arc::new(MemoryStore::new());
        let scheduler = AutosaveScheduler::new(store.clone(), DEFAULT_QUIET);
        (store, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_write_once_with_latest_version() {
        let (store, scheduler) = scheduler();
        let (scheduler, mut events) = scheduler.with_events();

        for n in 1..=5 {
            scheduler.schedule(rubric(n));
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(store.writes().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            store.writes(),
            vec![RecordedWrite::Rubric(RubricKey::new("coord", "BE"))]
        );
        assert_eq!(store.rubric("coord", "BE").unwrap().items.len(), 5);
        assert!(matches!(
            events.recv().await,
            Some(AutosaveEvent::Saved { items: 5, .. })
        ));
        assert!(scheduler.pending_keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn separate_keys_save_independently() {
        let (store, scheduler) = scheduler();
        scheduler.schedule(rubric(1));
        scheduler.schedule(Rubric::new("coord", "ME").with_items(rubric(2).items));
        assert_eq!(scheduler.pending_keys().len(), 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.writes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_immediately_and_cancels_timer() {
        let (store, scheduler) = scheduler();
        let key = RubricKey::new("coord", "BE");
        scheduler.schedule(rubric(3));

        assert!(scheduler.flush(&key).await.unwrap());
        assert_eq!(store.writes().len(), 1);
        assert!(!scheduler.flush(&key).await.unwrap());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_save() {
        let (store, scheduler) = scheduler();
        let key = RubricKey::new("coord", "BE");
        scheduler.schedule(rubric(1));
        assert!(scheduler.cancel(&key));
        assert!(!scheduler.cancel(&key));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_is_reported() {
        let (store, scheduler) = scheduler();
        let (scheduler, mut events) = scheduler.with_events();
        store.set_unavailable(true);

        scheduler.schedule(rubric(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(
            events.recv().await,
            Some(AutosaveEvent::Failed {
                error: StoreError::Unavailable(_),
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_assigns_item_ids() {
        let (store, scheduler) = scheduler();
        let mut edited = rubric(2);
        edited.items[1].id = None;
        scheduler.schedule(edited);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let saved = store.rubric("coord", "BE").unwrap();
        assert!(saved.items.iter().all(|i| i.id.is_some()));
        assert!(saved.updated_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn autosaves_keep_item_ids_of_stored_rubric() {
        let (store, scheduler) = scheduler();
        let without_ids = || {
            let mut edited = rubric(2);
            for item in &mut edited.items {
                item.id = None;
            }
            edited
        };

        scheduler.schedule(without_ids());
        tokio::time::sleep(Duration::from_secs(2)).await;
        let first: Vec<_> = store
            .rubric("coord", "BE")
            .unwrap()
            .items
            .iter()
            .map(|i| i.id)
            .collect();

        scheduler.schedule(without_ids());
        tokio::time::sleep(Duration::from_secs(2)).await;
        let second: Vec<_> = store
            .rubric("coord", "BE")
            .unwrap()
            .items
            .iter()
            .map(|i| i.id)
            .collect();

        assert!(first.iter().all(Option::is_some));
        assert_eq!(first, second);
        assert_eq!(store.writes().len(), 2);
    }
}
