//! Per-unit write serialization.
//!
//! Two submissions for the same student or project in the same program must
//! not interleave their detail and summary writes. Submissions for different
//! units proceed concurrently.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::ReviewUnit;

/// What a lock is taken on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitKey {
    Project { project_name: String, program: String },
    Student { register_number: String, program: String },
}

impl UnitKey {
    pub fn student(register_number: &str, program: &str) -> Self {
        UnitKey::Student {
            register_number: register_number.to_string(),
            program: program.to_string(),
        }
    }

    /// Keys a submission for `unit` must hold: the unit itself plus, for a
    /// group, every member whose record it writes.
    pub fn for_unit(unit: &ReviewUnit, program: &str) -> Vec<UnitKey> {
        let mut keys: Vec<UnitKey> = unit
            .members()
            .iter()
            .map(|m| UnitKey::student(m, program))
            .collect();
        if let ReviewUnit::Group(group) = unit {
            keys.push(UnitKey::Project {
                project_name: group.project_name.clone(),
                program: program.to_string(),
            });
        }
        keys
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKey::Project {
                project_name,
                program,
            } => write!(f, "project:{project_name}@{program}"),
            UnitKey::Student {
                register_number,
                program,
            } => write!(f, "student:{register_number}@{program}"),
        }
    }
}

/// Holds every lock of one acquisition until dropped.
#[must_use]
pub struct UnitGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

/// Table of async locks keyed by [`UnitKey`].
#[derive(Default)]
pub struct UnitLocks {
    slots: Mutex<HashMap<UnitKey, Arc<AsyncMutex<()>>>>,
}

impl UnitLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire all `keys`, waiting for any holder to finish.
    ///
    /// Keys are taken in sorted order so overlapping acquisitions cannot deadlock.
    pub async fn acquire(&self, mut keys: Vec<UnitKey>) -> UnitGuard {
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let slot = self.slot(key);
            guards.push(slot.lock_owned().await);
        }
        UnitGuard { _guards: guards }
    }

    fn slot(&self, key: UnitKey) -> Arc<AsyncMutex<()>> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Drop slots nobody holds or waits on.
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        Arc::clone(slots.entry(key).or_default())
    }

    /// Number of keys currently held or awaited.
    pub fn tracked(&self) -> usize {
        let slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slots
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProjectGroup;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn same_key_waits_for_holder() {
        let locks = Arc::new(UnitLocks::new());
        let guard = locks.acquire(vec![UnitKey::student("A", "BE")]).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire(vec![UnitKey::student("A", "BE")]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = UnitLocks::new();
        let _a = locks.acquire(vec![UnitKey::student("A", "BE")]).await;
        let _b = locks.acquire(vec![UnitKey::student("B", "BE")]).await;
        let _a_other_program = locks.acquire(vec![UnitKey::student("A", "ME")]).await;
        assert_eq!(locks.tracked(), 3);
    }

    #[test]
    fn group_keys_cover_members_and_project() {
        let unit = ReviewUnit::Group(ProjectGroup::new(
            "Drone",
            vec!["A".into(), "B".into(), "A".into()],
        ));
        let keys = UnitKey::for_unit(&unit, "BE");
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&UnitKey::Project {
            project_name: "Drone".into(),
            program: "BE".into()
        }));
        assert_eq!(keys[0].to_string(), "student:A@BE");
    }
}
