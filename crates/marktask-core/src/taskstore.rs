use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::error::{StoreError, TaskError};
use crate::kv::{COMPLETED_KEY, DELETED_KEY, KeyValueStore, THEME_KEY, TODOS_KEY};
use crate::task::{Task, Theme};

/// The three task lists plus the theme flag, persisted through the injected
/// key-value store. Every mutation loads the affected lists, applies a single
/// move or append, and flushes before returning; the lists stay disjoint
/// because each transition removes from one list and appends to another.
#[derive(Debug)]
pub struct TaskStore<'a, S> {
    kv: &'a S,
}

impl<S> Clone for TaskStore<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for TaskStore<'_, S> {}

impl<'a, S: KeyValueStore> TaskStore<'a, S> {
    pub fn new(kv: &'a S) -> Self {
        Self { kv }
    }

    pub fn active(&self) -> Result<Vec<Task>, StoreError> {
        self.load_list(TODOS_KEY)
    }

    pub fn completed(&self) -> Result<Vec<Task>, StoreError> {
        self.load_list(COMPLETED_KEY)
    }

    pub fn deleted(&self) -> Result<Vec<Task>, StoreError> {
        self.load_list(DELETED_KEY)
    }

    #[instrument(skip(self, description, now))]
    pub fn create(
        &self,
        title: &str,
        description: &str,
        duration_minutes: Option<u32>,
        remind: bool,
        now: DateTime<Utc>,
    ) -> Result<Task, TaskError> {
        if title.trim().is_empty() {
            return Err(TaskError::EmptyTitle);
        }

        let mut active = self.active()?;
        let completed = self.completed()?;
        let deleted = self.deleted()?;

        let id = next_id(&[&active, &completed, &deleted]);
        let task = Task::new_active(
            id,
            title.trim().to_string(),
            description.to_string(),
            duration_minutes,
            remind,
            now,
        );

        active.push(task.clone());
        self.save_list(TODOS_KEY, &active)?;

        debug!(id, active_count = active.len(), "task created");
        Ok(task)
    }

    #[instrument(skip(self, now))]
    pub fn complete(&self, id: u64, now: DateTime<Utc>) -> Result<Task, TaskError> {
        let mut active = self.active()?;
        let mut completed = self.completed()?;

        let idx = active
            .iter()
            .position(|task| task.id == id)
            .ok_or(TaskError::TaskNotFound { id })?;

        let mut task = active.remove(idx);
        task.completed = true;
        task.completed_at = Some(now);
        completed.push(task.clone());

        self.save_list(TODOS_KEY, &active)?;
        self.save_list(COMPLETED_KEY, &completed)?;

        debug!(id, "task completed");
        Ok(task)
    }

    #[instrument(skip(self))]
    pub fn uncomplete(&self, id: u64) -> Result<Task, TaskError> {
        let mut active = self.active()?;
        let mut completed = self.completed()?;

        let idx = completed
            .iter()
            .position(|task| task.id == id)
            .ok_or(TaskError::TaskNotFound { id })?;

        let mut task = completed.remove(idx);
        task.completed = false;
        task.completed_at = None;
        active.push(task.clone());

        self.save_list(TODOS_KEY, &active)?;
        self.save_list(COMPLETED_KEY, &completed)?;

        debug!(id, "task returned to active");
        Ok(task)
    }

    #[instrument(skip(self, now))]
    pub fn delete(&self, id: u64, now: DateTime<Utc>) -> Result<Task, TaskError> {
        let mut active = self.active()?;
        let mut deleted = self.deleted()?;

        let idx = active
            .iter()
            .position(|task| task.id == id)
            .ok_or(TaskError::TaskNotFound { id })?;

        let mut task = active.remove(idx);
        task.deleted_at = Some(now);
        deleted.push(task.clone());

        self.save_list(TODOS_KEY, &active)?;
        self.save_list(DELETED_KEY, &deleted)?;

        debug!(id, "task soft-deleted");
        Ok(task)
    }

    pub fn theme(&self) -> Result<Theme, StoreError> {
        let raw = self.kv.get(THEME_KEY)?;
        Ok(Theme::from_stored(raw.as_deref()))
    }

    #[instrument(skip(self))]
    pub fn toggle_theme(&self) -> Result<Theme, StoreError> {
        let next = self.theme()?.toggled();
        self.kv.set(THEME_KEY, next.as_str())?;
        debug!(theme = next.as_str(), "theme toggled");
        Ok(next)
    }

    fn load_list(&self, key: &str) -> Result<Vec<Task>, StoreError> {
        let Some(raw) = self.kv.get(key)? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str(&raw) {
            Ok(tasks) => Ok(tasks),
            Err(err) => {
                warn!(key, error = %err, "stored task list is corrupt; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    fn save_list(&self, key: &str, tasks: &[Task]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(tasks).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.kv.set(key, &raw)
    }
}

/// Fresh ids range over the union of all three lists, so an id is never
/// reused even after the task holding it is completed or deleted.
fn next_id(lists: &[&[Task]]) -> u64 {
    lists
        .iter()
        .flat_map(|list| list.iter())
        .map(|task| task.id)
        .max()
        .unwrap_or(0)
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn create_appends_to_active_only() {
        let kv = MemoryStore::new();
        let store = TaskStore::new(&kv);

        let task = store
            .create("Write report", "weekly status", Some(5), true, now())
            .expect("create");

        assert!(!task.completed);
        assert_eq!(task.duration_minutes, Some(5));

        let active = store.active().expect("active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, task.id);
        assert!(store.completed().expect("completed").is_empty());
        assert!(store.deleted().expect("deleted").is_empty());
    }

    #[test]
    fn empty_title_is_rejected_and_changes_nothing() {
        let kv = MemoryStore::new();
        let store = TaskStore::new(&kv);

        let err = store
            .create("   ", "whitespace only", None, false, now())
            .expect_err("must reject");
        assert!(matches!(err, TaskError::EmptyTitle));

        assert!(store.active().expect("active").is_empty());
        assert!(store.completed().expect("completed").is_empty());
        assert!(store.deleted().expect("deleted").is_empty());
    }

    #[test]
    fn complete_moves_and_uncomplete_reverses() {
        let kv = MemoryStore::new();
        let store = TaskStore::new(&kv);

        let task = store
            .create("Write report", "", Some(5), true, now())
            .expect("create");

        let done = store.complete(task.id, now()).expect("complete");
        assert!(done.completed);
        assert!(done.completed_at.is_some());
        assert!(store.active().expect("active").is_empty());
        assert_eq!(store.completed().expect("completed").len(), 1);

        let back = store.uncomplete(task.id).expect("uncomplete");
        assert!(!back.completed);
        assert!(back.completed_at.is_none());
        assert_eq!(store.active().expect("active").len(), 1);
        assert!(store.completed().expect("completed").is_empty());
    }

    #[test]
    fn delete_moves_without_duplicating() {
        let kv = MemoryStore::new();
        let store = TaskStore::new(&kv);

        let kept = store.create("Keep", "", None, false, now()).expect("create");
        let gone = store.create("Drop", "", None, false, now()).expect("create");

        let removed = store.delete(gone.id, now()).expect("delete");
        assert!(removed.deleted_at.is_some());

        let active = store.active().expect("active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, kept.id);

        let deleted = store.deleted().expect("deleted");
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, gone.id);
        assert!(active.iter().all(|task| task.id != gone.id));
    }

    #[test]
    fn completing_a_missing_id_fails() {
        let kv = MemoryStore::new();
        let store = TaskStore::new(&kv);

        let err = store.complete(42, now()).expect_err("must fail");
        assert!(matches!(err, TaskError::TaskNotFound { id: 42 }));
    }

    #[test]
    fn ids_stay_unique_across_all_lists() {
        let kv = MemoryStore::new();
        let store = TaskStore::new(&kv);

        let first = store.create("one", "", None, false, now()).expect("create");
        store.delete(first.id, now()).expect("delete");
        let second = store.create("two", "", None, false, now()).expect("create");
        store.complete(second.id, now()).expect("complete");
        let third = store.create("three", "", None, false, now()).expect("create");

        assert!(second.id > first.id);
        assert!(third.id > second.id);
    }

    #[test]
    fn theme_defaults_light_and_toggles() {
        let kv = MemoryStore::new();
        let store = TaskStore::new(&kv);

        assert_eq!(store.theme().expect("theme"), Theme::Light);
        assert_eq!(store.toggle_theme().expect("toggle"), Theme::Dark);
        assert_eq!(store.theme().expect("theme"), Theme::Dark);
        assert_eq!(store.toggle_theme().expect("toggle"), Theme::Light);
    }

    #[test]
    fn corrupt_list_reads_as_empty() {
        let kv = MemoryStore::new();
        kv.set(TODOS_KEY, "not json at all").expect("seed corrupt value");

        let store = TaskStore::new(&kv);
        assert!(store.active().expect("active").is_empty());
    }
}
