//! Progress checkpoint stores
//!
//! [`FileProgressStore`] keeps one JSON document per step and replaces it
//! atomically on every save. [`InMemoryProgressStore`] is a shareable handle
//! used by tests and by steps that do not need restartability.

use crate::adapters::traits::ProgressStore;
use crate::domain::{BatchError, ExecutionContext, Result, StepName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Persisted checkpoint of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub step: String,
    pub saved_at: DateTime<Utc>,
    pub context: ExecutionContext,
}

/// Checkpoints stored as `<dir>/<step>.json`
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, step: &StepName) -> PathBuf {
        self.dir.join(format!("{}.json", step.as_str()))
    }

    /// Load the full checkpoint record, including when it was saved
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Serialization` if the file is not a valid checkpoint.
    pub async fn load_checkpoint(&self, step: &StepName) -> Result<Option<Checkpoint>> {
        let path = self.path_for(step);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let checkpoint = serde_json::from_str(&contents).map_err(|e| {
            BatchError::Serialization(format!("Corrupt checkpoint {}: {e}", path.display()))
        })?;
        Ok(Some(checkpoint))
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn load(&self, step: &StepName) -> Result<Option<ExecutionContext>> {
        Ok(self.load_checkpoint(step).await?.map(|c| c.context))
    }

    async fn save(&self, step: &StepName, context: &ExecutionContext) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let checkpoint = Checkpoint {
            step: step.as_str().to_string(),
            saved_at: Utc::now(),
            context: context.clone(),
        };
        let json = serde_json::to_vec_pretty(&checkpoint)?;

        // rename over the old file so a crash never leaves a torn checkpoint
        let path = self.path_for(step);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::trace!(step = %step, path = %path.display(), "Saved checkpoint");
        Ok(())
    }

    async fn clear(&self, step: &StepName) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(step)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
struct MemoryCheckpoints {
    contexts: HashMap<String, ExecutionContext>,
    saves: usize,
}

/// Checkpoints held in memory; clones share the same storage
#[derive(Clone, Default)]
pub struct InMemoryProgressStore {
    inner: Arc<Mutex<MemoryCheckpoints>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves
    pub fn saves(&self) -> usize {
        self.inner.lock().saves
    }

    pub fn get(&self, step: &StepName) -> Option<ExecutionContext> {
        self.inner.lock().contexts.get(step.as_str()).cloned()
    }

    /// Seed a checkpoint, as if a previous run had saved it
    pub fn insert(&self, step: &StepName, context: ExecutionContext) {
        self.inner
            .lock()
            .contexts
            .insert(step.as_str().to_string(), context);
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn load(&self, step: &StepName) -> Result<Option<ExecutionContext>> {
        Ok(self.get(step))
    }

    async fn save(&self, step: &StepName, context: &ExecutionContext) -> Result<()> {
        let mut inner = self.inner.lock();
        inner
            .contexts
            .insert(step.as_str().to_string(), context.clone());
        inner.saves += 1;
        Ok(())
    }

    async fn clear(&self, step: &StepName) -> Result<()> {
        self.inner.lock().contexts.remove(step.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn step() -> StepName {
        StepName::new("import-orders").unwrap()
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = FileProgressStore::new(dir.path().join("state"));
        let step = step();

        assert!(store.load(&step).await.unwrap().is_none());

        let mut context = ExecutionContext::new();
        context.put_usize("line.reader.offset", 42);
        store.save(&step, &context).await.unwrap();

        let checkpoint = store.load_checkpoint(&step).await.unwrap().unwrap();
        assert_eq!(checkpoint.step, "import-orders");
        assert_eq!(checkpoint.context.get_usize("line.reader.offset"), Some(42));
        assert!(!store.path_for(&step).with_extension("json.tmp").exists());

        store.clear(&step).await.unwrap();
        assert!(store.load(&step).await.unwrap().is_none());
        // clearing twice is fine
        store.clear(&step).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileProgressStore::new(dir.path());
        tokio::fs::write(store.path_for(&step()), "{ not json")
            .await
            .unwrap();

        let result = store.load(&step()).await;
        assert!(matches!(result, Err(BatchError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_memory_store_is_shared_between_clones() {
        let store = InMemoryProgressStore::new();
        let handle = store.clone();

        let mut context = ExecutionContext::new();
        context.put_string("cursor", "k-17");
        handle.save(&step(), &context).await.unwrap();

        assert_eq!(store.saves(), 1);
        assert_eq!(
            store.get(&step()).unwrap().get_string("cursor"),
            Some("k-17")
        );
    }
}
