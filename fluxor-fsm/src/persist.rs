//! Instance persistence: one JSON file per instance.

// Layer 1: Standard library imports
use std::path::{Path, PathBuf};

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use crate::errors::FsmError;
use crate::ids::InstanceId;
use crate::instance::ExecutionContext;

/// Persistence backend for execution contexts.
#[async_trait]
pub trait InstanceStore: Send + Sync + 'static {
    /// Persist the full execution context.
    async fn save(&self, exec: &ExecutionContext) -> Result<(), FsmError>;

    /// Load one instance.
    async fn load(&self, instance_id: &InstanceId) -> Result<ExecutionContext, FsmError>;

    /// All persisted instances of `machine_id`.
    async fn list(&self, machine_id: &str) -> Result<Vec<ExecutionContext>, FsmError>;

    /// Delete one instance.
    async fn remove(&self, instance_id: &InstanceId) -> Result<(), FsmError>;
}

/// File-backed store: `<dir>/<instance_id>.json`, directory mode 0755,
/// files 0644 (unix).
///
/// `list` scans the directory and filters by the `machine_id` field inside
/// each file.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create the store, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, FsmError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(Self { dir })
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, instance_id: &InstanceId) -> PathBuf {
        self.dir.join(format!("{instance_id}.json"))
    }
}

#[async_trait]
impl InstanceStore for FileStore {
    async fn save(&self, exec: &ExecutionContext) -> Result<(), FsmError> {
        let path = self.path_for(&exec.instance_id);
        let payload = serde_json::to_vec_pretty(exec)?;
        tokio::fs::write(&path, payload).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).await?;
        }
        Ok(())
    }

    async fn load(&self, instance_id: &InstanceId) -> Result<ExecutionContext, FsmError> {
        let raw = tokio::fs::read(self.path_for(instance_id)).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn list(&self, machine_id: &str) -> Result<Vec<ExecutionContext>, FsmError> {
        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<ExecutionContext>(&raw) {
                Ok(exec) if exec.machine_id == machine_id => found.push(exec),
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "skipping unreadable instance file");
                }
            }
        }
        Ok(found)
    }

    async fn remove(&self, instance_id: &InstanceId) -> Result<(), FsmError> {
        match tokio::fs::remove_file(self.path_for(instance_id)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use std::collections::HashMap;
    use serde_json::json;

    fn sample(machine_id: &str) -> ExecutionContext {
        let mut data = HashMap::new();
        data.insert("amount".to_string(), json!(5));
        ExecutionContext::new(machine_id, InstanceId::new(), "pending", data)
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let exec = sample("order");
        store.save(&exec).await.unwrap();

        let loaded = store.load(&exec.instance_id).await.unwrap();
        assert_eq!(loaded.instance_id, exec.instance_id);
        assert_eq!(loaded.machine_id, exec.machine_id);
        assert_eq!(loaded.current_state, exec.current_state);
        assert_eq!(loaded.data, exec.data);
    }

    #[tokio::test]
    async fn test_list_filters_by_machine() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.save(&sample("order")).await.unwrap();
        store.save(&sample("order")).await.unwrap();
        store.save(&sample("shipment")).await.unwrap();

        assert_eq!(store.list("order").await.unwrap().len(), 2);
        assert_eq!(store.list("shipment").await.unwrap().len(), 1);
        assert!(store.list("none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let exec = sample("order");
        store.save(&exec).await.unwrap();
        store.remove(&exec.instance_id).await.unwrap();
        store.remove(&exec.instance_id).await.unwrap(); // already gone

        assert!(store.load(&exec.instance_id).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("instances")).unwrap();

        let exec = sample("order");
        store.save(&exec).await.unwrap();

        let dir_mode = std::fs::metadata(store.dir()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o755);

        let file_mode = std::fs::metadata(store.dir().join(format!("{}.json", exec.instance_id)))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o644);
    }
}
