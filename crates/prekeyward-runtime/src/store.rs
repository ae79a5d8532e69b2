//! Snapshot persistence.
//!
//! The client emits [`AccountSnapshot`]s whenever its bookkeeping changes;
//! stores keep the latest one per account as CBOR and hand them back on
//! startup.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use prekeyward_client::AccountSnapshot;

use crate::error::RuntimeError;

const EXTENSION: &str = "cbor";

/// Latest-snapshot-per-account storage.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot of `snapshot.account`.
    async fn save(&self, snapshot: &AccountSnapshot) -> Result<(), RuntimeError>;

    /// Stored snapshot of `account`, if any.
    async fn load(&self, account: &str) -> Result<Option<AccountSnapshot>, RuntimeError>;

    /// Every stored snapshot.
    async fn load_all(&self) -> Result<Vec<AccountSnapshot>, RuntimeError>;
}

/// In-memory store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    snapshots: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemorySnapshotStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts with a snapshot.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been saved.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &AccountSnapshot) -> Result<(), RuntimeError> {
        let bytes = snapshot.to_cbor()?;
        self.lock().insert(snapshot.account.clone(), bytes);
        Ok(())
    }

    async fn load(&self, account: &str) -> Result<Option<AccountSnapshot>, RuntimeError> {
        let bytes = self.lock().get(account).cloned();
        Ok(bytes.map(|bytes| AccountSnapshot::from_cbor(&bytes)).transpose()?)
    }

    async fn load_all(&self) -> Result<Vec<AccountSnapshot>, RuntimeError> {
        let encoded: Vec<Vec<u8>> = self.lock().values().cloned().collect();
        let mut snapshots = Vec::with_capacity(encoded.len());
        for bytes in encoded {
            snapshots.push(AccountSnapshot::from_cbor(&bytes)?);
        }
        Ok(snapshots)
    }
}

/// One CBOR file per account in a directory.
///
/// File names are the hex encoding of the account address, so any address
/// maps to a valid and distinct name. Writes go through a temporary file and
/// a rename.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Store rooted at `dir`, created if missing.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, RuntimeError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Directory holding the snapshots.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, account: &str) -> PathBuf {
        let mut name = String::with_capacity(account.len() * 2 + EXTENSION.len() + 1);
        for byte in account.as_bytes() {
            let _ = write!(name, "{byte:02x}");
        }
        name.push('.');
        name.push_str(EXTENSION);
        self.dir.join(name)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &AccountSnapshot) -> Result<(), RuntimeError> {
        let bytes = snapshot.to_cbor()?;
        let path = self.path_for(&snapshot.account);
        let tmp = path.with_extension("tmp");

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::trace!(account = %snapshot.account, bytes = bytes.len(), "snapshot saved");
        Ok(())
    }

    async fn load(&self, account: &str) -> Result<Option<AccountSnapshot>, RuntimeError> {
        match tokio::fs::read(self.path_for(account)).await {
            Ok(bytes) => Ok(Some(AccountSnapshot::from_cbor(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_all(&self) -> Result<Vec<AccountSnapshot>, RuntimeError> {
        let mut snapshots = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }

            let bytes = tokio::fs::read(&path).await?;
            match AccountSnapshot::from_cbor(&bytes) {
                Ok(snapshot) => snapshots.push(snapshot),
                // A lost snapshot only costs one extra publication.
                Err(e) => tracing::warn!(path = %path.display(), "skipping snapshot: {}", e),
            }
        }

        snapshots.sort_by(|a, b| a.account.cmp(&b.account));
        Ok(snapshots)
    }
}
