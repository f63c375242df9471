//! On-disk credential store.
//!
//! Each session persists one JSON blob named `<prefix><id>.json`, where the
//! prefix encodes the auth variant (`md_` for modern multi-device, `legacy_`
//! otherwise). Writes go through a temp file plus rename so a crash never
//! leaves a half-written blob, and writes to the same key are serialized so
//! bursts of credential updates cannot interleave.
//!
//! Reads are forgiving: a blob that fails to parse is reported as absent,
//! and enumeration skips anything it cannot read, so one bad file can never
//! wedge startup or revival.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use rmsg_transport::{AuthState, AuthVariant, SessionId};

use crate::errors::Result;

/// A persisted credential blob discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub id: SessionId,
    pub variant: AuthVariant,
}

/// Credential persistence rooted at a single directory.
pub struct CredentialStore {
    dir: PathBuf,
    // One lock per file name; keeps concurrent saves of the same session
    // from racing each other through the temp file.
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), write_locks: Mutex::new(HashMap::new()) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the storage directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn file_name(id: &SessionId, variant: AuthVariant) -> String {
        format!("{}{}.json", variant.storage_prefix(), id)
    }

    fn blob_path(&self, id: &SessionId, variant: AuthVariant) -> PathBuf {
        self.dir.join(Self::file_name(id, variant))
    }

    async fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// Load the credential blob for a session, if a readable one exists.
    pub async fn load(&self, id: &SessionId, variant: AuthVariant) -> Result<Option<AuthState>> {
        let path = self.blob_path(id, variant);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(creds) => Ok(Some(AuthState::new(creds))),
            Err(e) => {
                warn!(session = %id, path = %path.display(), error = %e,
                      "ignoring unreadable credential blob");
                Ok(None)
            }
        }
    }

    /// Persist the credential blob for a session (atomic replace).
    pub async fn save(&self, id: &SessionId, variant: AuthVariant, auth: &AuthState) -> Result<()> {
        self.ensure_dir().await?;
        let name = Self::file_name(id, variant);
        let lock = self.lock_for(&name).await;
        let _guard = lock.lock().await;

        let path = self.dir.join(&name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(&auth.creds)?).await?;
        fs::rename(&tmp, &path).await?;
        debug!(session = %id, path = %path.display(), "credentials saved");
        Ok(())
    }

    /// Remove the credential blob and any auxiliary dump for a session.
    /// Removing an already-absent blob is not an error.
    pub async fn delete(&self, id: &SessionId, variant: AuthVariant) -> Result<()> {
        let name = Self::file_name(id, variant);
        let lock = self.lock_for(&name).await;
        let _guard = lock.lock().await;

        remove_if_present(&self.dir.join(&name)).await?;
        remove_if_present(&self.dir.join(format!("{id}_store.json"))).await?;
        debug!(session = %id, "credentials deleted");
        Ok(())
    }

    /// Which auth variant, if any, has a stored blob for this id.
    /// Modern wins when both somehow exist.
    pub async fn variant_of(&self, id: &SessionId) -> Option<AuthVariant> {
        for variant in [AuthVariant::Modern, AuthVariant::Legacy] {
            if fs::metadata(self.blob_path(id, variant)).await.is_ok() {
                return Some(variant);
            }
        }
        None
    }

    /// Enumerate restorable credential blobs.
    ///
    /// Skips anything that is not a `<prefix><id>.json` file, auxiliary
    /// `*_store` dumps, and blobs that cannot be read or parsed. Results
    /// are sorted by id for deterministic startup order.
    pub async fn entries(&self) -> Result<Vec<StoreEntry>> {
        let mut reader = fs::read_dir(&self.dir).await?;
        let mut entries = Vec::new();

        while let Some(dirent) = reader.next_entry().await? {
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(".json") else { continue };
            if stem.ends_with("_store") {
                continue;
            }
            let Some((variant, id)) = AuthVariant::split_storage_key(stem) else {
                debug!(file = name, "skipping non-credential file");
                continue;
            };
            if id.is_empty() {
                continue;
            }
            let id = SessionId::new(id);
            // Content check happens here so startup never spawns a session
            // for a blob that cannot be read back. A read error disqualifies
            // the one entry, not the whole scan.
            match self.load(&id, variant).await {
                Ok(Some(_)) => entries.push(StoreEntry { id, variant }),
                Ok(None) => {}
                Err(e) => {
                    warn!(session = %id, error = %e, "skipping unreadable credential blob");
                }
            }
        }

        entries.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(entries)
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let (_dir, store) = store();
        let id = SessionId::new("alpha");
        let auth = AuthState::new(json!({"registered": true, "noiseKey": "k"}));

        store.save(&id, AuthVariant::Modern, &auth).await.unwrap();
        let loaded = store.load(&id, AuthVariant::Modern).await.unwrap().unwrap();
        assert_eq!(loaded.creds, auth.creds);
        assert_eq!(store.variant_of(&id).await, Some(AuthVariant::Modern));
    }

    #[tokio::test]
    async fn load_missing_blob_is_none() {
        let (_dir, store) = store();
        let loaded = store.load(&SessionId::new("ghost"), AuthVariant::Modern).await.unwrap();
        assert!(loaded.is_none());
        assert_eq!(store.variant_of(&SessionId::new("ghost")).await, None);
    }

    #[tokio::test]
    async fn corrupt_blob_reads_as_absent() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("md_bad.json"), b"{not json").unwrap();

        let loaded = store.load(&SessionId::new("bad"), AuthVariant::Modern).await.unwrap();
        assert!(loaded.is_none());
        // The file itself is untouched.
        assert!(dir.path().join("md_bad.json").exists());
    }

    #[tokio::test]
    async fn entries_skip_foreign_and_malformed_files() {
        let (dir, store) = store();
        store
            .save(&SessionId::new("alpha"), AuthVariant::Modern, &AuthState::new(json!({"a": 1})))
            .await
            .unwrap();
        store
            .save(&SessionId::new("beta"), AuthVariant::Legacy, &AuthState::new(json!({"b": 2})))
            .await
            .unwrap();
        std::fs::write(dir.path().join("md_corrupt.json"), b"][").unwrap();
        std::fs::write(dir.path().join("alpha_store.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"hi").unwrap();
        std::fs::write(dir.path().join("unprefixed.json"), b"{}").unwrap();

        let entries = store.entries().await.unwrap();
        assert_eq!(
            entries,
            vec![
                StoreEntry { id: SessionId::new("alpha"), variant: AuthVariant::Modern },
                StoreEntry { id: SessionId::new("beta"), variant: AuthVariant::Legacy },
            ]
        );
    }

    #[tokio::test]
    async fn entries_survive_an_unreadable_blob() {
        let (dir, store) = store();
        store
            .save(&SessionId::new("alpha"), AuthVariant::Modern, &AuthState::new(json!({"a": 1})))
            .await
            .unwrap();
        // A directory wearing a blob name: reads on it fail outright rather
        // than merely failing to parse.
        std::fs::create_dir(dir.path().join("md_zombie.json")).unwrap();

        let entries = store.entries().await.unwrap();
        assert_eq!(
            entries,
            vec![StoreEntry { id: SessionId::new("alpha"), variant: AuthVariant::Modern }]
        );
    }

    #[tokio::test]
    async fn delete_removes_blob_and_aux_dump() {
        let (dir, store) = store();
        let id = SessionId::new("alpha");
        store.save(&id, AuthVariant::Modern, &AuthState::new(json!({}))).await.unwrap();
        std::fs::write(dir.path().join("alpha_store.json"), b"{}").unwrap();

        store.delete(&id, AuthVariant::Modern).await.unwrap();
        assert!(!dir.path().join("md_alpha.json").exists());
        assert!(!dir.path().join("alpha_store.json").exists());

        // Deleting again is fine.
        store.delete(&id, AuthVariant::Modern).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_saves_leave_a_parseable_blob() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let id = SessionId::new("alpha");

        let mut tasks = Vec::new();
        for n in 0..8 {
            let store = Arc::clone(&store);
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                store.save(&id, AuthVariant::Modern, &AuthState::new(json!({"n": n}))).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let loaded = store.load(&id, AuthVariant::Modern).await.unwrap().unwrap();
        assert!(loaded.creds.get("n").and_then(|v| v.as_i64()).is_some());
    }
}
