//! Storage backend health checks

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow, bail};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::health::{
    Ctx, spot_error, spot_ok, spot_skipped, spot_warn, test, warn, with_timeout,
};

/// Reported by checks that need a storage backend when none could be created
pub const BACKEND_UNINITIALIZED: &str =
    "diagnose cannot attempt this step because backend could not be initialized";

/// Deadline for the end-to-end storage round trip
pub const ACCESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Any single storage operation slower than this is reported as a warning
pub const LATENCY_WARNING_THRESHOLD: Duration = Duration::from_millis(100);

/// Minimal key/value capability every storage backend provides
pub trait StorageBackend: Send + Sync {
    /// Storage type as named in configuration
    fn kind(&self) -> &'static str;

    fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Whether the backend can coordinate leader election
    fn supports_ha(&self) -> bool {
        false
    }
}

/// Stores each key as a file below a root directory
pub struct FileBackend {
    kind: &'static str,
    root: PathBuf,
}

impl FileBackend {
    /// Opens (creating if needed) a backend rooted at `root`
    pub fn new(kind: &'static str, root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create storage directory {}", root.display()))?;
        Ok(Self { kind, root })
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        if key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            bail!("invalid storage key {key:?}");
        }
        Ok(self.root.join(key))
    }
}

impl StorageBackend for FileBackend {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, value).with_context(|| format!("failed to write {}", path.display()))
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow!(e).context(format!("failed to read {}", path.display()))),
        }
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(anyhow!(e).context(format!("failed to delete {}", path.display())))
            }
            _ => Ok(()),
        }
    }

    fn supports_ha(&self) -> bool {
        self.kind == "raft"
    }
}

/// Keeps entries in memory for the lifetime of the process
#[derive(Default)]
pub struct InmemBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl InmemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for InmemBackend {
    fn kind(&self) -> &'static str {
        "inmem"
    }

    fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Builds the backend described by a storage stanza
pub fn create_backend(config: &StorageConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    Ok(match config {
        StorageConfig::File { path } => Arc::new(FileBackend::new("file", path)?),
        StorageConfig::Inmem => Arc::new(InmemBackend::new()),
        StorageConfig::Raft { path, .. } => Arc::new(FileBackend::new("raft", path.join("raft"))?),
    })
}

/// Checks the `storage` stanza and returns the backend if it could be created
///
/// Failures of individual steps are recorded under `ctx`; only a missing
/// stanza is returned as an error.
pub fn diagnose_storage(
    ctx: &Ctx,
    config: Option<&StorageConfig>,
) -> anyhow::Result<Option<Arc<dyn StorageBackend>>> {
    let config = config.ok_or_else(|| anyhow!("no storage stanza found in config"))?;

    let mut backend = None;
    let _ = test(ctx, "create-storage-backend", |_| {
        backend = Some(create_backend(config)?);
        Ok(())
    });

    if let StorageConfig::Raft { path, .. } = config {
        raft_file_checks(ctx, path);
    }

    let handle = backend.clone();
    let _ = test(
        ctx,
        "test-access-storage",
        with_timeout(ACCESS_TIMEOUT, move |ctx| {
            let backend = handle.ok_or_else(|| anyhow!(BACKEND_UNINITIALIZED))?;
            check_storage_access(ctx, backend.as_ref())
        }),
    );

    Ok(backend)
}

/// Checks the optional `ha_storage` stanza against the primary backend
pub fn diagnose_ha_storage(
    ctx: &Ctx,
    backend: Option<&Arc<dyn StorageBackend>>,
    config: Option<&StorageConfig>,
) -> anyhow::Result<()> {
    if backend.is_none() {
        bail!(BACKEND_UNINITIALIZED);
    }

    let Some(config) = config else {
        spot_skipped(ctx, "create-ha-storage-backend", "no HA storage configured");
        return Ok(());
    };

    let _ = test(ctx, "create-ha-storage-backend", |_| {
        let ha = create_backend(config)?;
        if !ha.supports_ha() {
            bail!("storage type {} does not support high availability", ha.kind());
        }
        Ok(())
    });
    Ok(())
}

/// Writes, reads back and deletes a test key, warning on slow operations
pub fn check_storage_access(ctx: &Ctx, backend: &dyn StorageBackend) -> anyhow::Result<()> {
    let key = format!("diagnose/latency/{}", Uuid::new_v4());
    let value = b"diagnose";

    let (write, ()) = timed(|| backend.put(&key, value))?;
    let (read, stored) = timed(|| backend.get(&key))?;
    if stored.as_deref() != Some(value.as_slice()) {
        bail!("storage returned unexpected data for key {key}");
    }
    let (delete, ()) = timed(|| backend.delete(&key))?;

    let (operation, slowest) = [("write", write), ("read", read), ("delete", delete)]
        .into_iter()
        .max_by_key(|(_, d)| *d)
        .unwrap_or(("write", write));

    if slowest > LATENCY_WARNING_THRESHOLD {
        warn(
            ctx,
            format!(
                "Storage operations are slower than {:?}. duration: {:?}, operation: {}",
                LATENCY_WARNING_THRESHOLD, slowest, operation
            ),
        );
    }
    Ok(())
}

fn timed<T>(op: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<(Duration, T)> {
    let start = Instant::now();
    let value = op()?;
    Ok((start.elapsed(), value))
}

/// Checks that the raft data directory exists and is not world-writable
pub fn raft_file_checks(ctx: &Ctx, path: &Path) {
    const NAME: &str = "raft-file-permissions";

    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            spot_error(
                ctx,
                NAME,
                anyhow!(e).context(format!("cannot inspect raft directory {}", path.display())),
            );
            return;
        }
    };

    if !meta.is_dir() {
        spot_error(
            ctx,
            NAME,
            anyhow!("raft path {} is not a directory", path.display()),
        );
        return;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o002 != 0 {
            spot_warn(
                ctx,
                NAME,
                format!("raft directory {} is world-writable", path.display()),
            );
            return;
        }
    }

    spot_ok(ctx, NAME, "");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CheckStatus, Session, Sink};

    #[test]
    fn test_file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new("file", dir.path()).unwrap();
        backend.put("a/b", b"value").unwrap();
        assert_eq!(backend.get("a/b").unwrap().as_deref(), Some(&b"value"[..]));
        backend.delete("a/b").unwrap();
        assert_eq!(backend.get("a/b").unwrap(), None);
        backend.delete("a/b").unwrap();
    }

    #[test]
    fn test_file_backend_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new("file", dir.path()).unwrap();
        assert!(backend.put("../outside", b"x").is_err());
        assert!(backend.get("a//b").is_err());
    }

    #[test]
    fn test_storage_with_inmem_backend_is_ok() {
        let session = Session::new(Sink::discard());
        let ctx = session.ctx();
        let result = test(&ctx, "storage", |ctx| {
            diagnose_storage(ctx, Some(&StorageConfig::Inmem)).map(|_| ())
        });
        assert!(result.is_ok());

        let report = session.finalize();
        let storage = report.find(&["storage"]).unwrap();
        assert_eq!(storage.status, CheckStatus::Ok);
        let names: Vec<_> = storage.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["create-storage-backend", "test-access-storage"]);
    }

    #[test]
    fn test_missing_storage_stanza_fails() {
        let session = Session::new(Sink::discard());
        let ctx = session.ctx();
        let _ = test(&ctx, "storage", |ctx| diagnose_storage(ctx, None).map(|_| ()));

        let report = session.finalize();
        let storage = report.find(&["storage"]).unwrap();
        assert_eq!(storage.status, CheckStatus::Fail);
        assert_eq!(storage.messages, ["no storage stanza found in config"]);
    }

    #[test]
    fn test_raft_directory_checks() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(Sink::discard());
        let ctx = session.ctx();
        raft_file_checks(&ctx, dir.path());
        raft_file_checks(&ctx, &dir.path().join("missing"));

        let report = session.finalize();
        let children = &report.root().children;
        assert_eq!(children[0].status, CheckStatus::Ok);
        assert_eq!(children[1].status, CheckStatus::Fail);
    }

    #[test]
    fn test_ha_storage_without_stanza_rolls_up_skipped() {
        let session = Session::new(Sink::discard());
        let ctx = session.ctx();
        let backend: Arc<dyn StorageBackend> = Arc::new(InmemBackend::new());
        let _ = test(&ctx, "setup-ha-storage", |ctx| {
            diagnose_ha_storage(ctx, Some(&backend), None)
        });
        let _ = test(&ctx, "setup-ha-storage-inmem", |ctx| {
            diagnose_ha_storage(ctx, Some(&backend), Some(&StorageConfig::Inmem))
        });

        let report = session.finalize();
        assert_eq!(
            report.find(&["setup-ha-storage"]).unwrap().status,
            CheckStatus::Skipped
        );
        assert_eq!(
            report.find(&["setup-ha-storage-inmem"]).unwrap().status,
            CheckStatus::Fail
        );
    }
}
