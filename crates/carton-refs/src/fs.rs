//! Filesystem reference store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use carton_types::Locator;

use crate::error::{RefError, RefResult};
use crate::names::validate_ref_name;
use crate::traits::RefStore;
use crate::types::Ref;

/// A [`RefStore`] backed by one JSON file per ref under `<root>/refs/`.
///
/// Compare-and-swap must hold across independent processes, so each update
/// runs under an `O_EXCL` lock file next to the ref: whoever creates
/// `<name>.lock` first owns the read-check-write sequence; everyone else
/// waits briefly and then gives up with an I/O error. The ref file itself
/// is replaced by tempfile+rename, so readers never see a partial write and
/// never need the lock.
pub struct FsRefStore {
    root: PathBuf,
}

/// How long a writer waits on a held lock before giving up.
const LOCK_ATTEMPTS: u32 = 50;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);

impl FsRefStore {
    /// Open (creating if needed) a ref store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> RefResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("refs"))?;
        Ok(Self { root })
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.root.join("refs").join(name)
    }

    fn read_ref_file(path: &Path) -> RefResult<Option<Ref>> {
        match fs::read(path) {
            Ok(data) => {
                let r = serde_json::from_slice(&data)
                    .map_err(|e| RefError::Serialization(e.to_string()))?;
                Ok(Some(r))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn lock(&self, name: &str) -> RefResult<LockGuard> {
        let path = self.ref_path(&format!("{name}.lock"));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        for _ in 0..LOCK_ATTEMPTS {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(LockGuard { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(RefError::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("ref lock held too long: {name}"),
        )))
    }
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release ref lock");
        }
    }
}

impl RefStore for FsRefStore {
    fn read(&self, name: &str) -> RefResult<Option<Ref>> {
        Self::read_ref_file(&self.ref_path(name))
    }

    fn compare_and_swap(
        &self,
        name: &str,
        locator: Locator,
        expected_generation: Option<u64>,
    ) -> RefResult<u64> {
        validate_ref_name(name)?;
        let _guard = self.lock(name)?;

        let path = self.ref_path(name);
        let current = Self::read_ref_file(&path)?.map(|r| r.generation);
        if current != expected_generation {
            return Err(RefError::Conflict {
                name: name.to_string(),
                expected: expected_generation,
                actual: current,
            });
        }

        let generation = current.unwrap_or(0) + 1;
        let reference = Ref {
            name: name.to_string(),
            locator,
            generation,
        };
        let data = serde_json::to_vec_pretty(&reference)
            .map_err(|e| RefError::Serialization(e.to_string()))?;
        let dir = path.parent().expect("ref path has a parent");
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        io::Write::write_all(&mut tmp, &data)?;
        tmp.persist(&path).map_err(|e| RefError::Io(e.error))?;
        Ok(generation)
    }

    fn delete(&self, name: &str) -> RefResult<bool> {
        validate_ref_name(name)?;
        let _guard = self.lock(name)?;
        match fs::remove_file(self.ref_path(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> RefResult<Vec<Ref>> {
        let mut result = Vec::new();
        let base = self.root.join("refs");
        collect_refs(&base, &base, &mut result)?;
        result.retain(|r| r.name.starts_with(prefix));
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }
}

fn collect_refs(base: &Path, dir: &Path, out: &mut Vec<Ref>) -> RefResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_refs(base, &path, out)?;
            continue;
        }
        if path.extension().map(|e| e == "lock").unwrap_or(false) {
            continue;
        }
        if let Some(r) = FsRefStore::read_ref_file(&path)? {
            out.push(r);
        }
    }
    Ok(())
}

impl std::fmt::Debug for FsRefStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsRefStore").field("root", &self.root).finish()
    }
}
