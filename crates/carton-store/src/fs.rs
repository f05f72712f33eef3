use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use carton_types::BundleId;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlobStore;

/// Filesystem blob store.
///
/// Blobs live under `<root>/objects/<ab>/<cdef...>` where `ab` is the first
/// hex byte of the key; the two-level fan-out keeps directory sizes sane at
/// millions of blobs. Writes go through a temp file in the same directory
/// followed by a rename, so readers never observe a partially written blob.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("objects"))?;
        Ok(Self { root })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &BundleId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join("objects").join(&hex[..2]).join(&hex[2..])
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, data: &[u8]) -> StoreResult<BundleId> {
        let id = BundleId::for_blob(data);
        let path = self.blob_path(&id);
        if path.exists() {
            // Content-addressed: existing bytes are the same bytes.
            return Ok(id);
        }
        let dir = path.parent().expect("blob path has a parent");
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, data)?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        tracing::debug!(id = %id.short_hex(), bytes = data.len(), "stored blob");
        Ok(id)
    }

    fn get(&self, id: &BundleId) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.blob_path(id)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_range(&self, id: &BundleId, offset: u64, len: u64) -> StoreResult<Option<Vec<u8>>> {
        let mut file = match fs::File::open(self.blob_path(id)) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob_len = file.metadata()?.len();
        let in_bounds = offset
            .checked_add(len)
            .map(|end| end <= blob_len)
            .unwrap_or(false);
        if !in_bounds {
            return Err(StoreError::RangeOutOfBounds {
                id: *id,
                offset,
                len,
                blob_len,
            });
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(Some(buf))
    }

    fn exists(&self, id: &BundleId) -> StoreResult<bool> {
        Ok(self.blob_path(id).exists())
    }
}

impl std::fmt::Debug for FsBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsBlobStore").field("root", &self.root).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn put_and_get() {
        let (_dir, store) = temp_store();
        let id = store.put(b"disk bytes").unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap(), b"disk bytes");
    }

    #[test]
    fn fan_out_layout() {
        let (_dir, store) = temp_store();
        let id = store.put(b"layout").unwrap();
        let hex = id.to_hex();
        let expected = store
            .root()
            .join("objects")
            .join(&hex[..2])
            .join(&hex[2..]);
        assert!(expected.is_file());
    }

    #[test]
    fn get_missing_returns_none() {
        let (_dir, store) = temp_store();
        assert!(store.get(&BundleId::for_blob(b"missing")).unwrap().is_none());
    }

    #[test]
    fn put_is_idempotent() {
        let (_dir, store) = temp_store();
        let id1 = store.put(b"same").unwrap();
        let id2 = store.put(b"same").unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn get_range_reads_a_slice() {
        let (_dir, store) = temp_store();
        let id = store.put(b"0123456789").unwrap();
        assert_eq!(store.get_range(&id, 4, 3).unwrap().unwrap(), b"456");
    }

    #[test]
    fn get_range_past_end_is_an_error() {
        let (_dir, store) = temp_store();
        let id = store.put(b"short").unwrap();
        let err = store.get_range(&id, 0, 100).unwrap_err();
        assert!(matches!(err, StoreError::RangeOutOfBounds { .. }));
    }

    #[test]
    fn exists_after_put() {
        let (_dir, store) = temp_store();
        let id = store.put(b"here").unwrap();
        assert!(store.exists(&id).unwrap());
        assert!(!store.exists(&BundleId::for_blob(b"absent")).unwrap());
    }

    #[test]
    fn two_handles_share_one_root() {
        let dir = tempfile::tempdir().unwrap();
        let a = FsBlobStore::open(dir.path()).unwrap();
        let b = FsBlobStore::open(dir.path()).unwrap();
        let id = a.put(b"written by a").unwrap();
        assert_eq!(b.get(&id).unwrap().unwrap(), b"written by a");
    }

    #[test]
    fn large_blob_roundtrip() {
        let (_dir, store) = temp_store();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let id = store.put(&data).unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap(), data);
        assert_eq!(
            store.get_range(&id, 100_000, 1_000).unwrap().unwrap(),
            &data[100_000..101_000]
        );
    }
}
