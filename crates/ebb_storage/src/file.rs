//! File-based document backend for durable storage.
//!
//! The backend keeps the live document set in memory and records every
//! [`WriteBatch`] as one frame of an append-only journal:
//!
//! ```text
//! ┌──────────┬──────────┬──────────────────────┐
//! │ len: u32 │ crc: u32 │ payload (CBOR batch) │
//! └──────────┴──────────┴──────────────────────┘
//! ```
//!
//! On open the journal is replayed. A torn trailing frame (crash during
//! append) is discarded and truncated away; a bad frame followed by more
//! data is reported as corruption.

use crate::backend::DocumentBackend;
use crate::batch::WriteBatch;
use crate::error::{StorageError, StorageResult};
use crate::memory::{apply_ops, Namespaces};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Frame header: payload length + CRC32 of the payload.
const HEADER_LEN: usize = 8;

#[derive(Debug)]
struct Journal {
    file: File,
    size: u64,
}

/// A durable document backend backed by a single journal file.
///
/// # Durability
///
/// With `sync_on_write` enabled (the default) every batch is `fsync`ed
/// before `apply` returns. Disabling it trades durability of the most
/// recent batches for throughput; `flush()` forces a sync.
///
/// # Locking
///
/// An advisory lock on `<path>.lock` is held for the lifetime of the
/// backend, so a second process opening the same journal gets
/// [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use ebb_storage::{DocumentBackend, FileBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("cache.ebb")).unwrap();
/// backend.put("notes", "n1", b"hello".to_vec()).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    sync_on_write: bool,
    journal: Mutex<Journal>,
    namespaces: RwLock<Namespaces>,
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a journal at the given path and replays it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process holds the lock (`Locked`)
    /// - A frame other than the last one is corrupted
    /// - I/O errors occur
    pub fn open(path: &Path) -> StorageResult<Self> {
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(sibling(path, ".lock"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StorageError::Locked)?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let (namespaces, valid_len) = replay(&bytes)?;
        if valid_len < bytes.len() as u64 {
            warn!(
                path = %path.display(),
                discarded = bytes.len() as u64 - valid_len,
                "discarding torn journal tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        debug!(path = %path.display(), size = valid_len, "journal opened");

        Ok(Self {
            path: path.to_path_buf(),
            sync_on_write: true,
            journal: Mutex::new(Journal {
                file,
                size: valid_len,
            }),
            namespaces: RwLock::new(namespaces),
            _lock_file: lock_file,
        })
    }

    /// Opens or creates a journal, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the journal
    /// cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Sets whether every batch is synced to disk before `apply` returns.
    #[must_use]
    pub fn with_sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current journal size in bytes.
    pub fn journal_size(&self) -> u64 {
        self.journal.lock().size
    }

    /// Rewrites the journal as a single snapshot frame.
    ///
    /// The snapshot is written to a sibling file and renamed over the
    /// journal, so a crash during compaction leaves the old journal intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written or renamed.
    pub fn compact(&self) -> StorageResult<()> {
        let mut journal = self.journal.lock();
        let before = journal.size;

        let mut snapshot = WriteBatch::new();
        for (namespace, entries) in self.namespaces.read().iter() {
            for (key, value) in entries {
                snapshot.put(namespace.clone(), key.clone(), value.clone());
            }
        }

        let tmp_path = sibling(&self.path, ".compact");
        let frame = encode_frame(&snapshot)?;
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&frame)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        journal.file = file;
        journal.size = frame.len() as u64;

        debug!(before, after = journal.size, "journal compacted");
        Ok(())
    }
}

impl DocumentBackend for FileBackend {
    fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn scan(&self, namespace: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let frame = encode_frame(&batch)?;

        // The journal lock is held while the in-memory view is updated so
        // that replay order and visible order agree.
        let mut journal = self.journal.lock();
        let offset = journal.size;
        let written = write_frame(&mut journal.file, offset, &frame, self.sync_on_write);

        if let Err(e) = written {
            // Drop the partial frame so the next append starts clean.
            let _ = journal.file.set_len(offset);
            return Err(e.into());
        }
        journal.size = offset + frame.len() as u64;

        apply_ops(&mut self.namespaces.write(), batch.into_ops());
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        let mut journal = self.journal.lock();
        journal.file.flush()?;
        journal.file.sync_all()?;
        Ok(())
    }
}

fn write_frame(file: &mut File, offset: u64, frame: &[u8], sync: bool) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(frame)?;
    if sync {
        file.sync_data()?;
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn encode_frame(batch: &WriteBatch) -> StorageResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(batch, &mut payload)
        .map_err(|e| StorageError::Codec(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| StorageError::Codec("batch larger than 4 GiB".into()))?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Replays journal bytes, returning the document set and the length of
/// the valid prefix.
fn replay(bytes: &[u8]) -> StorageResult<(Namespaces, u64)> {
    let mut namespaces = Namespaces::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        if bytes.len() - offset < HEADER_LEN {
            break;
        }

        let len = read_u32(&bytes[offset..offset + 4]) as usize;
        let crc = read_u32(&bytes[offset + 4..offset + HEADER_LEN]);
        let start = offset + HEADER_LEN;
        let end = match start.checked_add(len) {
            Some(end) if end <= bytes.len() => end,
            _ => break,
        };

        let payload = &bytes[start..end];
        if compute_crc32(payload) != crc {
            if end == bytes.len() {
                break;
            }
            return Err(StorageError::corrupted(offset as u64, "checksum mismatch"));
        }

        let batch: WriteBatch = ciborium::from_reader(payload)
            .map_err(|e| StorageError::corrupted(offset as u64, e.to_string()))?;
        apply_ops(&mut namespaces, batch.into_ops());
        offset = end;
    }

    Ok((namespaces, offset as u64))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

/// CRC-32 (IEEE, reflected) of `data`.
fn compute_crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchOp;
    use crate::memory::InMemoryBackend;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn file_put_get() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("cache.ebb")).unwrap();

        backend.put("books", "b1", b"dune".to_vec()).unwrap();
        assert_eq!(backend.get("books", "b1").unwrap(), Some(b"dune".to_vec()));
        assert!(backend.journal_size() > 0);
    }

    #[test]
    fn file_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.ebb");

        {
            let backend = FileBackend::open(&path).unwrap();
            let mut batch = WriteBatch::new();
            batch.put("books", "b1", vec![1]);
            batch.put("books", "b2", vec![2]);
            backend.apply(batch).unwrap();
            backend.delete("books", "b1").unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.get("books", "b1").unwrap(), None);
        assert_eq!(backend.get("books", "b2").unwrap(), Some(vec![2]));
    }

    #[test]
    fn file_discards_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.ebb");

        let valid_len = {
            let backend = FileBackend::open(&path).unwrap();
            backend.put("n", "k", vec![7]).unwrap();
            backend.journal_size()
        };

        // Half a header plus garbage, as if the process died mid-append.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0x10, 0x00, 0x00]).unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.journal_size(), valid_len);
        assert_eq!(backend.get("n", "k").unwrap(), Some(vec![7]));

        backend.put("n", "k2", vec![8]).unwrap();
        drop(backend);
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.get("n", "k2").unwrap(), Some(vec![8]));
    }

    #[test]
    fn file_rejects_corruption_before_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.ebb");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.put("n", "a", vec![1, 1, 1, 1]).unwrap();
            backend.put("n", "b", vec![2]).unwrap();
        }

        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_LEN + 2] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let result = FileBackend::open(&path);
        assert!(matches!(result, Err(StorageError::Corrupted { offset: 0, .. })));
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.ebb");

        let _first = FileBackend::open(&path).unwrap();
        let second = FileBackend::open(&path);
        assert!(matches!(second, Err(StorageError::Locked)));
    }

    #[test]
    fn file_compact_keeps_state_and_shrinks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.ebb");

        let backend = FileBackend::open(&path).unwrap();
        for i in 0..20u8 {
            backend.put("n", "k", vec![i; 32]).unwrap();
        }
        let before = backend.journal_size();

        backend.compact().unwrap();
        assert!(backend.journal_size() < before);
        assert_eq!(backend.get("n", "k").unwrap(), Some(vec![19; 32]));

        backend.put("n", "after", vec![1]).unwrap();
        drop(backend);

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.get("n", "k").unwrap(), Some(vec![19; 32]));
        assert_eq!(backend.get("n", "after").unwrap(), Some(vec![1]));
    }

    #[test]
    fn file_open_with_create_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("cache.ebb");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.path(), path.as_path());
        assert!(path.exists());
    }

    fn arb_op() -> impl Strategy<Value = BatchOp> {
        let namespace = prop_oneof![Just("a"), Just("b")].prop_map(String::from);
        let key = "[k-m]{1,2}";
        prop_oneof![
            (namespace.clone(), key, prop::collection::vec(any::<u8>(), 0..8)).prop_map(
                |(namespace, key, value)| BatchOp::Put {
                    namespace,
                    key,
                    value
                }
            ),
            (namespace, key).prop_map(|(namespace, key)| BatchOp::Delete { namespace, key }),
        ]
    }

    fn to_batch(ops: Vec<BatchOp>) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for op in ops {
            match op {
                BatchOp::Put {
                    namespace,
                    key,
                    value,
                } => batch.put(namespace, key, value),
                BatchOp::Delete { namespace, key } => batch.delete(namespace, key),
            }
        }
        batch
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn journal_replay_matches_applied_batches(
            batches in prop::collection::vec(prop::collection::vec(arb_op(), 0..6), 1..8)
        ) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("cache.ebb");
            let model = InMemoryBackend::new();
            {
                let backend = FileBackend::open(&path).unwrap();
                for ops in batches {
                    model.apply(to_batch(ops.clone())).unwrap();
                    backend.apply(to_batch(ops)).unwrap();
                }
            }

            let reopened = FileBackend::open(&path).unwrap();
            for namespace in ["a", "b"] {
                prop_assert_eq!(reopened.scan(namespace).unwrap(), model.scan(namespace).unwrap());
            }
        }
    }
}
