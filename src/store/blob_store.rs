//! The storage engine: a sharded file tree plus per-shard inline tables
//!
//! Payloads are addressed by the CID of their bytes. Placement is a pure
//! function of payload size: anything under the inline limit goes into
//! the shard's small-object table, everything else becomes a `.bin` file
//! in the shard directory. Streamed stores are always file-backed.
//! A CID is held in exactly one of the two locations, never both.

use crate::model::{Cid, Digest, HashAlgorithm, Hasher};
use crate::store::shard::{shard_rel_path, ShardTable, OBJECT_EXT, TABLE_FILE};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fs::{self, File};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Window size for streaming reads and writes.
const STREAM_WINDOW: usize = 8 * 1024 * 1024;

/// Default byte threshold below which payloads are stored inline.
pub const DEFAULT_INLINE_LIMIT: usize = 256;

/// Default number of shard directory levels.
pub const DEFAULT_LEVELS: usize = 2;

/// A content-addressed blob store rooted at a directory.
pub struct BlobStore {
    root: PathBuf,
    algorithm: HashAlgorithm,
    inline_limit: usize,
    levels: usize,
    /// Lazily-opened small-object tables, keyed by shard directory.
    tables: Mutex<HashMap<PathBuf, ShardTable>>,
}

impl BlobStore {
    /// Open a store rooted at an existing directory.
    ///
    /// Fails with [`Error::PathNotFound`] if the root is missing; the
    /// store never creates its own root.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::PathNotFound(root));
        }
        Ok(BlobStore {
            root,
            algorithm: HashAlgorithm::default(),
            inline_limit: DEFAULT_INLINE_LIMIT,
            levels: DEFAULT_LEVELS,
            tables: Mutex::new(HashMap::new()),
        })
    }

    /// Set the hash algorithm used for new stores.
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the inline threshold: payloads strictly smaller than this go
    /// into the small-object table.
    pub fn with_inline_limit(mut self, limit: usize) -> Self {
        self.inline_limit = limit;
        self
    }

    /// Set the shard directory depth.
    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels;
        self
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The hash algorithm new stores are tagged with.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The inline threshold in bytes.
    pub fn inline_limit(&self) -> usize {
        self.inline_limit
    }

    /// Shard directory for a CID, created if absent.
    fn shard_dir(&self, cid: &str) -> Result<PathBuf> {
        let dir = self.root.join(shard_rel_path(cid, self.levels));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Authoritative file path for a file-backed object.
    fn object_path(&self, cid: &str) -> Result<PathBuf> {
        Ok(self.shard_dir(cid)?.join(format!("{}.{}", cid, OBJECT_EXT)))
    }

    /// Run `f` against the (lazily loaded, cached) table for this CID's shard.
    fn with_table<T>(&self, cid: &str, f: impl FnOnce(&mut ShardTable) -> Result<T>) -> Result<T> {
        let dir = self.shard_dir(cid)?;
        let mut tables = self.tables.lock();
        let table = match tables.entry(dir.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => v.insert(ShardTable::load(dir.join(TABLE_FILE))?),
        };
        f(table)
    }

    /// Store an in-memory payload. Returns its CID and whether the
    /// object is new. Idempotent: a repeat store of identical bytes is a
    /// success with `is_new = false`.
    pub fn store(&self, data: &[u8]) -> Result<(Cid, bool)> {
        let digest = Digest::of(self.algorithm, data);
        let cid = Cid::from_digest(&digest);

        if self.contains(&cid)? {
            return Ok((cid, false));
        }

        if data.len() < self.inline_limit {
            debug!(cid = %cid, size = data.len(), "storing inline");
            self.with_table(cid.as_str(), |table| {
                table.insert(cid.as_str(), data).map(|_| ())
            })?;
        } else {
            debug!(cid = %cid, size = data.len(), "storing file-backed");
            let path = self.object_path(cid.as_str())?;
            self.write_atomic(&path, |file| file.write_all(data).map_err(Into::into))?;
        }
        Ok((cid, true))
    }

    /// Store a payload from a rewindable stream.
    ///
    /// Two passes: the stream is consumed once to compute the digest,
    /// rewound, then copied into the file tree. Streamed stores are
    /// always file-backed regardless of size. Fails with
    /// [`Error::NonSeekableInput`] when the rewind is refused.
    pub fn store_stream<R: Read + Seek>(&self, reader: &mut R) -> Result<(Cid, bool)> {
        let mut hasher = Hasher::new(self.algorithm);
        let mut buf = vec![0u8; STREAM_WINDOW];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let cid = Cid::from_digest(&hasher.finalize());

        if self.contains(&cid)? {
            return Ok((cid, false));
        }

        reader.seek(SeekFrom::Start(0)).map_err(|e| {
            // Only a refused rewind means the stream is one-shot; other
            // failures are real I/O faults and must surface as such.
            if e.kind() == std::io::ErrorKind::Unsupported {
                Error::NonSeekableInput
            } else {
                Error::Io(e)
            }
        })?;

        debug!(cid = %cid, "storing from stream");
        let path = self.object_path(cid.as_str())?;
        self.write_atomic(&path, |file| {
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                file.write_all(&buf[..n])?;
            }
            Ok(())
        })?;
        Ok((cid, true))
    }

    /// Write an object file through a temp file renamed into place, so a
    /// concurrent reader never observes a partial payload.
    fn write_atomic(
        &self,
        path: &Path,
        fill: impl FnOnce(&mut File) -> Result<()>,
    ) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        fill(tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Retrieve the payload for a CID, byte-identical to what was
    /// stored. File tree first, then the small-object table.
    pub fn retrieve(&self, cid: &Cid) -> Result<Vec<u8>> {
        let path = self.object_path(cid.as_str())?;
        if path.is_file() {
            return Ok(fs::read(path)?);
        }
        self.with_table(cid.as_str(), |table| table.get(cid.as_str()))?
            .ok_or_else(|| Error::NotFound(cid.to_string()))
    }

    /// Retrieve a lazily-read handle to the payload, for objects too
    /// large to materialize.
    pub fn retrieve_stream(&self, cid: &Cid) -> Result<ObjectReader> {
        let path = self.object_path(cid.as_str())?;
        if path.is_file() {
            return Ok(ObjectReader::File(File::open(path)?));
        }
        match self.with_table(cid.as_str(), |table| table.get(cid.as_str()))? {
            Some(data) => Ok(ObjectReader::Inline(Cursor::new(data))),
            None => Err(Error::NotFound(cid.to_string())),
        }
    }

    /// Remove the object from whichever location holds it. Deleting an
    /// absent CID is a no-op, not an error, for both backends.
    pub fn forget(&self, cid: &Cid) -> Result<()> {
        let path = self.object_path(cid.as_str())?;
        if path.is_file() {
            fs::remove_file(path)?;
            return Ok(());
        }
        self.with_table(cid.as_str(), |table| {
            table.remove(cid.as_str()).map(|_| ())
        })
    }

    /// True iff the CID is present in either location.
    pub fn contains(&self, cid: &Cid) -> Result<bool> {
        if self.object_path(cid.as_str())?.is_file() {
            return Ok(true);
        }
        self.with_table(cid.as_str(), |table| Ok(table.contains(cid.as_str())))
    }

    /// Iterate over every stored CID: file-backed objects and every key
    /// of every small-object table found while walking the shard tree.
    /// Order is unspecified; mutations during iteration may or may not
    /// be observed.
    pub fn cids(&self) -> CidIter {
        CidIter {
            walker: walkdir::WalkDir::new(&self.root).into_iter(),
            pending: VecDeque::new(),
        }
    }
}

/// A readable handle onto a stored payload.
pub enum ObjectReader {
    /// File-backed object, read lazily from disk.
    File(File),
    /// Inline object served from the small-object table.
    Inline(Cursor<Vec<u8>>),
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            ObjectReader::File(f) => f.read(buf),
            ObjectReader::Inline(c) => c.read(buf),
        }
    }
}

impl Seek for ObjectReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            ObjectReader::File(f) => f.seek(pos),
            ObjectReader::Inline(c) => c.seek(pos),
        }
    }
}

/// Lazy iterator over every CID in a store.
pub struct CidIter {
    walker: walkdir::IntoIter,
    pending: VecDeque<Cid>,
}

impl Iterator for CidIter {
    type Item = Result<Cid>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cid) = self.pending.pop_front() {
                return Some(Ok(cid));
            }
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(Error::Io(e.into()))),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name == TABLE_FILE {
                let table = match ShardTable::load(entry.path()) {
                    Ok(table) => table,
                    Err(e) => return Some(Err(e)),
                };
                self.pending
                    .extend(table.keys().filter_map(|k| k.parse::<Cid>().ok()));
            } else if let Some(stem) = name.strip_suffix(&format!(".{}", OBJECT_EXT)) {
                // Foreign files that do not decode as CIDs are skipped.
                if let Ok(cid) = stem.parse::<Cid>() {
                    return Some(Ok(cid));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> BlobStore {
        BlobStore::open(dir).unwrap()
    }

    #[test]
    fn test_open_missing_root_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            BlobStore::open(&missing),
            Err(Error::PathNotFound(_))
        ));
    }

    #[test]
    fn test_store_retrieve_roundtrip_inline() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let (cid, is_new) = store.store(b"abc").unwrap();
        assert!(is_new);
        assert_eq!(store.retrieve(&cid).unwrap(), b"abc");
        assert!(store.contains(&cid).unwrap());
    }

    #[test]
    fn test_store_retrieve_roundtrip_file_backed() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let payload = vec![7u8; 4096];
        let (cid, is_new) = store.store(&payload).unwrap();
        assert!(is_new);
        assert_eq!(store.retrieve(&cid).unwrap(), payload);
        assert!(store.object_path(cid.as_str()).unwrap().is_file());
    }

    #[test]
    fn test_store_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let (cid1, new1) = store.store(b"same bytes").unwrap();
        let (cid2, new2) = store.store(b"same bytes").unwrap();
        assert_eq!(cid1, cid2);
        assert!(new1);
        assert!(!new2);
    }

    #[test]
    fn test_inline_boundary() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path()).with_inline_limit(256);

        // One byte under the limit: must live in the shard table, not a file.
        let small = vec![1u8; 255];
        let (small_cid, _) = store.store(&small).unwrap();
        assert!(!store.object_path(small_cid.as_str()).unwrap().is_file());
        assert_eq!(store.retrieve(&small_cid).unwrap(), small);

        // Exactly at the limit: must not appear in the shard table.
        let at_limit = vec![2u8; 256];
        let (large_cid, _) = store.store(&at_limit).unwrap();
        assert!(store.object_path(large_cid.as_str()).unwrap().is_file());
        let in_table = store
            .with_table(large_cid.as_str(), |t| Ok(t.contains(large_cid.as_str())))
            .unwrap();
        assert!(!in_table);
    }

    #[test]
    fn test_shard_path_from_trailing_characters() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path()).with_levels(2);

        let (cid, _) = store.store(&vec![3u8; 512]).unwrap();
        let chars: Vec<char> = cid.as_str().chars().collect();
        let expected = dir
            .path()
            .join(chars[chars.len() - 1].to_string())
            .join(chars[chars.len() - 2].to_string())
            .join(format!("{}.bin", cid));
        assert!(expected.is_file());
    }

    #[test]
    fn test_store_stream_always_file_backed() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        // Small payload, but streamed: goes to the file tree anyway.
        let mut reader = Cursor::new(b"tiny streamed payload".to_vec());
        let (cid, is_new) = store.store_stream(&mut reader).unwrap();
        assert!(is_new);
        assert!(store.object_path(cid.as_str()).unwrap().is_file());
        assert_eq!(store.retrieve(&cid).unwrap(), b"tiny streamed payload");

        let mut again = Cursor::new(b"tiny streamed payload".to_vec());
        let (cid2, new2) = store.store_stream(&mut again).unwrap();
        assert_eq!(cid, cid2);
        assert!(!new2);
    }

    #[test]
    fn test_stream_and_memory_store_agree_on_cid() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let payload = vec![9u8; 10_000];
        let (mem_cid, _) = store.store(&payload).unwrap();

        let other = tempdir().unwrap();
        let stream_store = store_in(other.path());
        let mut reader = Cursor::new(payload);
        let (stream_cid, _) = stream_store.store_stream(&mut reader).unwrap();
        assert_eq!(mem_cid, stream_cid);
    }

    #[test]
    fn test_non_seekable_input() {
        struct NoRewind(Cursor<Vec<u8>>);
        impl Read for NoRewind {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                self.0.read(buf)
            }
        }
        impl Seek for NoRewind {
            fn seek(&mut self, _pos: SeekFrom) -> std::io::Result<u64> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "one-shot stream",
                ))
            }
        }

        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let mut reader = NoRewind(Cursor::new(b"cannot rewind".to_vec()));
        assert!(matches!(
            store.store_stream(&mut reader),
            Err(Error::NonSeekableInput)
        ));
    }

    #[test]
    fn test_retrieve_stream_matches() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let payload = vec![5u8; 1024];
        let (cid, _) = store.store(&payload).unwrap();

        let mut out = Vec::new();
        store.retrieve_stream(&cid).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);

        let (inline_cid, _) = store.store(b"inline").unwrap();
        let mut out = Vec::new();
        store
            .retrieve_stream(&inline_cid)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"inline");
    }

    #[test]
    fn test_io_fault_during_rewind_is_not_non_seekable() {
        struct FaultySeek(Cursor<Vec<u8>>);
        impl Read for FaultySeek {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                self.0.read(buf)
            }
        }
        impl Seek for FaultySeek {
            fn seek(&mut self, _pos: SeekFrom) -> std::io::Result<u64> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "device dropped off the bus",
                ))
            }
        }

        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let mut reader = FaultySeek(Cursor::new(b"rewind fails transiently".to_vec()));
        assert!(matches!(
            store.store_stream(&mut reader),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_object_reader_is_seekable_for_both_backends() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let (inline_cid, _) = store.store(b"0123456789").unwrap();
        let (file_cid, _) = store.store(&{
            let mut big = b"0123456789".to_vec();
            big.resize(2048, b'x');
            big
        })
        .unwrap();

        for cid in [&inline_cid, &file_cid] {
            let mut reader = store.retrieve_stream(cid).unwrap();
            reader.seek(SeekFrom::Start(5)).unwrap();
            let mut rest = [0u8; 5];
            reader.read_exact(&mut rest).unwrap();
            assert_eq!(&rest, b"56789");

            // Rewind and read from the top again.
            reader.seek(SeekFrom::Start(0)).unwrap();
            let mut head = [0u8; 10];
            reader.read_exact(&mut head).unwrap();
            assert_eq!(&head, b"0123456789");
        }
    }

    #[test]
    fn test_forget_is_idempotent_in_both_backends() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let (inline_cid, _) = store.store(b"small").unwrap();
        let (file_cid, _) = store.store(&vec![4u8; 2048]).unwrap();

        store.forget(&inline_cid).unwrap();
        store.forget(&file_cid).unwrap();
        assert!(!store.contains(&inline_cid).unwrap());
        assert!(!store.contains(&file_cid).unwrap());

        // Second forget of an absent CID is a no-op.
        store.forget(&inline_cid).unwrap();
        store.forget(&file_cid).unwrap();

        // And so is forgetting something never stored.
        let (ghost, _) = {
            let other = tempdir().unwrap();
            store_in(other.path()).store(b"never here").unwrap()
        };
        store.forget(&ghost).unwrap();
    }

    #[test]
    fn test_retrieve_absent_is_not_found() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let other = tempdir().unwrap();
        let (cid, _) = store_in(other.path()).store(b"elsewhere").unwrap();
        assert!(matches!(store.retrieve(&cid), Err(Error::NotFound(_))));
        assert!(matches!(
            store.retrieve_stream(&cid),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_cids_enumerates_both_backends_once() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let (a, _) = store.store(b"inline one").unwrap();
        let (b, _) = store.store(b"inline two").unwrap();
        let (c, _) = store.store(&vec![8u8; 1000]).unwrap();

        let mut listed: Vec<String> = store
            .cids()
            .map(|r| r.unwrap().into_inner())
            .collect();
        listed.sort();
        let mut expected = vec![
            a.into_inner(),
            b.into_inner(),
            c.into_inner(),
        ];
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[test]
    fn test_restartable_enumeration() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.store(b"one").unwrap();
        store.store(&vec![1u8; 512]).unwrap();

        let first: Vec<_> = store.cids().map(|r| r.unwrap()).collect();
        let second: Vec<_> = store.cids().map(|r| r.unwrap()).collect();
        assert_eq!(first.len(), 2);
        assert_eq!(first.len(), second.len());
    }
}
