//! The data service: one storage engine plus one knowledge base
//!
//! Both live under a single root directory: the sharded object tree,
//! and a SQLite file holding the triple relation. They interact only
//! through digests and CIDs as opaque values; neither touches the
//! other's storage.

use crate::knowledge::{KnowledgeBase, Triple};
use crate::model::{Cid, Digest, HashAlgorithm, Hasher};
use crate::store::{BlobStore, CidIter, ObjectReader};
use crate::Result;
use std::io::{Read, Seek};
use std::path::Path;

/// File name of the knowledge base within the root directory.
pub const KNOWLEDGE_FILE: &str = "kb.sqlite";

/// Facade over a [`BlobStore`] and a [`KnowledgeBase`] sharing a root.
pub struct DataService {
    store: BlobStore,
    knowledge: KnowledgeBase,
}

impl DataService {
    /// Open a service rooted at an existing directory, with default
    /// configuration (SHA2-256, 256-byte inline limit, 2 shard levels).
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_store(BlobStore::open(root)?)
    }

    /// Open a service around a pre-configured store.
    pub fn with_store(store: BlobStore) -> Result<Self> {
        let knowledge =
            KnowledgeBase::open(store.root().join(KNOWLEDGE_FILE), store.algorithm())?;
        Ok(DataService { store, knowledge })
    }

    /// The underlying storage engine.
    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    /// The underlying knowledge base.
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    // === Storage operations ===

    /// Store an in-memory payload.
    pub fn know(&self, data: &[u8]) -> Result<(Cid, bool)> {
        self.store.store(data)
    }

    /// Store a payload from a rewindable stream.
    pub fn know_stream<R: Read + Seek>(&self, reader: &mut R) -> Result<(Cid, bool)> {
        self.store.store_stream(reader)
    }

    /// Retrieve the payload for a CID.
    pub fn recall(&self, cid: &Cid) -> Result<Vec<u8>> {
        self.store.retrieve(cid)
    }

    /// Retrieve a lazily-read handle to the payload.
    pub fn recall_stream(&self, cid: &Cid) -> Result<ObjectReader> {
        self.store.retrieve_stream(cid)
    }

    /// Remove a stored payload. No-op when absent.
    pub fn forget(&self, cid: &Cid) -> Result<()> {
        self.store.forget(cid)
    }

    /// True iff a payload is stored under this CID.
    pub fn known(&self, cid: &Cid) -> Result<bool> {
        self.store.contains(cid)
    }

    /// Iterate over every stored CID.
    pub fn cids(&self) -> CidIter {
        self.store.cids()
    }

    /// Re-hash the stored payload and compare against its CID, using
    /// the algorithm named by the identifier's own tag. Detects bit rot
    /// in storage.
    pub fn confirm(&self, cid: &Cid) -> Result<bool> {
        let algorithm = cid.digest()?.algorithm();
        let mut reader = self.store.retrieve_stream(cid)?;
        let mut hasher = Hasher::new(algorithm);
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Cid::from_digest(&hasher.finalize()) == *cid)
    }

    // === Knowledge operations ===

    /// Record a fact about a digest.
    pub fn believe(&self, subject: &Digest, property: &str, value: &str) -> Result<(Digest, bool)> {
        self.knowledge.believe(subject, property, value)
    }

    /// Query recorded facts.
    pub fn inquire(
        &self,
        subject: Option<&Digest>,
        property: Option<&str>,
        value: Option<&str>,
    ) -> Result<Vec<Triple>> {
        self.knowledge.inquire(subject, property, value)
    }

    /// The configured hash algorithm.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.store.algorithm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_knowledge_file() {
        let dir = tempdir().unwrap();
        let service = DataService::open(dir.path()).unwrap();
        service.know(b"anything").unwrap();
        assert!(dir.path().join(KNOWLEDGE_FILE).is_file());
    }

    #[test]
    fn test_confirm_detects_intact_payload() {
        let dir = tempdir().unwrap();
        let service = DataService::open(dir.path()).unwrap();

        let (small, _) = service.know(b"small payload").unwrap();
        let (large, _) = service.know(&vec![6u8; 4096]).unwrap();
        assert!(service.confirm(&small).unwrap());
        assert!(service.confirm(&large).unwrap());
    }

    #[test]
    fn test_stored_payloads_can_be_sniffed() {
        let dir = tempdir().unwrap();
        let service = DataService::open(dir.path()).unwrap();

        // Tar's magic sits at offset 257, so classifying a recalled
        // payload needs a seekable handle for both backends.
        let mut tar = vec![0u8; 512];
        tar[257..265].copy_from_slice(b"ustar\x00\x30\x30");
        let (tar_cid, _) = service.know(&tar).unwrap();
        let mut reader = service.recall_stream(&tar_cid).unwrap();
        assert_eq!(
            crate::sniff::sniff(&mut reader).unwrap(),
            Some(crate::sniff::ContentKind::Tar)
        );

        // Inline payloads get the same treatment.
        let (pdf_cid, _) = service.know(b"%PDF-1.7 tiny").unwrap();
        let mut reader = service.recall_stream(&pdf_cid).unwrap();
        assert_eq!(
            crate::sniff::sniff(&mut reader).unwrap(),
            Some(crate::sniff::ContentKind::Pdf)
        );
    }

    #[test]
    fn test_confirm_detects_corruption() {
        let dir = tempdir().unwrap();
        let service = DataService::open(dir.path()).unwrap();

        let (cid, _) = service.know(&vec![1u8; 1024]).unwrap();

        // Flip bytes in the object file behind the store's back.
        let path = walkdir::WalkDir::new(dir.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .find(|e| e.file_name().to_string_lossy().ends_with(".bin"))
            .unwrap()
            .path()
            .to_path_buf();
        std::fs::write(&path, vec![2u8; 1024]).unwrap();

        assert!(!service.confirm(&cid).unwrap());
    }
}
