//! Batch ingestion of files and directory trees
//!
//! Each file is streamed into the store and annotated with provenance
//! triples: where it came from, its filesystem timestamps (recorded as
//! facts about the `had_path` triple, not about the content itself,
//! since the same bytes may arrive from many paths), and its sniffed
//! content kind. Symbolic links are skipped.

use crate::model::Cid;
use crate::service::DataService;
use crate::sniff;
use crate::Result;
use std::fs::File;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Counts reported back to ingestion tooling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Files whose content was new to the store.
    pub stored: usize,
    /// Files whose content was already present.
    pub duplicates: usize,
}

/// Ingest a single file, recording provenance triples. Returns the CID
/// and whether the content was new.
pub fn ingest_file(service: &DataService, path: &Path) -> Result<(Cid, bool)> {
    let mut file = File::open(path)?;
    let (cid, is_new) = service.know_stream(&mut file)?;
    info!(path = %path.display(), cid = %cid, is_new, "ingested");

    let subject = cid.digest()?;
    let (path_id, _) = service.believe(&subject, "had_path", &path.display().to_string())?;

    let meta = std::fs::metadata(path)?;
    if let Some(secs) = unix_seconds(meta.modified()) {
        service.believe(&path_id, "last_modified", &secs)?;
    }
    if let Some(secs) = unix_seconds(meta.accessed()) {
        service.believe(&path_id, "last_accessed", &secs)?;
    }
    if let Some(secs) = unix_seconds(meta.created()) {
        service.believe(&path_id, "created", &secs)?;
    }

    let mut file = File::open(path)?;
    if let Some(kind) = sniff::sniff(&mut file)? {
        service.believe(&subject, "content_kind", kind.tag())?;
    }

    Ok((cid, is_new))
}

/// Ingest a path. With `recursive`, directories are walked and every
/// regular file stored; otherwise the path must name a single file.
pub fn ingest_path(service: &DataService, path: &Path, recursive: bool) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    if recursive && path.is_dir() {
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = entry.map_err(|e| crate::Error::Io(e.into()))?;
            if entry.path_is_symlink() {
                warn!(path = %entry.path().display(), "skipping symbolic link");
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let (_, is_new) = ingest_file(service, entry.path())?;
            if is_new {
                report.stored += 1;
            } else {
                report.duplicates += 1;
            }
        }
    } else {
        let (_, is_new) = ingest_file(service, path)?;
        if is_new {
            report.stored += 1;
        } else {
            report.duplicates += 1;
        }
    }

    Ok(report)
}

fn unix_seconds(time: std::io::Result<SystemTime>) -> Option<String> {
    let time = time.ok()?;
    let secs = time.duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(secs.to_string())
}
