//! Archive extraction: unpack a stored archive and ingest its contents
//!
//! The payload is spooled into a scratch directory, unpacked with the
//! system's unzip/tar/gzip tool, and every produced file is stored back
//! through the normal streaming path with an `extracted_from` triple
//! pointing at the parent archive.

use crate::model::Cid;
use crate::service::DataService;
use crate::sniff::{self, ContentKind};
use crate::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::process::{Command, Stdio};
use tracing::info;
use walkdir::WalkDir;

/// Counts reported after unpacking an archive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Extracted files whose content was new to the store.
    pub stored: usize,
    /// Extracted files whose content was already present.
    pub duplicates: usize,
}

/// Unpack the archive stored under `cid` and ingest every file it
/// contains. Fails with [`Error::UnsupportedArchive`] when the payload
/// does not sniff as a known archive format.
pub fn extract(service: &DataService, cid: &Cid) -> Result<ExtractReport> {
    let mut reader = service.recall_stream(cid)?;
    let kind = match sniff::sniff(&mut reader)? {
        Some(kind) if kind.is_archive() => kind,
        _ => return Err(Error::UnsupportedArchive(cid.to_string())),
    };

    let scratch = tempfile::tempdir()?;
    let payload_path = scratch.path().join(format!("{}.{}", cid, kind.tag()));
    let out_dir = scratch.path().join("out");
    fs::create_dir(&out_dir)?;

    // Fresh stream: sniffing moved the first one.
    let mut reader = service.recall_stream(cid)?;
    let mut payload = File::create(&payload_path)?;
    io::copy(&mut reader, &mut payload)?;
    drop(payload);

    info!(cid = %cid, kind = kind.tag(), "unpacking archive");
    let status = match kind {
        ContentKind::Zip => Command::new("unzip")
            .arg("-q")
            .arg(&payload_path)
            .arg("-d")
            .arg(&out_dir)
            .status()?,
        ContentKind::Tar => Command::new("tar")
            .arg("-xf")
            .arg(&payload_path)
            .arg("-C")
            .arg(&out_dir)
            .status()?,
        ContentKind::Gzip => {
            let out = File::create(out_dir.join("payload"))?;
            Command::new("gzip")
                .arg("-dc")
                .arg(&payload_path)
                .stdout(Stdio::from(out))
                .status()?
        }
        _ => unreachable!("non-archive kinds rejected above"),
    };
    if !status.success() {
        return Err(Error::Extraction(format!(
            "{} exited with {}",
            kind.tag(),
            status
        )));
    }

    let mut report = ExtractReport::default();
    for entry in WalkDir::new(&out_dir).follow_links(false) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let mut file = File::open(entry.path())?;
        let (child, is_new) = service.know_stream(&mut file)?;
        service.believe(&child.digest()?, "extracted_from", cid.as_str())?;
        if is_new {
            report.stored += 1;
        } else {
            report.duplicates += 1;
        }
    }
    Ok(report)
}
