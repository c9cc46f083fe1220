//! Magic-byte content classification
//!
//! Reads just enough of a payload to recognize a handful of well-known
//! formats. Used to filter enumeration output and to gate archive
//! extraction; anything unrecognized is simply `None`.

use crate::Result;
use std::io::{Read, Seek, SeekFrom};

/// Recognized payload kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ContentKind {
    Pdf,
    Png,
    Jpeg,
    Zip,
    Tar,
    Gzip,
}

impl ContentKind {
    /// True for kinds that can be unpacked into constituent files.
    pub fn is_archive(&self) -> bool {
        matches!(self, ContentKind::Zip | ContentKind::Tar | ContentKind::Gzip)
    }

    /// Short lowercase tag, as used in recorded triples.
    pub fn tag(&self) -> &'static str {
        match self {
            ContentKind::Pdf => "pdf",
            ContentKind::Png => "png",
            ContentKind::Jpeg => "jpg",
            ContentKind::Zip => "zip",
            ContentKind::Tar => "tar",
            ContentKind::Gzip => "gz",
        }
    }
}

/// Classify a payload by its magic bytes. The reader is left at an
/// unspecified position.
pub fn sniff<R: Read + Seek>(reader: &mut R) -> Result<Option<ContentKind>> {
    let mut header = [0u8; 8];
    let n = read_up_to(reader, &mut header)?;
    let header = &header[..n];

    let kind = if header.starts_with(b"%PDF-") {
        Some(ContentKind::Pdf)
    } else if header.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(ContentKind::Png)
    } else if header.starts_with(b"\xFF\xD8") {
        Some(ContentKind::Jpeg)
    } else if header.starts_with(b"PK\x03\x04") {
        Some(ContentKind::Zip)
    } else if header.starts_with(b"\x1f\x8b") {
        Some(ContentKind::Gzip)
    } else {
        // Tar puts its magic at offset 257.
        reader.seek(SeekFrom::Start(257))?;
        let mut magic = [0u8; 8];
        let n = read_up_to(reader, &mut magic)?;
        let magic = &magic[..n];
        if magic.starts_with(b"ustar\x00\x30\x30") || magic.starts_with(b"ustar\x20\x20\x00") {
            Some(ContentKind::Tar)
        } else {
            None
        }
    };
    Ok(kind)
}

/// Fill as much of `buf` as the reader can supply.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn kind_of(bytes: &[u8]) -> Option<ContentKind> {
        sniff(&mut Cursor::new(bytes.to_vec())).unwrap()
    }

    #[test]
    fn test_recognizes_headers() {
        assert_eq!(kind_of(b"%PDF-1.7 rest"), Some(ContentKind::Pdf));
        assert_eq!(kind_of(b"\x89PNG\r\n\x1a\n...."), Some(ContentKind::Png));
        assert_eq!(kind_of(b"\xFF\xD8\xFF\xE0"), Some(ContentKind::Jpeg));
        assert_eq!(kind_of(b"PK\x03\x04junk"), Some(ContentKind::Zip));
        assert_eq!(kind_of(b"\x1f\x8b\x08"), Some(ContentKind::Gzip));
    }

    #[test]
    fn test_recognizes_tar_at_offset() {
        let mut payload = vec![0u8; 512];
        payload[257..265].copy_from_slice(b"ustar\x00\x30\x30");
        assert_eq!(kind_of(&payload), Some(ContentKind::Tar));
    }

    #[test]
    fn test_unknown_and_short_payloads() {
        assert_eq!(kind_of(b"plain text"), None);
        assert_eq!(kind_of(b""), None);
        assert_eq!(kind_of(b"x"), None);
    }

    #[test]
    fn test_archive_kinds() {
        assert!(ContentKind::Zip.is_archive());
        assert!(ContentKind::Tar.is_archive());
        assert!(ContentKind::Gzip.is_archive());
        assert!(!ContentKind::Pdf.is_archive());
        assert!(!ContentKind::Png.is_archive());
        assert!(!ContentKind::Jpeg.is_archive());
    }
}
