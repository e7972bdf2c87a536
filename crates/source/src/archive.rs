use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

/// Upper bound on the buffer reserved from an entry's declared size, which
/// comes from the untrusted archive header.
const PREALLOCATION_LIMIT: u64 = 1 << 20;

/// Raw markup of every chapter of a work, keyed by chapter id.
///
/// The API delivers a zip whose entries are named after chapter ids, with or
/// without an extension. Entries whose stem is not numeric are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterArchive {
    chapters: HashMap<u64, String>,
}

impl ChapterArchive {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).or_raise(|| ErrorKind::InvalidArchive)?;
        let mut chapters = HashMap::with_capacity(zip.len());
        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).or_raise(|| ErrorKind::InvalidArchive)?;
            if entry.is_dir() {
                continue;
            }
            let Some(id) = Self::chapter_id(entry.name()) else {
                tracing::debug!(name = entry.name(), "Skipping archive entry without a chapter id");
                continue;
            };
            let mut raw = Vec::with_capacity(entry.size().min(PREALLOCATION_LIMIT) as usize);
            entry.read_to_end(&mut raw).or_raise(|| ErrorKind::InvalidArchive)?;
            chapters.insert(id, String::from_utf8_lossy(&raw).into_owned());
        }
        Ok(Self { chapters })
    }

    fn chapter_id(name: &str) -> Option<u64> {
        Path::new(name).file_stem()?.to_str()?.parse().ok()
    }

    pub fn get(&self, chapter_id: u64) -> Option<&str> {
        self.chapters.get(&chapter_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}

/// Builds an archive in the same shape the API serves. Used by tests here
/// and in dependent crates.
#[cfg(any(test, feature = "mock"))]
pub fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in entries {
            writer.start_file(*name, options).expect("zip entry");
            writer.write_all(content.as_bytes()).expect("zip write");
        }
        writer.finish().expect("zip finish");
    }
    buffer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_entries_by_chapter_id() {
        let bytes = build_archive(&[("1458516761", "<p>Ganesh</p>"), ("42.html", "<p>Other</p>")]);
        let archive = ChapterArchive::from_bytes(&bytes).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.get(1458516761), Some("<p>Ganesh</p>"));
        assert_eq!(archive.get(42), Some("<p>Other</p>"));
    }

    #[test]
    fn ignores_non_numeric_entries() {
        let bytes = build_archive(&[("README", "hello"), ("7", "<p>x</p>")]);
        let archive = ChapterArchive::from_bytes(&bytes).unwrap();
        assert_eq!(archive.len(), 1);
        assert!(archive.get(7).is_some());
    }

    #[test]
    fn declared_sizes_are_not_trusted() {
        let mut bytes = build_archive(&[("7", "<p>x</p>")]);
        // Claim nearly 4 GiB uncompressed in the local and central headers.
        for (signature, offset) in [([0x50, 0x4B, 0x03, 0x04], 22), ([0x50, 0x4B, 0x01, 0x02], 24)] {
            let at = bytes.windows(4).position(|w| w == signature).unwrap() + offset;
            bytes[at..at + 4].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        }
        // Rejecting the entry is as good as reading it; reserving the claimed
        // size up front is not.
        if let Ok(archive) = ChapterArchive::from_bytes(&bytes) {
            assert_eq!(archive.get(7), Some("<p>x</p>"));
        }
    }

    #[test]
    fn rejects_garbage() {
        let err = ChapterArchive::from_bytes(b"definitely not a zip").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidArchive));
    }
}
