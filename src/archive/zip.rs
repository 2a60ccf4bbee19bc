use bytes::Bytes;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zip::ZipArchive;

use super::{ArchiveDecoder, DecodeError, ExtractedMember, MemberReader};

/// Upper bound on buffer space reserved from an entry's declared size
const PREALLOCATE_LIMIT: u64 = 16 * 1024 * 1024;

/// Opens zip archives.
///
/// Directory entries carry no content and are skipped. Entry names are kept
/// verbatim, so members may land under a different prefix than the archive.
pub struct ZipDecoder {
    max_member_size: u64,
}

impl ZipDecoder {
    pub fn new(max_member_size: u64) -> Self {
        ZipDecoder { max_member_size }
    }
}

fn corrupt(err: impl std::fmt::Display) -> DecodeError {
    DecodeError::Corrupt(err.to_string())
}

impl ArchiveDecoder for ZipDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn MemberReader>, DecodeError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(corrupt)?;
        let limit = self.max_member_size;

        let mut indices = Vec::with_capacity(archive.len());
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index).map_err(corrupt)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            // Reject oversized entries before anything is uploaded
            if entry.size() > limit {
                return Err(DecodeError::TooLarge { name, limit });
            }
            indices.push(index);
            names.push(name);
        }

        Ok(Box::new(ZipMembers {
            archive,
            indices,
            names,
            max_member_size: limit,
        }))
    }
}

/// File entries of an open zip archive
pub struct ZipMembers {
    archive: ZipArchive<BufReader<File>>,
    indices: Vec<usize>,
    names: Vec<String>,
    max_member_size: u64,
}

impl MemberReader for ZipMembers {
    fn names(&self) -> &[String] {
        &self.names
    }

    fn read(&mut self, index: usize) -> Result<ExtractedMember, DecodeError> {
        let entry_index = *self
            .indices
            .get(index)
            .ok_or_else(|| super::no_such_member(index))?;
        let name = self.names[index].clone();
        let limit = self.max_member_size;

        let mut entry = self.archive.by_index(entry_index).map_err(corrupt)?;
        // The declared size can lie; cap what is actually inflated too
        let mut content = Vec::with_capacity(entry.size().min(PREALLOCATE_LIMIT) as usize);
        (&mut entry)
            .take(limit.saturating_add(1))
            .read_to_end(&mut content)
            .map_err(|e| DecodeError::Corrupt(format!("{name}: {e}")))?;
        if content.len() as u64 > limit {
            return Err(DecodeError::TooLarge { name, limit });
        }

        Ok(ExtractedMember {
            name,
            content: Bytes::from(content),
        })
    }
}
