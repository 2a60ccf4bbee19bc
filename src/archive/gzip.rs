use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{ArchiveDecoder, DecodeError, ExtractedMember, MemberReader};

/// Opens a gzip stream as a single member.
///
/// Concatenated gzip members (appended logs) inflate into one continuous
/// member. The whole blob is inflated in one pass before the member is
/// produced, so a member is never observed half written.
pub struct GzipDecoder {
    member_name: String,
    max_member_size: u64,
}

impl GzipDecoder {
    /// Decoder whose member is named after `source_key`
    pub fn for_key(source_key: &str, max_member_size: u64) -> Result<Self, DecodeError> {
        let member_name = member_name_for_key(source_key)
            .ok_or_else(|| DecodeError::InvalidName(source_key.to_string()))?;
        Ok(GzipDecoder {
            member_name,
            max_member_size,
        })
    }
}

/// Strip the `.gz` suffix from a key: `logs/day1.csv.gz` becomes `logs/day1.csv`
/// and `report.gz` becomes `report`.
///
/// The key is cut at its last `.gz` (any case). Returns `None` when that leaves
/// nothing to name the member with.
pub fn member_name_for_key(key: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `key`
    let cut = key.to_ascii_lowercase().rfind(".gz")?;
    let name = &key[..cut];
    if name.is_empty() || name.ends_with('/') {
        return None;
    }
    Some(name.to_string())
}

impl ArchiveDecoder for GzipDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn MemberReader>, DecodeError> {
        Ok(Box::new(GzipMember {
            path: path.to_path_buf(),
            names: vec![self.member_name.clone()],
            max_member_size: self.max_member_size,
        }))
    }
}

/// The single member of a gzip blob, inflated when read
pub struct GzipMember {
    path: PathBuf,
    names: Vec<String>,
    max_member_size: u64,
}

impl MemberReader for GzipMember {
    fn names(&self) -> &[String] {
        &self.names
    }

    fn read(&mut self, index: usize) -> Result<ExtractedMember, DecodeError> {
        let name = self
            .names
            .get(index)
            .cloned()
            .ok_or_else(|| super::no_such_member(index))?;
        let compressed = std::fs::read(&self.path)?;
        let limit = self.max_member_size;

        // Bytes trailing the last member must form another valid member
        let mut content = Vec::new();
        MultiGzDecoder::new(compressed.as_slice())
            .take(limit.saturating_add(1))
            .read_to_end(&mut content)
            .map_err(|e| DecodeError::Corrupt(e.to_string()))?;

        if content.len() as u64 > limit {
            return Err(DecodeError::TooLarge { name, limit });
        }

        Ok(ExtractedMember {
            name,
            content: Bytes::from(content),
        })
    }
}
