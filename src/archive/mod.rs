pub mod detect;
pub mod gzip;
pub mod zip;

use bytes::Bytes;
use std::fmt;
use std::io;
use std::path::Path;
use thiserror::Error;

pub use self::gzip::GzipDecoder;
pub use self::zip::ZipDecoder;

/// Archive kinds the pipeline can unwrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Zip,
    Gzip,
}

impl ArchiveFormat {
    /// Infer the format from an object key.
    ///
    /// Any key containing `.gz` (case-insensitive) is treated as gzip, everything
    /// else as zip. The guess is verified against the content before decoding.
    pub fn from_key(key: &str) -> Self {
        if key.to_ascii_lowercase().contains(".gz") {
            ArchiveFormat::Gzip
        } else {
            ArchiveFormat::Zip
        }
    }

    /// MIME type the content must sniff as
    pub fn content_type(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => detect::ZIP_CONTENT_TYPE,
            ArchiveFormat::Gzip => detect::GZIP_CONTENT_TYPE,
        }
    }

    /// File extension used for scratch blobs
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Gzip => "gz",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveFormat::Zip => f.write_str("zip"),
            ArchiveFormat::Gzip => f.write_str("gzip"),
        }
    }
}

/// One file decoded out of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMember {
    /// Object key the member is uploaded under
    pub name: String,
    pub content: Bytes,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("archive is corrupt: {0}")]
    Corrupt(String),

    #[error("member '{name}' is too large to extract safely: exceeds {limit} byte limit")]
    TooLarge { name: String, limit: u64 },

    #[error("cannot derive a member name from key '{0}'")]
    InvalidName(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Trait for opening a downloaded archive
pub trait ArchiveDecoder: Send + Sync {
    /// Open the archive at `path` and list its members without inflating them
    fn open(&self, path: &Path) -> Result<Box<dyn MemberReader>, DecodeError>;
}

/// Members of an opened archive, inflated one at a time.
///
/// Only the member being read is held in memory, so peak usage is bounded by
/// the largest member rather than the whole archive.
pub trait MemberReader: Send {
    /// Member names in archive order
    fn names(&self) -> &[String];

    /// Inflate the member at `index`
    fn read(&mut self, index: usize) -> Result<ExtractedMember, DecodeError>;

    fn len(&self) -> usize {
        self.names().len()
    }

    fn is_empty(&self) -> bool {
        self.names().is_empty()
    }
}

fn no_such_member(index: usize) -> DecodeError {
    DecodeError::Io(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("no member at index {index}"),
    ))
}

/// Build the decoder for `format`. `source_key` names the gzip member.
pub fn decoder_for(
    format: ArchiveFormat,
    source_key: &str,
    max_member_size: u64,
) -> Result<Box<dyn ArchiveDecoder>, DecodeError> {
    Ok(match format {
        ArchiveFormat::Zip => Box::new(ZipDecoder::new(max_member_size)),
        ArchiveFormat::Gzip => Box::new(GzipDecoder::for_key(source_key, max_member_size)?),
    })
}

/// Open the archive at `path` in one call
pub fn open(
    path: &Path,
    format: ArchiveFormat,
    source_key: &str,
    max_member_size: u64,
) -> Result<Box<dyn MemberReader>, DecodeError> {
    decoder_for(format, source_key, max_member_size)?.open(path)
}
