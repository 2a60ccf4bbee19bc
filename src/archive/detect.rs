//! Content sniffing by magic bytes.

pub const ZIP_CONTENT_TYPE: &str = "application/zip";
pub const GZIP_CONTENT_TYPE: &str = "application/gzip";

/// Number of leading bytes needed to sniff a blob
pub const SNIFF_LEN: usize = 4;

/// Identify the content type of a blob from its leading bytes.
///
/// Zip files may start with a local file header, a spanning marker, or (for an
/// archive without entries) the end of central directory record.
pub fn sniff_content_type(header: &[u8]) -> Option<&'static str> {
    match header {
        [0x50, 0x4B, 0x03, 0x04, ..] | [0x50, 0x4B, 0x05, 0x06, ..] | [0x50, 0x4B, 0x07, 0x08, ..] => {
            Some(ZIP_CONTENT_TYPE)
        }
        [0x1F, 0x8B, ..] => Some(GZIP_CONTENT_TYPE),
        _ => None,
    }
}
