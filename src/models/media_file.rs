//! File and directory records exchanged by bulk export/import.

use bytes::Bytes;

/// A media file with its content, keyed by media-relative filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaFile {
    pub filename: String,
    pub content: Bytes,
}

/// A file handed to a bulk import.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportFile {
    pub filename: String,
    /// Directory the filename is relative to, if any.
    pub directory: Option<String>,
    pub content: Bytes,
}

impl From<MediaFile> for ImportFile {
    fn from(file: MediaFile) -> Self {
        Self {
            filename: file.filename,
            directory: None,
            content: file.content,
        }
    }
}

/// A simulated directory entry in the flat object namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subdirectory {
    pub name: String,
}

/// Content populated by a successful `load_by_filename`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedFile {
    pub id: String,
    pub filename: String,
    pub content: Bytes,
    /// Hex MD5 of `content`.
    pub checksum: String,
}

impl LoadedFile {
    pub fn new(filename: &str, content: Bytes) -> Self {
        let checksum = format!("{:x}", md5::compute(&content));
        Self {
            id: filename.to_string(),
            filename: filename.to_string(),
            content,
            checksum,
        }
    }
}
