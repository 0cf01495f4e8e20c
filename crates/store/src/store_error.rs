// ---------------------------------------------------------------------------
// StoreError: error type for snapshot save/load
// ---------------------------------------------------------------------------

use std::fmt;

/// Errors that can occur while writing or reading a snapshot file.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error (file not found, permission denied, disk full, etc.)
    Io(std::io::Error),
    /// Bitcode encoding failed.
    Encode(String),
    /// Bitcode decoding failed, or a decoded record holds an impossible value.
    Decode(String),
    /// The file does not start with the snapshot magic bytes.
    NotASnapshot,
    /// Snapshot header or schema is newer than this build supports.
    VersionMismatch { expected_max: u32, found: u32 },
    /// The payload does not match the checksum recorded in the header.
    Corrupted { expected: u32, computed: u32 },
    /// lz4 decompression failed.
    Decompress(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
            StoreError::Encode(msg) => write!(f, "Encoding error: {msg}"),
            StoreError::Decode(msg) => write!(f, "Decoding error: {msg}"),
            StoreError::NotASnapshot => write!(f, "Not a snapshot file (bad magic bytes)"),
            StoreError::VersionMismatch {
                expected_max,
                found,
            } => write!(
                f,
                "Version mismatch: snapshot is v{found}, but this build only supports up to v{expected_max}"
            ),
            StoreError::Corrupted { expected, computed } => write!(
                f,
                "Snapshot is corrupted: checksum mismatch (expected {expected:#010X}, got {computed:#010X})"
            ),
            StoreError::Decompress(msg) => write!(f, "Decompression error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<bitcode::Error> for StoreError {
    fn from(e: bitcode::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl From<lz4_flex::block::DecompressError> for StoreError {
    fn from(e: lz4_flex::block::DecompressError) -> Self {
        StoreError::Decompress(e.to_string())
    }
}
