// ---------------------------------------------------------------------------
// file_header – Snapshot file header with magic bytes, version, and checksum
// ---------------------------------------------------------------------------
//
// Header format (28 bytes, fixed-size, little-endian):
//   [0..4]   Magic bytes: "FLDT"
//   [4..8]   Format version (u32)
//   [8..12]  Flags (u32: bit 0 = lz4 compressed payload)
//   [12..20] Timestamp (Unix epoch seconds, u64)
//   [20..24] Uncompressed payload size (u32)
//   [24..28] xxHash32 checksum of the stored payload (everything after the header)
//
// On save: encode Snapshot -> optionally lz4 -> prepend header
// On load: check magic -> check version -> validate checksum -> decompress

use xxhash_rust::xxh32::xxh32;

use crate::store_error::StoreError;

/// Magic bytes identifying a snapshot file.
pub const MAGIC: [u8; 4] = *b"FLDT";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 28;

/// Layout version of the header itself. The snapshot schema has its own
/// version inside the payload.
pub const HEADER_FORMAT_VERSION: u32 = 1;

/// Payload is lz4 block-compressed with its size prepended.
pub const FLAG_COMPRESSED: u32 = 1;

const XXHASH_SEED: u32 = 0;

/// Parsed file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub format_version: u32,
    pub flags: u32,
    pub timestamp: u64,
    pub uncompressed_size: u32,
    pub checksum: u32,
}

impl FileHeader {
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }
}

/// Frame an encoded snapshot: compress it when asked and prepend the header.
pub fn wrap_with_header(encoded: &[u8], compress: bool) -> Result<Vec<u8>, StoreError> {
    let uncompressed_size = u32::try_from(encoded.len()).map_err(|_| {
        StoreError::Encode(format!(
            "snapshot payload of {} bytes exceeds the header size field",
            encoded.len()
        ))
    })?;

    let compressed;
    let (payload, flags) = if compress {
        compressed = lz4_flex::compress_prepend_size(encoded);
        (compressed.as_slice(), FLAG_COMPRESSED)
    } else {
        (encoded, 0)
    };

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&HEADER_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.extend_from_slice(&uncompressed_size.to_le_bytes());
    out.extend_from_slice(&xxh32(payload, XXHASH_SEED).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Parse and validate the header, returning it with the stored payload.
///
/// # Errors
///
/// - `NotASnapshot` if the magic bytes are missing
/// - `Decode` if the buffer is shorter than a header
/// - `VersionMismatch` if the header comes from a newer build
/// - `Corrupted` if the checksum does not match
pub fn unwrap_header(bytes: &[u8]) -> Result<(FileHeader, &[u8]), StoreError> {
    if bytes.len() < 4 || bytes[..4] != MAGIC {
        return Err(StoreError::NotASnapshot);
    }
    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::Decode(format!(
            "snapshot is too short ({} bytes, need at least {HEADER_SIZE} for header)",
            bytes.len()
        )));
    }

    let mut ts = [0u8; 8];
    ts.copy_from_slice(&bytes[12..20]);
    let header = FileHeader {
        format_version: le_u32(bytes, 4),
        flags: le_u32(bytes, 8),
        timestamp: u64::from_le_bytes(ts),
        uncompressed_size: le_u32(bytes, 20),
        checksum: le_u32(bytes, 24),
    };

    if header.format_version > HEADER_FORMAT_VERSION {
        return Err(StoreError::VersionMismatch {
            expected_max: HEADER_FORMAT_VERSION,
            found: header.format_version,
        });
    }

    let payload = &bytes[HEADER_SIZE..];
    let computed = xxh32(payload, XXHASH_SEED);
    if computed != header.checksum {
        return Err(StoreError::Corrupted {
            expected: header.checksum,
            computed,
        });
    }

    Ok((header, payload))
}

/// Undo the compression recorded in `header`, checking the declared size.
pub fn decode_payload(header: &FileHeader, payload: &[u8]) -> Result<Vec<u8>, StoreError> {
    let raw = if header.is_compressed() {
        lz4_flex::decompress_size_prepended(payload)?
    } else {
        payload.to_vec()
    };
    if raw.len() != header.uncompressed_size as usize {
        return Err(StoreError::Decode(format!(
            "payload is {} bytes, header declares {}",
            raw.len(),
            header.uncompressed_size
        )));
    }
    Ok(raw)
}
