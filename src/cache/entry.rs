//! Cache Entry Module
//!
//! Entry metadata held in memory and the framing of payload records on disk.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::cache::CacheKey;

// == Cache Entry ==
/// Metadata for one stored payload. The payload itself lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Payload length in bytes
    pub size_bytes: u64,
    /// Logical tick of the last read hit or write
    pub last_access: u64,
    /// Logical tick of the write that created this version
    pub inserted_at: u64,
    /// Wall-clock write time (Unix milliseconds), used for max age
    pub stored_at_ms: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates metadata for a payload written at logical time `tick`.
    pub fn new(key: CacheKey, size_bytes: u64, tick: u64) -> Self {
        Self {
            key,
            size_bytes,
            last_access: tick,
            inserted_at: tick,
            stored_at_ms: current_timestamp_ms(),
        }
    }

    // == Is Expired ==
    /// Checks the entry against an optional max age.
    ///
    /// An entry is expired once its age is greater than or equal to
    /// `max_age`; no max age means it never expires.
    pub fn is_expired(&self, max_age: Option<Duration>) -> bool {
        match max_age {
            Some(max_age) => self.age_ms() >= max_age.as_millis() as u64,
            None => false,
        }
    }

    /// Milliseconds since the entry was written.
    pub fn age_ms(&self) -> u64 {
        current_timestamp_ms().saturating_sub(self.stored_at_ms)
    }
}

// == Record Framing ==
/// Magic prefix of every content record.
pub const RECORD_MAGIC: &[u8; 4] = b"RCE1";

/// magic + u64 length + sha256 digest
pub const RECORD_HEADER_LEN: usize = 4 + 8 + 32;

/// Frames `payload` as `magic | len (LE) | sha256 | payload`.
pub fn encode_record(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_HEADER_LEN + payload.len());
    out.extend_from_slice(RECORD_MAGIC);
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&Sha256::digest(payload));
    out.extend_from_slice(payload);
    out
}

/// Payload length declared by a record header, if the header is well formed.
pub fn record_payload_len(header: &[u8]) -> Result<u64, String> {
    if header.len() < RECORD_HEADER_LEN {
        return Err(format!("record header truncated at {} bytes", header.len()));
    }
    if &header[..4] != RECORD_MAGIC {
        return Err("bad record magic".to_string());
    }
    let mut len = [0u8; 8];
    len.copy_from_slice(&header[4..12]);
    Ok(u64::from_le_bytes(len))
}

/// Validates a full record and returns the payload slice.
pub fn decode_record(record: &[u8]) -> Result<&[u8], String> {
    let declared = record_payload_len(record)?;
    let payload = &record[RECORD_HEADER_LEN..];
    if payload.len() as u64 != declared {
        return Err(format!(
            "payload length {} does not match header length {}",
            payload.len(),
            declared
        ));
    }
    if Sha256::digest(payload).as_slice() != &record[12..RECORD_HEADER_LEN] {
        return Err("payload checksum mismatch".to_string());
    }
    Ok(payload)
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
