//! Session record encoding: `postcard` payload behind a fixed header.
//!
//! ```text
//! +-------+---------+-------------+-----------------+
//! | GSTP  | version | length (LE) | postcard bytes  |
//! | 4 B   | 1 B     | 4 B         | length B        |
//! +-------+---------+-------------+-----------------+
//! ```

use crate::session::SessionState;
use crate::GearstepError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAGIC: [u8; 4] = *b"GSTP";
pub const FORMAT_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 9;

// =============================================================================
// FINGERPRINT
// =============================================================================

/// 64-bit fingerprint of a canonical config encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigFingerprint(pub u64);

impl ConfigFingerprint {
    #[cfg(not(feature = "crypto-hash"))]
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let hash = bytes
            .iter()
            .fold(OFFSET, |acc, &b| (acc ^ u64::from(b)).wrapping_mul(PRIME));
        Self(hash)
    }

    #[cfg(feature = "crypto-hash")]
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let digest = blake3::hash(bytes);
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest.as_bytes()[..8]);
        Self(u64::from_le_bytes(first))
    }
}

impl fmt::Display for ConfigFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// A session as handed to the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    /// Fingerprint of the stage config the session was created under.
    pub fingerprint: ConfigFingerprint,
    pub state: SessionState,
}

/// Encode a record with header.
pub fn encode_record(record: &SessionRecord) -> Result<Vec<u8>, GearstepError> {
    let payload =
        postcard::to_allocvec(record).map_err(|e| GearstepError::Snapshot(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| GearstepError::Snapshot(format!("record too large: {} bytes", payload.len())))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN.saturating_add(payload.len()));
    bytes.extend_from_slice(&MAGIC);
    bytes.push(FORMAT_VERSION);
    bytes.extend_from_slice(&length.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a record, checking magic, version and declared length.
pub fn decode_record(bytes: &[u8]) -> Result<SessionRecord, GearstepError> {
    let Some((header, payload)) = bytes.split_at_checked(HEADER_LEN) else {
        return Err(GearstepError::Snapshot(format!(
            "record too short: {} bytes",
            bytes.len()
        )));
    };

    if header[..4] != MAGIC {
        return Err(GearstepError::Snapshot("bad magic".to_string()));
    }
    if header[4] != FORMAT_VERSION {
        return Err(GearstepError::Snapshot(format!(
            "unsupported format version {} (expected {FORMAT_VERSION})",
            header[4]
        )));
    }

    let mut length = [0u8; 4];
    length.copy_from_slice(&header[5..HEADER_LEN]);
    let declared = u32::from_le_bytes(length) as usize;
    if declared != payload.len() {
        return Err(GearstepError::Snapshot(format!(
            "length mismatch: header says {declared}, payload is {}",
            payload.len()
        )));
    }

    postcard::from_bytes(payload).map_err(|e| GearstepError::Snapshot(e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================
