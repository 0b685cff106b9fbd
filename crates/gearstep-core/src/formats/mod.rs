//! # Formats
//!
//! Binary session record format and config fingerprinting.
//!
//! File and network I/O stay in the app layer; this module only converts
//! between values and bytes.

mod record;

pub use record::{
    ConfigFingerprint, FORMAT_VERSION, HEADER_LEN, MAGIC, SessionRecord, decode_record,
    encode_record,
};
