//! Binary serialization and deserialization of compiled rulesets.
//!
//! Compiling a script is cheap, but callers that load the same ruleset on
//! every request can persist the [`CompiledRuleset`] instead. The format is
//! a 32-byte fixed header followed by a bincode-encoded payload.
//!
//! ## Wire Format
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic bytes: b"RSQL"
//! 4       2     Format version (u16, little-endian)
//! 6       2     Engine version (u16, little-endian)
//! 8       4     Flags (u32, reserved)
//! 12      4     Payload length in bytes (u32, little-endian)
//! 16      16    BLAKE3 hash of the payload (truncated to 16 bytes)
//! 32..    var   Bincode-encoded payload
//! ```
//!
//! ## Versioning
//!
//! The format version in the header must match exactly. If it does not,
//! deserialization fails immediately with [`DeserializeError::IncompatibleVersion`].
//! The engine version is informational only.
//!
//! ## Staleness
//!
//! When the script text is passed to [`encode`], its full BLAKE3 digest is
//! stored in the payload. [`source_matches`] compares it against the current
//! script so a cache can be rebuilt when the source changes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CompiledRuleset, RuleType};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAGIC: &[u8; 4] = b"RSQL";
const FORMAT_VERSION: u16 = 1;
const ENGINE_VERSION: u16 = 1;
const HEADER_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when serializing a [`CompiledRuleset`] to bytes.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to encode compiled ruleset: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("payload of {0} bytes exceeds the 4 GiB format limit")]
    TooLarge(usize),

    #[error("I/O error during serialization: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when deserializing a [`CompiledRuleset`] from bytes.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("not a compiled rulescript binary: invalid magic bytes")]
    BadMagic,

    #[error("incompatible format version: blob is v{blob}, engine supports v{supported}")]
    IncompatibleVersion { blob: u16, supported: u16 },

    #[error("integrity check failed: BLAKE3 checksum mismatch")]
    ChecksumMismatch,

    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("failed to decode payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("I/O error during deserialization: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    metadata: Metadata,
    ruleset: CompiledRuleset,
}

#[derive(Debug, Serialize, Deserialize)]
struct Metadata {
    rule_count: usize,
    warning_count: usize,
    source_digest: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(payload: &Payload) -> Result<(), DeserializeError> {
    let rs = &payload.ruleset;
    let rule_count = rs.compiled_rules.len();

    if payload.metadata.rule_count != rule_count {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} rules but payload has {rule_count}",
            payload.metadata.rule_count
        )));
    }
    if payload.metadata.warning_count != rs.compilation_warnings.len() {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} warnings but payload has {}",
            payload.metadata.warning_count,
            rs.compilation_warnings.len()
        )));
    }
    if rs.total_rules != rule_count {
        return Err(DeserializeError::Validation(format!(
            "total_rules is {} but {rule_count} compiled rules exist",
            rs.total_rules
        )));
    }

    for (rule_type, stored) in [
        (RuleType::Inclusion, rs.inclusion_rules),
        (RuleType::Exclusion, rs.exclusion_rules),
        (RuleType::Priority, rs.priority_rules),
        (RuleType::Bonus, rs.bonus_rules),
    ] {
        let actual = rs
            .compiled_rules
            .iter()
            .filter(|r| r.rule_type == rule_type)
            .count();
        if actual != stored {
            return Err(DeserializeError::Validation(format!(
                "{rule_type} count is {stored} but {actual} {rule_type} rules exist"
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Header I/O
// ---------------------------------------------------------------------------

fn write_header(buf: &mut Vec<u8>, payload: &[u8]) -> Result<(), SerializeError> {
    let payload_len =
        u32::try_from(payload.len()).map_err(|_| SerializeError::TooLarge(payload.len()))?;
    let hash = blake3::hash(payload);

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&ENGINE_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // flags (reserved)
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&hash.as_bytes()[..16]);
    Ok(())
}

#[allow(clippy::cast_possible_truncation)] // HEADER_SIZE is 32, always fits in u32
fn read_header(bytes: &[u8]) -> Result<(u16, u32, [u8; 16]), DeserializeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DeserializeError::LengthMismatch {
            expected: HEADER_SIZE as u32,
            actual: bytes.len(),
        });
    }

    if &bytes[0..4] != MAGIC {
        return Err(DeserializeError::BadMagic);
    }

    let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
    // bytes[6..8] is engine_version (informational)
    // bytes[8..12] is flags (reserved)
    let payload_len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

    let mut hash = [0u8; 16];
    hash.copy_from_slice(&bytes[16..32]);

    Ok((format_version, payload_len, hash))
}

fn checked_payload(bytes: &[u8]) -> Result<Payload, DeserializeError> {
    let (format_version, payload_len, stored_hash) = read_header(bytes)?;

    if format_version != FORMAT_VERSION {
        return Err(DeserializeError::IncompatibleVersion {
            blob: format_version,
            supported: FORMAT_VERSION,
        });
    }

    let payload_end = HEADER_SIZE + payload_len as usize;
    if bytes.len() < payload_end {
        return Err(DeserializeError::LengthMismatch {
            expected: payload_len,
            actual: bytes.len() - HEADER_SIZE,
        });
    }
    let payload = &bytes[HEADER_SIZE..payload_end];

    if blake3::hash(payload).as_bytes()[..16] != stored_hash {
        return Err(DeserializeError::ChecksumMismatch);
    }

    let (decoded, _): (Payload, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
    validate(&decoded)?;
    Ok(decoded)
}

// ---------------------------------------------------------------------------
// Public encode/decode
// ---------------------------------------------------------------------------

pub(crate) fn encode(
    ruleset: &CompiledRuleset,
    source_text: Option<&str>,
) -> Result<Vec<u8>, SerializeError> {
    let payload = Payload {
        metadata: Metadata {
            rule_count: ruleset.compiled_rules.len(),
            warning_count: ruleset.compilation_warnings.len(),
            source_digest: source_text.map(|s| *blake3::hash(s.as_bytes()).as_bytes()),
        },
        ruleset: ruleset.clone(),
    };
    let payload = bincode::serde::encode_to_vec(&payload, bincode::config::standard())?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    write_header(&mut buf, &payload)?;
    buf.extend_from_slice(&payload);
    tracing::debug!(
        ruleset = %ruleset.ruleset_code,
        bytes = buf.len(),
        "encoded compiled ruleset"
    );
    Ok(buf)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<CompiledRuleset, DeserializeError> {
    checked_payload(bytes).map(|payload| payload.ruleset)
}

/// Whether `bytes` were encoded from exactly `source_text`.
///
/// Returns `Ok(false)` when the blob carries no source digest.
///
/// # Errors
///
/// Returns [`DeserializeError`] when `bytes` is not a valid blob.
pub fn source_matches(bytes: &[u8], source_text: &str) -> Result<bool, DeserializeError> {
    let payload = checked_payload(bytes)?;
    Ok(payload
        .metadata
        .source_digest
        .is_some_and(|digest| digest == *blake3::hash(source_text.as_bytes()).as_bytes()))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
