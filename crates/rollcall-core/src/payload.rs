//! Face payload codec.
//!
//! A capture arrives as a data URL (`data:image/png;base64,...`) or as bare
//! base64. It is stored as a JSON payload carrying the capture itself, a
//! 16×16 grayscale signature and a SHA-256 hash of the decoded bytes. Older
//! rows hold only the raw capture string; [`FacePayload::parse`] accepts both
//! and reports when cached fields had to be recomputed.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

// --- Named constants ---
/// Side length of the downsampled signature grid.
pub const SIGNATURE_SIZE: u32 = 16;
/// Number of cells in a signature.
pub const SIGNATURE_LEN: usize = (SIGNATURE_SIZE * SIGNATURE_SIZE) as usize;
const DATA_URL_MARKER: &str = "base64,";

/// Padding is optional and trailing bits are ignored: browsers and older
/// clients disagree on both.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("capture could not be decoded into image bytes")]
    Decode,
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Extract the image bytes from a data URL or bare base64 capture.
///
/// Characters outside the base64 alphabet (whitespace, padding, line breaks)
/// are dropped; spaces are read as `+` since form encoding mangles them.
/// Returns `None` when nothing decodes.
pub fn decode_capture(capture: &str) -> Option<Vec<u8>> {
    let encoded = match capture.split_once(DATA_URL_MARKER) {
        Some((_, rest)) => rest,
        None => capture,
    };

    let cleaned: String = encoded
        .chars()
        .map(|c| if c == ' ' { '+' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '/')
        .collect();

    match LENIENT_BASE64.decode(cleaned.as_bytes()) {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "capture is not valid base64");
            None
        }
    }
}

/// SHA-256 of the decoded capture, lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// 16×16 grayscale downsample of a capture, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn new(cells: Vec<u8>) -> Self {
        Self(cells)
    }

    /// Decode `bytes` as a bitmap and resample it to the signature grid.
    ///
    /// Returns `None` if the bytes are not a decodable image.
    pub fn from_image_bytes(bytes: &[u8]) -> Option<Self> {
        let img = match image::load_from_memory(bytes) {
            Ok(img) => img,
            Err(e) => {
                tracing::debug!(error = %e, "capture is not a decodable bitmap");
                return None;
            }
        };
        if img.width() == 0 || img.height() == 0 {
            return None;
        }

        let small = img
            .resize_exact(SIGNATURE_SIZE, SIGNATURE_SIZE, FilterType::Triangle)
            .to_rgb8();

        let cells: Vec<u8> = small
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                let sum = r as f32 + g as f32 + b as f32;
                (sum / 3.0).round() as u8
            })
            .collect();

        if cells.is_empty() {
            None
        } else {
            Some(Self(cells))
        }
    }

    /// Read a signature from a stored JSON value.
    ///
    /// Anything other than a non-empty array of integers in `0..=255` is
    /// treated as missing.
    fn from_json(value: &serde_json::Value) -> Option<Self> {
        let items = value.as_array()?;
        if items.is_empty() {
            return None;
        }
        items
            .iter()
            .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(Self)
    }

    pub fn cells(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mean absolute per-cell difference. 0 = identical.
    ///
    /// `None` when the lengths differ or either side is empty.
    pub fn distance(&self, other: &Signature) -> Option<f64> {
        if self.0.is_empty() || self.0.len() != other.0.len() {
            return None;
        }
        let sum: u64 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a.abs_diff(*b) as u64)
            .sum();
        Some(sum as f64 / self.0.len() as f64)
    }
}

/// Stored form of a face capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacePayload {
    /// The capture exactly as submitted.
    pub image: String,
    pub signature: Option<Signature>,
    pub hash: Option<String>,
}

/// Result of reading a stored payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayload {
    pub payload: FacePayload,
    /// A cached field was missing and has been recomputed.
    pub needs_update: bool,
}

impl ParsedPayload {
    /// Whether the normalized payload should be written back to storage.
    pub fn should_backfill(&self) -> bool {
        self.needs_update && (self.payload.signature.is_some() || self.payload.hash.is_some())
    }
}

/// On-disk JSON shape. `signature` stays untyped so a malformed cache is
/// recomputed instead of rejecting the row.
#[derive(Deserialize)]
struct StoredPayload {
    image: String,
    #[serde(default)]
    signature: Option<serde_json::Value>,
    #[serde(default)]
    hash: Option<String>,
}

impl FacePayload {
    /// Build a payload from a fresh capture.
    ///
    /// Fails only when neither a signature nor a hash can be derived, which
    /// in practice means the capture did not decode to any bytes.
    pub fn encode(capture: &str) -> Result<Self, PayloadError> {
        let bytes = decode_capture(capture);
        let hash = bytes.as_deref().map(content_hash);
        let signature = bytes.as_deref().and_then(Signature::from_image_bytes);

        if signature.is_none() && hash.is_none() {
            return Err(PayloadError::Decode);
        }

        tracing::debug!(
            bytes = bytes.as_ref().map_or(0, Vec::len),
            has_signature = signature.is_some(),
            "encoded face payload"
        );

        Ok(Self {
            image: capture.to_string(),
            signature,
            hash,
        })
    }

    /// Serialize to the JSON storage form.
    pub fn to_storage(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decoded image bytes of the stored capture.
    pub fn image_bytes(&self) -> Option<Vec<u8>> {
        decode_capture(&self.image)
    }

    /// Read a stored payload, accepting both the JSON form and a bare
    /// legacy capture string.
    pub fn parse(stored: &str) -> ParsedPayload {
        match serde_json::from_str::<StoredPayload>(stored) {
            Ok(raw) => Self::from_stored(raw),
            Err(_) => Self::from_legacy(stored),
        }
    }

    fn from_stored(raw: StoredPayload) -> ParsedPayload {
        let cached_signature = raw.signature.as_ref().and_then(Signature::from_json);
        let cached_hash = raw.hash.filter(|h| !h.is_empty());

        let bytes = if cached_signature.is_none() || cached_hash.is_none() {
            decode_capture(&raw.image)
        } else {
            None
        };

        let mut needs_update = false;

        let signature = match cached_signature {
            Some(sig) => Some(sig),
            None => {
                let sig = bytes.as_deref().and_then(Signature::from_image_bytes);
                needs_update |= sig.is_some();
                sig
            }
        };

        let hash = match cached_hash {
            Some(hash) => Some(hash),
            None => {
                let hash = bytes.as_deref().map(content_hash);
                needs_update |= hash.is_some();
                hash
            }
        };

        ParsedPayload {
            payload: Self {
                image: raw.image,
                signature,
                hash,
            },
            needs_update,
        }
    }

    fn from_legacy(stored: &str) -> ParsedPayload {
        let bytes = decode_capture(stored);
        let hash = bytes.as_deref().map(content_hash);
        let signature = bytes.as_deref().and_then(Signature::from_image_bytes);
        let needs_update = hash.is_some() || signature.is_some();

        ParsedPayload {
            payload: Self {
                image: stored.to_string(),
                signature,
                hash,
            },
            needs_update,
        }
    }
}
