//! Content and perceptual fingerprints
//!
//! [`ContentHash`] is a SHA-256 digest stored as a 32-byte array, used for
//! exact byte-level deduplication. [`PerceptualHash`] is a 64-bit difference
//! hash used to detect near-duplicate images by Hamming distance.

use std::fmt;
use std::str::FromStr;

use image::DynamicImage;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Error returned when a hash string cannot be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind} hash: {value}")]
pub struct ParseHashError {
    kind: &'static str,
    value: String,
}

/// SHA-256 digest of a stored artifact's bytes
///
/// Serialized as a lowercase 64-character hex string so ledger rows and JSON
/// output stay human readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash a complete byte payload
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(digest.into())
    }

    /// Parse a 64-character hex string (case insensitive)
    pub fn from_hex(value: &str) -> Result<Self, ParseHashError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value, &mut bytes).map_err(|_| ParseHashError {
            kind: "content",
            value: value.to_string(),
        })?;
        Ok(Self(bytes))
    }

    /// Lowercase hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Incremental SHA-256 over a streamed transfer
#[derive(Default)]
pub struct ContentHasher(Sha256);

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    pub fn finish(self) -> ContentHash {
        ContentHash(self.0.finalize().into())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ContentHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// 64-bit difference hash (dHash)
///
/// The image is reduced to a 9x8 grayscale thumbnail; each bit records
/// whether a pixel is brighter than its right-hand neighbour. Visually
/// similar images differ in few bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    const WIDTH: u32 = 9;
    const HEIGHT: u32 = 8;

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Fingerprint an already decoded image
    pub fn of_image(image: &DynamicImage) -> Self {
        let thumb = image
            .resize_exact(Self::WIDTH, Self::HEIGHT, FilterType::Triangle)
            .to_luma8();

        let mut bits = 0u64;
        for y in 0..Self::HEIGHT {
            for x in 0..Self::WIDTH - 1 {
                let left = thumb.get_pixel(x, y).0[0];
                let right = thumb.get_pixel(x + 1, y).0[0];
                bits <<= 1;
                if left > right {
                    bits |= 1;
                }
            }
        }
        Self(bits)
    }

    /// Fingerprint encoded image bytes, `None` if they do not decode
    pub fn of_bytes(bytes: &[u8]) -> Option<Self> {
        image::load_from_memory(bytes)
            .ok()
            .map(|img| Self::of_image(&img))
    }

    /// Number of differing bits
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    pub fn is_near(&self, other: &PerceptualHash, max_distance: u32) -> bool {
        self.distance(other) <= max_distance
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for PerceptualHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(ParseHashError {
                kind: "perceptual",
                value: s.to_string(),
            });
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| ParseHashError {
                kind: "perceptual",
                value: s.to_string(),
            })
    }
}

impl From<PerceptualHash> for String {
    fn from(hash: PerceptualHash) -> Self {
        hash.to_string()
    }
}

impl TryFrom<String> for PerceptualHash {
    type Error = ParseHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
