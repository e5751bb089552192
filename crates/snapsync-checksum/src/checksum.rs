//! Content checksums
//!
//! Provides [`Checksum`], the 32-byte BLAKE3 digest that identifies every node
//! of the workspace tree, and [`ChecksumWriter`], the framed builder used to
//! derive node checksums from their fields.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte content checksum (BLAKE3)
///
/// Two values built from identical content are always equal, regardless of
/// where or when they were computed. Cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Wrap raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Underlying digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a checksum from a byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ChecksumError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| ChecksumError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Digest of raw bytes, without framing
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Checksum of a document's text content
    ///
    /// This is the value carried as the baseline of a text delta, so both
    /// sides of a synchronization must derive it the same way.
    #[must_use]
    pub fn of_text(text: &str) -> Self {
        let mut writer = ChecksumWriter::new("text");
        writer.write_str(text);
        writer.finish()
    }

    /// First 8 bytes as hex, for logs
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }

    /// All-zero checksum, used for empty Merkle combinations
    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Checksum {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&hex::decode(s)?)
    }
}

impl AsRef<[u8; 32]> for Checksum {
    fn as_ref(&self) -> &[u8; 32] {
        &self.0
    }
}

impl serde::Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> serde::Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ChecksumVisitor;

        impl<'de> serde::de::Visitor<'de> for ChecksumVisitor {
            type Value = Checksum;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
                formatter.write_str("a 32-byte checksum as hex string or bytes")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                value.parse().map_err(E::custom)
            }

            fn visit_bytes<E>(self, value: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Checksum::from_slice(value).map_err(E::custom)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(ChecksumVisitor)
        } else {
            deserializer.deserialize_bytes(ChecksumVisitor)
        }
    }
}

/// Framed, domain-separated checksum builder
///
/// Every node kind starts with its own tag and every variable-length field is
/// length-prefixed, so `("ab", "c")` and `("a", "bc")` never collide.
#[derive(Debug, Clone)]
pub struct ChecksumWriter {
    hasher: blake3::Hasher,
}

impl ChecksumWriter {
    /// Start a checksum for the node kind named by `tag`
    #[must_use]
    pub fn new(tag: &str) -> Self {
        let mut writer = Self {
            hasher: blake3::Hasher::new(),
        };
        writer.write_str(tag);
        writer
    }

    /// Length-prefixed bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.write_u64(bytes.len() as u64);
        self.hasher.update(bytes);
        self
    }

    /// Length-prefixed UTF-8 string
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.write_bytes(value.as_bytes())
    }

    /// Optional string, with a presence marker
    pub fn write_opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => {
                self.write_bool(true);
                self.write_str(value)
            }
            None => self.write_bool(false),
        }
    }

    /// Little-endian u64
    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    /// Single byte flag
    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.hasher.update(&[u8::from(value)]);
        self
    }

    /// A 16-byte identity
    pub fn write_id(&mut self, id: [u8; 16]) -> &mut Self {
        self.hasher.update(&id);
        self
    }

    /// A child checksum
    pub fn write_checksum(&mut self, checksum: &Checksum) -> &mut Self {
        self.hasher.update(checksum.as_bytes());
        self
    }

    /// Finish and produce the checksum
    #[must_use]
    pub fn finish(&self) -> Checksum {
        Checksum(*self.hasher.finalize().as_bytes())
    }
}

/// Errors that can occur when parsing checksums
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    /// Invalid checksum length
    #[error("invalid checksum length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex decoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_from_slice_invalid_length() {
        let result = Checksum::from_slice(&[1u8; 31]);
        assert!(matches!(
            result,
            Err(ChecksumError::InvalidLength {
                expected: 32,
                actual: 31
            })
        ));
    }

    #[test]
    fn checksum_display_and_parse() {
        let checksum = Checksum::compute(b"test");
        let parsed: Checksum = checksum.to_string().parse().unwrap();
        assert_eq!(checksum, parsed);
        assert!(checksum.to_string().starts_with(&checksum.short()));
    }

    #[test]
    fn checksum_serde_is_hex_in_json() {
        let checksum = Checksum::of_text("fn main() {}");
        let json = serde_json::to_string(&checksum).unwrap();
        assert_eq!(json.len(), 66);
        let decoded: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, checksum);
    }

    #[test]
    fn text_checksum_differs_from_raw_digest() {
        assert_ne!(Checksum::of_text("abc"), Checksum::compute(b"abc"));
        assert_eq!(Checksum::of_text("abc"), Checksum::of_text("abc"));
    }

    #[test]
    fn writer_framing_prevents_boundary_aliasing() {
        let mut a = ChecksumWriter::new("pair");
        a.write_str("ab").write_str("c");
        let mut b = ChecksumWriter::new("pair");
        b.write_str("a").write_str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn writer_tags_separate_domains() {
        let mut a = ChecksumWriter::new("document");
        a.write_str("x");
        let mut b = ChecksumWriter::new("project");
        b.write_str("x");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn writer_optional_presence_matters() {
        let mut none = ChecksumWriter::new("opt");
        none.write_opt_str(None);
        let mut empty = ChecksumWriter::new("opt");
        empty.write_opt_str(Some(""));
        assert_ne!(none.finish(), empty.finish());
    }

    #[test]
    fn zero_checksum_is_default() {
        assert!(Checksum::default().is_zero());
        assert!(!Checksum::compute(b"x").is_zero());
    }
}
