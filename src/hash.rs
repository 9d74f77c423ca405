// src/hash.rs

//! SHA-256 checksums for source archive verification
//!
//! Recipes declare the SHA-256 of their source archive as 64 hex characters,
//! optionally prefixed with `sha256:`. [`Checksum`] holds the normalized form
//! and [`Hasher`] computes digests incrementally while a download streams.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Length of a SHA-256 digest rendered as hex
pub const SHA256_HEX_LEN: usize = 64;

const PREFIX: &str = "sha256:";

/// Checksum parse errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    /// Empty checksum string
    Empty,
    /// Unsupported algorithm prefix
    UnknownAlgorithm(String),
    /// Hex string has the wrong length
    InvalidLength { expected: usize, got: usize },
    /// Hex string contains non-hex characters
    InvalidHex(String),
}

impl fmt::Display for ChecksumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "checksum is empty"),
            Self::UnknownAlgorithm(name) => {
                write!(f, "unsupported checksum algorithm: {} (expected sha256)", name)
            }
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid checksum length: expected {}, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in checksum: {}", s),
        }
    }
}

impl std::error::Error for ChecksumError {}

/// A validated SHA-256 checksum (lowercase hex)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum(String);

impl Checksum {
    /// Parse a checksum, accepting an optional `sha256:` prefix
    pub fn parse(s: &str) -> Result<Self, ChecksumError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ChecksumError::Empty);
        }

        let hex = match s.split_once(':') {
            Some((algo, hex)) if algo.eq_ignore_ascii_case("sha256") => hex,
            Some((algo, _)) => return Err(ChecksumError::UnknownAlgorithm(algo.to_string())),
            None => s,
        };

        if hex.len() != SHA256_HEX_LEN {
            return Err(ChecksumError::InvalidLength {
                expected: SHA256_HEX_LEN,
                got: hex.len(),
            });
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ChecksumError::InvalidHex(hex.to_string()));
        }

        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// The hex digest
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefixed form, e.g. `sha256:abc...`
    pub fn to_prefixed_string(&self) -> String {
        format!("{}{}", PREFIX, self.0)
    }

    /// Whether `data` hashes to this checksum
    pub fn matches(&self, data: &[u8]) -> bool {
        hash_bytes(data).0 == self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Checksum {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Incremental SHA-256 hasher
#[derive(Default)]
pub struct Hasher {
    state: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more data
    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    /// Finish and return the checksum
    pub fn finalize(self) -> Checksum {
        Checksum(hex::encode(self.state.finalize()))
    }
}

/// Checksum of a byte slice
pub fn hash_bytes(data: &[u8]) -> Checksum {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Checksum of everything a reader yields
pub fn hash_reader<R: Read>(reader: &mut R) -> io::Result<Checksum> {
    let mut hasher = Hasher::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Checksum of a file, streamed
pub fn hash_file(path: &Path) -> io::Result<Checksum> {
    let mut file = File::open(path)?;
    hash_reader(&mut file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_hash_bytes_known_value() {
        assert_eq!(hash_bytes(b"hello world").as_str(), HELLO_SHA256);
    }

    #[test]
    fn test_parse_accepts_prefix_and_uppercase() {
        let plain = Checksum::parse(HELLO_SHA256).unwrap();
        let prefixed = Checksum::parse(&format!("sha256:{}", HELLO_SHA256.to_uppercase())).unwrap();
        assert_eq!(plain, prefixed);
        assert_eq!(prefixed.to_prefixed_string(), format!("sha256:{}", HELLO_SHA256));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(Checksum::parse(""), Err(ChecksumError::Empty));
        assert!(matches!(
            Checksum::parse("md5:abc"),
            Err(ChecksumError::UnknownAlgorithm(_))
        ));
        assert!(matches!(
            Checksum::parse("abc123"),
            Err(ChecksumError::InvalidLength { expected: 64, got: 6 })
        ));
        let not_hex = "z".repeat(64);
        assert!(matches!(Checksum::parse(&not_hex), Err(ChecksumError::InvalidHex(_))));
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let checksum = hash_file(file.path()).unwrap();
        assert_eq!(checksum.as_str(), HELLO_SHA256);
        assert!(checksum.matches(b"hello world"));
        assert!(!checksum.matches(b"hello worle"));
    }
}
