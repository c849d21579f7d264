//! Content fingerprints for change detection
//!
//! A fingerprint is the SHA-256 digest of a file's bytes. It is only used to
//! notice that content changed between runs, not as a security boundary.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{BackupError, BackupResult};

/// Length of a fingerprint in bytes
pub const FINGERPRINT_LEN: usize = 32;

/// Fixed-length content digest of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Fingerprint an in-memory buffer
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Lowercase hex form, as stored in the ledger
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the ledger form: exactly 64 lowercase hex characters
    pub fn from_hex(s: &str) -> Result<Self, String> {
        if s.len() != FINGERPRINT_LEN * 2 {
            return Err(format!(
                "fingerprint must be {} hex characters, got {}",
                FINGERPRINT_LEN * 2,
                s.len()
            ));
        }
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err("fingerprint must be lowercase hex".to_string());
        }

        let mut bytes = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| e.to_string())?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the fingerprint of a file
///
/// The file is streamed through the hasher in chunks, so large files are not
/// read into memory; the digest is the same as hashing the whole content.
pub fn fingerprint(path: &Path) -> BackupResult<Fingerprint> {
    let file = File::open(path).map_err(|e| BackupError::read(path.display().to_string(), e))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)
        .map_err(|e| BackupError::read(path.display().to_string(), e))?;

    Ok(Fingerprint(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_fingerprint_matches_in_memory_digest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        let contents: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &contents).unwrap();

        assert_eq!(fingerprint(&path).unwrap(), Fingerprint::of_bytes(&contents));
    }

    #[test]
    fn test_empty_file_fingerprint() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        assert_eq!(fingerprint(&path).unwrap().to_hex(), EMPTY_SHA256);
    }

    #[test]
    fn test_content_change_changes_fingerprint() {
        assert_ne!(Fingerprint::of_bytes(b"alpha"), Fingerprint::of_bytes(b"alphb"));
        assert_eq!(Fingerprint::of_bytes(b"alpha"), Fingerprint::of_bytes(b"alpha"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = fingerprint(&temp_dir.path().join("gone.txt")).unwrap_err();
        assert!(matches!(err, BackupError::Read { .. }));
    }

    #[test]
    fn test_hex_round_trip() {
        let fp = Fingerprint::from_hex(EMPTY_SHA256).unwrap();
        assert_eq!(fp.to_hex(), EMPTY_SHA256);
        assert_eq!(fp.to_string(), EMPTY_SHA256);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(Fingerprint::from_hex("abc").is_err());
        assert!(Fingerprint::from_hex(&EMPTY_SHA256.to_uppercase()).is_err());
        assert!(Fingerprint::from_hex(&"zz".repeat(32)).is_err());
    }
}
