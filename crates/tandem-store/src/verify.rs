//! BLAKE3 fingerprints and integrity checks for artifacts.

use crate::error::{Result, StoreError};

/// Hex-encoded BLAKE3 digest of `data`.
pub fn blake3_hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Verify that `data` (read from `file`) matches the expected BLAKE3 hex hash.
pub fn verify_blake3(file: &str, data: &[u8], expected_hex: &str) -> Result<()> {
    compare_digest(file, &blake3_hex(data), expected_hex)
}

/// Compare an already computed digest against the expected one.
pub fn compare_digest(file: &str, actual_hex: &str, expected_hex: &str) -> Result<()> {
    if !actual_hex.eq_ignore_ascii_case(expected_hex) {
        return Err(StoreError::IntegrityMismatch {
            file: file.to_string(),
            expected: expected_hex.to_string(),
            actual: actual_hex.to_string(),
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_blake3_good() {
        let data = b"integrity test data";
        verify_blake3("a.params", data, &blake3_hex(data)).unwrap();
        verify_blake3("a.params", data, &blake3_hex(data).to_uppercase()).unwrap();
    }

    #[test]
    fn verify_blake3_bad() {
        let data = b"integrity test data";
        let err = verify_blake3("a.params", data, &"0".repeat(64)).unwrap_err();
        match err {
            StoreError::IntegrityMismatch { file, actual, .. } => {
                assert_eq!(file, "a.params");
                assert_eq!(actual, blake3_hex(data));
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
