//! Cryptographic primitives for srpchat.
//!
//! This module provides the symmetric side of the protocol:
//!
//! - **AES-256-GCM**: authenticated encryption for chat payloads
//! - **HKDF-SHA256**: key derivation from shared secrets
//! - **SHA-256**: the protocol hash, used one-shot over concatenated inputs
//! - Cryptographically secure randomness and constant-time comparison

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub mod aead;

pub use aead::{decrypt, derive_key, encrypt, IV_SIZE, KEY_SIZE, TAG_SIZE};

/// Output size of the protocol hash (SHA-256).
pub const HASH_SIZE: usize = 32;

/// Fills and returns `len` bytes from the operating system CSPRNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Returns a fixed-size array of random bytes from the OS CSPRNG.
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// SHA-256 over the concatenation of `parts`.
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Constant-time byte-slice equality.
///
/// Slices of different lengths compare unequal without leaking where they
/// differ.
pub fn bytes_equal(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_parts_matches_concatenation() {
        let whole = sha256_parts(&[b"hello world"]);
        let split = sha256_parts(&[b"hello", b" ", b"world"]);
        assert_eq!(whole, split);
    }

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256_parts(&[b"abc"]);
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_random_bytes_distinct() {
        let a = random_bytes(32);
        let b = random_bytes(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_bytes_equal() {
        assert!(bytes_equal(b"same", b"same"));
        assert!(!bytes_equal(b"same", b"sami"));
        assert!(!bytes_equal(b"short", b"longer input"));
        assert!(bytes_equal(b"", b""));
    }
}
