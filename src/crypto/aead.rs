//! AES-256-GCM authenticated encryption for chat payloads.
//!
//! Every encrypted payload travels as a self-contained envelope:
//!
//! ```text
//! IV (12 bytes) || ciphertext || tag (16 bytes)
//! ```
//!
//! The IV is freshly random per message. Optional associated data binds
//! context without being transmitted; both sides must pass the same AAD or
//! the tag check fails.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{ChatError, Result};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;
/// GCM nonce size in bytes.
pub const IV_SIZE: usize = 12;
/// GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Default HKDF context string for chat key derivation.
const DEFAULT_KDF_INFO: &[u8] = b"chat-room-key";

/// Encrypts `plaintext` under `key`, returning the `IV || ct || tag` envelope.
///
/// `aad` is authenticated but not encrypted; `None` means empty.
pub fn encrypt(plaintext: &[u8], key: &[u8], aad: Option<&[u8]>) -> Result<Vec<u8>> {
    if key.len() != KEY_SIZE {
        return Err(ChatError::crypto("invalid key size"));
    }

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| ChatError::crypto(format!("cipher init failed: {e}")))?;

    let payload = Payload {
        msg: plaintext,
        aad: aad.unwrap_or(&[]),
    };
    let ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|_| ChatError::crypto("encryption failed"))?;

    let mut envelope = Vec::with_capacity(IV_SIZE + ciphertext.len());
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypts an `IV || ct || tag` envelope produced by [`encrypt`].
///
/// Fails with a crypto error if the key length is wrong, the envelope is
/// shorter than IV + tag, or the authentication tag does not verify.
pub fn decrypt(envelope: &[u8], key: &[u8], aad: Option<&[u8]>) -> Result<Vec<u8>> {
    if key.len() != KEY_SIZE {
        return Err(ChatError::crypto("invalid key size"));
    }
    if envelope.len() < IV_SIZE + TAG_SIZE {
        return Err(ChatError::crypto("invalid encrypted data size"));
    }

    let (iv, ciphertext) = envelope.split_at(IV_SIZE);
    let nonce = Nonce::from_slice(iv);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| ChatError::crypto(format!("cipher init failed: {e}")))?;

    let payload = Payload {
        msg: ciphertext,
        aad: aad.unwrap_or(&[]),
    };
    cipher
        .decrypt(nonce, payload)
        .map_err(|_| ChatError::crypto("authentication failed - message tampered or corrupted"))
}

/// Derives a 32-byte key from input keying material via HKDF-SHA256.
///
/// `info` defaults to `"chat-room-key"` when `None`.
pub fn derive_key(ikm: &[u8], salt: &[u8], info: Option<&[u8]>) -> Result<[u8; KEY_SIZE]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut key = [0u8; KEY_SIZE];
    hk.expand(info.unwrap_or(DEFAULT_KDF_INFO), &mut key)
        .map_err(|e| ChatError::crypto(format!("HKDF expand failed: {e}")))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random_array;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = random_array::<KEY_SIZE>();
        let plaintext = b"Hello, encrypted chat!";

        let envelope = encrypt(plaintext, &key, None).unwrap();
        assert_eq!(envelope.len(), IV_SIZE + plaintext.len() + TAG_SIZE);

        let decrypted = decrypt(&envelope, &key, None).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let key = random_array::<KEY_SIZE>();
        let envelope = encrypt(b"", &key, None).unwrap();
        assert_eq!(decrypt(&envelope, &key, None).unwrap(), b"");
    }

    #[test]
    fn test_aad_roundtrip_and_mismatch() {
        let key = random_array::<KEY_SIZE>();
        let envelope = encrypt(b"payload", &key, Some(b"header")).unwrap();

        assert_eq!(
            decrypt(&envelope, &key, Some(b"header")).unwrap(),
            b"payload"
        );
        assert!(decrypt(&envelope, &key, Some(b"other")).is_err());
        assert!(decrypt(&envelope, &key, None).is_err());
    }

    #[test]
    fn test_tampering_detected_in_every_region() {
        let key = random_array::<KEY_SIZE>();
        let envelope = encrypt(b"integrity matters", &key, None).unwrap();

        for index in [0, IV_SIZE, envelope.len() - 1] {
            let mut mutated = envelope.clone();
            mutated[index] ^= 0x01;
            assert!(
                decrypt(&mutated, &key, None).is_err(),
                "flip at {index} was not detected"
            );
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = random_array::<KEY_SIZE>();
        let other = random_array::<KEY_SIZE>();
        let envelope = encrypt(b"secret", &key, None).unwrap();
        assert!(decrypt(&envelope, &other, None).is_err());
    }

    #[test]
    fn test_invalid_key_size_rejected() {
        assert!(encrypt(b"x", &[0u8; 16], None).is_err());
        assert!(decrypt(&[0u8; 64], &[0u8; 31], None).is_err());
    }

    #[test]
    fn test_short_envelope_rejected() {
        let key = random_array::<KEY_SIZE>();
        assert!(decrypt(&[0u8; IV_SIZE + TAG_SIZE - 1], &key, None).is_err());
    }

    #[test]
    fn test_iv_randomness() {
        let key = random_array::<KEY_SIZE>();
        let a = encrypt(b"same plaintext", &key, None).unwrap();
        let b = encrypt(b"same plaintext", &key, None).unwrap();
        assert_ne!(a, b);
        assert_ne!(&a[..IV_SIZE], &b[..IV_SIZE]);
    }

    #[test]
    fn test_derive_key_deterministic() {
        let a = derive_key(b"password", b"salt", None).unwrap();
        let b = derive_key(b"password", b"salt", None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_key_context_separation() {
        let default_info = derive_key(b"password", b"salt", None).unwrap();
        let explicit = derive_key(b"password", b"salt", Some(b"chat-room-key")).unwrap();
        let other = derive_key(b"password", b"salt", Some(b"another-context")).unwrap();

        assert_eq!(default_info, explicit);
        assert_ne!(default_info, other);
        assert_ne!(
            derive_key(b"password", b"pepper", None).unwrap(),
            default_info
        );
    }
}
