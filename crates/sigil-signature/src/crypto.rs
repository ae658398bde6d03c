//! # Credential Encryption
//!
//! AES-256-GCM encryption of per-node credential payloads.
//!
//! ## Layout
//!
//! ```text
//!   blob = nonce (12 bytes) || ciphertext || GCM tag (16 bytes)
//!   key  = SHA-256(master key || 0x00 || user_id)
//!   aad  = "sigil:v1:" || user_id || ":" || node_type
//! ```
//!
//! The associated data binds a blob to the entry it was written for: a blob
//! copied into another user's document, or under another node type, fails
//! to decrypt instead of yielding someone else's credentials.
//!
//! Plaintext only ever exists in memory, in zeroizing buffers.

use crate::error::{Result, SignatureError};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// AES-GCM standard nonce size.
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Credential field values keyed by field name.
///
/// Values are wiped on drop and never printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthData(BTreeMap<String, String>);

impl AuthData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        if let Some(mut old) = self.0.insert(field.into(), value.into()) {
            old.zeroize();
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AuthData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut data = Self::new();
        for (k, v) in iter {
            data.insert(k, v);
        }
        data
    }
}

impl Drop for AuthData {
    fn drop(&mut self) {
        for value in self.0.values_mut() {
            value.zeroize();
        }
    }
}

impl fmt::Debug for AuthData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthData")
            .field("fields", &self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The process-wide master key.
pub struct MasterKey(Zeroizing<[u8; KEY_SIZE]>);

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Uses exactly-32-byte material as-is; anything else is hashed with SHA-256.
    pub fn from_material(material: &[u8]) -> Self {
        match <[u8; KEY_SIZE]>::try_from(material) {
            Ok(bytes) => Self::from_bytes(bytes),
            Err(_) => Self::from_passphrase(material),
        }
    }

    /// Always hashes, so a 32-character passphrase is not mistaken for raw key bytes.
    pub fn from_passphrase(passphrase: &[u8]) -> Self {
        let digest: [u8; KEY_SIZE] = Sha256::digest(passphrase).into();
        Self::from_bytes(digest)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Encrypts and decrypts [`AuthData`] for signature entries.
#[derive(Debug)]
pub struct CredentialCipher {
    master: MasterKey,
}

impl CredentialCipher {
    pub fn new(master: MasterKey) -> Self {
        Self { master }
    }

    fn user_key(&self, user_id: &str) -> Zeroizing<[u8; KEY_SIZE]> {
        let mut hasher = Sha256::new();
        hasher.update(&*self.master.0);
        hasher.update([0u8]);
        hasher.update(user_id.as_bytes());
        Zeroizing::new(hasher.finalize().into())
    }

    fn aad(user_id: &str, node_type: &str) -> Vec<u8> {
        format!("sigil:v1:{}:{}", user_id, node_type).into_bytes()
    }

    /// Encrypts `auth` for one user's entry of `node_type`.
    pub fn encrypt(&self, user_id: &str, node_type: &str, auth: &AuthData) -> Result<Vec<u8>> {
        let key = self.user_key(user_id);
        let cipher = Aes256Gcm::new_from_slice(&*key)
            .map_err(|e| SignatureError::Crypto(format!("cipher init failed: {}", e)))?;

        let plaintext = Zeroizing::new(
            serde_json::to_vec(auth).map_err(|e| SignatureError::Crypto(format!("encode failed: {}", e)))?,
        );

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let aad = Self::aad(user_id, node_type);

        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext.as_slice(),
                    aad: &aad,
                },
            )
            .map_err(|e| SignatureError::Crypto(format!("encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypts a blob produced by [`CredentialCipher::encrypt`] for the same
    /// user and node type.
    pub fn decrypt(&self, user_id: &str, node_type: &str, blob: &[u8]) -> Result<AuthData> {
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(SignatureError::Crypto("ciphertext too short".to_string()));
        }

        let key = self.user_key(user_id);
        let cipher = Aes256Gcm::new_from_slice(&*key)
            .map_err(|e| SignatureError::Crypto(format!("cipher init failed: {}", e)))?;

        let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);
        let aad = Self::aad(user_id, node_type);

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad: &aad,
                    },
                )
                .map_err(|_| SignatureError::Crypto("decryption failed".to_string()))?,
        );

        serde_json::from_slice(&plaintext)
            .map_err(|e| SignatureError::Crypto(format!("decode failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CredentialCipher {
        CredentialCipher::new(MasterKey::from_bytes([0x42; KEY_SIZE]))
    }

    fn sample() -> AuthData {
        [("api_key", "sk-live-123"), ("region", "eu")].into_iter().collect()
    }

    #[test]
    fn test_roundtrip() {
        let c = cipher();
        let blob = c.encrypt("alice", "openai", &sample()).unwrap();
        assert_eq!(c.decrypt("alice", "openai", &blob).unwrap(), sample());
    }

    #[test]
    fn test_roundtrip_arbitrary_payloads() {
        let c = cipher();
        let payloads: Vec<AuthData> = vec![
            AuthData::new(),
            [("password", "")].into_iter().collect(),
            [("token", "ünïcødé ✓ \"quoted\" \n newline")].into_iter().collect(),
            [("blob", "x".repeat(64 * 1024))].into_iter().collect(),
            (0..50).map(|i| (format!("field_{}", i), format!("value-{}", i))).collect(),
        ];
        for payload in payloads {
            let blob = c.encrypt("u", "n", &payload).unwrap();
            assert_eq!(c.decrypt("u", "n", &blob).unwrap(), payload);
        }
    }

    #[test]
    fn test_ciphertext_hides_plaintext() {
        let blob = cipher().encrypt("alice", "openai", &sample()).unwrap();
        let needle = b"sk-live-123";
        assert!(!blob.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let c = cipher();
        let a = c.encrypt("alice", "openai", &sample()).unwrap();
        let b = c.encrypt("alice", "openai", &sample()).unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_blob_bound_to_user_and_node() {
        let c = cipher();
        let blob = c.encrypt("alice", "openai", &sample()).unwrap();
        assert!(c.decrypt("bob", "openai", &blob).is_err());
        assert!(c.decrypt("alice", "slack", &blob).is_err());
    }

    #[test]
    fn test_wrong_master_key_fails() {
        let blob = cipher().encrypt("alice", "openai", &sample()).unwrap();
        let other = CredentialCipher::new(MasterKey::from_passphrase(b"different"));
        assert!(other.decrypt("alice", "openai", &blob).is_err());
    }

    #[test]
    fn test_tampered_blob_fails() {
        let c = cipher();
        let mut blob = c.encrypt("alice", "openai", &sample()).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(c.decrypt("alice", "openai", &blob).is_err());
        assert!(c.decrypt("alice", "openai", &blob[..8]).is_err());
    }

    #[test]
    fn test_debug_redacts_values() {
        let rendered = format!("{:?}", sample());
        assert!(rendered.contains("api_key"));
        assert!(!rendered.contains("sk-live-123"));
    }

    #[test]
    fn test_master_key_material() {
        let raw = [7u8; KEY_SIZE];
        let a = CredentialCipher::new(MasterKey::from_material(&raw));
        let b = CredentialCipher::new(MasterKey::from_bytes(raw));
        let blob = a.encrypt("u", "n", &sample()).unwrap();
        assert_eq!(b.decrypt("u", "n", &blob).unwrap(), sample());
    }
}
