//! Master-key derivation and AES-256-GCM encryption (spec §4.6).
//!
//! Grounded on `eric8810-authy/src/vault/crypto.rs::derive_key` (HKDF-SHA256
//! usage) generalized from age's passphrase/keyfile encryption to direct
//! AES-256-GCM, as the broker's adversary model calls for zero-UX-friction
//! machine-derived keys rather than a user-supplied passphrase.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{BrokerError, Result};

const HKDF_INFO: &[u8] = b"capbroker-auth-master-key-v1";
const HKDF_SALT: &[u8] = b"capbroker-static-salt-v1";

/// The derived master key. Exists only in memory; wiped on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct MasterKey(Box<[u8; 32]>);

impl MasterKey {
    /// Derive from a keyfile's contents (spec.md Open Question 1 decision:
    /// a keyfile may seed the HKDF input in place of the machine identifier).
    pub fn from_keyfile_bytes(bytes: &[u8]) -> Self {
        Self::derive(bytes)
    }

    /// Derive the default machine-stable key: HKDF-SHA256 over a platform
    /// identifier concatenated with the process user name (spec §4.6).
    ///
    /// The machine identifier is platform-specific: this build reads
    /// `/etc/machine-id` on Linux and falls back to the system hostname
    /// everywhere else. Tokens encrypted under this key are therefore not
    /// portable between hosts by design.
    pub fn derive_machine_key() -> Self {
        let machine_id = read_machine_id();
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        let mut ikm = machine_id.into_bytes();
        ikm.push(0);
        ikm.extend_from_slice(user.as_bytes());
        let key = Self::derive(&ikm);
        ikm.zeroize();
        key
    }

    fn derive(ikm: &[u8]) -> Self {
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), ikm);
        let mut okm = [0u8; 32];
        hk.expand(HKDF_INFO, &mut okm)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        Self(Box::new(okm))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.0.as_slice()))
    }

    /// Encrypt `plaintext`, returning `nonce(12) || ciphertext || tag(16)`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, plaintext)
            .map_err(|_| BrokerError::Internal("encryption failure".into()))?;
        let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a `nonce || ciphertext || tag` blob. Any corruption — including
    /// a single flipped bit — fails with `MasterKeyUnavailable`, distinguishable
    /// from a not-found error by the caller (spec §8 Testable Property 5).
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < 12 {
            return Err(BrokerError::MasterKeyUnavailable("blob too short to contain a nonce".into()));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher()
            .decrypt(nonce, ciphertext)
            .map_err(|_| BrokerError::MasterKeyUnavailable("decryption failed".into()))
    }
}

#[cfg(target_os = "linux")]
fn read_machine_id() -> String {
    std::fs::read_to_string("/etc/machine-id")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| hostname_fallback())
}

#[cfg(not(target_os = "linux"))]
fn read_machine_id() -> String {
    hostname_fallback()
}

fn hostname_fallback() -> String {
    let mut buf = [0u8; 256];
    #[cfg(unix)]
    unsafe {
        if libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) == 0 {
            let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            if let Ok(s) = std::str::from_utf8(&buf[..end]) {
                return s.to_string();
            }
        }
    }
    "unknown-host".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = MasterKey::derive(b"test-ikm");
        let blob = key.encrypt(b"hello world").unwrap();
        assert_eq!(key.decrypt(&blob).unwrap(), b"hello world");
    }

    #[test]
    fn bit_flip_fails_decryption() {
        let key = MasterKey::derive(b"test-ikm");
        let mut blob = key.encrypt(b"hello world").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(key.decrypt(&blob).is_err());
    }

    #[test]
    fn different_ikm_yields_different_key() {
        let a = MasterKey::derive(b"a");
        let b = MasterKey::derive(b"b");
        let blob = a.encrypt(b"secret").unwrap();
        assert!(b.decrypt(&blob).is_err());
    }
}
