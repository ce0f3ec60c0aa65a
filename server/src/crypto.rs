//! Cryptography module for PIN encryption
//!
//! Provides AES-256-GCM encryption with Argon2id key derivation.
//! The key is derived once from the server secret; every PIN gets its
//! own random nonce. PINs are never stored in plaintext.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

use crate::error::{AppError, Result};

const NONCE_SIZE: usize = 12; // 96 bits for GCM
const KEY_SALT: &[u8] = b"codesafe-pin-key-v1";

/// Encrypted data container
pub struct EncryptedData {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Encode as base64(nonce || ciphertext) for storage in a text column
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(self.nonce.len() + self.ciphertext.len());
        raw.extend_from_slice(&self.nonce);
        raw.extend_from_slice(&self.ciphertext);
        BASE64.encode(raw)
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::Crypto(format!("Invalid ciphertext encoding: {}", e)))?;

        if raw.len() <= NONCE_SIZE {
            return Err(AppError::Crypto("Ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
        Ok(Self {
            nonce: nonce.to_vec(),
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// AES-256-GCM cipher keyed from the server PIN secret
#[derive(Clone)]
pub struct PinCipher {
    cipher: Aes256Gcm,
}

impl PinCipher {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(AppError::Crypto("PIN secret must not be empty".to_string()));
        }

        let key = derive_key(secret, KEY_SALT)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| AppError::Crypto(format!("Cipher initialization failed: {}", e)))?;

        Ok(Self { cipher })
    }

    /// Encrypt data with a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedData> {
        let mut nonce_bytes = vec![0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| AppError::Crypto(format!("Encryption failed: {}", e)))?;

        Ok(EncryptedData {
            nonce: nonce_bytes,
            ciphertext,
        })
    }

    pub fn decrypt(&self, encrypted: &EncryptedData) -> Result<Vec<u8>> {
        if encrypted.nonce.len() != NONCE_SIZE {
            return Err(AppError::Crypto("Invalid nonce length".to_string()));
        }

        let nonce = Nonce::from_slice(&encrypted.nonce);

        self.cipher
            .decrypt(nonce, encrypted.ciphertext.as_ref())
            .map_err(|e| AppError::Crypto(format!("Decryption failed: {}", e)))
    }

    /// Encrypt a PIN into its stored text form
    pub fn seal(&self, pin: &str) -> Result<String> {
        Ok(self.encrypt(pin.as_bytes())?.encode())
    }

    /// Decrypt a stored PIN
    pub fn open(&self, sealed: &str) -> Result<String> {
        let plaintext = self.decrypt(&EncryptedData::decode(sealed)?)?;
        String::from_utf8(plaintext)
            .map_err(|e| AppError::Crypto(format!("Decrypted PIN is not UTF-8: {}", e)))
    }
}

/// Derive 256-bit key from secret using Argon2id
fn derive_key(secret: &str, salt: &[u8]) -> Result<Vec<u8>> {
    let argon2 = Argon2::default();

    let salt_string = SaltString::encode_b64(salt)
        .map_err(|e| AppError::Crypto(format!("Salt encoding failed: {}", e)))?;

    let password_hash = argon2
        .hash_password(secret.as_bytes(), &salt_string)
        .map_err(|e| AppError::Crypto(format!("Key derivation failed: {}", e)))?;

    let hash = password_hash
        .hash
        .ok_or_else(|| AppError::Crypto("No hash generated".to_string()))?;

    // Argon2 produces a hash, we need exactly 32 bytes for AES-256
    let key_bytes = hash.as_bytes();
    if key_bytes.len() < 32 {
        return Err(AppError::Crypto("Derived key too short".to_string()));
    }

    Ok(key_bytes[..32].to_vec())
}
