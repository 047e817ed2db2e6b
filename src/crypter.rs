use crate::error::AppError;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac_sha256::Hash;
use rand::{Rng, RngCore};
use std::collections::BTreeMap;

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// RFC 7636 unreserved characters.
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Associated data bound to a ciphertext. Decrypting under a different
/// context fails.
pub type EncryptionContext = BTreeMap<String, String>;

pub trait Crypter: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], context: &EncryptionContext) -> Result<Vec<u8>, AppError>;
    fn decrypt(&self, ciphertext: &[u8], context: &EncryptionContext) -> Result<Vec<u8>, AppError>;

    fn hash(&self, data: &[u8]) -> [u8; 32] {
        Hash::hash(data)
    }

    fn generate(&self, length: usize) -> String {
        let mut rng = rand::rng();
        (0..length)
            .map(|_| char::from(UNRESERVED[rng.random_range(0..UNRESERVED.len())]))
            .collect()
    }
}

/// AES-256-GCM with a random nonce prepended to every ciphertext.
pub struct AesGcmCrypter {
    cipher: Aes256Gcm,
}

impl AesGcmCrypter {
    pub fn new(key: &[u8]) -> Result<Self, AppError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            AppError::invalid_config(format!(
                "state encryption key must be 32 bytes, got {}",
                key.len()
            ))
        })?;
        Ok(Self { cipher })
    }
}

fn associated_data(context: &EncryptionContext) -> Result<Vec<u8>, AppError> {
    serde_json::to_vec(context)
        .map_err(|err| AppError::invalid_input(format!("unencodable encryption context: {err}")))
}

impl Crypter for AesGcmCrypter {
    fn encrypt(&self, plaintext: &[u8], context: &EncryptionContext) -> Result<Vec<u8>, AppError> {
        let aad = associated_data(context)?;
        let mut nonce = [0u8; NONCE_LENGTH];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| AppError::unknown("encryption failed"))?;

        let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], context: &EncryptionContext) -> Result<Vec<u8>, AppError> {
        if ciphertext.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(AppError::invalid_input("ciphertext too short"));
        }
        let aad = associated_data(context)?;
        let (nonce, sealed) = ciphertext.split_at(NONCE_LENGTH);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| AppError::invalid_input("decryption failed"))
    }
}
