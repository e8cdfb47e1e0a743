//! RSA key pairs, key serialization and payload encryption
//!
//! Public keys travel as base64 of their PKCS#1 PEM text. Payloads are
//! encrypted with PKCS#1 v1.5 in as many blocks as needed, each block holding
//! at most `modulus_bytes - 11` bytes of plaintext.

use crate::error::CryptoError;
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding,
};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

/// Key size used when nothing else is configured
pub const DEFAULT_KEY_BITS: usize = 1024;

/// PKCS#1 v1.5 encryption padding overhead per block
const PKCS1_OVERHEAD: usize = 11;

#[derive(Debug, Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits).map_err(CryptoError::KeyGeneration)?;
        Ok(Self::from_private(private))
    }

    pub fn from_private(private: RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self { private, public }
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn private_key_pem(&self) -> Result<String, CryptoError> {
        self.private
            .to_pkcs1_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))
    }

    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        public_key_pem(&self.public)
    }

    pub fn from_private_pem(pem: &str) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
        Ok(Self::from_private(private))
    }
}

pub fn public_key_pem(key: &RsaPublicKey) -> Result<String, CryptoError> {
    key.to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyEncoding(e.to_string()))
}

pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| CryptoError::KeyEncoding(e.to_string()))
}

/// Serializes a public key for the `pub_key` field of the handshake messages
pub fn public_key_to_string(key: &RsaPublicKey) -> Result<String, CryptoError> {
    Ok(general_purpose::STANDARD.encode(public_key_pem(key)?))
}

pub fn public_key_from_string(encoded: &str) -> Result<RsaPublicKey, CryptoError> {
    let pem_bytes = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
    let pem = String::from_utf8(pem_bytes).map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
    public_key_from_pem(&pem)
}

/// Largest plaintext chunk one block can carry for this key
pub fn max_chunk_len(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(PKCS1_OVERHEAD)
}

pub fn encrypt(key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let chunk_len = max_chunk_len(key).max(1);
    let mut ciphertext = Vec::new();

    for chunk in plaintext.chunks(chunk_len) {
        let block = key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, chunk)
            .map_err(CryptoError::Encrypt)?;
        ciphertext.extend_from_slice(&block);
    }

    Ok(ciphertext)
}

pub fn decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let block = key.size();
    if ciphertext.len() % block != 0 {
        return Err(CryptoError::CiphertextLength {
            len: ciphertext.len(),
            block,
        });
    }

    let mut plaintext = Vec::with_capacity(ciphertext.len());
    for chunk in ciphertext.chunks(block) {
        let part = key
            .decrypt(Pkcs1v15Encrypt, chunk)
            .map_err(CryptoError::Decrypt)?;
        plaintext.extend_from_slice(&part);
    }

    Ok(plaintext)
}
