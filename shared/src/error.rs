//! Error types for the wire protocol, key handling and handshake

use crate::protocol::ErrorCode;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed or truncated frame. Always fatal for the connection it came from,
/// since the byte stream cannot be resynchronised.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("bad frame tag {0:?}")]
    BadMagic([u8; 6]),

    #[error("invalid encryption flag {0}")]
    BadFlag(u8),

    #[error("frame header must be {expected} bytes, got {actual}")]
    BadHeaderLength { expected: usize, actual: usize },

    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("connection closed mid-frame after {read} of {expected} bytes")]
    UnexpectedEof { read: usize, expected: usize },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl FramingError {
    /// True when the peer went away (EOF or reset) rather than sending garbage
    pub fn is_disconnect(&self) -> bool {
        match self {
            FramingError::UnexpectedEof { .. } => true,
            FramingError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(rsa::Error),

    #[error("encryption failed: {0}")]
    Encrypt(rsa::Error),

    #[error("decryption failed: {0}")]
    Decrypt(rsa::Error),

    #[error("ciphertext of {len} bytes is not a multiple of the {block} byte block size")]
    CiphertextLength { len: usize, block: usize },

    #[error("key encoding: {0}")]
    KeyEncoding(String),
}

#[derive(Debug, Error)]
pub enum CaError {
    #[error("CA key storage: {0}")]
    Io(#[from] io::Error),

    #[error("CA key material: {0}")]
    Key(#[from] CryptoError),

    #[error("CA signing failed: {0}")]
    Sign(rsa::Error),

    #[error("CA keys did not appear in {} after {attempts} attempts", dir.display())]
    ProvisionTimeout { dir: PathBuf, attempts: u32 },
}

/// Failure to turn a frame payload into a [`crate::protocol::Message`] or back
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no integer proto field")]
    MissingProto,

    #[error("unknown proto {0}")]
    UnknownProto(i64),

    #[error("encrypted frame received but no private key is available")]
    MissingKey,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("peer public key failed CA verification")]
    NotVerified,

    #[error("registration rejected ({code:?}): {message}")]
    Rejected { code: ErrorCode, message: String },

    #[error("unexpected {0} message during handshake")]
    UnexpectedMessage(&'static str),

    #[error("connection closed during handshake")]
    ConnectionClosed,

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Ca(#[from] CaError),
}
