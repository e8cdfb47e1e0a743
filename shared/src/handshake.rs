//! Key exchange shared by both ends of a connection
//!
//! Each side owns a [`LocalIdentity`]: its key pair plus a CA signature over
//! its serialized public key. The client opens with `REGISTER_CLIENT`, the
//! server answers `REGISTER_CONFIRM`; both messages travel in plaintext and
//! carry the sender's key and signature. Once a side has verified the peer's
//! key, everything it sends is sealed with that key.

use crate::ca::CertificateAuthority;
use crate::crypto::{self, public_key_from_string, public_key_to_string, KeyPair};
use crate::error::{HandshakeError, ProtocolError};
use crate::frame::Frame;
use crate::protocol::{Message, PlayerId};
use base64::{engine::general_purpose, Engine as _};
use log::debug;
use rsa::{RsaPrivateKey, RsaPublicKey};

#[derive(Debug, Clone)]
pub struct LocalIdentity {
    keys: KeyPair,
    pub_key: String,
    signature: String,
}

impl LocalIdentity {
    pub fn generate(bits: usize, ca: &CertificateAuthority) -> Result<Self, HandshakeError> {
        Self::new(KeyPair::generate(bits)?, ca)
    }

    /// Wraps an existing key pair and has the CA vouch for it
    pub fn new(keys: KeyPair, ca: &CertificateAuthority) -> Result<Self, HandshakeError> {
        let pub_key = public_key_to_string(keys.public_key())?;
        let signature = general_purpose::STANDARD.encode(ca.sign(&pub_key)?);
        Ok(Self {
            keys,
            pub_key,
            signature,
        })
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        self.keys.private_key()
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        self.keys.public_key()
    }

    pub fn public_key_string(&self) -> &str {
        &self.pub_key
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn register_request(&self, name: &str) -> Message {
        Message::RegisterClient {
            name: name.to_string(),
            pub_key: self.pub_key.clone(),
            signature: self.signature.clone(),
        }
    }

    pub fn register_confirm(&self, player_id: PlayerId) -> Message {
        Message::RegisterConfirm {
            player_id,
            pub_key: self.pub_key.clone(),
            signature: self.signature.clone(),
        }
    }
}

/// Checks a peer's key against the CA and parses it. A bad signature, bad
/// base64 or unparsable key all come back as [`HandshakeError::NotVerified`].
pub fn verify_peer_key(
    ca: &CertificateAuthority,
    pub_key: &str,
    signature: &str,
) -> Result<RsaPublicKey, HandshakeError> {
    let signature = general_purpose::STANDARD.decode(signature).map_err(|e| {
        debug!("peer signature is not base64: {}", e);
        HandshakeError::NotVerified
    })?;

    if !ca.verify(pub_key, &signature) {
        return Err(HandshakeError::NotVerified);
    }

    public_key_from_string(pub_key).map_err(|e| {
        debug!("signed peer key does not parse: {}", e);
        HandshakeError::NotVerified
    })
}

/// Serializes a message into a frame, encrypting when the peer's key is known
pub fn seal(message: &Message, peer_key: Option<&RsaPublicKey>) -> Result<Frame, ProtocolError> {
    let payload = message.to_bytes()?;
    Ok(match peer_key {
        Some(key) => Frame::new(crypto::encrypt(key, &payload)?, true),
        None => Frame::new(payload, false),
    })
}

/// Inverse of [`seal`]. Plain frames never need a key.
pub fn open(frame: &Frame, own_key: Option<&RsaPrivateKey>) -> Result<Message, ProtocolError> {
    if !frame.encrypted {
        return Message::from_bytes(&frame.payload);
    }

    let key = own_key.ok_or(ProtocolError::MissingKey)?;
    let plaintext = crypto::decrypt(key, &frame.payload)?;
    Message::from_bytes(&plaintext)
}
