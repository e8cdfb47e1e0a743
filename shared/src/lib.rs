//! # Shared Protocol Library
//!
//! Everything both the server and the client need to talk to each other:
//! the framing on the TCP stream, the JSON message catalogue, RSA key
//! handling, the simulated certificate authority and the game board itself.
//!
//! ## Wire Format
//!
//! Every message is one frame: the six ASCII bytes `length`, a big-endian
//! `u32` payload length, a flag byte (`0` plain, `1` encrypted) and the
//! payload. Payloads are JSON objects with an integer `proto` field naming
//! the message kind. After the registration handshake every payload is
//! RSA-encrypted with the receiver's public key.
//!
//! ## Module Organization
//!
//! ### Frame Module (`frame`)
//! Header encoding, incremental async reads that tolerate partial delivery,
//! and write loops that tolerate short writes.
//!
//! ### Protocol Module (`protocol`)
//! The `Message` enum with its JSON mapping, error codes and the
//! `last_move` sentinels.
//!
//! ### Crypto and CA Modules (`crypto`, `ca`)
//! Key generation, PEM/base64 serialization, chunked PKCS#1 v1.5
//! encryption, and a file-backed CA that signs and verifies public keys.
//!
//! ### Handshake Module (`handshake`)
//! A process's signed identity plus helpers that seal and open frames.
//!
//! ### Board Module (`board`)
//! The 7x6 connect-four grid with win and draw detection.

pub mod board;
pub mod ca;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod protocol;

pub use board::{Board, BoardView, Outcome};
pub use ca::{CertificateAuthority, ProvisionOptions, Role};
pub use crypto::KeyPair;
pub use error::{CaError, CryptoError, FramingError, HandshakeError, ProtocolError};
pub use frame::Frame;
pub use handshake::LocalIdentity;
pub use protocol::{ErrorCode, LastMove, Message, PlayerId};
