//! # Game Server Library
//!
//! This library provides the authoritative server for networked connect-four.
//! It accepts TCP connections, authenticates every player's public key against
//! the shared certificate authority, pairs registered players into sessions,
//! and relays moves between them over encrypted frames.
//!
//! ## Core Responsibilities
//!
//! ### Registration
//! Each connection gets a player id in accept order. Its first message must be
//! `REGISTER_CLIENT` carrying a CA-signed public key; the server checks the
//! signature, answers with its own signed key, and from then on encrypts
//! everything it sends to that player with the player's key.
//!
//! ### Pairing
//! Registered players wait in a FIFO queue. As soon as two are waiting they
//! are seated in a new session, told each other's names, and one of them is
//! asked to open.
//!
//! ### Authority
//! The server owns every board. Moves from the wrong player or into a full or
//! non-existent column are answered with an error and change nothing.
//!
//! ### Forfeiture
//! A player whose connection drops mid-game loses; the opponent receives
//! `GAME_OVER` with the forfeit sentinel.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! The binary runs on tokio's current-thread runtime. Small per-connection
//! tasks do nothing but read frames into a channel and write queued bytes
//! out; every state transition happens in one loop that owns [`state::ServerState`].
//! No locks are needed and transitions never interleave.
//!
//! ### Explicit State
//! `ServerState` returns the messages it wants sent instead of writing to
//! sockets, so registration, pairing and forfeiture are all unit-testable.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! Player ids, the live-connection cap and the registration queue.
//!
//! ### Game Module (`game`)
//! One session's turn state machine on top of the shared board.
//!
//! ### State Module (`state`)
//! `register_a_player`, `make_players_move` and disconnect cleanup.
//!
//! ### Network Module (`network`)
//! The accept loop and the per-connection reader and writer tasks.
//!
//! ### Config Module (`config`)
//! Bind address, player cap, key size and CA location.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use shared::{CertificateAuthority, LocalIdentity, ProvisionOptions, Role};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!
//!     // load the CA keys, creating them if this is the first server to start
//!     let ca = CertificateAuthority::provision(
//!         &config.ca_dir,
//!         Role::Server,
//!         &ProvisionOptions::default(),
//!     )
//!     .await?;
//!     let identity = LocalIdentity::generate(config.key_bits, &ca)?;
//!
//!     let mut server = Server::bind(&config, identity, ca).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod game;
pub mod network;
pub mod state;
