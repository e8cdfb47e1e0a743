//! # Game Client Library
//!
//! This library provides the player side of networked connect-four: it
//! connects to the server, proves its identity through the shared
//! certificate authority, and then runs a simple turn loop in the terminal.
//!
//! ## Architecture Overview
//!
//! ### Registration
//! The client generates a fresh RSA key pair, has the CA sign it, and sends
//! it in plaintext with its display name. The server answers with its own
//! signed key. If that signature does not check out the client stops; it has
//! no reason to keep talking to a server it cannot trust.
//!
//! ### Turn Loop
//! After registration every frame is encrypted. The client waits for an
//! opponent, and each `YOUR_TURN` carries the opponent's last column, which
//! the client drops into its local board before asking for a move. The game
//! ends with `GAME_OVER`: a win, a loss, a draw or a forfeit.
//!
//! ### Local Board
//! The client keeps its own board to show it and to reject full or missing
//! columns before they are sent. The server still has the final word; a
//! move it refuses is simply asked for again.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! `ServerLink`, the registration handshake and encrypted send/receive.
//!
//! ### Game Module (`game`)
//! `ClientGame` state plus the async `play` loop.
//!
//! ### Input Module (`input`)
//! The `MoveSource` trait with line-based and scripted implementations.
//!
//! ### Rendering Module (`rendering`)
//! Board and status output for a terminal, with optional ANSI colour.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::{play, ClientGame};
//! use client::input::LineMoves;
//! use client::network::ServerLink;
//! use client::rendering::TerminalRenderer;
//! use shared::{CertificateAuthority, LocalIdentity, ProvisionOptions, Role};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ca = CertificateAuthority::provision(
//!         Path::new("ca_keys"),
//!         Role::Client,
//!         &ProvisionOptions::default(),
//!     )
//!     .await?;
//!     let identity = LocalIdentity::generate(1024, &ca)?;
//!
//!     let mut link = ServerLink::connect("127.0.0.1:55667", identity, ca).await?;
//!     let player_id = link.register("Ada").await?;
//!
//!     let mut game = ClientGame::new(player_id);
//!     let result = play(
//!         &mut link,
//!         &mut game,
//!         &mut LineMoves::stdin(),
//!         &mut TerminalRenderer::stdout(),
//!     )
//!     .await?;
//!     println!("{:?}", result);
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
