//! Server network layer: TCP accept loop and per-connection I/O tasks

use crate::config::ServerConfig;
use crate::state::{Action, ServerState};
use log::{debug, error, info, warn};
use shared::frame::{self, read_frame};
use shared::handshake;
use shared::{CertificateAuthority, FramingError, Frame, LocalIdentity, Message, PlayerId};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

/// How long accepting stops after an error such as running out of file
/// descriptors
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(500);

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    FrameReceived { player_id: PlayerId, frame: Frame },
    /// Clean EOF, reset or EOF mid-frame
    Disconnected { player_id: PlayerId },
    /// Bytes that can never be resynchronised, e.g. a bad frame tag
    Malformed {
        player_id: PlayerId,
        error: FramingError,
    },
}

/// The loop's handle on one live socket
struct Peer {
    writer: mpsc::UnboundedSender<Vec<u8>>,
    reader: JoinHandle<()>,
}

/// TCP game server. All state lives in `state` and is only touched from the
/// loop in [`Server::run_until`]; the spawned tasks just move bytes.
pub struct Server {
    listener: TcpListener,
    state: ServerState,
    peers: HashMap<PlayerId, Peer>,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Binds the configured address, falling back to an OS-assigned port
    /// when it is taken.
    pub async fn bind(
        config: &ServerConfig,
        identity: LocalIdentity,
        ca: CertificateAuthority,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let listener = match TcpListener::bind(config.bind_addr()).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(
                    "Could not bind {}: {}, using an ephemeral port",
                    config.bind_addr(),
                    e
                );
                TcpListener::bind(config.fallback_addr()).await?
            }
        };
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            state: ServerState::new(config, identity, ca),
            peers: HashMap::new(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(std::future::pending()).await
    }

    /// Main server loop; returns once `shutdown` completes
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Server started successfully");

        // set while accepts are paused after a listener-level failure
        let mut accept_resume: Option<Instant> = None;

        loop {
            tokio::select! {
                accepted = self.listener.accept(), if accept_resume.is_none() => {
                    match accepted {
                        Ok((stream, addr)) => self.handle_accept(stream, addr),
                        Err(e) if is_transient_accept_error(&e) => {
                            warn!("Connection dropped before accept: {}", e);
                        }
                        Err(e) => {
                            error!(
                                "Failed to accept connection: {}, pausing accepts for {:?}",
                                e, ACCEPT_BACKOFF
                            );
                            accept_resume = Some(Instant::now() + ACCEPT_BACKOFF);
                        }
                    }
                },

                _ = sleep_until(accept_resume.unwrap_or_else(Instant::now)), if accept_resume.is_some() => {
                    debug!("Resuming accepts");
                    accept_resume = None;
                },

                Some(message) = self.server_rx.recv() => {
                    self.handle_server_message(message);
                },

                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        for (_, peer) in self.peers.drain() {
            peer.reader.abort();
        }
        Ok(())
    }

    fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        let (reader, writer) = stream.into_split();

        let player_id = match self.state.accept(addr) {
            Ok(player_id) => player_id,
            Err(rejection) => {
                tokio::spawn(reject(writer, rejection));
                return;
            }
        };

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(player_id, writer, writer_rx));
        let reader = tokio::spawn(read_loop(player_id, reader, self.server_tx.clone()));

        self.peers.insert(
            player_id,
            Peer {
                writer: writer_tx,
                reader,
            },
        );
    }

    fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::FrameReceived { player_id, frame } => {
                // frames can still be queued from a connection we already closed
                if !self.peers.contains_key(&player_id) {
                    return;
                }
                let actions = self.state.handle_frame(player_id, &frame);
                self.apply(actions);
            }
            ServerMessage::Disconnected { player_id } => {
                if self.peers.remove(&player_id).is_some() {
                    info!("Connection {} closed by peer", player_id);
                    let actions = self.state.handle_disconnect(player_id);
                    self.apply(actions);
                }
            }
            ServerMessage::Malformed { player_id, error } => {
                if self.peers.contains_key(&player_id) {
                    warn!("Dropping connection {}: {}", player_id, error);
                    let actions = self.state.drop_connection(player_id);
                    self.apply(actions);
                }
            }
        }
    }

    fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send(outbound) => {
                    let Some(peer) = self.peers.get(&outbound.to) else {
                        continue;
                    };
                    let frame = match outbound.to_frame() {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!("Failed to seal message for {}: {}", outbound.to, e);
                            continue;
                        }
                    };
                    debug!(
                        "-> {} {} ({} bytes{})",
                        outbound.to,
                        outbound.message.name(),
                        frame.payload.len(),
                        if frame.encrypted { ", encrypted" } else { "" }
                    );
                    if peer.writer.send(frame.to_bytes()).is_err() {
                        warn!("Writer for connection {} already gone", outbound.to);
                    }
                }
                Action::Close(player_id) => {
                    // dropping the sender lets the writer flush, then shut down
                    if let Some(peer) = self.peers.remove(&player_id) {
                        peer.reader.abort();
                    }
                }
            }
        }
    }
}

/// Errors that concern only the connection being accepted. Anything else
/// is a problem with the listener and will likely repeat.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

async fn read_loop(
    player_id: PlayerId,
    mut reader: OwnedReadHalf,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    loop {
        let message = match read_frame(&mut reader).await {
            Ok(Some(frame)) => ServerMessage::FrameReceived { player_id, frame },
            Ok(None) => ServerMessage::Disconnected { player_id },
            Err(e) if e.is_disconnect() => {
                debug!("Connection {} lost: {}", player_id, e);
                ServerMessage::Disconnected { player_id }
            }
            Err(error) => ServerMessage::Malformed { player_id, error },
        };

        let done = !matches!(message, ServerMessage::FrameReceived { .. });
        if server_tx.send(message).is_err() || done {
            break;
        }
    }
}

async fn write_loop(
    player_id: PlayerId,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = frame::write_bytes(&mut writer, &bytes).await {
            warn!("Failed to write to connection {}: {}", player_id, e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Tells a connection it was refused, then closes it
async fn reject(mut writer: OwnedWriteHalf, message: Message) {
    let result = match handshake::seal(&message, None) {
        Ok(frame) => frame::write_frame(&mut writer, &frame)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    if let Err(e) = result {
        debug!("Failed to send rejection: {}", e);
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TurnOrder;
    use shared::{ErrorCode, LastMove};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    const TEST_BITS: usize = 512;

    async fn spawn_server(max_players: usize) -> (SocketAddr, CertificateAuthority, oneshot::Sender<()>) {
        let ca = CertificateAuthority::generate(TEST_BITS).unwrap();
        let identity = LocalIdentity::generate(TEST_BITS, &ca).unwrap();
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            max_players,
            key_bits: TEST_BITS,
            turn_order: TurnOrder::Fixed(0),
            ..ServerConfig::default()
        };

        let mut server = Server::bind(&config, identity, ca.clone()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
                .unwrap();
        });
        (addr, ca, stop_tx)
    }

    async fn next_message(stream: &mut TcpStream, identity: &LocalIdentity) -> Option<Message> {
        let read = timeout(Duration::from_secs(5), read_frame(stream))
            .await
            .expect("timed out waiting for a frame");
        let frame = match read {
            Ok(frame) => frame?,
            Err(e) if e.is_disconnect() => return None,
            Err(e) => panic!("read failed: {}", e),
        };
        Some(handshake::open(&frame, Some(identity.private_key())).unwrap())
    }

    #[test]
    fn test_accept_error_classification() {
        assert!(is_transient_accept_error(&io::Error::from(
            io::ErrorKind::ConnectionAborted
        )));
        assert!(is_transient_accept_error(&io::Error::from(
            io::ErrorKind::Interrupted
        )));
        // EMFILE and friends come from the listener and would repeat
        assert!(!is_transient_accept_error(&io::Error::from(
            io::ErrorKind::OutOfMemory
        )));
        assert!(!is_transient_accept_error(&io::Error::from_raw_os_error(24)));
    }

    #[tokio::test]
    async fn test_register_over_tcp() {
        let (addr, ca, _stop) = spawn_server(2).await;
        let identity = LocalIdentity::generate(TEST_BITS, &ca).unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let frame = handshake::seal(&identity.register_request("A"), None).unwrap();
        frame::write_frame(&mut stream, &frame).await.unwrap();

        match next_message(&mut stream, &identity).await {
            Some(Message::RegisterConfirm { player_id, .. }) => assert_eq!(player_id, 0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_server_rejects_in_plaintext() {
        let (addr, ca, _stop) = spawn_server(2).await;
        let identity = LocalIdentity::generate(TEST_BITS, &ca).unwrap();

        let _a = TcpStream::connect(addr).await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();
        let mut c = TcpStream::connect(addr).await.unwrap();

        assert_eq!(
            next_message(&mut c, &identity).await,
            Some(Message::error(ErrorCode::PlayerCountExceeded))
        );
        assert_eq!(next_message(&mut c, &identity).await, None);
    }

    #[tokio::test]
    async fn test_bad_tag_closes_connection() {
        let (addr, ca, _stop) = spawn_server(2).await;
        let identity = LocalIdentity::generate(TEST_BITS, &ca).unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"lenxth\x00\x00\x00\x00\x00")
            .await
            .unwrap();

        assert_eq!(next_message(&mut stream, &identity).await, None);
    }

    #[tokio::test]
    async fn test_peer_close_forfeits() {
        let (addr, ca, _stop) = spawn_server(2).await;
        let alice = LocalIdentity::generate(TEST_BITS, &ca).unwrap();
        let bob = LocalIdentity::generate(TEST_BITS, &ca).unwrap();

        let mut a = TcpStream::connect(addr).await.unwrap();
        let frame = handshake::seal(&alice.register_request("A"), None).unwrap();
        frame::write_frame(&mut a, &frame).await.unwrap();
        next_message(&mut a, &alice).await;

        let mut b = TcpStream::connect(addr).await.unwrap();
        let frame = handshake::seal(&bob.register_request("B"), None).unwrap();
        frame::write_frame(&mut b, &frame).await.unwrap();
        next_message(&mut b, &bob).await;
        next_message(&mut b, &bob).await; // OTHER_PLAYER

        drop(a);

        assert_eq!(
            next_message(&mut b, &bob).await,
            Some(Message::GameOver {
                winner: Some(1),
                last_move: LastMove::Forfeit,
            })
        );
    }
}
