//! Client side of the connection: registration handshake and sealed frames

use log::{debug, info, warn};
use rsa::RsaPublicKey;
use shared::error::{FramingError, HandshakeError, ProtocolError};
use shared::frame::{read_frame, write_frame};
use shared::handshake::{open, seal, verify_peer_key};
use shared::{CertificateAuthority, ErrorCode, LocalIdentity, Message, PlayerId};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("server closed the connection")]
    ConnectionClosed,

    #[error("server sent {0} unencrypted after the handshake")]
    Unencrypted(&'static str),

    #[error("no more moves available from input")]
    InputClosed,

    #[error("server error {code:?}: {message}")]
    Server { code: ErrorCode, message: String },
}

/// A connection to the game server. Plaintext until [`register`] succeeds,
/// encrypted with the server's key afterwards.
///
/// [`register`]: ServerLink::register
pub struct ServerLink<S> {
    stream: S,
    identity: LocalIdentity,
    ca: CertificateAuthority,
    server_key: Option<RsaPublicKey>,
    player_id: Option<PlayerId>,
}

impl ServerLink<TcpStream> {
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        identity: LocalIdentity,
        ca: CertificateAuthority,
    ) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!("Connected to {}", stream.peer_addr()?);
        Ok(Self::new(stream, identity, ca))
    }
}

impl<S> ServerLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, identity: LocalIdentity, ca: CertificateAuthority) -> Self {
        Self {
            stream,
            identity,
            ca,
            server_key: None,
            player_id: None,
        }
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn is_registered(&self) -> bool {
        self.server_key.is_some()
    }

    /// Sends `REGISTER_CLIENT` and waits for the server's signed reply.
    /// Any failure here is fatal for the client.
    pub async fn register(&mut self, name: &str) -> Result<PlayerId, HandshakeError> {
        let request = seal(&self.identity.register_request(name), None)?;
        write_frame(&mut self.stream, &request).await?;

        let frame = read_frame(&mut self.stream)
            .await?
            .ok_or(HandshakeError::ConnectionClosed)?;

        match open(&frame, Some(self.identity.private_key()))? {
            Message::RegisterConfirm {
                player_id,
                pub_key,
                signature,
            } => {
                let server_key = verify_peer_key(&self.ca, &pub_key, &signature)?;
                info!("Registered as player {}, server key verified", player_id);
                self.server_key = Some(server_key);
                self.player_id = Some(player_id);
                Ok(player_id)
            }
            Message::Error { code, message } => Err(HandshakeError::Rejected { code, message }),
            other => Err(HandshakeError::UnexpectedMessage(other.name())),
        }
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        debug!("-> {}", message.name());
        let frame = seal(message, self.server_key.as_ref())?;
        write_frame(&mut self.stream, &frame).await?;
        Ok(())
    }

    /// Next message from the server, `None` once it has closed the connection.
    /// Once registered, plaintext frames are refused.
    pub async fn recv(&mut self) -> Result<Option<Message>, ClientError> {
        let Some(frame) = read_frame(&mut self.stream).await? else {
            return Ok(None);
        };
        let message = open(&frame, Some(self.identity.private_key()))?;
        if self.is_registered() && !frame.encrypted {
            warn!("Refusing plaintext {} from the server", message.name());
            return Err(ClientError::Unencrypted(message.name()));
        }
        debug!("<- {}", message.name());
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::LastMove;
    use tokio::io::{duplex, DuplexStream};

    const TEST_BITS: usize = 512;

    struct FakeServer {
        stream: DuplexStream,
        identity: LocalIdentity,
    }

    impl FakeServer {
        async fn expect(&mut self) -> Message {
            let frame = read_frame(&mut self.stream).await.unwrap().unwrap();
            open(&frame, Some(self.identity.private_key())).unwrap()
        }

        async fn reply(&mut self, message: Message, key: Option<&RsaPublicKey>) {
            let frame = seal(&message, key).unwrap();
            write_frame(&mut self.stream, &frame).await.unwrap();
        }

        fn confirm(&self, player_id: PlayerId) -> Message {
            self.identity.register_confirm(player_id)
        }
    }

    /// A link trusting `client_ca` wired to a fake server whose key is
    /// signed by `server_ca`
    fn pair(
        client_ca: &CertificateAuthority,
        server_ca: &CertificateAuthority,
    ) -> (ServerLink<DuplexStream>, FakeServer) {
        let (client_end, server_end) = duplex(64 * 1024);
        let link = ServerLink::new(
            client_end,
            LocalIdentity::generate(TEST_BITS, client_ca).unwrap(),
            client_ca.clone(),
        );
        let server = FakeServer {
            stream: server_end,
            identity: LocalIdentity::generate(TEST_BITS, server_ca).unwrap(),
        };
        (link, server)
    }

    #[tokio::test]
    async fn test_register_then_encrypted_traffic() {
        let ca = CertificateAuthority::generate(TEST_BITS).unwrap();
        let (mut link, mut server) = pair(&ca, &ca);

        let server_task = tokio::spawn(async move {
            let client_key = match server.expect().await {
                Message::RegisterClient {
                    name,
                    pub_key,
                    signature,
                } => {
                    assert_eq!(name, "alice");
                    verify_peer_key(&ca, &pub_key, &signature).unwrap()
                }
                other => panic!("unexpected {:?}", other),
            };
            let confirm = server.confirm(3);
            server.reply(confirm, None).await;

            let made = server.expect().await;
            server
                .reply(
                    Message::YourTurn {
                        last_move: LastMove::Column(2),
                    },
                    Some(&client_key),
                )
                .await;
            made
        });

        assert_eq!(link.register("alice").await.unwrap(), 3);
        assert!(link.is_registered());
        assert_eq!(link.player_id(), Some(3));

        link.send(&Message::MakeMove { column: 4 }).await.unwrap();
        assert_eq!(
            link.recv().await.unwrap(),
            Some(Message::YourTurn {
                last_move: LastMove::Column(2)
            })
        );
        assert_eq!(server_task.await.unwrap(), Message::MakeMove { column: 4 });
    }

    #[tokio::test]
    async fn test_unverified_server_is_fatal() {
        let ca = CertificateAuthority::generate(TEST_BITS).unwrap();
        let rogue_ca = CertificateAuthority::generate(TEST_BITS).unwrap();
        let (mut link, mut server) = pair(&ca, &rogue_ca);

        tokio::spawn(async move {
            server.expect().await;
            let confirm = server.confirm(0);
            server.reply(confirm, None).await;
        });

        assert!(matches!(
            link.register("alice").await,
            Err(HandshakeError::NotVerified)
        ));
        assert!(!link.is_registered());
    }

    #[tokio::test]
    async fn test_rejection_is_reported() {
        let ca = CertificateAuthority::generate(TEST_BITS).unwrap();
        let (mut link, mut server) = pair(&ca, &ca);

        tokio::spawn(async move {
            server.expect().await;
            server
                .reply(Message::error(ErrorCode::PlayerCountExceeded), None)
                .await;
        });

        match link.register("carol").await {
            Err(HandshakeError::Rejected { code, .. }) => {
                assert_eq!(code, ErrorCode::PlayerCountExceeded)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plaintext_after_handshake_is_refused() {
        let ca = CertificateAuthority::generate(TEST_BITS).unwrap();
        let (mut link, mut server) = pair(&ca, &ca);

        tokio::spawn(async move {
            server.expect().await;
            let confirm = server.confirm(0);
            server.reply(confirm, None).await;
            server
                .reply(
                    Message::GameOver {
                        winner: Some(0),
                        last_move: LastMove::Column(1),
                    },
                    None,
                )
                .await;
        });

        link.register("erin").await.unwrap();
        assert!(matches!(
            link.recv().await,
            Err(ClientError::Unencrypted("GAME_OVER"))
        ));
    }

    #[tokio::test]
    async fn test_recv_after_server_closes() {
        let ca = CertificateAuthority::generate(TEST_BITS).unwrap();
        let (mut link, server) = pair(&ca, &ca);
        drop(server);

        assert!(link.recv().await.unwrap().is_none());
        assert!(link.register("dave").await.is_err());
    }
}
