//! Everything the event loop mutates, gathered in one owned value
//!
//! `ServerState` turns inbound events (accept, frame, disconnect) into a list
//! of [`Action`]s for the network layer to carry out. It does no I/O itself,
//! so every registration, pairing and forfeiture path can be exercised
//! without a socket.

use crate::config::{ServerConfig, TurnOrder};
use crate::connection::{ConnectionManager, ConnectionPhase};
use crate::game::{MoveRejection, Notice, Seat, Session, SessionId};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rsa::RsaPublicKey;
use shared::error::ProtocolError;
use shared::handshake::{self, verify_peer_key};
use shared::{CertificateAuthority, ErrorCode, Frame, LocalIdentity, Message, PlayerId};
use std::collections::HashMap;
use std::net::SocketAddr;

/// A message bound for one connection, with the key to seal it under
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: PlayerId,
    pub message: Message,
    /// `None` sends the frame in plaintext
    pub peer_key: Option<RsaPublicKey>,
}

impl Outbound {
    pub fn plain(to: PlayerId, message: Message) -> Self {
        Self {
            to,
            message,
            peer_key: None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.peer_key.is_some()
    }

    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        handshake::seal(&self.message, self.peer_key.as_ref())
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    Send(Outbound),
    /// Flush anything already queued for the connection, then close it
    Close(PlayerId),
}

pub struct ServerState {
    identity: LocalIdentity,
    ca: CertificateAuthority,
    connections: ConnectionManager,
    sessions: HashMap<SessionId, Session>,
    next_session_id: SessionId,
    turn_order: TurnOrder,
    rng: StdRng,
}

impl ServerState {
    pub fn new(config: &ServerConfig, identity: LocalIdentity, ca: CertificateAuthority) -> Self {
        Self {
            identity,
            ca,
            connections: ConnectionManager::new(config.max_players),
            sessions: HashMap::new(),
            next_session_id: 0,
            turn_order: config.turn_order,
            rng: StdRng::from_entropy(),
        }
    }

    /// Admits a new socket, or hands back the error to send before closing it
    pub fn accept(&mut self, addr: SocketAddr) -> Result<PlayerId, Message> {
        self.connections.add_connection(addr).ok_or_else(|| {
            warn!("Rejecting connection from {}: server is full", addr);
            Message::error(ErrorCode::PlayerCountExceeded)
        })
    }

    /// Decodes one frame from `player_id` and dispatches it. A frame that
    /// cannot be decrypted or parsed drops the connection, as does a frame
    /// whose encryption does not match the handshake state: plaintext only
    /// before registration, encrypted only after it.
    pub fn handle_frame(&mut self, player_id: PlayerId, frame: &Frame) -> Vec<Action> {
        let Some(phase) = self.connections.get(player_id).map(|c| c.phase) else {
            debug!("Frame for unknown connection {} ignored", player_id);
            return Vec::new();
        };

        let expect_encrypted = phase != ConnectionPhase::Unregistered;
        if frame.encrypted != expect_encrypted {
            warn!(
                "Connection {} sent an {} frame while {:?}",
                player_id,
                if frame.encrypted { "encrypted" } else { "unencrypted" },
                phase
            );
            return self.drop_connection(player_id);
        }

        match handshake::open(frame, Some(self.identity.private_key())) {
            Ok(message) => self.handle_message(player_id, message),
            Err(e) => {
                warn!("Undecodable frame from connection {}: {}", player_id, e);
                self.drop_connection(player_id)
            }
        }
    }

    pub fn handle_message(&mut self, player_id: PlayerId, message: Message) -> Vec<Action> {
        let Some(phase) = self.connections.get(player_id).map(|c| c.phase) else {
            debug!("Message for unknown connection {} ignored", player_id);
            return Vec::new();
        };

        match message {
            Message::RegisterClient {
                name,
                pub_key,
                signature,
            } => {
                if phase != ConnectionPhase::Unregistered {
                    warn!("Connection {} tried to register twice", player_id);
                    return Vec::new();
                }
                self.register_a_player(player_id, name, &pub_key, &signature)
            }
            Message::MakeMove { column } => self.make_players_move(player_id, column),
            other @ (Message::RegisterConfirm { .. }
            | Message::OtherPlayer { .. }
            | Message::YourTurn { .. }
            | Message::GameOver { .. }
            | Message::Error { .. }) => match phase {
                ConnectionPhase::Unregistered | ConnectionPhase::Homeless => {
                    warn!(
                        "Connection {} sent {} before being paired",
                        player_id,
                        other.name()
                    );
                    self.drop_connection(player_id)
                }
                _ => {
                    warn!(
                        "Ignoring server-only {} message from connection {}",
                        other.name(),
                        player_id
                    );
                    Vec::new()
                }
            },
        }
    }

    fn register_a_player(
        &mut self,
        player_id: PlayerId,
        name: String,
        pub_key: &str,
        signature: &str,
    ) -> Vec<Action> {
        let peer_key = match verify_peer_key(&self.ca, pub_key, signature) {
            Ok(key) => key,
            Err(e) => {
                warn!("Connection {} failed registration: {}", player_id, e);
                let mut actions = vec![Action::Send(Outbound::plain(
                    player_id,
                    Message::error(ErrorCode::PublicKeyNotVerified),
                ))];
                actions.extend(self.drop_connection(player_id));
                return actions;
            }
        };

        info!("Player {} registered as {:?}", player_id, name);
        self.connections.mark_registered(player_id, name, peer_key);

        let mut actions = vec![Action::Send(Outbound::plain(
            player_id,
            self.identity.register_confirm(player_id),
        ))];
        actions.extend(self.pair_homeless());
        actions
    }

    fn pair_homeless(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();

        while let Some((first, second)) = self.connections.take_pair() {
            let seat = |id: PlayerId| {
                let name = self
                    .connections
                    .get(id)
                    .map(|c| c.display_name.clone())
                    .unwrap_or_default();
                Seat::new(id, name)
            };
            let seats = [seat(first), seat(second)];

            let opener = match self.turn_order {
                TurnOrder::Random => self.rng.gen_range(0..2),
                TurnOrder::Fixed(index) => index,
            };

            let session_id = self.next_session_id;
            self.next_session_id += 1;

            let (session, notices) = Session::start(session_id, seats, opener);
            for id in session.players() {
                self.connections
                    .set_phase(id, ConnectionPhase::Paired(session_id));
            }
            self.sessions.insert(session_id, session);
            actions.extend(self.deliver(notices));
        }

        actions
    }

    fn make_players_move(&mut self, player_id: PlayerId, column: i32) -> Vec<Action> {
        let phase = match self.connections.get(player_id) {
            Some(connection) => connection.phase,
            None => return Vec::new(),
        };

        let session_id = match phase {
            ConnectionPhase::Paired(session_id) => session_id,
            ConnectionPhase::Finished => {
                debug!("Move from player {} after their game ended", player_id);
                return Vec::new();
            }
            ConnectionPhase::Unregistered | ConnectionPhase::Homeless => {
                warn!("Move from unpaired connection {}", player_id);
                return self.drop_connection(player_id);
            }
        };

        let Some(session) = self.sessions.get_mut(&session_id) else {
            debug!("Move for vanished session {}", session_id);
            return Vec::new();
        };

        match session.apply_move(player_id, column) {
            Ok(notices) => {
                let over = session.is_terminal();
                let actions = self.deliver(notices);
                if over {
                    self.finish_session(session_id);
                }
                actions
            }
            Err(MoveRejection::NotYourTurn) => {
                warn!("Player {} moved out of turn", player_id);
                self.reply_error(player_id, ErrorCode::NotYourTurn)
            }
            Err(MoveRejection::InvalidMove) => {
                debug!("Player {} sent invalid column {}", player_id, column);
                self.reply_error(player_id, ErrorCode::InvalidMove)
            }
            Err(rejection) => {
                debug!("Move from player {} ignored: {:?}", player_id, rejection);
                Vec::new()
            }
        }
    }

    /// Cleans up after a connection whose socket is already gone. A player
    /// leaving an unfinished session forfeits it.
    pub fn handle_disconnect(&mut self, player_id: PlayerId) -> Vec<Action> {
        let Some(connection) = self.connections.remove_connection(player_id) else {
            return Vec::new();
        };

        let Some(session_id) = connection.session() else {
            return Vec::new();
        };

        let notices = match self.sessions.get_mut(&session_id) {
            Some(session) => session.forfeit(player_id),
            None => Vec::new(),
        };
        let actions = self.deliver(notices);
        self.finish_session(session_id);
        actions
    }

    /// Same cleanup as a disconnect, followed by closing the socket
    pub fn drop_connection(&mut self, player_id: PlayerId) -> Vec<Action> {
        let mut actions = self.handle_disconnect(player_id);
        actions.push(Action::Close(player_id));
        actions
    }

    fn finish_session(&mut self, session_id: SessionId) {
        if let Some(session) = self.sessions.remove(&session_id) {
            debug!("Session {} closed", session.id());
            for id in session.players() {
                self.connections.set_phase(id, ConnectionPhase::Finished);
            }
        }
    }

    fn reply_error(&self, player_id: PlayerId, code: ErrorCode) -> Vec<Action> {
        self.deliver(vec![Notice {
            to: player_id,
            message: Message::error(code),
        }])
    }

    /// Addresses notices to live connections, encrypted with each peer's key.
    /// Notices for connections that are already gone are dropped.
    fn deliver(&self, notices: Vec<Notice>) -> Vec<Action> {
        notices
            .into_iter()
            .filter_map(|notice| {
                let connection = self.connections.get(notice.to)?;
                Some(Action::Send(Outbound {
                    to: notice.to,
                    message: notice.message,
                    peer_key: connection.peer_key.clone(),
                }))
            })
            .collect()
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn session(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
