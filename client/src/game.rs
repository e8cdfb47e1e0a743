//! Client-side view of one game and the turn loop that drives it
//!
//! The client keeps its own copy of the board so it can show it and refuse
//! obviously invalid columns before they reach the server. Its own moves are
//! held as pending until the server's next message shows they were accepted.

use crate::input::MoveSource;
use crate::network::{ClientError, ServerLink};
use crate::rendering::TerminalRenderer;
use log::{debug, warn};
use shared::{Board, ErrorCode, LastMove, Message, PlayerId};
use std::io::Write;
use tokio::io::{AsyncRead, AsyncWrite};

/// How the game ended from this player's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Won,
    Lost,
    Draw,
    OpponentForfeited,
}

/// What the turn loop should do after a server message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    OpponentFound { name: String, id: PlayerId },
    /// Pick a column and send it
    YourMove,
    /// The last move was refused; pick again
    RetryMove(String),
    ServerError { code: ErrorCode, message: String },
    Finished(GameResult),
    Ignored,
}

#[derive(Debug)]
pub struct ClientGame {
    player_id: PlayerId,
    opponent: Option<(String, PlayerId)>,
    board: Board,
    pending_move: Option<usize>,
    result: Option<GameResult>,
}

impl ClientGame {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            opponent: None,
            board: Board::new(),
            pending_move: None,
            result: None,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn opponent(&self) -> Option<(&str, PlayerId)> {
        self.opponent.as_ref().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    /// Validates `column` against the local board and builds the move.
    /// The piece is only placed once the server accepts it.
    pub fn submit_move(&mut self, column: usize) -> Option<Message> {
        if self.result.is_some() || !self.board.is_valid_move(column) {
            return None;
        }
        self.pending_move = Some(column);
        Some(Message::MakeMove {
            column: column as i32,
        })
    }

    pub fn handle(&mut self, message: Message) -> Reaction {
        match message {
            Message::OtherPlayer {
                other_name,
                other_id,
            } => {
                self.opponent = Some((other_name.clone(), other_id));
                Reaction::OpponentFound {
                    name: other_name,
                    id: other_id,
                }
            }
            Message::YourTurn { last_move } => {
                self.commit_pending();
                self.apply_opponent_move(last_move);
                Reaction::YourMove
            }
            Message::GameOver { winner, last_move } => {
                self.commit_pending();
                if !self.board.is_terminal() {
                    self.apply_opponent_move(last_move);
                }

                let result = match winner {
                    None => GameResult::Draw,
                    Some(id) if id == self.player_id => match last_move {
                        LastMove::Forfeit => GameResult::OpponentForfeited,
                        _ => GameResult::Won,
                    },
                    Some(_) => GameResult::Lost,
                };
                self.result = Some(result);
                Reaction::Finished(result)
            }
            Message::Error {
                code: ErrorCode::InvalidMove,
                message,
            } => {
                self.pending_move = None;
                Reaction::RetryMove(message)
            }
            Message::Error { code, message } => {
                if code == ErrorCode::NotYourTurn {
                    self.pending_move = None;
                }
                Reaction::ServerError { code, message }
            }
            other => {
                debug!("Ignoring {} during the game", other.name());
                Reaction::Ignored
            }
        }
    }

    fn commit_pending(&mut self) {
        if let Some(column) = self.pending_move.take() {
            if !self.board.place(column, self.player_id) {
                warn!("Accepted move in column {} does not fit the local board", column);
            }
        }
    }

    fn apply_opponent_move(&mut self, last_move: LastMove) {
        let Some(column) = last_move.column() else {
            return;
        };
        let opponent = self.opponent.as_ref().map_or(PlayerId::MAX, |(_, id)| *id);
        if !self.board.place(column, opponent) {
            warn!("Opponent move in column {} does not fit the local board", column);
        }
    }
}

/// Runs the turn loop until the game ends. Moves come from `moves`; progress
/// is written through `renderer`.
pub async fn play<S, M, W>(
    link: &mut ServerLink<S>,
    game: &mut ClientGame,
    moves: &mut M,
    renderer: &mut TerminalRenderer<W>,
) -> Result<GameResult, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    M: MoveSource,
    W: Write,
{
    renderer.waiting_for_opponent()?;

    loop {
        let Some(message) = link.recv().await? else {
            return Err(ClientError::ConnectionClosed);
        };

        match game.handle(message) {
            Reaction::OpponentFound { name, id } => renderer.opponent(&name, id)?,
            Reaction::YourMove => {
                renderer.board(game.board(), game.player_id())?;
                send_move(link, game, moves, renderer).await?;
            }
            Reaction::RetryMove(reason) => {
                renderer.invalid_move(&reason)?;
                send_move(link, game, moves, renderer).await?;
            }
            Reaction::ServerError { code, message } => {
                renderer.server_error(code, &message)?;
                if game.opponent().is_none() {
                    return Err(ClientError::Server { code, message });
                }
            }
            Reaction::Finished(result) => {
                renderer.board(game.board(), game.player_id())?;
                renderer.result(result)?;
                return Ok(result);
            }
            Reaction::Ignored => {}
        }
    }
}

async fn send_move<S, M, W>(
    link: &mut ServerLink<S>,
    game: &mut ClientGame,
    moves: &mut M,
    renderer: &mut TerminalRenderer<W>,
) -> Result<(), ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    M: MoveSource,
    W: Write,
{
    loop {
        renderer.prompt_move()?;
        let column = moves.next_move(game.board())?.ok_or(ClientError::InputClosed)?;
        match game.submit_move(column) {
            Some(message) => return link.send(&message).await,
            None => renderer.invalid_move("That column is full or does not exist")?,
        }
    }
}
