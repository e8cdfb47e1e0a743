//! One connect-four match between two registered players
//!
//! A `Session` owns the board and whose turn it is. It never touches sockets:
//! every transition returns the messages it wants delivered as [`Notice`]s and
//! leaves delivery (and encryption) to the caller.

use log::{debug, info};
use shared::{Board, LastMove, Message, Outcome, PlayerId};

pub type SessionId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub player_id: PlayerId,
    pub name: String,
}

impl Seat {
    pub fn new(player_id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            player_id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Index into the seats of the player expected to move
    AwaitingMove(usize),
    Terminal(Outcome),
}

/// A message the session wants sent to one player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub to: PlayerId,
    pub message: Message,
}

impl Notice {
    fn new(to: PlayerId, message: Message) -> Self {
        Self { to, message }
    }
}

/// Why a `MAKE_MOVE` was not applied. The board and turn are unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejection {
    NotSeated,
    NotYourTurn,
    InvalidMove,
    GameOver,
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    seats: [Seat; 2],
    board: Board,
    phase: SessionPhase,
}

impl Session {
    /// Pairs two players. Both learn who their opponent is, then the opening
    /// player alone gets `YOUR_TURN` with the opening sentinel.
    pub fn start(id: SessionId, seats: [Seat; 2], first: usize) -> (Self, Vec<Notice>) {
        let first = first.min(1);
        info!(
            "Session {}: {} (player {}) vs {} (player {}), player {} opens",
            id,
            seats[0].name,
            seats[0].player_id,
            seats[1].name,
            seats[1].player_id,
            seats[first].player_id
        );

        let notices = vec![
            Notice::new(
                seats[0].player_id,
                Message::OtherPlayer {
                    other_name: seats[1].name.clone(),
                    other_id: seats[1].player_id,
                },
            ),
            Notice::new(
                seats[1].player_id,
                Message::OtherPlayer {
                    other_name: seats[0].name.clone(),
                    other_id: seats[0].player_id,
                },
            ),
            Notice::new(
                seats[first].player_id,
                Message::YourTurn {
                    last_move: LastMove::Opening,
                },
            ),
        ];

        let session = Self {
            id,
            seats,
            board: Board::new(),
            phase: SessionPhase::AwaitingMove(first),
        };
        (session, notices)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, SessionPhase::Terminal(_))
    }

    pub fn players(&self) -> [PlayerId; 2] {
        [self.seats[0].player_id, self.seats[1].player_id]
    }

    pub fn current_player(&self) -> Option<PlayerId> {
        match self.phase {
            SessionPhase::AwaitingMove(seat) => Some(self.seats[seat].player_id),
            SessionPhase::Terminal(_) => None,
        }
    }

    pub fn opponent_of(&self, player_id: PlayerId) -> Option<PlayerId> {
        self.seat_of(player_id)
            .map(|seat| self.seats[1 - seat].player_id)
    }

    fn seat_of(&self, player_id: PlayerId) -> Option<usize> {
        self.seats.iter().position(|s| s.player_id == player_id)
    }

    /// Applies `column` for `from`. On success the returned notices are
    /// either `YOUR_TURN` for the opponent or `GAME_OVER` for both players.
    pub fn apply_move(&mut self, from: PlayerId, column: i32) -> Result<Vec<Notice>, MoveRejection> {
        let seat = self.seat_of(from).ok_or(MoveRejection::NotSeated)?;
        let current = match self.phase {
            SessionPhase::AwaitingMove(current) => current,
            SessionPhase::Terminal(_) => return Err(MoveRejection::GameOver),
        };
        if seat != current {
            return Err(MoveRejection::NotYourTurn);
        }

        let column = usize::try_from(column).map_err(|_| MoveRejection::InvalidMove)?;
        if !self.board.place(column, from) {
            return Err(MoveRejection::InvalidMove);
        }
        let last_move = LastMove::Column(column as u8);

        if let Some(outcome) = self.board.outcome() {
            self.phase = SessionPhase::Terminal(outcome);
            let winner = match outcome {
                Outcome::Winner(id) => Some(id),
                Outcome::Draw => None,
            };
            info!("Session {} over: {:?}", self.id, outcome);

            return Ok(self
                .players()
                .iter()
                .map(|&to| Notice::new(to, Message::GameOver { winner, last_move }))
                .collect());
        }

        let next = 1 - seat;
        self.phase = SessionPhase::AwaitingMove(next);
        debug!(
            "Session {}: player {} played column {}, player {} to move",
            self.id, from, column, self.seats[next].player_id
        );
        Ok(vec![Notice::new(
            self.seats[next].player_id,
            Message::YourTurn { last_move },
        )])
    }

    /// Ends the session because `departed` left. The remaining player wins;
    /// nothing happens if the session was already over.
    pub fn forfeit(&mut self, departed: PlayerId) -> Vec<Notice> {
        if self.is_terminal() {
            return Vec::new();
        }
        let Some(remaining) = self.opponent_of(departed) else {
            return Vec::new();
        };

        info!(
            "Session {}: player {} left, player {} wins by forfeit",
            self.id, departed, remaining
        );
        self.phase = SessionPhase::Terminal(Outcome::Winner(remaining));
        vec![Notice::new(
            remaining,
            Message::GameOver {
                winner: Some(remaining),
                last_move: LastMove::Forfeit,
            },
        )]
    }
}
