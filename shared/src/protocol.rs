//! Message catalogue for the turn-based session
//!
//! Every payload is a UTF-8 JSON object carrying an integer `proto`
//! discriminant. Messages are decoded once at the boundary into the closed
//! [`Message`] enum, so handlers match exhaustively instead of inspecting raw
//! JSON.

use crate::error::ProtocolError;
use serde::Deserialize;
use serde_json::{json, Value};

/// Player identifier assigned by the server at accept time
pub type PlayerId = u32;

/// Integer discriminants fixed by the protocol version
pub mod proto {
    pub const REGISTER_CLIENT: i64 = 0;
    pub const REGISTER_CONFIRM: i64 = 1;
    pub const YOUR_TURN: i64 = 5;
    pub const MAKE_MOVE: i64 = 6;
    pub const GAME_OVER: i64 = 7;
    pub const OTHER_PLAYER: i64 = 8;
    pub const ERROR: i64 = -1;
}

const NO_WINNER: i64 = -1;
const OPENING_MOVE: i32 = -1;
const FORFEIT_MOVE: i32 = -2;

/// The move that led to a `YourTurn` or `GameOver` notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastMove {
    /// No move has been made yet (wire value -1)
    Opening,
    /// The opponent disconnected (wire value -2)
    Forfeit,
    Column(u8),
}

impl LastMove {
    pub fn to_wire(self) -> i32 {
        match self {
            LastMove::Opening => OPENING_MOVE,
            LastMove::Forfeit => FORFEIT_MOVE,
            LastMove::Column(column) => i32::from(column),
        }
    }

    pub fn from_wire(value: i32) -> Self {
        match value {
            FORFEIT_MOVE => LastMove::Forfeit,
            v if v >= 0 && v <= i32::from(u8::MAX) => LastMove::Column(v as u8),
            _ => LastMove::Opening,
        }
    }

    pub fn column(self) -> Option<usize> {
        match self {
            LastMove::Column(column) => Some(usize::from(column)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    PlayerCountExceeded,
    PublicKeyNotVerified,
    NotYourTurn,
    InvalidMove,
    Custom,
    Unknown(i32),
}

impl ErrorCode {
    pub fn to_wire(self) -> i32 {
        match self {
            ErrorCode::PlayerCountExceeded => 1,
            ErrorCode::PublicKeyNotVerified => 2,
            ErrorCode::NotYourTurn => 3,
            ErrorCode::InvalidMove => 4,
            ErrorCode::Custom => -1,
            ErrorCode::Unknown(code) => code,
        }
    }

    pub fn from_wire(code: i32) -> Self {
        match code {
            1 => ErrorCode::PlayerCountExceeded,
            2 => ErrorCode::PublicKeyNotVerified,
            3 => ErrorCode::NotYourTurn,
            4 => ErrorCode::InvalidMove,
            -1 => ErrorCode::Custom,
            other => ErrorCode::Unknown(other),
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::PlayerCountExceeded => {
                "The maximum player count has been reached. Please try again later"
            }
            ErrorCode::PublicKeyNotVerified => {
                "Your public key could not be verified by the certificate authority"
            }
            ErrorCode::NotYourTurn => "It is not your turn",
            ErrorCode::InvalidMove => "That column cannot take another tile",
            ErrorCode::Custom | ErrorCode::Unknown(_) => "An unknown error has occurred.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    RegisterClient {
        name: String,
        pub_key: String,
        signature: String,
    },
    RegisterConfirm {
        player_id: PlayerId,
        pub_key: String,
        signature: String,
    },
    OtherPlayer {
        other_name: String,
        other_id: PlayerId,
    },
    YourTurn {
        last_move: LastMove,
    },
    MakeMove {
        column: i32,
    },
    GameOver {
        /// `None` on a draw
        winner: Option<PlayerId>,
        last_move: LastMove,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

#[derive(Deserialize)]
struct RegisterClientBody {
    name: String,
    pub_key: String,
    signature: String,
}

#[derive(Deserialize)]
struct RegisterConfirmBody {
    player_id: PlayerId,
    pub_key: String,
    signature: String,
}

#[derive(Deserialize)]
struct OtherPlayerBody {
    other_name: String,
    other_id: PlayerId,
}

#[derive(Deserialize)]
struct YourTurnBody {
    last_move: i32,
}

#[derive(Deserialize)]
struct MakeMoveBody {
    #[serde(rename = "move")]
    column: i32,
}

#[derive(Deserialize)]
struct GameOverBody {
    winner: i64,
    last_move: i32,
}

#[derive(Deserialize)]
struct ErrorBody {
    error_code: i32,
    #[serde(default)]
    error_message: String,
}

impl Message {
    /// Builds an `Error` message carrying the code's default text
    pub fn error(code: ErrorCode) -> Self {
        Message::Error {
            code,
            message: code.default_message().to_string(),
        }
    }

    pub fn proto(&self) -> i64 {
        match self {
            Message::RegisterClient { .. } => proto::REGISTER_CLIENT,
            Message::RegisterConfirm { .. } => proto::REGISTER_CONFIRM,
            Message::OtherPlayer { .. } => proto::OTHER_PLAYER,
            Message::YourTurn { .. } => proto::YOUR_TURN,
            Message::MakeMove { .. } => proto::MAKE_MOVE,
            Message::GameOver { .. } => proto::GAME_OVER,
            Message::Error { .. } => proto::ERROR,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::RegisterClient { .. } => "REGISTER_CLIENT",
            Message::RegisterConfirm { .. } => "REGISTER_CONFIRM",
            Message::OtherPlayer { .. } => "OTHER_PLAYER",
            Message::YourTurn { .. } => "YOUR_TURN",
            Message::MakeMove { .. } => "MAKE_MOVE",
            Message::GameOver { .. } => "GAME_OVER",
            Message::Error { .. } => "ERROR",
        }
    }

    pub fn to_json(&self) -> Value {
        let proto = self.proto();
        match self {
            Message::RegisterClient {
                name,
                pub_key,
                signature,
            } => json!({
                "proto": proto,
                "name": name,
                "pub_key": pub_key,
                "signature": signature,
            }),
            Message::RegisterConfirm {
                player_id,
                pub_key,
                signature,
            } => json!({
                "proto": proto,
                "player_id": player_id,
                "pub_key": pub_key,
                "signature": signature,
            }),
            Message::OtherPlayer {
                other_name,
                other_id,
            } => json!({
                "proto": proto,
                "other_name": other_name,
                "other_id": other_id,
            }),
            Message::YourTurn { last_move } => json!({
                "proto": proto,
                "last_move": last_move.to_wire(),
            }),
            Message::MakeMove { column } => json!({
                "proto": proto,
                "move": column,
            }),
            Message::GameOver { winner, last_move } => json!({
                "proto": proto,
                "winner": winner.map_or(NO_WINNER, i64::from),
                "last_move": last_move.to_wire(),
            }),
            Message::Error { code, message } => json!({
                "proto": proto,
                "error_code": code.to_wire(),
                "error_message": message,
            }),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(&self.to_json())?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_json(value)
    }

    pub fn from_json(value: Value) -> Result<Self, ProtocolError> {
        let proto = value
            .get("proto")
            .and_then(Value::as_i64)
            .ok_or(ProtocolError::MissingProto)?;

        let message = match proto {
            proto::REGISTER_CLIENT => {
                let body: RegisterClientBody = serde_json::from_value(value)?;
                Message::RegisterClient {
                    name: body.name,
                    pub_key: body.pub_key,
                    signature: body.signature,
                }
            }
            proto::REGISTER_CONFIRM => {
                let body: RegisterConfirmBody = serde_json::from_value(value)?;
                Message::RegisterConfirm {
                    player_id: body.player_id,
                    pub_key: body.pub_key,
                    signature: body.signature,
                }
            }
            proto::OTHER_PLAYER => {
                let body: OtherPlayerBody = serde_json::from_value(value)?;
                Message::OtherPlayer {
                    other_name: body.other_name,
                    other_id: body.other_id,
                }
            }
            proto::YOUR_TURN => {
                let body: YourTurnBody = serde_json::from_value(value)?;
                Message::YourTurn {
                    last_move: LastMove::from_wire(body.last_move),
                }
            }
            proto::MAKE_MOVE => {
                let body: MakeMoveBody = serde_json::from_value(value)?;
                Message::MakeMove {
                    column: body.column,
                }
            }
            proto::GAME_OVER => {
                let body: GameOverBody = serde_json::from_value(value)?;
                Message::GameOver {
                    winner: PlayerId::try_from(body.winner).ok(),
                    last_move: LastMove::from_wire(body.last_move),
                }
            }
            proto::ERROR => {
                let body: ErrorBody = serde_json::from_value(value)?;
                Message::Error {
                    code: ErrorCode::from_wire(body.error_code),
                    message: body.error_message,
                }
            }
            other => return Err(ProtocolError::UnknownProto(other)),
        };

        Ok(message)
    }
}
