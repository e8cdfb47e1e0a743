use crate::game::GameResult;
use shared::board::COLUMNS;
use shared::{Board, ErrorCode, PlayerId};
use std::io::{self, Write};

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";

/// Text output for a terminal. Colour is optional so output can be captured.
pub struct TerminalRenderer<W> {
    out: W,
    color: bool,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), true)
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn welcome(&mut self, player_id: PlayerId) -> io::Result<()> {
        let piece = self.piece(true);
        writeln!(
            self.out,
            "Registered as player {}, you play {}",
            player_id, piece
        )
    }

    pub fn waiting_for_opponent(&mut self) -> io::Result<()> {
        writeln!(self.out, "Waiting for an opponent...")
    }

    pub fn opponent(&mut self, name: &str, id: PlayerId) -> io::Result<()> {
        let piece = self.piece(false);
        writeln!(self.out, "Playing against {} (player {}, {})", name, id, piece)
    }

    /// Draws `board` with `viewer`'s pieces as `X` and the opponent's as `O`
    pub fn board(&mut self, board: &Board, viewer: PlayerId) -> io::Result<()> {
        if !self.color {
            write!(self.out, "{}", board.view(viewer))?;
            return Ok(());
        }

        for column in 0..COLUMNS {
            write!(self.out, " {}", column)?;
        }
        writeln!(self.out)?;
        for row in board.rows_top_down() {
            for cell in row {
                let symbol = match cell {
                    Some(id) => self.piece(*id == viewer),
                    None => ".".to_string(),
                };
                write!(self.out, " {}", symbol)?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }

    pub fn prompt_move(&mut self) -> io::Result<()> {
        write!(self.out, "Your move, choose a column: ")?;
        self.out.flush()
    }

    pub fn invalid_move(&mut self, reason: &str) -> io::Result<()> {
        writeln!(self.out, "Invalid move: {}", reason)
    }

    pub fn server_error(&mut self, code: ErrorCode, message: &str) -> io::Result<()> {
        writeln!(self.out, "Server error ({}): {}", code.to_wire(), message)
    }

    pub fn result(&mut self, result: GameResult) -> io::Result<()> {
        let text = match result {
            GameResult::Won => "You won!",
            GameResult::Lost => "You lost.",
            GameResult::Draw => "The board is full, it's a draw.",
            GameResult::OpponentForfeited => "Your opponent left, you won by forfeit!",
        };
        writeln!(self.out, "{}", text)?;
        self.out.flush()
    }

    fn piece(&self, own: bool) -> String {
        let (symbol, color) = if own { ('X', RED) } else { ('O', YELLOW) };
        if self.color {
            format!("{}{}{}", color, symbol, RESET)
        } else {
            symbol.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(renderer: TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn test_plain_board_matches_view() {
        let mut board = Board::new();
        board.place(3, 0);
        board.place(3, 1);

        let mut renderer = TerminalRenderer::new(Vec::new(), false);
        renderer.board(&board, 1).unwrap();
        assert_eq!(output(renderer), board.view(1).to_string());
    }

    #[test]
    fn test_colored_pieces_by_owner() {
        // players 0 and 2 share a parity but must still look different
        let mut board = Board::new();
        board.place(0, 0);
        board.place(1, 2);

        let mut renderer = TerminalRenderer::new(Vec::new(), true);
        renderer.board(&board, 2).unwrap();
        let text = output(renderer);
        let bottom = text.lines().last().unwrap();
        assert_eq!(bottom, " \x1b[33mO\x1b[0m \x1b[31mX\x1b[0m . . . . .");
    }

    #[test]
    fn test_result_lines() {
        let mut renderer = TerminalRenderer::new(Vec::new(), false);
        renderer.result(GameResult::OpponentForfeited).unwrap();
        renderer.server_error(ErrorCode::NotYourTurn, "wait").unwrap();
        let text = output(renderer);
        assert!(text.contains("forfeit"));
        assert!(text.contains("Server error (3): wait"));
    }
}
