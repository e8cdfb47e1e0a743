//! Local move collection

use shared::board::COLUMNS;
use shared::Board;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

pub const DEFAULT_NAME: &str = "Player";

/// Somewhere the turn loop can get the player's next column from
pub trait MoveSource {
    /// Next column to play, `None` when no more input will come
    fn next_move(&mut self, board: &Board) -> io::Result<Option<usize>>;
}

/// Reads columns typed one per line, re-asking until one fits the board
pub struct LineMoves<R, W> {
    reader: R,
    feedback: W,
}

impl<R: BufRead, W: Write> LineMoves<R, W> {
    pub fn new(reader: R, feedback: W) -> Self {
        Self { reader, feedback }
    }
}

impl LineMoves<io::StdinLock<'static>, io::Stdout> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> MoveSource for LineMoves<R, W> {
    fn next_move(&mut self, board: &Board) -> io::Result<Option<usize>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }

            match line.trim().parse::<usize>() {
                Ok(column) if board.is_valid_move(column) => return Ok(Some(column)),
                Ok(column) if column < COLUMNS => {
                    write!(self.feedback, "Column {} is full, pick another: ", column)?
                }
                _ => write!(
                    self.feedback,
                    "Enter a column number from 0 to {}: ",
                    COLUMNS - 1
                )?,
            }
            self.feedback.flush()?;
        }
    }
}

/// Fixed list of columns, played in order without looking at the board
#[derive(Debug, Default)]
pub struct ScriptedMoves {
    moves: VecDeque<usize>,
}

impl ScriptedMoves {
    pub fn new(moves: impl IntoIterator<Item = usize>) -> Self {
        Self {
            moves: moves.into_iter().collect(),
        }
    }
}

impl MoveSource for ScriptedMoves {
    fn next_move(&mut self, _board: &Board) -> io::Result<Option<usize>> {
        Ok(self.moves.pop_front())
    }
}

/// Asks for a display name until a non-blank one is given. EOF falls back to
/// [`DEFAULT_NAME`].
pub fn prompt_name<R: BufRead, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<String> {
    let mut line = String::new();
    loop {
        write!(writer, "Enter your name: ")?;
        writer.flush()?;

        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(DEFAULT_NAME.to_string());
        }
        let name = line.trim();
        if !name.is_empty() {
            return Ok(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_until_valid_column() {
        let mut board = Board::new();
        for _ in 0..6 {
            board.place(2, 0);
        }
        let input = Cursor::new("abc\n9\n2\n 4 \n");
        let mut moves = LineMoves::new(input, Vec::new());

        assert_eq!(moves.next_move(&board).unwrap(), Some(4));

        let feedback = String::from_utf8(moves.feedback).unwrap();
        assert!(feedback.contains("from 0 to 6"));
        assert!(feedback.contains("Column 2 is full"));
    }

    #[test]
    fn test_eof_ends_input() {
        let mut moves = LineMoves::new(Cursor::new("x\n"), Vec::new());
        assert_eq!(moves.next_move(&Board::new()).unwrap(), None);
    }

    #[test]
    fn test_scripted_moves_in_order() {
        let mut moves = ScriptedMoves::new([3, 1]);
        let board = Board::new();
        assert_eq!(moves.next_move(&board).unwrap(), Some(3));
        assert_eq!(moves.next_move(&board).unwrap(), Some(1));
        assert_eq!(moves.next_move(&board).unwrap(), None);
    }

    #[test]
    fn test_name_prompt() {
        let mut output = Vec::new();
        let name = prompt_name(&mut Cursor::new("\n  \n Ada \n"), &mut output).unwrap();
        assert_eq!(name, "Ada");
        assert_eq!(
            String::from_utf8(output).unwrap().matches("Enter your name").count(),
            3
        );

        let name = prompt_name(&mut Cursor::new(""), &mut Vec::new()).unwrap();
        assert_eq!(name, DEFAULT_NAME);
    }
}
