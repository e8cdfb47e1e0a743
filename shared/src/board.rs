//! Connect-four grid shared by the server's sessions and the client's local view

use crate::protocol::PlayerId;
use std::fmt;

pub const COLUMNS: usize = 7;
pub const ROWS: usize = 6;
pub const WINNING_LENGTH: usize = 4;

/// How a finished game ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Winner(PlayerId),
    Draw,
}

/// Row 0 is the bottom of the grid; pieces fall toward it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cells: [[Option<PlayerId>; COLUMNS]; ROWS],
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            cells: [[None; COLUMNS]; ROWS],
        }
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<PlayerId> {
        self.cells.get(row).and_then(|r| r.get(column).copied().flatten())
    }

    pub fn is_valid_move(&self, column: usize) -> bool {
        column < COLUMNS && self.cells[ROWS - 1][column].is_none()
    }

    /// Drops a piece into `column`. Returns false, leaving the board
    /// untouched, when the column is full or out of range.
    pub fn place(&mut self, column: usize, player: PlayerId) -> bool {
        if !self.is_valid_move(column) {
            return false;
        }

        for row in self.cells.iter_mut() {
            if row[column].is_none() {
                row[column] = Some(player);
                return true;
            }
        }
        false
    }

    pub fn is_full(&self) -> bool {
        self.cells[ROWS - 1].iter().all(Option::is_some)
    }

    pub fn pieces(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }

    /// `None` while the game can continue
    pub fn outcome(&self) -> Option<Outcome> {
        if let Some(winner) = self.winner() {
            return Some(Outcome::Winner(winner));
        }
        if self.is_full() {
            return Some(Outcome::Draw);
        }
        None
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    /// Rows from top to bottom, the order a terminal prints them
    pub fn rows_top_down(&self) -> impl Iterator<Item = &[Option<PlayerId>; COLUMNS]> {
        self.cells.iter().rev()
    }

    fn winner(&self) -> Option<PlayerId> {
        const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

        for row in 0..ROWS {
            for column in 0..COLUMNS {
                let Some(player) = self.cells[row][column] else {
                    continue;
                };
                for (dr, dc) in DIRECTIONS {
                    if self.run_length(row, column, dr, dc, player) >= WINNING_LENGTH {
                        return Some(player);
                    }
                }
            }
        }
        None
    }

    fn run_length(&self, row: usize, column: usize, dr: isize, dc: isize, player: PlayerId) -> usize {
        let mut length = 0;
        let (mut r, mut c) = (row as isize, column as isize);

        while r >= 0 && c >= 0 && (r as usize) < ROWS && (c as usize) < COLUMNS {
            if self.cells[r as usize][c as usize] != Some(player) {
                break;
            }
            length += 1;
            r += dr;
            c += dc;
        }
        length
    }
}

/// Plain-text grid as one player sees it: numbered columns, top row first,
/// `X` for the viewer's pieces and `O` for anyone else's
pub struct BoardView<'a> {
    board: &'a Board,
    viewer: PlayerId,
}

impl Board {
    pub fn view(&self, viewer: PlayerId) -> BoardView<'_> {
        BoardView {
            board: self,
            viewer,
        }
    }
}

impl fmt::Display for BoardView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for column in 0..COLUMNS {
            write!(f, " {}", column)?;
        }
        writeln!(f)?;

        for row in self.board.rows_top_down() {
            for cell in row {
                let symbol = match cell {
                    None => '.',
                    Some(id) if *id == self.viewer => 'X',
                    Some(_) => 'O',
                };
                write!(f, " {}", symbol)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(board: &mut Board, moves: &[(usize, PlayerId)]) {
        for &(column, player) in moves {
            assert!(board.place(column, player), "column {} rejected", column);
        }
    }

    #[test]
    fn test_pieces_stack_from_bottom() {
        let mut board = Board::new();
        play(&mut board, &[(3, 0), (3, 1)]);

        assert_eq!(board.cell(0, 3), Some(0));
        assert_eq!(board.cell(1, 3), Some(1));
        assert_eq!(board.cell(2, 3), None);
        assert_eq!(board.pieces(), 2);
        assert_eq!(board.outcome(), None);
    }

    #[test]
    fn test_full_and_out_of_range_columns() {
        let mut board = Board::new();
        for i in 0..ROWS {
            assert!(board.place(0, (i % 2) as PlayerId));
        }

        assert!(!board.is_valid_move(0));
        assert!(!board.place(0, 0));
        assert!(!board.place(COLUMNS, 0));
        assert_eq!(board.pieces(), ROWS);
    }

    #[test]
    fn test_vertical_win() {
        let mut board = Board::new();
        play(&mut board, &[(3, 0), (4, 1), (3, 0), (4, 1), (3, 0), (4, 1)]);
        assert_eq!(board.outcome(), None);

        play(&mut board, &[(3, 0)]);
        assert_eq!(board.outcome(), Some(Outcome::Winner(0)));
    }

    #[test]
    fn test_horizontal_win() {
        let mut board = Board::new();
        play(&mut board, &[(0, 1), (0, 0), (1, 1), (1, 0), (2, 1), (2, 0), (3, 1)]);
        assert_eq!(board.outcome(), Some(Outcome::Winner(1)));
    }

    #[test]
    fn test_rising_diagonal_win() {
        let mut board = Board::new();
        play(
            &mut board,
            &[
                (0, 0),
                (1, 1),
                (1, 0),
                (2, 1),
                (2, 0),
                (3, 1),
                (2, 0),
                (3, 1),
                (3, 0),
                (6, 1),
                (3, 0),
            ],
        );
        assert_eq!(board.outcome(), Some(Outcome::Winner(0)));
    }

    #[test]
    fn test_falling_diagonal_win() {
        let mut board = Board::new();
        play(
            &mut board,
            &[
                (6, 1),
                (5, 0),
                (5, 1),
                (4, 0),
                (4, 1),
                (3, 0),
                (4, 1),
                (3, 0),
                (3, 1),
                (0, 0),
                (3, 1),
            ],
        );
        assert_eq!(board.outcome(), Some(Outcome::Winner(1)));
    }

    #[test]
    fn test_three_is_not_enough() {
        let mut board = Board::new();
        play(&mut board, &[(0, 0), (1, 0), (2, 0), (4, 0)]);
        assert_eq!(board.outcome(), None);
    }

    #[test]
    fn test_full_board_is_draw() {
        let mut board = Board::new();
        // column pairs alternate owners every row so no line of four forms
        for row in 0..ROWS {
            for column in 0..COLUMNS {
                let owner = ((column / 2) + row) % 2;
                assert!(board.place(column, owner as PlayerId));
            }
        }

        assert!(board.is_full());
        assert_eq!(board.outcome(), Some(Outcome::Draw));
    }

    #[test]
    fn test_text_layout() {
        let mut board = Board::new();
        play(&mut board, &[(0, 0), (0, 2), (6, 0)]);

        let text = board.view(0).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), ROWS + 1);
        assert_eq!(lines[0], " 0 1 2 3 4 5 6");
        assert_eq!(lines[ROWS - 1], " O . . . . . .");
        assert_eq!(lines[ROWS], " X . . . . . X");
    }

    #[test]
    fn test_symbols_follow_the_viewer() {
        // ids of the same parity still get distinct symbols
        let mut board = Board::new();
        play(&mut board, &[(0, 0), (1, 2)]);

        let bottom = |viewer| board.view(viewer).to_string().lines().last().map(String::from);
        assert_eq!(bottom(0).as_deref(), Some(" X O . . . . ."));
        assert_eq!(bottom(2).as_deref(), Some(" O X . . . . ."));
    }
}
