//! Rule sets shipped with the crate.

mod tictactoe;

pub use tictactoe::{Mark, TicTacToe, TicTacToeFactory};
