pub mod common;
pub mod game;
pub mod mock_game;
pub mod moves;
