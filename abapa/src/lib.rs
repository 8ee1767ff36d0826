#![deny(unused_results)]

//! The search core: a two-tier aging cache, a perfect-hash endgame tablebase, an opening book with a UCT-based
//! trainer, a time manager, and two pluggable engines (iterative-deepening PVS Negamax and best-first UCT).
//! Everything here is generic over [`gears::general::game::Game`] and knows nothing about any concrete game's
//! rules; move generation, the text protocol and CLI/GUI integration are external collaborators.

pub mod cache;
pub mod leaves;
pub mod negamax;
pub mod report;
pub mod roots;
pub mod search;
pub mod time_manager;
pub mod trainer;
pub mod uct;
