//! Identity resolution: raw, error-prone rank and name tokens in, stable
//! player records out.

pub mod name;
pub mod rank;
pub mod similarity;

pub use name::{resolve_ally_name, resolve_enemy_name, ResolvedName};
pub use rank::{resolve_enemy_rank, resolve_player_rank, translate_rank, ResolvedRank};
pub use similarity::{best_match, clean, ratio};
