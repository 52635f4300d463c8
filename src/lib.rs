//! Scoutfish: a negascout chess search over shakmaty positions.

pub mod config;
pub mod constants;
pub mod error;
pub mod evaluation;
pub mod movegen;
pub mod moves;
pub mod ordering;
pub mod position;
pub mod search;
pub mod see;
pub mod tt;
pub mod uci;
