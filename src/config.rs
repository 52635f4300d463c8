use crate::error::{EngineError, EngineResult};

/// Settings for a [`SearchSession`](crate::search::SearchSession).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchConfig {
    /// Transposition table size as log2 of the entry count.
    pub hash_log2_size: u32,
    /// How often, in nodes, the time budget and stop flag are checked.
    pub nodes_between_time_check: u64,
    /// Playing strength, 0 to 1000. Below 1000 good moves are sometimes
    /// skipped on purpose.
    pub strength: u32,
    pub random_seed: u64,
    /// Collect per-ply node statistics and log each root move.
    pub verbose: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            hash_log2_size: 20,
            nodes_between_time_check: 5000,
            strength: 1000,
            random_seed: 0,
            verbose: false,
        }
    }
}

pub const MAX_HASH_LOG2_SIZE: u32 = 28;
pub const MAX_STRENGTH: u32 = 1000;

impl SearchConfig {
    /// Applies a `setoption name <name> value <value>` pair.
    pub fn set_option(&mut self, name: &str, value: &str) -> EngineResult<()> {
        let invalid = || EngineError::InvalidOption { name: name.to_owned(), value: value.to_owned() };
        match name.to_ascii_lowercase().as_str() {
            "hash" => {
                let log2: u32 = value.parse().map_err(|_| invalid())?;
                if !(1..=MAX_HASH_LOG2_SIZE).contains(&log2) {
                    return Err(invalid());
                }
                self.hash_log2_size = log2;
            }
            "strength" => {
                let strength: u32 = value.parse().map_err(|_| invalid())?;
                if strength > MAX_STRENGTH {
                    return Err(invalid());
                }
                self.strength = strength;
            }
            "seed" => self.random_seed = value.parse().map_err(|_| invalid())?,
            _ => return Err(invalid()),
        }
        Ok(())
    }
}
