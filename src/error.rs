use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid FEN: {0}")]
    InvalidFen(#[from] shakmaty::fen::ParseFenError),

    #[error("illegal position: {0}")]
    IllegalPosition(String),

    #[error("invalid UCI move: {0}")]
    InvalidMove(String),

    #[error("illegal move {uci} in position {fen}")]
    IllegalMove { uci: String, fen: String },

    #[error("invalid value {value:?} for option {name}")]
    InvalidOption { name: String, value: String },
}

pub type EngineResult<T> = Result<T, EngineError>;
