use thiserror::Error;

/// Errors produced by sharding, loading and collective operations.
#[derive(Error, Debug)]
pub enum FleetError {
    /// A worker group must contain at least one rank.
    #[error("Invalid world size: {0} (must be at least 1)")]
    InvalidWorldSize(usize),
    /// The rank is outside `[0, world_size)`.
    #[error("Invalid rank: {rank} is not in [0, {world_size})")]
    InvalidRank { rank: usize, world_size: usize },
    /// Batches must hold at least one sample.
    #[error("Invalid batch size: {0} (must be at least 1)")]
    InvalidBatchSize(usize),
    /// Two buffers that must line up element for element do not.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Duplicate tensor name: {0}")]
    DuplicateName(String),
    #[error("Unknown tensor name: {0}")]
    UnknownName(String),
    /// A ring neighbour hung up in the middle of a collective.
    #[error("Communication error: {0}")]
    Communication(String),
    /// A value does not fit the element type, e.g. the world size in a mean.
    #[error("Numeric conversion failed: {0}")]
    Conversion(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;
