use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Node capacity exceeded: the tree is limited to {limit} nodes")]
    CapacityExceeded { limit: usize },

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Recursion depth {depth} exceeds the supported maximum of {max}")]
    DepthExceeded { depth: usize, max: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid tree: {0}")]
    InvalidTree(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SolverResult<T> = Result<T, SolverError>;
