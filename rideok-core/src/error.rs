use thiserror::Error;

/// Error taxonomy shared by the lifecycle manager, the sweeper and the
/// storage backends. Infrastructure failures are folded into `Unexpected`
/// so callers never see raw driver errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("You are not the driver of this ride")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("No available seats")]
    Capacity,

    #[error("{0}")]
    Unexpected(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(problem: impl Into<String>) -> Self {
        CoreError::Validation(vec![problem.into()])
    }

    pub fn unexpected(err: impl std::fmt::Display) -> Self {
        CoreError::Unexpected(err.to_string())
    }
}
