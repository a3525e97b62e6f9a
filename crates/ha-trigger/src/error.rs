//! Trigger errors

use thiserror::Error;

/// Errors from building or evaluating a trigger
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Bad input to a builder entry point, raised before anything is attached
    #[error("{0}")]
    Validation(String),

    /// Call and cancel rules both held for one event
    #[error("logic error: {0}")]
    Logic(String),
}

pub type TriggerResult<T> = Result<T, TriggerError>;
