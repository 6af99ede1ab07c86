use super::models::Balance;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("registry already initialized")]
    AlreadyInitialized,
    #[error("registry not initialized")]
    NotInitialized,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("insufficient funds: attached {attached}, required {required}")]
    InsufficientFunds { required: Balance, attached: Balance },
    #[error("unauthorized")]
    Unauthorized,
    #[error("duplicate resource: {0}")]
    DuplicateResource(String),
    #[error("internal error: {0}")]
    Internal(&'static str),
}

pub type PlatformResult<T> = Result<T, PlatformError>;
