use crate::store::StoreError;
use crate::upstream::UpstreamError;
use swarmdash_core::ValidationError;
use thiserror::Error;

/// Errors surfaced by the lifecycle coordinator to command callers.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("a test is already running")]
    TestAlreadyRunning,

    #[error("no test is currently running")]
    NoActiveTest,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Server(#[from] crate::server::ServerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
