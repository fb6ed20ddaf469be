//! Error taxonomy. The sampler treats `Transient` as data and never
//! propagates it; everything else surfaces to the API layer as a typed
//! error, serialized `{error: string}` with HTTP 200 by the gateway.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("pool exhausted: {0}")]
    PoolExhausted(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("backend failure: {0}")]
    BackendFailure(String),
    #[error("transient: {0}")]
    Transient(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
