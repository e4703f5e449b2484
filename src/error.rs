//! Crate-level error type.
//!
//! Most failure paths in this crate are recovered where they happen (see
//! [`history`](crate::history) and [`notify`](crate::notify)); the variants
//! here cover the few operations that report back to the caller.

use thiserror::Error;

use crate::config::ConfigError;
use crate::machine::TransitionError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub type Result<T> = std::result::Result<T, Error>;
