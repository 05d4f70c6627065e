//! Error types for the CSA client

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection timeout")]
    ConnectTimeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Client actor closed")]
    ActorClosed,
}
