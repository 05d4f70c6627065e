//! Error types for the coordinator

use thiserror::Error;

use crate::notation::NotationError;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("A session is already running")]
    AlreadyRunning,

    #[error("Not in a game")]
    NotInGame,

    #[error("Not our turn")]
    NotOurTurn,

    #[error("No piece on the selected square")]
    EmptySquare,

    #[error("Piece cannot promote")]
    CannotPromote,

    #[error(transparent)]
    Notation(#[from] NotationError),

    #[error("Engine error: {0}")]
    Engine(#[from] engine::EngineError),

    #[error("Client error: {0}")]
    Client(#[from] csa_client::ClientError),

    #[error("Coordinator actor closed")]
    ActorClosed,
}
