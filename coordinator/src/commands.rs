use std::sync::Arc;

use engine::UsiEngineConfig;
use tokio::sync::{broadcast, oneshot};

use crate::error::CoordinatorError;
use crate::events::{CoordinatorEvent, GameState};
use crate::notation::Square;
use crate::traits::BoardApplier;

/// Who plays our side of the board.
#[derive(Debug, Clone)]
pub enum PlayerType {
    /// Moves come in through `human_move`.
    Human,
    /// A USI engine is spawned and driven automatically.
    Engine(UsiEngineConfig),
}

/// Everything needed to take one seat at a CSA server.
#[derive(Clone)]
pub struct StartOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Protocol version we expect the server to announce; a differing
    /// `Protocol_Version` in the game summary is reported to the host.
    pub csa_version: String,
    pub player: PlayerType,
    pub board: Arc<dyn BoardApplier>,
}

impl StartOptions {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: csa_client::DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
            csa_version: "1.2.1".to_string(),
            player: PlayerType::Human,
            board: Arc::new(crate::traits::NullBoard),
        }
    }
}

/// Commands sent to the coordinator actor.
pub enum CoordinatorCommand {
    Start {
        options: Box<StartOptions>,
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    /// A human move in board coordinates; converted to CSA internally.
    HumanMove {
        from: Square,
        to: Square,
        promote: bool,
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    /// A human drop from hand.
    HumanDrop {
        piece: crate::notation::Piece,
        to: Square,
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    Resign,
    DeclareWin,
    GetState {
        reply: oneshot::Sender<GameState>,
    },
    Subscribe {
        reply: oneshot::Sender<broadcast::Receiver<CoordinatorEvent>>,
    },
    Shutdown,
}
