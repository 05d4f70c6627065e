use tokio::sync::{broadcast, mpsc, oneshot};

use crate::actor::run_coordinator_actor;
use crate::commands::{CoordinatorCommand, StartOptions};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::events::{CoordinatorEvent, GameState};
use crate::notation::{Piece, Square};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

/// Cheap-to-clone handle to the coordinator actor.
#[derive(Clone)]
pub struct GameCoordinator {
    cmd_tx: mpsc::Sender<CoordinatorCommand>,
}

impl GameCoordinator {
    /// Spawn the actor and return a handle to it.
    pub fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        tokio::spawn(run_coordinator_actor(cmd_rx, event_tx));
        Self { cmd_tx }
    }

    /// Connect, log in, and wait for a game per `options`.
    pub async fn start(&self, options: StartOptions) -> CoordinatorResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Start {
            options: Box::new(options),
            reply,
        })
        .await?;
        rx.await.map_err(|_| CoordinatorError::ActorClosed)?
    }

    /// Tear down the current session (resigning first if a game is live).
    pub async fn stop(&self) -> CoordinatorResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Stop { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::ActorClosed)
    }

    pub async fn human_move(
        &self,
        from: Square,
        to: Square,
        promote: bool,
    ) -> CoordinatorResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorCommand::HumanMove {
            from,
            to,
            promote,
            reply,
        })
        .await?;
        rx.await.map_err(|_| CoordinatorError::ActorClosed)?
    }

    pub async fn human_drop(&self, piece: Piece, to: Square) -> CoordinatorResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorCommand::HumanDrop { piece, to, reply })
            .await?;
        rx.await.map_err(|_| CoordinatorError::ActorClosed)?
    }

    pub async fn resign(&self) -> CoordinatorResult<()> {
        self.send(CoordinatorCommand::Resign).await
    }

    pub async fn declare_win(&self) -> CoordinatorResult<()> {
        self.send(CoordinatorCommand::DeclareWin).await
    }

    pub async fn state(&self) -> CoordinatorResult<GameState> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorCommand::GetState { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::ActorClosed)
    }

    pub async fn subscribe(&self) -> CoordinatorResult<broadcast::Receiver<CoordinatorEvent>> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Subscribe { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::ActorClosed)
    }

    /// Stop the actor itself. Further calls on any clone will fail.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(CoordinatorCommand::Shutdown).await;
    }

    async fn send(&self, cmd: CoordinatorCommand) -> CoordinatorResult<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| CoordinatorError::ActorClosed)
    }
}
