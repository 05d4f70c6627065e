use tokio::sync::{broadcast, mpsc, oneshot};

use crate::actor::run_client_actor;
use crate::commands::ClientCommand;
use crate::error::{ClientError, ClientResult};
use crate::events::ClientEvent;
use crate::types::ConnectionState;

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Cheap, cloneable handle to a client actor.
///
/// Commands are fire-and-forget; outcomes arrive on the event stream
/// obtained from [`subscribe`](Self::subscribe).
#[derive(Clone)]
pub struct CsaClient {
    cmd_tx: mpsc::Sender<ClientCommand>,
}

impl CsaClient {
    /// Spawn a fresh client actor and return its handle.
    pub fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(run_client_actor(cmd_rx, event_tx));
        Self { cmd_tx }
    }

    pub async fn connect(&self, host: &str, port: u16) -> ClientResult<()> {
        self.send(ClientCommand::Connect {
            host: host.to_string(),
            port,
        })
        .await
    }

    pub async fn disconnect(&self) -> ClientResult<()> {
        self.send(ClientCommand::Disconnect).await
    }

    pub async fn login(&self, username: String, password: String) -> ClientResult<()> {
        self.send(ClientCommand::Login { username, password }).await
    }

    pub async fn logout(&self) -> ClientResult<()> {
        self.send(ClientCommand::Logout).await
    }

    pub async fn agree(&self, game_id: Option<String>) -> ClientResult<()> {
        self.send(ClientCommand::Agree { game_id }).await
    }

    pub async fn reject(&self, game_id: Option<String>) -> ClientResult<()> {
        self.send(ClientCommand::Reject { game_id }).await
    }

    pub async fn send_move(&self, mv: String) -> ClientResult<()> {
        self.send(ClientCommand::SendMove { mv }).await
    }

    pub async fn send_raw(&self, line: String) -> ClientResult<()> {
        self.send(ClientCommand::SendRaw { line }).await
    }

    pub async fn resign(&self) -> ClientResult<()> {
        self.send(ClientCommand::Resign).await
    }

    pub async fn declare_win(&self) -> ClientResult<()> {
        self.send(ClientCommand::DeclareWin).await
    }

    pub async fn request_chudan(&self) -> ClientResult<()> {
        self.send(ClientCommand::RequestChudan).await
    }

    pub async fn state(&self) -> ClientResult<ConnectionState> {
        let (tx, rx) = oneshot::channel();
        self.send(ClientCommand::GetState { reply: tx }).await?;
        rx.await.map_err(|_| ClientError::ActorClosed)
    }

    pub async fn subscribe(&self) -> ClientResult<broadcast::Receiver<ClientEvent>> {
        let (tx, rx) = oneshot::channel();
        self.send(ClientCommand::Subscribe { reply: tx }).await?;
        rx.await.map_err(|_| ClientError::ActorClosed)
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Shutdown).await;
    }

    async fn send(&self, cmd: ClientCommand) -> ClientResult<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| ClientError::ActorClosed)
    }
}
