//! The client actor: owns the socket, drives the protocol state machine.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn, Instrument};

use crate::commands::ClientCommand;
use crate::error::{ClientError, ClientResult};
use crate::events::ClientEvent;
use crate::state::ProtocolState;
use crate::types::ConnectionState;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);
const LINE_CHANNEL_CAPACITY: usize = 64;

/// The main client actor loop. Owns all mutable state; processes commands
/// and socket lines sequentially.
pub(crate) async fn run_client_actor(
    cmd_rx: mpsc::Receiver<ClientCommand>,
    event_tx: broadcast::Sender<ClientEvent>,
) {
    run_client_actor_inner(cmd_rx, event_tx)
        .instrument(tracing::info_span!("csa_client"))
        .await;
}

async fn run_client_actor_inner(
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
    event_tx: broadcast::Sender<ClientEvent>,
) {
    tracing::info!("Client actor started");

    let mut actor = ClientActor {
        state: ProtocolState::new(),
        event_tx,
        conn: None,
        line_rx: None,
    };

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Shutdown) | None => {
                        tracing::info!("Client actor shutting down");
                        actor.disconnect().await;
                        break;
                    }
                    Some(cmd) => actor.handle_command(cmd).await,
                }
            }

            line = next_line(&mut actor.line_rx), if actor.line_rx.is_some() => {
                actor.handle_socket(line).await;
            }
        }
    }

    tracing::info!("Client actor exited");
}

async fn next_line(
    rx: &mut Option<mpsc::Receiver<std::io::Result<String>>>,
) -> Option<std::io::Result<String>> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

struct Connection {
    writer: OwnedWriteHalf,
    reader_task: JoinHandle<()>,
}

struct ClientActor {
    state: ProtocolState,
    event_tx: broadcast::Sender<ClientEvent>,
    conn: Option<Connection>,
    line_rx: Option<mpsc::Receiver<std::io::Result<String>>>,
}

impl ClientActor {
    async fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Connect { host, port } => self.connect(&host, port).await,
            ClientCommand::Disconnect => self.disconnect().await,
            ClientCommand::Login { username, password } => {
                if self.state.state() != ConnectionState::Connected {
                    self.emit(ClientEvent::Error("not connected to a server".to_string()));
                    return;
                }
                let wire = format!("LOGIN {username} {password}");
                let public = format!("LOGIN {username} ***");
                self.send_line(&wire, &public).await;
            }
            ClientCommand::Logout => {
                if self.is_logged_in() {
                    self.send_line("LOGOUT", "LOGOUT").await;
                }
            }
            ClientCommand::Agree { game_id } => {
                if self.state.state() != ConnectionState::GameReady {
                    self.emit(ClientEvent::Error("no game summary to agree to".to_string()));
                    return;
                }
                let cmd = match game_id {
                    Some(id) => format!("AGREE {id}"),
                    None => "AGREE".to_string(),
                };
                self.send_line(&cmd, &cmd).await;
            }
            ClientCommand::Reject { game_id } => {
                if self.state.state() != ConnectionState::GameReady {
                    self.emit(ClientEvent::Error("no game summary to reject".to_string()));
                    return;
                }
                let cmd = match game_id {
                    Some(id) => format!("REJECT {id}"),
                    None => "REJECT".to_string(),
                };
                self.send_line(&cmd, &cmd).await;
            }
            ClientCommand::SendMove { mv } => {
                if self.state.state() != ConnectionState::InGame {
                    self.emit(ClientEvent::Error("not in a game".to_string()));
                    return;
                }
                if !self.state.my_turn() {
                    self.emit(ClientEvent::Error("not our turn".to_string()));
                    return;
                }
                self.send_line(&mv, &mv).await;
            }
            ClientCommand::SendRaw { line } => {
                self.send_line(&line, &line).await;
            }
            ClientCommand::Resign => self.send_in_game("%TORYO").await,
            ClientCommand::DeclareWin => self.send_in_game("%KACHI").await,
            ClientCommand::RequestChudan => self.send_in_game("%CHUDAN").await,
            ClientCommand::GetState { reply } => {
                let _ = reply.send(self.state.state());
            }
            ClientCommand::Subscribe { reply } => {
                let _ = reply.send(self.event_tx.subscribe());
            }
            ClientCommand::Shutdown => {}
        }
    }

    async fn connect(&mut self, host: &str, port: u16) {
        if self.state.state() != ConnectionState::Disconnected {
            self.emit(ClientEvent::Error("already connected".to_string()));
            return;
        }

        info!(host, port, "connecting");
        let event = self.state.transition(ConnectionState::Connecting);
        self.apply(event);

        match self.open_socket(host, port).await {
            Ok(stream) => {
                info!("connected to server");
                let (read_half, writer) = stream.into_split();
                let (line_tx, line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
                let reader_task = tokio::spawn(read_lines(read_half, line_tx));
                self.conn = Some(Connection {
                    writer,
                    reader_task,
                });
                self.line_rx = Some(line_rx);
                let event = self.state.transition(ConnectionState::Connected);
                self.apply(event);
            }
            Err(err) => {
                warn!(%err, "connect failed");
                self.emit(ClientEvent::Error(err.to_string()));
                let event = self.state.transition(ConnectionState::Disconnected);
                self.apply(event);
            }
        }
    }

    async fn open_socket(&self, host: &str, port: u16) -> ClientResult<TcpStream> {
        let stream = time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ClientError::ConnectTimeout)??;
        Ok(stream)
    }

    /// Single teardown path. Sends `LOGOUT` first when a session is live so
    /// the server closes it cleanly; never retries.
    async fn disconnect(&mut self) {
        if self.is_logged_in() {
            self.send_line("LOGOUT", "LOGOUT").await;
        }
        self.close_socket();
        let event = self.state.transition(ConnectionState::Disconnected);
        self.apply(event);
    }

    fn close_socket(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.reader_task.abort();
        }
        self.line_rx = None;
    }

    async fn handle_socket(&mut self, item: Option<std::io::Result<String>>) {
        match item {
            Some(Ok(line)) => {
                // Every received line is teed verbatim, blanks included.
                self.emit(ClientEvent::RawReceived(line.clone()));
                if line.is_empty() {
                    return;
                }
                for event in self.state.handle_line(&line) {
                    self.emit(event);
                }
                // A LOGOUT acknowledgment ends the session from our side.
                if self.state.state() == ConnectionState::Disconnected {
                    self.close_socket();
                }
            }
            Some(Err(err)) => {
                warn!(%err, "socket error");
                self.emit(ClientEvent::Error(format!("connection lost: {err}")));
                self.close_socket();
                let event = self.state.transition(ConnectionState::Disconnected);
                self.apply(event);
            }
            None => {
                // Remote close. Expected after the game; an error before.
                if self.state.state() == ConnectionState::GameOver {
                    info!("connection closed by server after game end");
                } else {
                    warn!("connection closed by server");
                    self.emit(ClientEvent::Error("connection closed by server".to_string()));
                }
                self.close_socket();
                let event = self.state.transition(ConnectionState::Disconnected);
                self.apply(event);
            }
        }
    }

    async fn send_in_game(&mut self, cmd: &str) {
        if self.state.state() != ConnectionState::InGame {
            self.emit(ClientEvent::Error("not in a game".to_string()));
            return;
        }
        self.send_line(cmd, cmd).await;
    }

    async fn send_line(&mut self, wire: &str, public: &str) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        let msg = format!("{wire}\n");
        if let Err(err) = conn.writer.write_all(msg.as_bytes()).await {
            warn!(%err, "failed to write message");
            self.emit(ClientEvent::Error(format!("failed to send message: {err}")));
            return;
        }
        debug!(line = public, "sent");
        self.emit(ClientEvent::RawSent(public.to_string()));
    }

    fn is_logged_in(&self) -> bool {
        matches!(
            self.state.state(),
            ConnectionState::LoggedIn | ConnectionState::WaitingForGame
        )
    }

    fn apply(&self, event: Option<ClientEvent>) {
        if let Some(event) = event {
            self.emit(event);
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Reader task: splits the socket into lines, CR stripped. Channel close
/// signals EOF; an `Err` item signals a transport fault.
async fn read_lines(read_half: OwnedReadHalf, tx: mpsc::Sender<std::io::Result<String>>) {
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();
    loop {
        buf.clear();
        match reader.read_line(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = buf.trim_end_matches(['\r', '\n']).to_string();
                if tx.send(Ok(line)).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                break;
            }
        }
    }
}
