//! Spawning and driving a USI engine child process.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;

use crate::parser::{parse_usi_message, UsiMessage};
use crate::{EngineCommand, EngineEvent, GoParams, UsiMessageDirection};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const QUIT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to spawn engine: {0}")]
    Spawn(std::io::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine has no stdin")]
    NoStdin,
    #[error("Engine has no stdout")]
    NoStdout,
    #[error("Engine closed during handshake")]
    ClosedDuringHandshake,
    #[error("Engine closed")]
    Closed,
    #[error("Timeout waiting for {0}")]
    HandshakeTimeout(&'static str),
}

/// How to launch the engine.
#[derive(Debug, Clone)]
pub struct UsiEngineConfig {
    pub path: PathBuf,
    /// `setoption name <k> value <v>` pairs applied after `usiok`.
    pub options: Vec<(String, String)>,
}

impl UsiEngineConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: Vec::new(),
        }
    }
}

/// A running USI engine.
///
/// Owns the child process plus a stdin writer task and a stdout reader
/// task; callers talk to it through [`send_command`](Self::send_command)
/// and [`recv_event`](Self::recv_event).
pub struct UsiEngine {
    process: Child,
    command_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl UsiEngine {
    /// Spawn the engine and complete the USI handshake:
    /// `usi` → `usiok`, options, `isready` → `readyok`, `usinewgame`.
    #[tracing::instrument(level = "info", skip(config), fields(path = %config.path.display()))]
    pub async fn spawn(config: UsiEngineConfig) -> Result<Self, EngineError> {
        tracing::info!("Starting USI engine");
        let mut process = tokio::process::Command::new(&config.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        let mut stdin = process.stdin.take().ok_or(EngineError::NoStdin)?;
        let stdout = process.stdout.take().ok_or(EngineError::NoStdout)?;

        let (event_tx, mut event_rx) = mpsc::channel::<EngineEvent>(32);

        // Stdout reader task: parse every line, surface it as events.
        let reader_event_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tracing::warn!("engine stdout EOF");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        tracing::trace!("USI << {}", trimmed);
                        let _ = reader_event_tx
                            .send(EngineEvent::RawUsiMessage {
                                direction: UsiMessageDirection::FromEngine,
                                message: trimmed.to_string(),
                            })
                            .await;

                        let event = match parse_usi_message(trimmed) {
                            Ok(UsiMessage::UsiOk) | Ok(UsiMessage::ReadyOk) => EngineEvent::Ready,
                            Ok(UsiMessage::BestMove { mv, .. }) => {
                                tracing::info!(best_move = %mv, "engine moved");
                                EngineEvent::BestMove(mv)
                            }
                            Ok(UsiMessage::Info(info)) => EngineEvent::Info(info),
                            Ok(_) => continue,
                            Err(_) => continue, // id strings, option lists, banners
                        };
                        if reader_event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::error!(%err, "error reading engine stdout");
                        break;
                    }
                }
            }
            tracing::debug!("engine reader task exiting");
        });

        // Handshake runs on the raw stdin before the writer task owns it.
        stdin.write_all(b"usi\n").await?;
        stdin.flush().await?;
        wait_ready(&mut event_rx, "usiok").await?;

        for (name, value) in &config.options {
            tracing::info!(name, value, "setting engine option");
            stdin
                .write_all(format!("setoption name {name} value {value}\n").as_bytes())
                .await?;
        }
        stdin.write_all(b"isready\n").await?;
        stdin.flush().await?;
        wait_ready(&mut event_rx, "readyok").await?;

        stdin.write_all(b"usinewgame\n").await?;
        stdin.flush().await?;

        // Stdin writer task.
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);
        let writer_event_tx = event_tx.clone();
        tokio::spawn(async move {
            while let Some(cmd) = stdin_rx.recv().await {
                let trimmed = cmd.trim();
                tracing::trace!("USI >> {}", trimmed);
                let _ = writer_event_tx
                    .send(EngineEvent::RawUsiMessage {
                        direction: UsiMessageDirection::ToEngine,
                        message: trimmed.to_string(),
                    })
                    .await;
                if let Err(err) = stdin.write_all(cmd.as_bytes()).await {
                    tracing::error!(%err, "failed to write to engine stdin");
                    let _ = writer_event_tx
                        .send(EngineEvent::Error(format!("engine write failed: {err}")))
                        .await;
                    break;
                }
                if let Err(err) = stdin.flush().await {
                    tracing::error!(%err, "failed to flush engine stdin");
                }
            }
            tracing::debug!("engine writer task exiting");
        });

        // Command processor task: renders commands to wire text.
        let (command_tx, mut command_rx) = mpsc::channel::<EngineCommand>(32);
        let command_stdin_tx = stdin_tx.clone();
        tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                let wire = match cmd {
                    EngineCommand::SetPosition { position, moves } => {
                        let mut line = format!("position {position}");
                        if !moves.is_empty() {
                            line.push_str(" moves");
                            for mv in &moves {
                                line.push(' ');
                                line.push_str(mv);
                            }
                        }
                        line.push('\n');
                        line
                    }
                    EngineCommand::Go(params) => format_go(&params),
                    EngineCommand::Stop => "stop\n".to_string(),
                    EngineCommand::GameOver(result) => {
                        format!("gameover {}\n", result.as_str())
                    }
                    EngineCommand::Quit => {
                        let _ = command_stdin_tx.send("quit\n".to_string()).await;
                        break;
                    }
                };
                if command_stdin_tx.send(wire).await.is_err() {
                    break;
                }
            }
            tracing::debug!("engine command task exiting");
        });

        tracing::info!("USI engine ready");
        Ok(Self {
            process,
            command_tx,
            event_rx,
        })
    }

    pub async fn send_command(&self, cmd: EngineCommand) -> Result<(), EngineError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| EngineError::Closed)
    }

    /// Receive the next engine event.
    pub async fn recv_event(&mut self) -> Option<EngineEvent> {
        self.event_rx.recv().await
    }

    /// Non-blocking event poll.
    pub fn try_recv_event(&mut self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Ask the engine to quit, wait briefly, then kill it.
    pub async fn shutdown(mut self) {
        let _ = self.command_tx.send(EngineCommand::Quit).await;
        let _ = tokio::time::timeout(QUIT_GRACE, self.process.wait()).await;
        let _ = self.process.kill().await;
    }
}

async fn wait_ready(
    event_rx: &mut mpsc::Receiver<EngineEvent>,
    what: &'static str,
) -> Result<(), EngineError> {
    tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        while let Some(event) = event_rx.recv().await {
            if matches!(event, EngineEvent::Ready) {
                tracing::debug!("received {}", what);
                return Ok(());
            }
        }
        Err(EngineError::ClosedDuringHandshake)
    })
    .await
    .map_err(|_| EngineError::HandshakeTimeout(what))?
}

fn format_go(params: &GoParams) -> String {
    let mut line = format!("go btime {} wtime {}", params.btime_ms, params.wtime_ms);
    if params.binc_ms > 0 || params.winc_ms > 0 {
        line.push_str(&format!(" binc {} winc {}", params.binc_ms, params.winc_ms));
    } else {
        line.push_str(&format!(" byoyomi {}", params.byoyomi_ms));
    }
    line.push('\n');
    line
}
