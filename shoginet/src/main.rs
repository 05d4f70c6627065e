//! Command-line CSA network player.
//!
//! Connects to a CSA shogi server, agrees to the first offered game, and
//! plays it with the configured USI engine (or just observes, logging the
//! wire traffic, when no engine is given). Exits when the game ends.

use anyhow::{bail, Context};
use clap::Parser;
use coordinator::{CoordinatorEvent, GameCoordinator, GameState, PlayerType, StartOptions};
use engine::UsiEngineConfig;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Play one game on a CSA shogi server.
#[derive(Parser)]
#[command(name = "shoginet", about = "CSA protocol network shogi player")]
struct Cli {
    /// CSA server hostname.
    #[arg(long)]
    host: String,

    /// CSA server port.
    #[arg(long, default_value_t = 4081)]
    port: u16,

    /// Login username.
    #[arg(long)]
    username: String,

    /// Login password.
    #[arg(long)]
    password: String,

    /// Advertised CSA protocol version.
    #[arg(long, default_value = "1.2.1")]
    csa_version: String,

    /// Path to a USI engine binary. Omit to observe without playing.
    #[arg(long)]
    engine: Option<std::path::PathBuf>,

    /// Engine option as `name=value`; may be repeated.
    #[arg(long = "engine-option", value_name = "NAME=VALUE")]
    engine_options: Vec<String>,
}

fn parse_engine_option(raw: &str) -> anyhow::Result<(String, String)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("engine option `{raw}` is not in name=value form"))?;
    Ok((name.to_string(), value.to_string()))
}

fn build_options(cli: &Cli) -> anyhow::Result<StartOptions> {
    let mut options = StartOptions::new(&cli.host, &cli.username, &cli.password);
    options.port = cli.port;
    options.csa_version = cli.csa_version.clone();

    if let Some(path) = &cli.engine {
        let mut config = UsiEngineConfig::new(path);
        for raw in &cli.engine_options {
            config.options.push(parse_engine_option(raw)?);
        }
        options.player = PlayerType::Engine(config);
    }

    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let options = build_options(&cli)?;

    let coordinator = GameCoordinator::spawn();
    let events = coordinator
        .subscribe()
        .await
        .context("coordinator unavailable")?;
    coordinator
        .start(options)
        .await
        .context("failed to start session")?;

    let outcome = run_event_loop(events).await;

    coordinator.stop().await.ok();
    coordinator.shutdown().await;
    outcome
}

/// Follow the coordinator until the game is decided or the session dies.
async fn run_event_loop(
    events: tokio::sync::broadcast::Receiver<CoordinatorEvent>,
) -> anyhow::Result<()> {
    let mut stream = BroadcastStream::new(events);

    loop {
        let event = tokio::select! {
            event = stream.next() => event,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                return Ok(());
            }
        };

        let Some(event) = event else {
            bail!("coordinator event stream closed");
        };
        let event = match event {
            Ok(event) => event,
            Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
                tracing::warn!(missed = n, "event stream lagged");
                continue;
            }
        };

        match event {
            CoordinatorEvent::StateChanged(state) => {
                tracing::info!(?state, "state changed");
                if state == GameState::Error {
                    bail!("session failed");
                }
            }
            CoordinatorEvent::GameStarted { game_id, black, white } => {
                tracing::info!(game_id, black, white, "game started");
            }
            CoordinatorEvent::MoveMade {
                pretty,
                csa,
                mover_is_us,
                consumed_ms,
                ..
            } => {
                tracing::info!(%pretty, csa, mover_is_us, consumed_ms, "move");
            }
            CoordinatorEvent::TurnChanged(our_turn) => {
                tracing::debug!(our_turn, "turn changed");
            }
            CoordinatorEvent::EngineInfo(info) => {
                tracing::debug!(
                    depth = info.depth,
                    score = ?info.score,
                    nodes = info.nodes,
                    pv = ?info.pv,
                    "engine search"
                );
            }
            CoordinatorEvent::GameEnded { text, consumed_ms, .. } => {
                tracing::info!(consumed_ms, "game ended: {text}");
                return Ok(());
            }
            CoordinatorEvent::CommLog { direction, line } => {
                tracing::debug!(?direction, line, "wire");
            }
            CoordinatorEvent::Error(err) => {
                tracing::error!(error = %err, "coordinator error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_engine_option() {
        assert_eq!(
            parse_engine_option("USI_Hash=256").unwrap(),
            ("USI_Hash".to_string(), "256".to_string())
        );
        assert!(parse_engine_option("garbage").is_err());
    }

    #[test]
    fn test_build_options_with_engine() {
        let cli = Cli::parse_from([
            "shoginet",
            "--host",
            "example.com",
            "--username",
            "u",
            "--password",
            "p",
            "--engine",
            "/usr/bin/engine",
            "--engine-option",
            "USI_Hash=256",
            "--engine-option",
            "Threads=4",
        ]);
        let options = build_options(&cli).unwrap();
        assert_eq!(options.port, 4081);
        let PlayerType::Engine(config) = options.player else {
            panic!("expected engine player");
        };
        assert_eq!(config.options.len(), 2);
        assert_eq!(config.options[1], ("Threads".to_string(), "4".to_string()));
    }

    #[test]
    fn test_build_options_defaults_to_human() {
        let cli = Cli::parse_from([
            "shoginet", "--host", "h", "--username", "u", "--password", "p",
        ]);
        let options = build_options(&cli).unwrap();
        assert!(matches!(options.player, PlayerType::Human));
        assert_eq!(options.csa_version, "1.2.1");
    }
}
