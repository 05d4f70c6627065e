//! The coordinator actor: one CSA client seat, optionally a USI engine
//! behind it, and the bookkeeping that keeps board, clock, and host in step.

use std::sync::Arc;

use csa_client::{
    ClientEvent, CsaClient, GameEndCause, GameResult, GameSummary, Side,
};
use engine::{EngineCommand, EngineEvent, GameOverResult, GoParams, UsiEngine};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn, Instrument};

use crate::board::PositionTracker;
use crate::clock::MatchClock;
use crate::commands::{CoordinatorCommand, PlayerType, StartOptions};
use crate::error::CoordinatorError;
use crate::events::{CommDirection, CoordinatorEvent, GameState};
use crate::notation::{csa_to_usi, pretty_move, usi_to_csa, CsaMove, Square, UsiMove};
use crate::traits::BoardApplier;

/// The main coordinator actor loop.
pub(crate) async fn run_coordinator_actor(
    cmd_rx: mpsc::Receiver<CoordinatorCommand>,
    event_tx: broadcast::Sender<CoordinatorEvent>,
) {
    run_coordinator_actor_inner(cmd_rx, event_tx)
        .instrument(tracing::info_span!("coordinator"))
        .await;
}

async fn run_coordinator_actor_inner(
    mut cmd_rx: mpsc::Receiver<CoordinatorCommand>,
    event_tx: broadcast::Sender<CoordinatorEvent>,
) {
    tracing::info!("Coordinator actor started");

    let mut actor = CoordinatorActor {
        state: GameState::Idle,
        event_tx,
        session: None,
    };

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(CoordinatorCommand::Shutdown) | None => {
                        tracing::info!("Coordinator actor shutting down");
                        actor.stop().await;
                        break;
                    }
                    Some(cmd) => actor.handle_command(cmd).await,
                }
            }

            signal = next_signal(&mut actor.session), if actor.session.is_some() => {
                actor.handle_signal(signal).await;
            }
        }
    }

    tracing::info!("Coordinator actor exited");
}

enum SessionSignal {
    Client(ClientEvent),
    ClientLagged(u64),
    ClientClosed,
    Engine(EngineEvent),
    EngineClosed,
}

async fn next_signal(session: &mut Option<Session>) -> SessionSignal {
    let Some(session) = session.as_mut() else {
        return std::future::pending().await;
    };
    let Session {
        client_events,
        engine,
        ..
    } = session;

    match engine {
        Some(engine) => tokio::select! {
            event = client_events.recv() => client_signal(event),
            event = engine.recv_event() => match event {
                Some(event) => SessionSignal::Engine(event),
                None => SessionSignal::EngineClosed,
            },
        },
        None => client_signal(client_events.recv().await),
    }
}

fn client_signal(event: Result<ClientEvent, broadcast::error::RecvError>) -> SessionSignal {
    match event {
        Ok(event) => SessionSignal::Client(event),
        Err(broadcast::error::RecvError::Lagged(n)) => SessionSignal::ClientLagged(n),
        Err(broadcast::error::RecvError::Closed) => SessionSignal::ClientClosed,
    }
}

/// Everything scoped to one server session, dropped as a unit by `stop`.
struct Session {
    client: CsaClient,
    client_events: broadcast::Receiver<ClientEvent>,
    engine: Option<UsiEngine>,
    board: Arc<dyn BoardApplier>,
    username: String,
    password: String,
    csa_version: String,
    summary: Option<GameSummary>,
    tracker: PositionTracker,
    clock: Option<MatchClock>,
    my_side: Option<Side>,
    my_turn: bool,
    move_count: u32,
    usi_moves: Vec<String>,
    start_position: String,
    prev_to: Option<Square>,
}

struct CoordinatorActor {
    state: GameState,
    event_tx: broadcast::Sender<CoordinatorEvent>,
    session: Option<Session>,
}

impl CoordinatorActor {
    async fn handle_command(&mut self, cmd: CoordinatorCommand) {
        match cmd {
            CoordinatorCommand::Start { options, reply } => {
                let _ = reply.send(self.start(*options).await);
            }
            CoordinatorCommand::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            CoordinatorCommand::HumanMove {
                from,
                to,
                promote,
                reply,
            } => {
                let _ = reply.send(self.human_move(from, to, promote).await);
            }
            CoordinatorCommand::HumanDrop { piece, to, reply } => {
                let _ = reply.send(self.human_drop(piece, to).await);
            }
            CoordinatorCommand::Resign => {
                if let Some(session) = &self.session {
                    let _ = session.client.resign().await;
                }
            }
            CoordinatorCommand::DeclareWin => {
                if let Some(session) = &self.session {
                    let _ = session.client.declare_win().await;
                }
            }
            CoordinatorCommand::GetState { reply } => {
                let _ = reply.send(self.state);
            }
            CoordinatorCommand::Subscribe { reply } => {
                let _ = reply.send(self.event_tx.subscribe());
            }
            CoordinatorCommand::Shutdown => {}
        }
    }

    async fn start(&mut self, options: StartOptions) -> Result<(), CoordinatorError> {
        if self.session.is_some() || self.state != GameState::Idle {
            return Err(CoordinatorError::AlreadyRunning);
        }

        info!(
            host = %options.host,
            port = options.port,
            username = %options.username,
            csa_version = %options.csa_version,
            "starting session"
        );

        let engine = match &options.player {
            PlayerType::Human => None,
            PlayerType::Engine(config) => Some(UsiEngine::spawn(config.clone()).await?),
        };

        let client = CsaClient::spawn();
        let client_events = client.subscribe().await?;
        client.connect(&options.host, options.port).await?;

        self.session = Some(Session {
            client,
            client_events,
            engine,
            board: options.board,
            username: options.username,
            password: options.password,
            csa_version: options.csa_version,
            summary: None,
            tracker: PositionTracker::hirate(),
            clock: None,
            my_side: None,
            my_turn: false,
            move_count: 0,
            usi_moves: Vec::new(),
            start_position: "startpos".to_string(),
            prev_to: None,
        });
        self.set_state(GameState::Connecting);
        Ok(())
    }

    /// Single teardown path; safe in every state.
    async fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if self.state == GameState::InGame {
                let _ = session.client.resign().await;
            }
            let _ = session.client.disconnect().await;
            session.client.shutdown().await;
            if let Some(engine) = session.engine.take() {
                engine.shutdown().await;
            }
        }
        self.set_state(GameState::Idle);
    }

    async fn human_move(
        &mut self,
        from: Square,
        to: Square,
        promote: bool,
    ) -> Result<(), CoordinatorError> {
        let session = self.in_game_session()?;
        let (side, piece) = session
            .tracker
            .piece_at(from)
            .ok_or(CoordinatorError::EmptySquare)?;
        if Some(side) != session.my_side {
            return Err(CoordinatorError::EmptySquare);
        }
        let piece = if promote {
            piece.promoted().ok_or(CoordinatorError::CannotPromote)?
        } else {
            piece
        };
        let mv = CsaMove {
            side,
            from: Some(from),
            to,
            piece,
        };
        session.client.send_move(mv.to_string()).await?;
        Ok(())
    }

    async fn human_drop(
        &mut self,
        piece: crate::notation::Piece,
        to: Square,
    ) -> Result<(), CoordinatorError> {
        let session = self.in_game_session()?;
        let Some(side) = session.my_side else {
            return Err(CoordinatorError::NotInGame);
        };
        let mv = CsaMove {
            side,
            from: None,
            to,
            piece: piece.unpromoted(),
        };
        session.client.send_move(mv.to_string()).await?;
        Ok(())
    }

    fn in_game_session(&mut self) -> Result<&mut Session, CoordinatorError> {
        if self.state != GameState::InGame {
            return Err(CoordinatorError::NotInGame);
        }
        let session = self.session.as_mut().ok_or(CoordinatorError::NotInGame)?;
        if !session.my_turn {
            return Err(CoordinatorError::NotOurTurn);
        }
        Ok(session)
    }

    async fn handle_signal(&mut self, signal: SessionSignal) {
        match signal {
            SessionSignal::Client(event) => self.handle_client_event(event).await,
            SessionSignal::ClientLagged(n) => {
                warn!(missed = n, "client event stream lagged");
            }
            SessionSignal::ClientClosed => {
                warn!("client actor closed unexpectedly");
                self.emit(CoordinatorEvent::Error("connection handler closed".to_string()));
                self.session = None;
                self.set_state(GameState::Error);
            }
            SessionSignal::Engine(event) => self.handle_engine_event(event).await,
            SessionSignal::EngineClosed => {
                if let Some(session) = self.session.as_mut() {
                    session.engine = None;
                }
                if self.state == GameState::InGame {
                    self.emit(CoordinatorEvent::Error("engine terminated".to_string()));
                    self.set_state(GameState::Error);
                }
            }
        }
    }

    async fn handle_client_event(&mut self, event: ClientEvent) {
        use csa_client::ConnectionState;

        match event {
            ClientEvent::StateChanged(ConnectionState::Connected) => {
                if let Some(session) = &self.session {
                    let _ = session
                        .client
                        .login(session.username.clone(), session.password.clone())
                        .await;
                    self.set_state(GameState::LoggingIn);
                }
            }
            ClientEvent::StateChanged(ConnectionState::Disconnected) => {
                if !matches!(
                    self.state,
                    GameState::Idle | GameState::GameOver | GameState::Error
                ) {
                    self.emit(CoordinatorEvent::Error("connection lost".to_string()));
                    self.set_state(GameState::Error);
                }
            }
            ClientEvent::StateChanged(_) => {}
            ClientEvent::LoginSucceeded => self.set_state(GameState::WaitingForMatch),
            ClientEvent::LoginFailed(reason) => {
                self.emit(CoordinatorEvent::Error(reason));
                self.set_state(GameState::Error);
            }
            ClientEvent::LogoutCompleted => debug!("logout acknowledged"),
            ClientEvent::SummaryReceived(summary) => self.on_summary(summary).await,
            ClientEvent::GameStarted(game_id) => self.on_game_started(game_id).await,
            ClientEvent::GameRejected { game_id, rejector } => {
                info!(game_id, rejector, "game rejected");
                self.emit(CoordinatorEvent::Error(format!(
                    "game {game_id} rejected by {rejector}"
                )));
                self.set_state(GameState::WaitingForMatch);
            }
            ClientEvent::MoveConfirmed { mv, consumed_ms } => {
                self.on_move(&mv, consumed_ms, true).await;
            }
            ClientEvent::MoveReceived { mv, consumed_ms } => {
                self.on_move(&mv, consumed_ms, false).await;
            }
            ClientEvent::GameEnded {
                result,
                cause,
                consumed_ms,
            } => self.on_game_ended(result, cause, consumed_ms).await,
            ClientEvent::GameInterrupted => {
                self.on_game_ended(GameResult::Chudan, GameEndCause::Chudan, 0)
                    .await;
            }
            ClientEvent::RawReceived(line) => self.emit(CoordinatorEvent::CommLog {
                direction: CommDirection::Received,
                line,
            }),
            ClientEvent::RawSent(line) => self.emit(CoordinatorEvent::CommLog {
                direction: CommDirection::Sent,
                line,
            }),
            ClientEvent::Error(message) => self.emit(CoordinatorEvent::Error(message)),
        }
    }

    /// Seed the session from the announced game and auto-agree.
    async fn on_summary(&mut self, summary: GameSummary) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let Some(my_side) = summary.my_turn else {
            warn!("game summary missing Your_Turn, rejecting");
            let _ = session.client.reject(None).await;
            self.emit(CoordinatorEvent::Error(
                "game summary did not assign us a side".to_string(),
            ));
            return;
        };
        let to_move = summary.to_move.unwrap_or(Side::Black);

        session.my_side = Some(my_side);
        session.tracker = PositionTracker::from_position_lines(&summary.position_lines);
        session.board.reset(&summary.position_lines).await;
        session.start_position = if session.tracker.is_hirate() {
            "startpos".to_string()
        } else {
            format!("sfen {}", session.tracker.to_sfen(to_move))
        };
        session.clock = Some(MatchClock::new(&summary.time));
        session.usi_moves.clear();
        session.move_count = 0;
        session.prev_to = None;

        // Replay moves already played from the announced position.
        for text in &summary.moves {
            match CsaMove::parse(text) {
                Ok(mv) => {
                    let usi = csa_to_usi(&mv, session.tracker.source_promoted(&mv));
                    session.tracker.apply_csa(&mv);
                    session.board.apply_move(&mv, mv.side).await;
                    session.usi_moves.push(usi.to_string());
                    session.move_count += 1;
                    session.prev_to = Some(mv.to);
                }
                Err(err) => {
                    warn!(%err, mv = %text, "bad move in game summary");
                }
            }
        }

        let to_move_now = if session.move_count % 2 == 0 {
            to_move
        } else {
            to_move.opponent()
        };
        session.my_turn = my_side == to_move_now;

        info!(
            game_id = %summary.game_id,
            black = %summary.black_name,
            white = %summary.white_name,
            side = %my_side,
            "agreeing to game"
        );
        let game_id = (!summary.game_id.is_empty()).then(|| summary.game_id.clone());
        let version_mismatch = (!summary.protocol_version.is_empty()
            && summary.protocol_version != session.csa_version)
            .then(|| {
                format!(
                    "server announced protocol version {}, configured for {}",
                    summary.protocol_version, session.csa_version
                )
            });
        session.summary = Some(summary);

        if let Some(message) = version_mismatch {
            warn!("{message}");
            self.emit(CoordinatorEvent::Error(message));
        }
        self.set_state(GameState::WaitingForAgree);
        if let Some(session) = &self.session {
            let _ = session.client.agree(game_id).await;
        }
    }

    async fn on_game_started(&mut self, game_id: String) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let (black, white) = session
            .summary
            .as_ref()
            .map(|s| (s.black_name.clone(), s.white_name.clone()))
            .unwrap_or_default();
        let my_turn = session.my_turn;

        self.set_state(GameState::InGame);
        self.emit(CoordinatorEvent::GameStarted {
            game_id,
            black,
            white,
        });
        self.emit(CoordinatorEvent::TurnChanged(my_turn));
        if my_turn {
            self.drive_engine().await;
        }
    }

    /// One accepted move off the wire, ours or theirs.
    async fn on_move(&mut self, text: &str, consumed_ms: u64, mover_is_us: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let mv = match CsaMove::parse(text) {
            Ok(mv) => mv,
            Err(err) => {
                warn!(%err, mv = text, "unparseable move from server");
                self.emit(CoordinatorEvent::Error(format!("bad move from server: {text}")));
                return;
            }
        };

        let source_promoted = session.tracker.source_promoted(&mv);
        let is_promotion = session.tracker.is_promotion(&mv);
        let usi = csa_to_usi(&mv, source_promoted);
        let pretty = pretty_move(&mv, is_promotion, session.prev_to, session.move_count);

        session.tracker.apply_csa(&mv);
        session.board.apply_move(&mv, mv.side).await;
        if let Some(clock) = session.clock.as_mut() {
            clock.record_move(mv.side, consumed_ms);
        }
        session.move_count += 1;
        session.usi_moves.push(usi.to_string());
        session.prev_to = Some(mv.to);
        session.my_turn = session.my_side == Some(mv.side.opponent());
        let my_turn = session.my_turn;

        self.emit(CoordinatorEvent::MoveMade {
            csa: mv.to_string(),
            usi: usi.to_string(),
            pretty,
            mover_is_us,
            consumed_ms,
        });
        self.emit(CoordinatorEvent::TurnChanged(my_turn));
        if my_turn {
            self.drive_engine().await;
        }
    }

    /// Hand the position to the engine and start the search with the
    /// clock's current estimates.
    async fn drive_engine(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some(engine) = session.engine.as_ref() else {
            return;
        };
        let Some(clock) = session.clock.as_ref() else {
            return;
        };

        let position = EngineCommand::SetPosition {
            position: session.start_position.clone(),
            moves: session.usi_moves.clone(),
        };
        let byoyomi_side = session.my_side.unwrap_or(Side::Black);
        let go = EngineCommand::Go(GoParams {
            btime_ms: clock.remaining_ms(Side::Black),
            wtime_ms: clock.remaining_ms(Side::White),
            byoyomi_ms: clock.byoyomi_ms(byoyomi_side),
            binc_ms: clock.increment_ms(),
            winc_ms: clock.increment_ms(),
        });

        for cmd in [position, go] {
            if let Err(err) = engine.send_command(cmd).await {
                warn!(%err, "failed to drive engine");
                self.emit(CoordinatorEvent::Error(err.to_string()));
                return;
            }
        }
    }

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::BestMove(text) => self.on_best_move(&text).await,
            EngineEvent::Info(info) => {
                self.emit(CoordinatorEvent::EngineInfo(info));
            }
            EngineEvent::Error(message) => self.emit(CoordinatorEvent::Error(message)),
            EngineEvent::Ready | EngineEvent::RawUsiMessage { .. } => {}
        }
    }

    async fn on_best_move(&mut self, text: &str) {
        // A search result landing after the game is decided is stale.
        if self.state != GameState::InGame {
            debug!(best_move = text, "discarding stale best move");
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if !session.my_turn {
            debug!(best_move = text, "best move while not our turn, discarding");
            return;
        }

        match text {
            "resign" => {
                let _ = session.client.resign().await;
                return;
            }
            "win" => {
                let _ = session.client.declare_win().await;
                return;
            }
            _ => {}
        }

        let Some(side) = session.my_side else {
            return;
        };
        let result = UsiMove::parse(text).and_then(|usi| {
            usi_to_csa(&usi, side, |sq| {
                session.tracker.piece_at(sq).map(|(_, piece)| piece)
            })
        });
        match result {
            Ok(mv) => {
                let _ = session.client.send_move(mv.to_string()).await;
            }
            Err(err) => {
                warn!(%err, best_move = text, "cannot convert engine move");
                self.emit(CoordinatorEvent::Error(format!(
                    "cannot convert engine move {text}: {err}"
                )));
            }
        }
    }

    async fn on_game_ended(&mut self, result: GameResult, cause: GameEndCause, consumed_ms: u64) {
        // Interruption and result pair may both arrive; report once.
        if self.state == GameState::GameOver {
            return;
        }
        let text = format!("{result} by {cause}");
        info!(%result, %cause, consumed_ms, "game over");

        if let Some(session) = self.session.as_mut() {
            if let Some(engine) = session.engine.take() {
                let verdict = match result {
                    GameResult::Win => GameOverResult::Win,
                    GameResult::Lose => GameOverResult::Lose,
                    _ => GameOverResult::Draw,
                };
                let _ = engine.send_command(EngineCommand::GameOver(verdict)).await;
                engine.shutdown().await;
            }
        }

        self.set_state(GameState::GameOver);
        self.emit(CoordinatorEvent::GameEnded {
            result,
            cause,
            text,
            consumed_ms,
        });
    }

    fn set_state(&mut self, next: GameState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "coordinator state");
            self.state = next;
            self.emit(CoordinatorEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: CoordinatorEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::time;

    use super::*;
    use crate::handle::GameCoordinator;
    use crate::traits::mock::RecordingBoard;

    async fn expect_event<F>(
        rx: &mut broadcast::Receiver<CoordinatorEvent>,
        mut pred: F,
    ) -> CoordinatorEvent
    where
        F: FnMut(&CoordinatorEvent) -> bool,
    {
        loop {
            let event = time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    fn summary_block() -> &'static [u8] {
        b"BEGIN Game_Summary\n\
          Protocol_Version:1.2.1\n\
          Game_ID:g1\n\
          Name+:us\n\
          Name-:them\n\
          Your_Turn:+\n\
          To_Move:+\n\
          BEGIN Time\n\
          Time_Unit:1sec\n\
          Total_Time:600\n\
          Byoyomi:10\n\
          END Time\n\
          END Game_Summary\n"
    }

    #[tokio::test]
    async fn test_human_session_end_to_end() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut writer) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();

            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line.trim_end(), "LOGIN us secret");
            writer.write_all(b"LOGIN:us OK\n").await.unwrap();
            writer.write_all(summary_block()).await.unwrap();

            line.clear();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line.trim_end(), "AGREE g1");
            writer.write_all(b"START:g1\n").await.unwrap();

            line.clear();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line.trim_end(), "+7776FU");
            writer.write_all(b"+7776FU,T3\n").await.unwrap();
            writer.write_all(b"-3334FU,T7\n").await.unwrap();

            writer.write_all(b"#RESIGN\n#WIN\n").await.unwrap();
        });

        let board = Arc::new(RecordingBoard::default());
        let coordinator = GameCoordinator::spawn();
        let mut events = coordinator.subscribe().await.unwrap();

        let mut options = StartOptions::new("127.0.0.1", "us", "secret");
        options.port = port;
        options.board = board.clone();
        coordinator.start(options).await.unwrap();

        let event = expect_event(&mut events, |e| {
            matches!(e, CoordinatorEvent::GameStarted { .. })
        })
        .await;
        let CoordinatorEvent::GameStarted { black, white, .. } = event else {
            unreachable!()
        };
        assert_eq!(black, "us");
        assert_eq!(white, "them");
        assert_eq!(coordinator.state().await.unwrap(), GameState::InGame);

        coordinator
            .human_move(
                Square::new(7, 7).unwrap(),
                Square::new(7, 6).unwrap(),
                false,
            )
            .await
            .unwrap();

        let event = expect_event(&mut events, |e| {
            matches!(e, CoordinatorEvent::MoveMade { .. })
        })
        .await;
        let CoordinatorEvent::MoveMade {
            csa,
            usi,
            pretty,
            mover_is_us,
            consumed_ms,
        } = event
        else {
            unreachable!()
        };
        assert_eq!(csa, "+7776FU");
        assert_eq!(usi, "7g7f");
        assert_eq!(pretty, "▲７六歩(77)");
        assert!(mover_is_us);
        assert_eq!(consumed_ms, 3000);

        let event = expect_event(&mut events, |e| {
            matches!(e, CoordinatorEvent::MoveMade { mover_is_us: false, .. })
        })
        .await;
        assert!(matches!(
            event,
            CoordinatorEvent::MoveMade { consumed_ms: 7000, .. }
        ));

        let event = expect_event(&mut events, |e| {
            matches!(e, CoordinatorEvent::GameEnded { .. })
        })
        .await;
        let CoordinatorEvent::GameEnded { result, cause, text, .. } = event else {
            unreachable!()
        };
        assert_eq!(result, GameResult::Win);
        assert_eq!(cause, GameEndCause::Resign);
        assert_eq!(text, "win by resignation");

        server.await.unwrap();

        // The collaborator saw the reset and both accepted moves.
        assert_eq!(board.resets.lock().unwrap().len(), 1);
        let moves = board.moves.lock().unwrap().clone();
        assert_eq!(
            moves,
            vec![
                ("+7776FU".to_string(), Side::Black),
                ("-3334FU".to_string(), Side::White),
            ]
        );

        coordinator.stop().await.unwrap();
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_human_move_rejected_out_of_turn() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut writer) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            writer.write_all(b"LOGIN:us OK\n").await.unwrap();
            // We play white; black moves first.
            writer
                .write_all(
                    b"BEGIN Game_Summary\nGame_ID:g3\nYour_Turn:-\nTo_Move:+\nEND Game_Summary\n",
                )
                .await
                .unwrap();
            line.clear();
            reader.read_line(&mut line).await.unwrap();
            writer.write_all(b"START:g3\n").await.unwrap();
            // Hold the connection open.
            line.clear();
            let _ = reader.read_line(&mut line).await;
        });

        let coordinator = GameCoordinator::spawn();
        let mut events = coordinator.subscribe().await.unwrap();
        let mut options = StartOptions::new("127.0.0.1", "us", "pw");
        options.port = port;
        coordinator.start(options).await.unwrap();
        expect_event(&mut events, |e| {
            matches!(e, CoordinatorEvent::GameStarted { .. })
        })
        .await;

        let err = coordinator
            .human_move(
                Square::new(7, 7).unwrap(),
                Square::new(7, 6).unwrap(),
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::NotOurTurn));

        coordinator.stop().await.unwrap();
        coordinator.shutdown().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_engine_info_forwarded_to_host() {
        let (event_tx, mut events) = broadcast::channel(16);
        let mut actor = CoordinatorActor {
            state: GameState::InGame,
            event_tx,
            session: None,
        };

        let info = engine::UsiInfo {
            depth: Some(12),
            ..Default::default()
        };
        actor.handle_engine_event(EngineEvent::Info(info)).await;

        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            CoordinatorEvent::EngineInfo(info) if info.depth == Some(12)
        ));
    }

    #[tokio::test]
    async fn test_protocol_version_mismatch_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut writer) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            writer.write_all(b"LOGIN:us OK\n").await.unwrap();
            writer.write_all(summary_block()).await.unwrap();
            line.clear();
            let _ = reader.read_line(&mut line).await;
        });

        let coordinator = GameCoordinator::spawn();
        let mut events = coordinator.subscribe().await.unwrap();
        let mut options = StartOptions::new("127.0.0.1", "us", "secret");
        options.port = port;
        // The summary announces 1.2.1.
        options.csa_version = "1.1".to_string();
        coordinator.start(options).await.unwrap();

        let event = expect_event(&mut events, |e| matches!(e, CoordinatorEvent::Error(_))).await;
        assert!(matches!(
            event,
            CoordinatorEvent::Error(m) if m.contains("protocol version 1.2.1")
        ));

        coordinator.stop().await.unwrap();
        coordinator.shutdown().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _keep = listener.accept().await;
            time::sleep(Duration::from_secs(5)).await;
        });

        let coordinator = GameCoordinator::spawn();
        let mut options = StartOptions::new("127.0.0.1", "us", "pw");
        options.port = port;
        coordinator.start(options.clone()).await.unwrap();
        let err = coordinator.start(options).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::AlreadyRunning));

        coordinator.stop().await.unwrap();
        assert_eq!(coordinator.state().await.unwrap(), GameState::Idle);
        coordinator.shutdown().await;
    }
}
