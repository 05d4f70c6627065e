use crate::summary::GameSummary;
use crate::types::{ConnectionState, GameEndCause, GameResult};

/// Events broadcast from the client actor to all subscribers.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum ClientEvent {
    /// Connection state after any transition.
    StateChanged(ConnectionState),
    LoginSucceeded,
    LoginFailed(String),
    LogoutCompleted,
    /// A full `Game_Summary` block finished parsing.
    SummaryReceived(GameSummary),
    /// `START:` received; the game is on.
    GameStarted(String),
    /// `REJECT:<game_id> by <rejector>`.
    GameRejected { game_id: String, rejector: String },
    /// Opponent move echoed by the server, consumed time in milliseconds.
    MoveReceived { mv: String, consumed_ms: u64 },
    /// Our own move echoed back by the server.
    MoveConfirmed { mv: String, consumed_ms: u64 },
    /// Two-line result pair decoded; reported exactly once per game.
    GameEnded {
        result: GameResult,
        cause: GameEndCause,
        consumed_ms: u64,
    },
    /// `#CHUDAN` arrived as the first result line; no result follows.
    GameInterrupted,
    /// Wire tap: every line read off the socket, CR stripped.
    RawReceived(String),
    /// Wire tap: every line written to the socket (password masked).
    RawSent(String),
    /// Error notification.
    Error(String),
}
