use csa_client::{GameEndCause, GameResult};
use engine::UsiInfo;

/// Coordinator lifecycle, one session at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Idle,
    Connecting,
    LoggingIn,
    WaitingForMatch,
    WaitingForAgree,
    InGame,
    GameOver,
    Error,
}

/// Events broadcast from the coordinator to the host.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    StateChanged(GameState),
    GameStarted {
        game_id: String,
        black: String,
        white: String,
    },
    /// One accepted move, in every notation the host might want.
    MoveMade {
        csa: String,
        usi: String,
        pretty: String,
        mover_is_us: bool,
        consumed_ms: u64,
    },
    /// True when it is now our turn.
    TurnChanged(bool),
    /// Search progress from the engine (depth, score, pv).
    EngineInfo(UsiInfo),
    GameEnded {
        result: GameResult,
        cause: GameEndCause,
        text: String,
        consumed_ms: u64,
    },
    /// Wire tap of the CSA connection (password already masked).
    CommLog {
        direction: CommDirection,
        line: String,
    },
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommDirection {
    Sent,
    Received,
}
