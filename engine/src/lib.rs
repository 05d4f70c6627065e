//! USI (Universal Shogi Interface) engine process wrapper.
//!
//! Moves cross this boundary as plain USI text (`7g7f`, `P*5e`, and the
//! special `resign`/`win` best-move values); the caller owns notation.

pub mod parser;
pub mod usi;

pub use parser::{parse_usi_message, Score, UsiInfo, UsiMessage, UsiParseError};
pub use usi::{EngineError, UsiEngine, UsiEngineConfig};

/// Commands sent to the engine.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// `position <sfen or startpos> [moves ...]`, moves in USI text.
    SetPosition {
        position: String,
        moves: Vec<String>,
    },
    Go(GoParams),
    Stop,
    /// `gameover win|lose|draw`.
    GameOver(GameOverResult),
    Quit,
}

/// Parameters for the `go` command. All times in milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoParams {
    pub btime_ms: u64,
    pub wtime_ms: u64,
    pub byoyomi_ms: u64,
    pub binc_ms: u64,
    pub winc_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOverResult {
    Win,
    Lose,
    Draw,
}

impl GameOverResult {
    pub fn as_str(self) -> &'static str {
        match self {
            GameOverResult::Win => "win",
            GameOverResult::Lose => "lose",
            GameOverResult::Draw => "draw",
        }
    }
}

/// Events received from the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Ready,
    /// USI move text; may be `resign` or `win`.
    BestMove(String),
    Info(UsiInfo),
    Error(String),
    RawUsiMessage {
        direction: UsiMessageDirection,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsiMessageDirection {
    ToEngine,
    FromEngine,
}
