//! Protocol-level enums shared by the client and its consumers.

use std::fmt;

/// Connection lifecycle of one CSA session.
///
/// Transitions are one-directional along the login → game flow; the only
/// backward edges are `GameOver → Disconnected` (explicit disconnect) and
/// any state `→ Disconnected` on socket loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    LoggedIn,
    WaitingForGame,
    GameReady,
    InGame,
    GameOver,
}

/// Side marker used throughout the CSA wire format (`+` = black, `-` = white).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Black,
    White,
}

impl Side {
    pub fn sign(self) -> char {
        match self {
            Side::Black => '+',
            Side::White => '-',
        }
    }

    pub fn from_sign(c: char) -> Option<Side> {
        match c {
            '+' => Some(Side::Black),
            '-' => Some(Side::White),
            _ => None,
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::Black => Side::White,
            Side::White => Side::Black,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Black => "black",
            Side::White => "white",
        })
    }
}

/// Outcome of a finished game, from this side's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Win,
    Lose,
    Draw,
    Censored,
    Chudan,
    Unknown,
}

impl GameResult {
    /// Match one `#` result line against the result keywords.
    fn from_line(line: &str) -> Option<GameResult> {
        match line {
            "#WIN" => Some(GameResult::Win),
            "#LOSE" => Some(GameResult::Lose),
            "#DRAW" => Some(GameResult::Draw),
            "#CENSORED" => Some(GameResult::Censored),
            _ => None,
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GameResult::Win => "win",
            GameResult::Lose => "loss",
            GameResult::Draw => "draw",
            GameResult::Censored => "censored",
            GameResult::Chudan => "interrupted",
            GameResult::Unknown => "unknown",
        })
    }
}

/// Why a game ended. Orthogonal to [`GameResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEndCause {
    Resign,
    TimeUp,
    IllegalMove,
    Sennichite,
    OuteSennichite,
    Jishogi,
    MaxMoves,
    Chudan,
    IllegalAction,
    Unknown,
}

impl GameEndCause {
    /// Match one `#` result line against the cause keywords.
    fn from_line(line: &str) -> Option<GameEndCause> {
        match line {
            "#RESIGN" => Some(GameEndCause::Resign),
            "#TIME_UP" => Some(GameEndCause::TimeUp),
            "#ILLEGAL_MOVE" => Some(GameEndCause::IllegalMove),
            "#SENNICHITE" => Some(GameEndCause::Sennichite),
            "#OUTE_SENNICHITE" => Some(GameEndCause::OuteSennichite),
            "#JISHOGI" => Some(GameEndCause::Jishogi),
            "#MAX_MOVES" => Some(GameEndCause::MaxMoves),
            "#CHUDAN" => Some(GameEndCause::Chudan),
            "#ILLEGAL_ACTION" => Some(GameEndCause::IllegalAction),
            _ => None,
        }
    }
}

impl fmt::Display for GameEndCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GameEndCause::Resign => "resignation",
            GameEndCause::TimeUp => "time forfeit",
            GameEndCause::IllegalMove => "illegal move",
            GameEndCause::Sennichite => "repetition",
            GameEndCause::OuteSennichite => "perpetual check",
            GameEndCause::Jishogi => "entering-king declaration",
            GameEndCause::MaxMoves => "move limit",
            GameEndCause::Chudan => "interruption",
            GameEndCause::IllegalAction => "illegal action",
            GameEndCause::Unknown => "unknown",
        })
    }
}

/// Decode the two-line `#` result pair.
///
/// The server sends cause-then-result, but each line is classified
/// independently so the pair decodes the same in either order.
pub fn decode_result_pair(first: &str, second: &str) -> (GameResult, GameEndCause) {
    let result = GameResult::from_line(first)
        .or_else(|| GameResult::from_line(second))
        .unwrap_or(GameResult::Unknown);
    let cause = GameEndCause::from_line(first)
        .or_else(|| GameEndCause::from_line(second))
        .unwrap_or(GameEndCause::Unknown);
    (result, cause)
}

/// Unit in which the `Game_Summary` time section counts time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeUnit {
    #[default]
    Seconds,
    Minutes,
    Millis,
}

impl TimeUnit {
    /// Parse a `Time_Unit` value. Unknown values fall back to seconds.
    pub fn parse(value: &str) -> TimeUnit {
        match value {
            "1msec" | "msec" => TimeUnit::Millis,
            "1min" | "min" => TimeUnit::Minutes,
            _ => TimeUnit::Seconds,
        }
    }

    pub fn to_millis(self) -> u64 {
        match self {
            TimeUnit::Seconds => 1000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Millis => 1,
        }
    }
}
