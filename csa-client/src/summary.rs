//! `Game_Summary` block parsing.
//!
//! The server announces a match as a `BEGIN Game_Summary` … `END Game_Summary`
//! block with nested `Time`/`Time+`/`Time-` and `Position` sections. The
//! parser tracks the open section explicitly; a `BEGIN` arriving inside the
//! wrong section is reported as a protocol error and the line is dropped.

use thiserror::Error;
use tracing::warn;

use crate::types::{Side, TimeUnit};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SummaryError {
    #[error("unexpected `{line}` inside {section} section")]
    InvalidNesting { line: String, section: &'static str },
}

/// Time control as declared in the summary's time sections.
///
/// Values are in the declared [`TimeUnit`]; the per-side fields are only set
/// when the server sent `Time+`/`Time-` overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeControl {
    pub unit: TimeUnit,
    pub total_time: u64,
    pub byoyomi: u64,
    pub least_time_per_move: u64,
    pub increment: u64,
    pub delay: u64,
    pub roundup: bool,
    pub total_time_black: Option<u64>,
    pub total_time_white: Option<u64>,
    pub byoyomi_black: Option<u64>,
    pub byoyomi_white: Option<u64>,
}

impl TimeControl {
    pub fn total_time_for(&self, side: Side) -> u64 {
        match side {
            Side::Black => self.total_time_black.unwrap_or(self.total_time),
            Side::White => self.total_time_white.unwrap_or(self.total_time),
        }
    }

    pub fn byoyomi_for(&self, side: Side) -> u64 {
        match side {
            Side::Black => self.byoyomi_black.unwrap_or(self.byoyomi),
            Side::White => self.byoyomi_white.unwrap_or(self.byoyomi),
        }
    }
}

/// Immutable-once-parsed snapshot of one announced game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameSummary {
    pub protocol_version: String,
    pub protocol_mode: String,
    pub format: String,
    pub declaration: String,
    pub game_id: String,
    pub black_name: String,
    pub white_name: String,
    /// Which side this client plays.
    pub my_turn: Option<Side>,
    /// Side to move in the announced position.
    pub to_move: Option<Side>,
    pub rematch_on_draw: bool,
    /// 0 means no limit.
    pub max_moves: u32,
    pub time: TimeControl,
    /// Raw CSA position lines (`P1`..`P9`, `P+`, `P-`, `+`, `-`).
    pub position_lines: Vec<String>,
    /// Moves already played from the announced position, times stripped.
    pub moves: Vec<String>,
}

impl GameSummary {
    pub fn time_unit_ms(&self) -> u64 {
        self.time.unit.to_millis()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeSlot {
    Shared,
    Black,
    White,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    General,
    Time(TimeSlot),
    Position,
}

impl Section {
    fn name(self) -> &'static str {
        match self {
            Section::General => "general",
            Section::Time(_) => "time",
            Section::Position => "position",
        }
    }
}

/// Incremental parser for one `Game_Summary` block.
///
/// Construct after seeing `BEGIN Game_Summary`, then [`feed`](Self::feed)
/// each subsequent line until it yields the finished [`GameSummary`].
#[derive(Debug)]
pub struct SummaryParser {
    summary: GameSummary,
    section: Section,
}

impl SummaryParser {
    pub fn new() -> Self {
        Self {
            summary: GameSummary::default(),
            section: Section::General,
        }
    }

    /// Consume one line. Returns the completed summary on `END Game_Summary`,
    /// `Ok(None)` while the block is still open, or an error for a line that
    /// violates the section structure (the line is dropped, parsing
    /// continues).
    pub fn feed(&mut self, line: &str) -> Result<Option<GameSummary>, SummaryError> {
        if line == "END Game_Summary" {
            return Ok(Some(std::mem::take(&mut self.summary)));
        }

        match line {
            "BEGIN Time" | "BEGIN Time+" | "BEGIN Time-" => {
                if self.section != Section::General {
                    return Err(self.nesting_error(line));
                }
                self.section = Section::Time(match line {
                    "BEGIN Time+" => TimeSlot::Black,
                    "BEGIN Time-" => TimeSlot::White,
                    _ => TimeSlot::Shared,
                });
                return Ok(None);
            }
            "END Time" | "END Time+" | "END Time-" => {
                if !matches!(self.section, Section::Time(_)) {
                    return Err(self.nesting_error(line));
                }
                self.section = Section::General;
                return Ok(None);
            }
            "BEGIN Position" => {
                if self.section != Section::General {
                    return Err(self.nesting_error(line));
                }
                self.section = Section::Position;
                return Ok(None);
            }
            "END Position" => {
                if self.section != Section::Position {
                    return Err(self.nesting_error(line));
                }
                self.section = Section::General;
                return Ok(None);
            }
            _ => {}
        }

        match self.section {
            Section::General => self.feed_general(line),
            Section::Time(slot) => self.feed_time(slot, line),
            Section::Position => self.feed_position(line),
        }
        Ok(None)
    }

    fn nesting_error(&self, line: &str) -> SummaryError {
        SummaryError::InvalidNesting {
            line: line.to_string(),
            section: self.section.name(),
        }
    }

    fn feed_general(&mut self, line: &str) {
        let Some((key, value)) = line.split_once(':') else {
            return;
        };
        let s = &mut self.summary;
        match key {
            "Protocol_Version" => s.protocol_version = value.to_string(),
            "Protocol_Mode" => s.protocol_mode = value.to_string(),
            "Format" => s.format = value.to_string(),
            "Declaration" => s.declaration = value.to_string(),
            "Game_ID" => s.game_id = value.to_string(),
            "Name+" => s.black_name = value.to_string(),
            "Name-" => s.white_name = value.to_string(),
            "Your_Turn" => s.my_turn = value.chars().next().and_then(Side::from_sign),
            "To_Move" => s.to_move = value.chars().next().and_then(Side::from_sign),
            "Rematch_On_Draw" => s.rematch_on_draw = value == "YES",
            "Max_Moves" => s.max_moves = value.parse().unwrap_or(0),
            _ => {}
        }
    }

    fn feed_time(&mut self, slot: TimeSlot, line: &str) {
        let Some((key, value)) = line.split_once(':') else {
            return;
        };
        let time = &mut self.summary.time;
        let amount = || -> u64 {
            value.parse().unwrap_or_else(|_| {
                warn!(key, value, "invalid time value in Game_Summary");
                0
            })
        };
        match key {
            "Time_Unit" => time.unit = TimeUnit::parse(value),
            "Total_Time" => match slot {
                TimeSlot::Shared => time.total_time = amount(),
                TimeSlot::Black => time.total_time_black = Some(amount()),
                TimeSlot::White => time.total_time_white = Some(amount()),
            },
            "Byoyomi" => match slot {
                TimeSlot::Shared => time.byoyomi = amount(),
                TimeSlot::Black => time.byoyomi_black = Some(amount()),
                TimeSlot::White => time.byoyomi_white = Some(amount()),
            },
            "Least_Time_Per_Move" => time.least_time_per_move = amount(),
            "Increment" => time.increment = amount(),
            "Delay" => time.delay = amount(),
            "Time_Roundup" => time.roundup = value == "YES",
            _ => {}
        }
    }

    fn feed_position(&mut self, line: &str) {
        // P1-P9 / P+ / P- rows and the bare side-to-move marker.
        if line.starts_with('P') || line == "+" || line == "-" {
            self.summary.position_lines.push(line.to_string());
            return;
        }
        // Already-played moves, `+7776FU,T12` form; keep the move, drop T.
        if (line.starts_with('+') || line.starts_with('-')) && line.len() > 1 {
            let mv = line.split_once(',').map_or(line, |(m, _)| m);
            self.summary.moves.push(mv.to_string());
        }
    }
}

impl Default for SummaryParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_block(lines: &[&str]) -> GameSummary {
        let mut parser = SummaryParser::new();
        for line in lines {
            if let Ok(Some(summary)) = parser.feed(line) {
                return summary;
            }
        }
        panic!("block did not close");
    }

    const BASIC: &[&str] = &[
        "Protocol_Version:1.2.1",
        "Protocol_Mode:Server",
        "Format:Shogi 1.0",
        "Declaration:Jishogi 1.1",
        "Game_ID:20260830-test-1",
        "Name+:sente",
        "Name-:gote",
        "Your_Turn:+",
        "To_Move:+",
        "Rematch_On_Draw:NO",
        "Max_Moves:256",
        "BEGIN Time",
        "Time_Unit:1sec",
        "Total_Time:600",
        "Byoyomi:10",
        "Increment:0",
        "Time_Roundup:NO",
        "END Time",
        "BEGIN Position",
        "P1-KY-KE-GI-KI-OU-KI-GI-KE-KY",
        "P2 * -HI *  *  *  *  * -KA * ",
        "P3-FU-FU-FU-FU-FU-FU-FU-FU-FU",
        "P4 *  *  *  *  *  *  *  *  * ",
        "P5 *  *  *  *  *  *  *  *  * ",
        "P6 *  *  *  *  *  *  *  *  * ",
        "P7+FU+FU+FU+FU+FU+FU+FU+FU+FU",
        "P8 * +KA *  *  *  *  * +HI * ",
        "P9+KY+KE+GI+KI+OU+KI+GI+KE+KY",
        "+",
        "END Position",
        "END Game_Summary",
    ];

    #[test]
    fn test_parse_basic_summary() {
        let summary = parse_block(BASIC);
        assert_eq!(summary.protocol_version, "1.2.1");
        assert_eq!(summary.game_id, "20260830-test-1");
        assert_eq!(summary.black_name, "sente");
        assert_eq!(summary.white_name, "gote");
        assert_eq!(summary.my_turn, Some(Side::Black));
        assert_eq!(summary.to_move, Some(Side::Black));
        assert_eq!(summary.max_moves, 256);
        assert_eq!(summary.time.unit, TimeUnit::Seconds);
        assert_eq!(summary.time.total_time, 600);
        assert_eq!(summary.time.byoyomi, 10);
        assert_eq!(summary.position_lines.len(), 10);
        assert!(summary.moves.is_empty());
    }

    #[test]
    fn test_parse_per_side_time_overrides() {
        let summary = parse_block(&[
            "Your_Turn:-",
            "To_Move:+",
            "BEGIN Time",
            "Time_Unit:1min",
            "Total_Time:30",
            "END Time",
            "BEGIN Time+",
            "Total_Time:40",
            "Byoyomi:1",
            "END Time+",
            "BEGIN Time-",
            "Total_Time:20",
            "END Time-",
            "END Game_Summary",
        ]);
        assert_eq!(summary.time.unit, TimeUnit::Minutes);
        assert_eq!(summary.time.total_time_for(Side::Black), 40);
        assert_eq!(summary.time.total_time_for(Side::White), 20);
        assert_eq!(summary.time.byoyomi_for(Side::Black), 1);
        // White falls back to the shared byoyomi (unset, so zero).
        assert_eq!(summary.time.byoyomi_for(Side::White), 0);
    }

    #[test]
    fn test_parse_position_moves_strip_times() {
        let summary = parse_block(&[
            "BEGIN Position",
            "P1-KY-KE-GI-KI-OU-KI-GI-KE-KY",
            "+",
            "+7776FU,T12",
            "-3334FU,T6",
            "END Position",
            "END Game_Summary",
        ]);
        assert_eq!(summary.moves, vec!["+7776FU", "-3334FU"]);
        assert_eq!(summary.position_lines, vec!["P1-KY-KE-GI-KI-OU-KI-GI-KE-KY", "+"]);
    }

    #[test]
    fn test_invalid_nesting_rejected() {
        let mut parser = SummaryParser::new();
        parser.feed("BEGIN Position").unwrap();
        let err = parser.feed("BEGIN Time").unwrap_err();
        assert_eq!(
            err,
            SummaryError::InvalidNesting {
                line: "BEGIN Time".to_string(),
                section: "position",
            }
        );
        // Parser keeps going; the block still closes.
        parser.feed("END Position").unwrap();
        assert!(parser.feed("END Game_Summary").unwrap().is_some());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let summary = parse_block(&["Wibble:wobble", "Game_ID:x", "END Game_Summary"]);
        assert_eq!(summary.game_id, "x");
    }
}
