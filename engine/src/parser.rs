//! Parsing of messages coming back from a USI engine.

#[derive(Debug, thiserror::Error)]
pub enum UsiParseError {
    #[error("Malformed USI message: {0}")]
    MalformedMessage(String),
    #[error("Unknown USI message: {0}")]
    UnknownMessage(String),
}

/// Incoming message from a USI engine.
#[derive(Debug, Clone)]
pub enum UsiMessage {
    Id { name: String, value: String },
    UsiOk,
    ReadyOk,
    BestMove { mv: String, ponder: Option<String> },
    Info(UsiInfo),
}

/// Engine search information from `info` lines.
#[derive(Debug, Clone, Default)]
pub struct UsiInfo {
    pub depth: Option<u8>,
    pub seldepth: Option<u8>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub score: Option<Score>,
    /// Principal variation, USI move text.
    pub pv: Vec<String>,
    pub multipv: Option<u8>,
    pub hashfull: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    /// Negative for being mated.
    Mate(i16),
}

/// Parse one USI message line.
pub fn parse_usi_message(line: &str) -> Result<UsiMessage, UsiParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.first() {
        Some(&"usiok") => Ok(UsiMessage::UsiOk),
        Some(&"readyok") => Ok(UsiMessage::ReadyOk),

        Some(&"id") => {
            if tokens.len() < 3 {
                return Err(UsiParseError::MalformedMessage(line.to_string()));
            }
            let name = tokens[1].to_string();
            let value = tokens[2..].join(" ");
            Ok(UsiMessage::Id { name, value })
        }

        Some(&"bestmove") => {
            let Some(mv) = tokens.get(1) else {
                return Err(UsiParseError::MalformedMessage(line.to_string()));
            };
            let ponder = if tokens.get(2) == Some(&"ponder") {
                tokens.get(3).map(|s| s.to_string())
            } else {
                None
            };
            Ok(UsiMessage::BestMove {
                mv: mv.to_string(),
                ponder,
            })
        }

        Some(&"info") => Ok(UsiMessage::Info(parse_info_line(&tokens[1..]))),

        _ => Err(UsiParseError::UnknownMessage(line.to_string())),
    }
}

fn parse_info_line(tokens: &[&str]) -> UsiInfo {
    let mut info = UsiInfo::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                info.depth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "seldepth" => {
                i += 1;
                info.seldepth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "time" => {
                i += 1;
                info.time_ms = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nodes" => {
                i += 1;
                info.nodes = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nps" => {
                i += 1;
                info.nps = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "score" => {
                i += 1;
                if let Some(&score_type) = tokens.get(i) {
                    i += 1;
                    if let Some(value_str) = tokens.get(i) {
                        info.score = match score_type {
                            "cp" => value_str.parse().ok().map(Score::Centipawns),
                            "mate" => value_str.parse().ok().map(Score::Mate),
                            _ => None,
                        };
                    }
                }
            }
            "pv" => {
                // Collect all moves until the next keyword
                i += 1;
                while i < tokens.len() && !is_keyword(tokens[i]) {
                    info.pv.push(tokens[i].to_string());
                    i += 1;
                }
                continue; // Don't increment i again
            }
            "multipv" => {
                i += 1;
                info.multipv = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "hashfull" => {
                i += 1;
                info.hashfull = tokens.get(i).and_then(|s| s.parse().ok());
            }
            _ => {
                // Unknown keyword, skip
            }
        }
        i += 1;
    }

    info
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "hashfull"
            | "nps"
            | "currmove"
            | "string"
    )
}
