//! Pure protocol state machine.
//!
//! [`ProtocolState`] owns everything the session knows that is not I/O:
//! connection state, the open summary parser, turn parity, and the two-slot
//! result buffer. [`handle_line`](ProtocolState::handle_line) maps one
//! received line to the events it implies; the actor does the socket work.

use tracing::{debug, warn};

use crate::events::ClientEvent;
use crate::summary::{GameSummary, SummaryParser};
use crate::types::{ConnectionState, GameEndCause, Side};

/// Buffer for the two-line `#` result pair, reset on game start.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResultBuffer {
    Empty,
    First(String),
}

#[derive(Debug)]
pub struct ProtocolState {
    state: ConnectionState,
    parser: Option<SummaryParser>,
    summary: Option<GameSummary>,
    my_turn: bool,
    move_count: u32,
    end_move_consumed_ms: u64,
    result: ResultBuffer,
}

impl ProtocolState {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            parser: None,
            summary: None,
            my_turn: false,
            move_count: 0,
            end_move_consumed_ms: 0,
            result: ResultBuffer::Empty,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn summary(&self) -> Option<&GameSummary> {
        self.summary.as_ref()
    }

    pub fn my_turn(&self) -> bool {
        self.my_turn
    }

    pub fn move_count(&self) -> u32 {
        self.move_count
    }

    /// Actor-driven transition (connect, disconnect, socket loss).
    pub fn transition(&mut self, next: ConnectionState) -> Option<ClientEvent> {
        if self.state == next {
            return None;
        }
        debug!(from = ?self.state, to = ?next, "connection state");
        self.state = next;
        if next == ConnectionState::Disconnected {
            self.parser = None;
            self.result = ResultBuffer::Empty;
        }
        Some(ClientEvent::StateChanged(next))
    }

    /// Dispatch one received line (CR already stripped).
    pub fn handle_line(&mut self, line: &str) -> Vec<ClientEvent> {
        let mut events = Vec::new();

        if let Some(parser) = self.parser.as_mut() {
            match parser.feed(line) {
                Ok(Some(summary)) => {
                    self.parser = None;
                    self.summary = Some(summary.clone());
                    events.extend(self.transition(ConnectionState::GameReady));
                    events.push(ClientEvent::SummaryReceived(summary));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(%err, "bad Game_Summary line");
                    events.push(ClientEvent::Error(err.to_string()));
                }
            }
            return events;
        }

        match self.state {
            ConnectionState::Connected => self.handle_login_response(line, &mut events),
            ConnectionState::LoggedIn | ConnectionState::WaitingForGame => {
                if line == "BEGIN Game_Summary" {
                    self.parser = Some(SummaryParser::new());
                } else if line.starts_with("LOGOUT:") {
                    // The session is over from our side; the server will
                    // close the socket next.
                    events.push(ClientEvent::LogoutCompleted);
                    events.extend(self.transition(ConnectionState::Disconnected));
                }
            }
            ConnectionState::GameReady => self.handle_game_ready(line, &mut events),
            ConnectionState::InGame => self.handle_in_game(line, &mut events),
            _ => {}
        }
        events
    }

    fn handle_login_response(&mut self, line: &str, events: &mut Vec<ClientEvent>) {
        if !line.starts_with("LOGIN:") {
            return;
        }
        if line.contains(" OK") {
            events.extend(self.transition(ConnectionState::LoggedIn));
            events.push(ClientEvent::LoginSucceeded);
            events.extend(self.transition(ConnectionState::WaitingForGame));
        } else if line.contains("incorrect") {
            warn!("login rejected by server");
            events.push(ClientEvent::LoginFailed(
                "username or password incorrect".to_string(),
            ));
        }
    }

    fn handle_game_ready(&mut self, line: &str, events: &mut Vec<ClientEvent>) {
        if let Some(game_id) = line.strip_prefix("START:") {
            let game_id = game_id.to_string();
            // First mover: it is our turn iff we are the side to move.
            self.my_turn = self
                .summary
                .as_ref()
                .is_some_and(|s| s.my_turn.is_some() && s.my_turn == s.to_move);
            self.move_count = 0;
            self.end_move_consumed_ms = 0;
            self.result = ResultBuffer::Empty;
            events.extend(self.transition(ConnectionState::InGame));
            events.push(ClientEvent::GameStarted(game_id));
        } else if let Some(rest) = line.strip_prefix("REJECT:") {
            // REJECT:<game_id> by <rejector>
            match rest.split_once(" by ") {
                Some((game_id, rejector)) if !game_id.is_empty() && !rejector.is_empty() => {
                    events.extend(self.transition(ConnectionState::WaitingForGame));
                    events.push(ClientEvent::GameRejected {
                        game_id: game_id.to_string(),
                        rejector: rejector.to_string(),
                    });
                }
                _ => {
                    warn!(line, "malformed REJECT line");
                    events.push(ClientEvent::Error(format!("malformed REJECT line: {line}")));
                }
            }
        }
    }

    fn handle_in_game(&mut self, line: &str, events: &mut Vec<ClientEvent>) {
        if line.starts_with('#') {
            self.handle_result_line(line, events);
            return;
        }

        // Echo of our own special command (`%TORYO,T4`): remember the
        // consumed time for the upcoming result pair.
        if line.starts_with('%') {
            if let Some((_, time)) = line.split_once(',') {
                self.end_move_consumed_ms = parse_consumed(time) * self.time_unit_ms();
            }
            return;
        }

        if (line.starts_with('+') || line.starts_with('-')) && line.len() > 1 {
            if self.result != ResultBuffer::Empty {
                warn!(line, "move line while a result pair is pending");
                events.push(ClientEvent::Error(format!(
                    "move line while a result pair is pending: {line}"
                )));
                return;
            }
            self.handle_move_line(line, events);
        }
    }

    fn handle_result_line(&mut self, line: &str, events: &mut Vec<ClientEvent>) {
        let first = match std::mem::replace(&mut self.result, ResultBuffer::Empty) {
            ResultBuffer::Empty => {
                if line == "#CHUDAN" {
                    // Interruption carries no second line and no result.
                    events.push(ClientEvent::GameInterrupted);
                    events.extend(self.transition(ConnectionState::GameOver));
                } else {
                    self.result = ResultBuffer::First(line.to_string());
                }
                return;
            }
            ResultBuffer::First(first) => first,
        };

        let (result, cause) = crate::types::decode_result_pair(&first, line);
        debug!(%result, %cause, consumed_ms = self.end_move_consumed_ms, "game ended");
        events.extend(self.transition(ConnectionState::GameOver));
        if cause == GameEndCause::Chudan {
            events.push(ClientEvent::GameInterrupted);
        }
        events.push(ClientEvent::GameEnded {
            result,
            cause,
            consumed_ms: self.end_move_consumed_ms,
        });
    }

    fn handle_move_line(&mut self, line: &str, events: &mut Vec<ClientEvent>) {
        let (mv, consumed) = match line.split_once(',') {
            Some((mv, time)) => (mv, parse_consumed(time)),
            None => (line, 0),
        };
        let consumed_ms = consumed * self.time_unit_ms();

        let Some(mover) = mv.chars().next().and_then(Side::from_sign) else {
            return;
        };
        self.move_count += 1;

        let was_my_turn = self.my_turn;
        // After this move it is our turn iff the mover was the opponent.
        self.my_turn = self
            .summary
            .as_ref()
            .and_then(|s| s.my_turn)
            .is_some_and(|side| side == mover.opponent());

        let mv = mv.to_string();
        if was_my_turn {
            events.push(ClientEvent::MoveConfirmed { mv, consumed_ms });
        } else {
            events.push(ClientEvent::MoveReceived { mv, consumed_ms });
        }
    }

    fn time_unit_ms(&self) -> u64 {
        self.summary.as_ref().map_or(1000, GameSummary::time_unit_ms)
    }
}

impl Default for ProtocolState {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the `T12` consumed-time token (the `T` already split off or not).
fn parse_consumed(token: &str) -> u64 {
    let digits = token.strip_prefix('T').unwrap_or(token);
    digits.parse().unwrap_or_else(|_| {
        warn!(token, "invalid consumed time token");
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameResult;

    /// Drive a state machine to `InGame` playing black with a 1-second unit.
    fn in_game_state() -> ProtocolState {
        let mut st = ProtocolState::new();
        st.transition(ConnectionState::Connecting);
        st.transition(ConnectionState::Connected);
        st.handle_line("LOGIN:testuser OK");
        st.handle_line("BEGIN Game_Summary");
        st.handle_line("Game_ID:g1");
        st.handle_line("Your_Turn:+");
        st.handle_line("To_Move:+");
        st.handle_line("BEGIN Time");
        st.handle_line("Time_Unit:1sec");
        st.handle_line("Total_Time:600");
        st.handle_line("END Time");
        st.handle_line("END Game_Summary");
        st.handle_line("START:g1");
        assert_eq!(st.state(), ConnectionState::InGame);
        st
    }

    #[test]
    fn test_login_ok_walks_to_waiting() {
        let mut st = ProtocolState::new();
        st.transition(ConnectionState::Connecting);
        st.transition(ConnectionState::Connected);
        let events = st.handle_line("LOGIN:testuser OK");
        assert!(matches!(
            events[0],
            ClientEvent::StateChanged(ConnectionState::LoggedIn)
        ));
        assert!(matches!(events[1], ClientEvent::LoginSucceeded));
        assert!(matches!(
            events[2],
            ClientEvent::StateChanged(ConnectionState::WaitingForGame)
        ));
        assert_eq!(st.state(), ConnectionState::WaitingForGame);
    }

    #[test]
    fn test_login_incorrect_stays_connected() {
        let mut st = ProtocolState::new();
        st.transition(ConnectionState::Connecting);
        st.transition(ConnectionState::Connected);
        let events = st.handle_line("LOGIN:incorrect");
        assert!(matches!(events[0], ClientEvent::LoginFailed(_)));
        assert_eq!(st.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_move_time_scaled_by_unit() {
        let mut st = in_game_state();
        let events = st.handle_line("+7776FU,T3");
        assert!(matches!(
            &events[0],
            ClientEvent::MoveConfirmed { mv, consumed_ms: 3000 } if mv == "+7776FU"
        ));
    }

    #[test]
    fn test_turn_alternates_from_first_mover() {
        let mut st = in_game_state();
        assert!(st.my_turn());
        st.handle_line("+7776FU,T1");
        assert!(!st.my_turn());
        let events = st.handle_line("-3334FU,T2");
        assert!(matches!(
            &events[0],
            ClientEvent::MoveReceived { consumed_ms: 2000, .. }
        ));
        assert!(st.my_turn());
        assert_eq!(st.move_count(), 2);
    }

    #[test]
    fn test_result_pair_either_order() {
        for pair in [["#RESIGN", "#WIN"], ["#WIN", "#RESIGN"]] {
            let mut st = in_game_state();
            assert!(st.handle_line(pair[0]).is_empty());
            let events = st.handle_line(pair[1]);
            let ended: Vec<_> = events
                .iter()
                .filter(|e| matches!(e, ClientEvent::GameEnded { .. }))
                .collect();
            assert_eq!(ended.len(), 1);
            assert!(matches!(
                ended[0],
                ClientEvent::GameEnded {
                    result: GameResult::Win,
                    cause: GameEndCause::Resign,
                    ..
                }
            ));
            assert_eq!(st.state(), ConnectionState::GameOver);
        }
    }

    #[test]
    fn test_resign_echo_sets_end_consumed_time() {
        let mut st = in_game_state();
        st.handle_line("%TORYO,T4");
        st.handle_line("#RESIGN");
        let events = st.handle_line("#LOSE");
        assert!(matches!(
            events.last(),
            Some(ClientEvent::GameEnded { consumed_ms: 4000, .. })
        ));
    }

    #[test]
    fn test_chudan_first_slot_interrupts_without_result() {
        let mut st = in_game_state();
        let events = st.handle_line("#CHUDAN");
        assert!(matches!(events[0], ClientEvent::GameInterrupted));
        assert!(matches!(
            events[1],
            ClientEvent::StateChanged(ConnectionState::GameOver)
        ));
        assert!(!events.iter().any(|e| matches!(e, ClientEvent::GameEnded { .. })));
    }

    #[test]
    fn test_move_during_pending_result_is_error() {
        let mut st = in_game_state();
        st.handle_line("#TIME_UP");
        let events = st.handle_line("+7776FU,T1");
        assert!(matches!(events[0], ClientEvent::Error(_)));
        assert_eq!(st.move_count(), 0);
    }

    #[test]
    fn test_reject_line_parsing() {
        let mut st = ProtocolState::new();
        st.transition(ConnectionState::Connecting);
        st.transition(ConnectionState::Connected);
        st.handle_line("LOGIN:u OK");
        st.handle_line("BEGIN Game_Summary");
        st.handle_line("Game_ID:g2");
        st.handle_line("END Game_Summary");
        assert_eq!(st.state(), ConnectionState::GameReady);

        let events = st.handle_line("REJECT:g2 by someone");
        assert!(matches!(
            &events[1],
            ClientEvent::GameRejected { game_id, rejector }
                if game_id == "g2" && rejector == "someone"
        ));
        assert_eq!(st.state(), ConnectionState::WaitingForGame);
    }

    #[test]
    fn test_malformed_reject_is_error() {
        let mut st = ProtocolState::new();
        st.transition(ConnectionState::Connecting);
        st.transition(ConnectionState::Connected);
        st.handle_line("LOGIN:u OK");
        st.handle_line("BEGIN Game_Summary");
        st.handle_line("END Game_Summary");
        let events = st.handle_line("REJECT:oops");
        assert!(matches!(events[0], ClientEvent::Error(_)));
        assert_eq!(st.state(), ConnectionState::GameReady);
    }

    #[test]
    fn test_logout_ack_ends_session() {
        let mut st = ProtocolState::new();
        st.transition(ConnectionState::Connecting);
        st.transition(ConnectionState::Connected);
        st.handle_line("LOGIN:u OK");
        assert_eq!(st.state(), ConnectionState::WaitingForGame);

        let events = st.handle_line("LOGOUT:completed");
        assert!(matches!(events[0], ClientEvent::LogoutCompleted));
        assert!(matches!(
            events[1],
            ClientEvent::StateChanged(ConnectionState::Disconnected)
        ));
        assert_eq!(st.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_lines_ignored_while_disconnected() {
        let mut st = ProtocolState::new();
        assert!(st.handle_line("LOGIN:u OK").is_empty());
        assert!(st.handle_line("+7776FU,T1").is_empty());
        assert_eq!(st.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_disconnect_clears_open_parser() {
        let mut st = ProtocolState::new();
        st.transition(ConnectionState::Connecting);
        st.transition(ConnectionState::Connected);
        st.handle_line("LOGIN:u OK");
        st.handle_line("BEGIN Game_Summary");
        st.transition(ConnectionState::Disconnected);
        // A stray summary line after the drop is silently ignored.
        assert!(st.handle_line("Game_ID:stale").is_empty());
    }
}
