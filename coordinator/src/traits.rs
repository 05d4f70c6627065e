//! Board collaborator abstraction.

use async_trait::async_trait;
use csa_client::Side;

use crate::notation::CsaMove;

/// Host-side board the coordinator keeps in sync.
///
/// Moves arriving here were already accepted by the server; the collaborator
/// applies them without its own legality judgment. Implemented by real hosts
/// and by the recording mock in tests.
#[async_trait]
pub trait BoardApplier: Send + Sync {
    /// Reset to the game's starting position (raw CSA position lines;
    /// empty means the standard start).
    async fn reset(&self, position_lines: &[String]);

    /// Apply one validated move.
    async fn apply_move(&self, mv: &CsaMove, mover: Side);
}

/// Default collaborator: ignores everything.
pub struct NullBoard;

#[async_trait]
impl BoardApplier for NullBoard {
    async fn reset(&self, _position_lines: &[String]) {}

    async fn apply_move(&self, _mv: &CsaMove, _mover: Side) {}
}

#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use std::sync::Mutex;

    use super::*;

    /// Test double that records every call.
    #[derive(Default)]
    pub struct RecordingBoard {
        pub resets: Mutex<Vec<Vec<String>>>,
        pub moves: Mutex<Vec<(String, Side)>>,
    }

    #[async_trait]
    impl BoardApplier for RecordingBoard {
        async fn reset(&self, position_lines: &[String]) {
            if let Ok(mut resets) = self.resets.lock() {
                resets.push(position_lines.to_vec());
            }
        }

        async fn apply_move(&self, mv: &CsaMove, mover: Side) {
            if let Ok(mut moves) = self.moves.lock() {
                moves.push((mv.to_string(), mover));
            }
        }
    }
}
