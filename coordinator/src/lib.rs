//! Game coordination between a CSA server seat, a board collaborator,
//! and an optional USI engine.

pub mod board;
pub mod clock;
pub mod commands;
pub mod error;
pub mod events;
pub mod handle;
pub mod notation;
pub mod traits;

mod actor;

pub use commands::{CoordinatorCommand, PlayerType, StartOptions};
pub use error::{CoordinatorError, CoordinatorResult};
pub use events::{CommDirection, CoordinatorEvent, GameState};
pub use handle::GameCoordinator;
pub use notation::{csa_to_usi, pretty_move, usi_to_csa, CsaMove, NotationError, Piece, Square, UsiMove};
pub use traits::{BoardApplier, NullBoard};
