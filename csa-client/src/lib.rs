//! Client for the CSA shogi server protocol (v1.1 / v1.2.1).
//!
//! One actor task per connection: raw newline-delimited TCP in, typed
//! [`ClientEvent`]s out over a broadcast channel. The protocol logic itself
//! lives in the pure [`state::ProtocolState`] machine, so it is testable
//! without a socket.

mod actor;
mod commands;
mod error;
mod events;
mod handle;
mod state;
mod summary;
mod types;

pub use commands::ClientCommand;
pub use error::{ClientError, ClientResult};
pub use events::ClientEvent;
pub use handle::CsaClient;
pub use state::ProtocolState;
pub use summary::{GameSummary, SummaryError, SummaryParser, TimeControl};
pub use types::{
    decode_result_pair, ConnectionState, GameEndCause, GameResult, Side, TimeUnit,
};

/// Default CSA server port.
pub const DEFAULT_PORT: u16 = 4081;
