use tokio::sync::{broadcast, oneshot};

use crate::events::ClientEvent;
use crate::types::ConnectionState;

/// Commands sent to the client actor. Fire-and-forget unless a reply
/// channel is embedded; completion is observed through events.
#[derive(Debug)]
pub enum ClientCommand {
    Connect {
        host: String,
        port: u16,
    },
    Disconnect,
    Login {
        username: String,
        password: String,
    },
    Logout,
    /// Accept the pending game. `game_id` defaults to the summary's id.
    Agree {
        game_id: Option<String>,
    },
    /// Decline the pending game.
    Reject {
        game_id: Option<String>,
    },
    /// Send a CSA move (`+7776FU`); rejected locally outside our turn.
    SendMove {
        mv: String,
    },
    /// Escape hatch: send an arbitrary protocol line.
    SendRaw {
        line: String,
    },
    Resign,
    DeclareWin,
    RequestChudan,
    GetState {
        reply: oneshot::Sender<ConnectionState>,
    },
    Subscribe {
        reply: oneshot::Sender<broadcast::Receiver<ClientEvent>>,
    },
    Shutdown,
}
