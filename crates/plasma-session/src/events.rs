//! Notifications for the layers above the session (UI, KI, scene).

use plasma_net::{GameMsg, LoadClone, PlayerId, Uoid};

use crate::linking::LinkEvent;

/// Something the host should react to, drained with
/// [`crate::NetClientSession::drain_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Members were added, updated, or removed while handling one message.
    RosterChanged,
    /// We stopped listening to a member.
    StopListening(PlayerId),
    /// We started listening to a member.
    StartListening(PlayerId),
    /// A screened game message to dispatch locally.
    GameMessage {
        /// Sending player.
        player_id: Option<PlayerId>,
        /// The message.
        msg: GameMsg,
        /// Local wall time to deliver at, `None` for immediately.
        deliver_at: Option<f64>,
    },
    /// Load or unload a clone.
    LoadClone(LoadClone),
    /// A remote avatar must be unloaded because its owner is gone.
    UnloadRemoteAvatar {
        /// Owner of the avatar.
        player_id: PlayerId,
        /// Avatar clone.
        avatar: Uoid,
    },
    /// Ownership of shared objects changed.
    OwnershipChanged {
        /// Whether we now own them.
        is_owner: bool,
    },
    /// Every announced initial state has arrived.
    AllInitialStatesReceived {
        /// Number of initial states received.
        count: u32,
    },
    /// The server ended the session.
    Terminated {
        /// Reason given by the server.
        reason: String,
    },
    /// Networking was disabled.
    NetDisabled {
        /// Tell the player.
        show_dialog: bool,
        /// Why.
        reason: String,
    },
    /// Linking progress.
    Link(LinkEvent),
}
