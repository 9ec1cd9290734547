//! Session error types.

use plasma_net::GameMsgType;

/// Reasons an outgoing message was not queued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// Networking has been disabled for this session.
    #[error("networking is disabled")]
    Disabled,

    /// The player has been silenced by staff.
    #[error("player is silenced")]
    Silenced,

    /// The screener refused the message.
    #[error("{0:?} message may not be sent")]
    Screened(GameMsgType),
}

/// Reasons a link request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Staff have banned this player from linking.
    #[error("linking is banned for this player")]
    Banned,

    /// There is no previous age to return to.
    #[error("no previous age to link to")]
    NoPreviousAge,
}
