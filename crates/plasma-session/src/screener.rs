//! Message screening.
//!
//! The server relays whatever other clients send, so every game message is
//! checked against a fixed policy before it is dispatched locally, and the
//! same policy applies to what we send. The screener holds no state; each
//! decision depends only on the message.

use plasma_net::{GameMsg, GameMsgType};

/// Which way a message is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the server.
    Incoming,
    /// About to be sent.
    Outgoing,
}

/// Policy for one message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenPolicy {
    /// Always accepted.
    AlwaysAllow,
    /// Never accepted.
    AlwaysReject(RejectReason),
    /// Accepted when the content passes [`content_allowed`].
    ContentDependent,
}

/// Why a type is on the reject list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Local reference bookkeeping that must never cross the wire.
    ReferenceControl,
    /// The type's encoding cannot be read safely.
    UnsafeEncoding,
    /// Executes commands on the receiving client.
    RemoteExecution,
}

/// A screening decision that refused the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{direction:?} {msg_type:?} message rejected")]
pub struct Rejection {
    /// Direction the message was travelling.
    pub direction: Direction,
    /// Type of the rejected message.
    pub msg_type: GameMsgType,
}

/// Policy for `msg_type`. `None` means the type is unclassified.
pub fn classify(msg_type: GameMsgType) -> Option<ScreenPolicy> {
    use GameMsgType::*;
    match msg_type {
        Ref | GenRef => Some(ScreenPolicy::AlwaysReject(RejectReason::ReferenceControl)),
        ParticleTransfer => Some(ScreenPolicy::AlwaysReject(RejectReason::UnsafeEncoding)),
        ConsoleCommand => Some(ScreenPolicy::AlwaysReject(RejectReason::RemoteExecution)),
        Ki => Some(ScreenPolicy::ContentDependent),
        Notify | AnimCommand | LinkEffects | Enable => Some(ScreenPolicy::AlwaysAllow),
        Other => None,
    }
}

/// Content check for [`ScreenPolicy::ContentDependent`] types.
pub fn content_allowed(msg: &GameMsg) -> bool {
    match msg {
        GameMsg::Ki(_) => msg.is_chat(),
        _ => true,
    }
}

/// The stateless screening policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageScreener;

impl MessageScreener {
    /// Screen `msg` travelling in `direction`.
    pub fn screen(&self, msg: &GameMsg, direction: Direction) -> Result<(), Rejection> {
        let msg_type = msg.msg_type();
        let allowed = match classify(msg_type) {
            None | Some(ScreenPolicy::AlwaysAllow) => true,
            Some(ScreenPolicy::AlwaysReject(reason)) => {
                tracing::warn!(?direction, ?msg_type, ?reason, "screener rejected message");
                false
            }
            Some(ScreenPolicy::ContentDependent) => {
                let ok = content_allowed(msg);
                if !ok {
                    tracing::warn!(?direction, ?msg_type, "screener rejected message content");
                }
                ok
            }
        };
        if allowed {
            Ok(())
        } else {
            Err(Rejection {
                direction,
                msg_type,
            })
        }
    }

    /// Whether we may send `msg`.
    pub fn allow_outgoing(&self, msg: &GameMsg) -> bool {
        self.screen(msg, Direction::Outgoing).is_ok()
    }

    /// Whether a received `msg` may be dispatched locally.
    pub fn allow_incoming(&self, msg: &GameMsg) -> bool {
        self.screen(msg, Direction::Incoming).is_ok()
    }
}
