//! Collaborators the session calls into.
//!
//! The session never owns scene objects, audio, or age loading. It reaches
//! them through these traits, which the embedding application implements and
//! passes into every [`crate::NetClientSession::update`] call.

use glam::Vec3;
use plasma_net::{PlayerId, Uoid};

use crate::linking::AgeLink;
use crate::pending::StateDelivery;

/// Opaque handle to a resolved scene object, issued by the [`ObjectDirectory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub u64);

/// Resolves object identities and delivers state to them.
pub trait ObjectDirectory {
    /// Look up the local object named by `uoid`.
    fn resolve(&self, uoid: &Uoid) -> Option<ObjectRef>;

    /// Whether `obj` is fully constructed and ready to receive messages.
    fn is_final(&self, obj: ObjectRef) -> bool;

    /// Hand a synchronized state record to `obj`.
    fn deliver_state(&mut self, obj: ObjectRef, delivery: StateDelivery);
}

/// World-space positions of avatars.
pub trait PositionService {
    /// The local player's avatar, once it has been loaded.
    fn local_avatar(&self) -> Option<ObjectRef>;

    /// Translation component of `avatar`'s local-to-world transform.
    fn world_position(&self, avatar: ObjectRef) -> Option<Vec3>;
}

/// The local player's ignore list.
pub trait IgnoreList {
    /// Whether the local player has muted `player`.
    fn is_ignoring(&self, player: PlayerId) -> bool;
}

/// Audio playback for remote voices.
pub trait VoicePlayback {
    /// Queue encoded voice frames on `avatar`'s voice emitter.
    fn play_voice(&mut self, avatar: ObjectRef, data: &[u8], num_frames: u8, flags: u8);
}

/// Starts the asynchronous age join and leave sub-operations.
///
/// Completion is reported back through
/// [`crate::NetClientSession::age_joined`] and
/// [`crate::NetClientSession::age_left`].
pub trait AgeTransitions {
    /// Begin loading and joining `link`'s age.
    fn begin_join(&mut self, link: &AgeLink);

    /// Begin leaving the current age. `quitting` is set when the client exits.
    fn begin_leave(&mut self, quitting: bool);
}

/// Time sources.
pub trait Clock {
    /// Monotonic seconds.
    fn now(&self) -> f64;

    /// Wall-clock seconds since the Unix epoch.
    fn sys_now(&self) -> f64;
}

/// Everything the session needs from its host, in one bound.
pub trait SessionHost:
    ObjectDirectory + PositionService + IgnoreList + VoicePlayback + AgeTransitions + Clock
{
}

impl<T> SessionHost for T where
    T: ObjectDirectory + PositionService + IgnoreList + VoicePlayback + AgeTransitions + Clock
{
}
