//! Structured object identity.
//!
//! Objects referenced over the wire are named by a [`Uoid`], never by a local
//! handle. The receiving side resolves a `Uoid` to whatever it uses locally.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Player identifier assigned by the server, stable for the whole session.
pub type PlayerId = u32;

/// A page (room) location inside an age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Page sequence number.
    pub sequence: u32,
    /// Page flags (reserved, built-in, ...).
    pub flags: u16,
}

impl Location {
    /// Page flag for pages loaded locally and never sent over the wire.
    pub const LOCAL_ONLY: u16 = 0x1;
    /// Page flag for the global, always loaded, pages.
    pub const RESERVED: u16 = 0x2;

    /// Create a location with no flags.
    pub fn new(sequence: u32) -> Self {
        Self { sequence, flags: 0 }
    }

    /// Whether this page belongs to the reserved global set.
    pub fn is_reserved(&self) -> bool {
        self.flags & Self::RESERVED != 0
    }
}

/// Unique object identifier: location, class and name, plus clone information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uoid {
    /// Page the object lives in.
    pub location: Location,
    /// Class index of the keyed object.
    pub class_type: u16,
    /// Object name, unique within its page and class.
    pub object_name: String,
    /// Clone number, `0` for the original object.
    pub clone_id: u32,
    /// Player that requested the clone, `0` for non-clones.
    pub clone_player_id: PlayerId,
}

impl Uoid {
    /// Create an identity for a non-cloned object.
    pub fn new(location: Location, class_type: u16, object_name: impl Into<String>) -> Self {
        Self {
            location,
            class_type,
            object_name: object_name.into(),
            clone_id: 0,
            clone_player_id: 0,
        }
    }

    /// Return a copy of this identity naming clone `clone_id` owned by `player`.
    pub fn cloned_for(&self, clone_id: u32, player: PlayerId) -> Self {
        Self {
            clone_id,
            clone_player_id: player,
            ..self.clone()
        }
    }

    /// Whether this identity names a clone rather than an original object.
    pub fn is_clone(&self) -> bool {
        self.clone_id != 0
    }
}

impl fmt::Display for Uoid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.location.sequence, self.class_type, self.object_name
        )?;
        if self.is_clone() {
            write!(f, "[clone {} of player {}]", self.clone_id, self.clone_player_id)?;
        }
        Ok(())
    }
}
