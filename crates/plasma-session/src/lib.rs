//! Client session layer for the Plasma network protocol.
//!
//! [`NetClientSession`] tracks the age roster, routes proximity voice, gates
//! synchronized state until objects can take it, screens game messages,
//! estimates the server clock, and sequences age links. It is driven by a
//! single [`NetClientSession::update`] call per frame and reaches the rest of
//! the client through the traits in [`world`].

pub mod clock;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod linking;
pub mod pending;
pub mod screener;
pub mod sdl;
pub mod session;
pub mod transport;
pub mod voice;
pub mod world;

#[cfg(test)]
mod test_host;

pub use clock::ServerClock;
pub use dispatch::{HandlerStatus, SDL_DESC_PROBLEM};
pub use error::{LinkError, SendError};
pub use events::SessionEvent;
pub use linking::{AgeLink, LinkEvent, LinkOp, LinkState, LinkingManager};
pub use pending::{DrainReport, InitialStateCounter, PendingLoad, PendingLoads, StateDelivery};
pub use screener::{Direction, MessageScreener, Rejection, ScreenPolicy};
pub use sdl::{
    ApplyFlags, Descriptor, DescriptorRegistry, SdlError, StateHeader, StateRecord, StateVariable,
};
pub use session::{NetClientSession, OutgoingMessage, SessionFlags, SessionSettings};
pub use transport::{Member, MemberFlags, NetChannel, Transport, TransportFlags};
pub use voice::{ListChange, ListenListMode, PlayerList, VoiceEngine, VoiceSettings};
pub use world::{
    AgeTransitions, Clock, IgnoreList, ObjectDirectory, ObjectRef, PositionService, SessionHost,
    VoicePlayback,
};
