//! Wire layer for the Plasma network client: message types, postcard codec,
//! length-prefixed framing, and the TCP connection to the game server.

pub mod framing;
pub mod messages;
pub mod tcp_client;
pub mod uoid;

pub use framing::{FrameConfig, FrameError, read_frame, read_message, write_frame, write_message};
pub use messages::*;
pub use tcp_client::{
    ConnectionState, ConnectionStateWatch, GameClient, KEEPALIVE_INTERVAL, drain_channel,
    message_channel,
};
pub use uoid::{Location, PlayerId, Uoid};
