//! Wire message types and serialization.
//!
//! Every frame carries one [`WireMessage`]: the sender's timestamp plus a
//! [`Message`]. Messages are serialized with [`postcard`] and prefixed with a
//! protocol version byte. Use [`serialize_message`] and
//! [`deserialize_message`] for encoding/decoding.

use serde::{Deserialize, Serialize};

use crate::uoid::{Location, PlayerId, Uoid};

/// Current wire-protocol version. Prepended to every serialized message.
pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One message as it travels over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    /// Sender wall-clock time in milliseconds since the Unix epoch.
    /// `0` means the sender did not stamp the message.
    pub sent_at_ms: u64,
    /// The message body.
    pub message: Message,
}

impl WireMessage {
    /// Wrap a message without a timestamp.
    pub fn unstamped(message: Message) -> Self {
        Self {
            sent_at_ms: 0,
            message,
        }
    }

    /// Wrap a message stamped at `sent_at_ms`.
    pub fn stamped(message: Message, sent_at_ms: u64) -> Self {
        Self {
            sent_at_ms,
            message,
        }
    }

    /// Sender time in seconds, if the message was stamped.
    pub fn sent_at_secs(&self) -> Option<f64> {
        (self.sent_at_ms != 0).then(|| self.sent_at_ms as f64 / 1000.0)
    }
}

// ---------------------------------------------------------------------------
// Top-level enum
// ---------------------------------------------------------------------------

/// Top-level network message. The enum discriminant is the type tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Message {
    // --- Session ---
    /// Server is terminating our session.
    Terminated(Terminated),
    /// Server grants or revokes ownership of shared objects.
    GroupOwner(GroupOwner),
    /// Server announces the total number of initial states for this age.
    InitialAgeStateSent(InitialAgeStateSent),

    // --- Roster ---
    /// Full replacement of the member roster.
    MembersList(MembersList),
    /// Incremental roster add or remove.
    MemberUpdate(MemberUpdate),

    // --- State ---
    /// Synchronized object state.
    SdlState(SdlState),
    /// A game-level message wrapped for transport.
    GameMessage(GameMessage),
    /// Load or unload a cloned object (usually an avatar).
    LoadClone(LoadClone),
    /// Client tells the server which pages it is paging in or out.
    PagingRoom(PagingRoom),

    // --- Voice ---
    /// Encoded voice frames.
    Voice(Voice),
    /// A member started or stopped listening to the receivers.
    ListenListUpdate(ListenListUpdate),
    /// Server switches the listen list between distance and forced modes.
    VoiceListCommand(VoiceListCommand),
}

/// Type tag for a [`Message`], used for logging and per-type bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    /// [`Message::Terminated`].
    Terminated,
    /// [`Message::GroupOwner`].
    GroupOwner,
    /// [`Message::InitialAgeStateSent`].
    InitialAgeStateSent,
    /// [`Message::MembersList`].
    MembersList,
    /// [`Message::MemberUpdate`].
    MemberUpdate,
    /// [`Message::SdlState`].
    SdlState,
    /// [`Message::GameMessage`].
    GameMessage,
    /// [`Message::LoadClone`].
    LoadClone,
    /// [`Message::PagingRoom`].
    PagingRoom,
    /// [`Message::Voice`].
    Voice,
    /// [`Message::ListenListUpdate`].
    ListenListUpdate,
    /// [`Message::VoiceListCommand`].
    VoiceListCommand,
}

impl Message {
    /// Extract the type tag without consuming the message.
    pub fn tag(&self) -> MessageTag {
        match self {
            Message::Terminated(_) => MessageTag::Terminated,
            Message::GroupOwner(_) => MessageTag::GroupOwner,
            Message::InitialAgeStateSent(_) => MessageTag::InitialAgeStateSent,
            Message::MembersList(_) => MessageTag::MembersList,
            Message::MemberUpdate(_) => MessageTag::MemberUpdate,
            Message::SdlState(_) => MessageTag::SdlState,
            Message::GameMessage(_) => MessageTag::GameMessage,
            Message::LoadClone(_) => MessageTag::LoadClone,
            Message::PagingRoom(_) => MessageTag::PagingRoom,
            Message::Voice(_) => MessageTag::Voice,
            Message::ListenListUpdate(_) => MessageTag::ListenListUpdate,
            Message::VoiceListCommand(_) => MessageTag::VoiceListCommand,
        }
    }

    /// The originating player, for message types that carry one.
    pub fn player_id(&self) -> Option<PlayerId> {
        match self {
            Message::SdlState(m) => m.player_id,
            Message::GameMessage(m) => m.player_id,
            Message::LoadClone(m) => Some(m.player_id),
            Message::PagingRoom(m) => Some(m.player_id),
            Message::Voice(m) => Some(m.player_id),
            Message::ListenListUpdate(m) => Some(m.player_id),
            Message::MemberUpdate(m) => Some(m.member.player_id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload structs
// ---------------------------------------------------------------------------

/// Session termination notice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Terminated {
    /// Human-readable reason shown to the player.
    pub reason: String,
}

/// Ownership grant for shared (non-avatar) objects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GroupOwner {
    /// `true` if this client now owns all shared objects.
    pub is_owner: bool,
}

/// Count of initial states the server sent (or will send) for this age.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct InitialAgeStateSent {
    /// Total number of initial-state messages to expect.
    pub num_initial_states: u32,
}

/// One participant as announced by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberInfo {
    /// Stable player identifier.
    pub player_id: PlayerId,
    /// Display name.
    pub player_name: String,
    /// Transient network address, if the member is reachable directly.
    pub address: Option<String>,
    /// Transient network port.
    pub port: u16,
    /// Staff (CCR) level, `0` for ordinary players.
    pub ccr_level: u8,
    /// Avatar object, absent until the avatar has been cloned in.
    pub avatar: Option<Uoid>,
    /// The member is a server process, not a player.
    pub is_server: bool,
    /// The member can be reached peer-to-peer.
    pub peer_to_peer: bool,
}

/// Full roster replacement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MembersList {
    /// Every member currently in the age, including servers.
    pub members: Vec<MemberInfo>,
}

/// Incremental roster change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberUpdate {
    /// `true` to add (or update) the member, `false` to remove it.
    pub adding: bool,
    /// The member being added or removed.
    pub member: MemberInfo,
}

/// Synchronized object state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SdlState {
    /// Object the state belongs to.
    pub object: Uoid,
    /// Player that produced the state, if any.
    pub player_id: Option<PlayerId>,
    /// Part of the initial state burst sent on age join.
    pub initial_state: bool,
    /// Only dirty variables are present.
    pub dirty_only: bool,
    /// State was broadcast to every member.
    pub broadcast: bool,
    /// Encoded state record (descriptor header, then variables).
    pub state: Vec<u8>,
}

/// A game-level message wrapped for the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameMessage {
    /// Player that sent the message, if any.
    pub player_id: Option<PlayerId>,
    /// Deliver at this sender-clock time (ms) rather than immediately.
    pub delivery_time_ms: Option<u64>,
    /// The wrapped message.
    pub msg: GameMsg,
}

/// Load or unload a clone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadClone {
    /// Player that requested the clone.
    pub player_id: PlayerId,
    /// Identity of the clone.
    pub clone: Uoid,
    /// The clone is a player avatar.
    pub is_player: bool,
    /// `true` to load, `false` to unload.
    pub is_loading: bool,
    /// Part of the initial state burst sent on age join.
    pub is_initial_state: bool,
}

/// Paging notification (client to server only).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PagingRoom {
    /// Player paging the rooms.
    pub player_id: PlayerId,
    /// Pages being paged in or out.
    pub rooms: Vec<Location>,
    /// `true` when paging out.
    pub paging_out: bool,
}

/// Voice frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Voice {
    /// Speaking player.
    pub player_id: PlayerId,
    /// Number of codec frames in `data`.
    pub num_frames: u8,
    /// Codec flags.
    pub flags: u8,
    /// Encoded audio.
    pub data: Vec<u8>,
    /// Players that should receive the frames (filled in on send).
    pub receivers: Vec<PlayerId>,
}

/// Listen-list change notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenListUpdate {
    /// Player whose listen list changed.
    pub player_id: PlayerId,
    /// `true` if `player_id` started listening to the receivers.
    pub adding: bool,
    /// Players affected by the change.
    pub receivers: Vec<PlayerId>,
}

/// Listen-list mode command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VoiceListCommand {
    /// Listen exactly to `members`. Ignored unless `members` contains `author`.
    Forced {
        /// Player that issued the command.
        author: PlayerId,
        /// Players to listen to.
        members: Vec<PlayerId>,
    },
    /// Return to distance-based selection.
    Distance,
}

// ---------------------------------------------------------------------------
// Game messages
// ---------------------------------------------------------------------------

/// Game-level messages carried inside [`GameMessage`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum GameMsg {
    /// KI (chat interface) message.
    Ki(KiMsg),
    /// Script notification.
    Notify(NotifyMsg),
    /// Animation command.
    AnimCommand(AnimCommandMsg),
    /// Link-in/out effects for an avatar.
    LinkEffects(LinkEffectsMsg),
    /// Enable or disable an object.
    Enable(EnableMsg),
    /// Particle transfer between systems.
    ParticleTransfer(ParticleTransferMsg),
    /// Low-level object reference control.
    Ref(RefMsg),
    /// Low-level generic reference control.
    GenRef(RefMsg),
    /// Console command to execute.
    ConsoleCommand(ConsoleCommandMsg),
    /// Any other message type, kept opaque.
    Other(OpaqueMsg),
}

/// Tag of a [`GameMsg`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMsgType {
    /// [`GameMsg::Ki`].
    Ki,
    /// [`GameMsg::Notify`].
    Notify,
    /// [`GameMsg::AnimCommand`].
    AnimCommand,
    /// [`GameMsg::LinkEffects`].
    LinkEffects,
    /// [`GameMsg::Enable`].
    Enable,
    /// [`GameMsg::ParticleTransfer`].
    ParticleTransfer,
    /// [`GameMsg::Ref`].
    Ref,
    /// [`GameMsg::GenRef`].
    GenRef,
    /// [`GameMsg::ConsoleCommand`].
    ConsoleCommand,
    /// [`GameMsg::Other`].
    Other,
}

impl GameMsg {
    /// Extract the type tag.
    pub fn msg_type(&self) -> GameMsgType {
        match self {
            GameMsg::Ki(_) => GameMsgType::Ki,
            GameMsg::Notify(_) => GameMsgType::Notify,
            GameMsg::AnimCommand(_) => GameMsgType::AnimCommand,
            GameMsg::LinkEffects(_) => GameMsgType::LinkEffects,
            GameMsg::Enable(_) => GameMsgType::Enable,
            GameMsg::ParticleTransfer(_) => GameMsgType::ParticleTransfer,
            GameMsg::Ref(_) => GameMsgType::Ref,
            GameMsg::GenRef(_) => GameMsgType::GenRef,
            GameMsg::ConsoleCommand(_) => GameMsgType::ConsoleCommand,
            GameMsg::Other(_) => GameMsgType::Other,
        }
    }

    /// Whether this is a plain chat line (the only KI command peers may exchange).
    pub fn is_chat(&self) -> bool {
        matches!(self, GameMsg::Ki(ki) if ki.command == KiCommand::ChatMessage)
    }
}

/// KI sub-commands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum KiCommand {
    /// Plain chat text.
    ChatMessage,
    /// Open or close the KI.
    SetVisibility,
    /// Upgrade the KI level.
    UpgradeLevel,
    /// Start a local book link.
    StartBookAlert,
    /// Anything else.
    Other(u8),
}

/// KI message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KiMsg {
    /// Sub-command.
    pub command: KiCommand,
    /// Sender display name.
    pub sender_name: String,
    /// Chat text.
    pub text: String,
    /// Chat flags (private, broadcast, ...).
    pub flags: u32,
}

/// Script notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifyMsg {
    /// Objects that should receive the notification.
    pub receivers: Vec<Uoid>,
    /// Activation state.
    pub state: f32,
    /// Encoded event records.
    pub events: Vec<u8>,
}

/// Animation command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimCommandMsg {
    /// Animated object.
    pub target: Uoid,
    /// Animation name.
    pub anim_name: String,
    /// Command bits (play, stop, loop, ...).
    pub commands: u32,
}

/// Avatar link effects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkEffectsMsg {
    /// Avatar linking in or out.
    pub avatar: Uoid,
    /// `true` when linking in.
    pub linking_in: bool,
}

/// Enable/disable message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnableMsg {
    /// Target object.
    pub target: Uoid,
    /// `true` to enable.
    pub enable: bool,
}

/// Particle transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticleTransferMsg {
    /// Source particle system.
    pub system: Uoid,
    /// Number of particles to transfer.
    pub count: u16,
}

/// Reference control message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefMsg {
    /// Object whose reference changes.
    pub target: Uoid,
    /// Reference context bits (create, destroy, request, ...).
    pub context: u8,
}

/// Console command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleCommandMsg {
    /// Command line to execute.
    pub command: String,
}

/// Message of a type this layer does not interpret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpaqueMsg {
    /// Class name of the message.
    pub type_name: String,
    /// Encoded body.
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during message deserialization.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Postcard deserialization failed.
    #[error("deserialization error: {0}")]
    Postcard(#[from] postcard::Error),
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Serialize a [`WireMessage`] into a versioned binary payload.
///
/// Wire format: `[version: u8] [postcard-encoded WireMessage]`
pub fn serialize_message(msg: &WireMessage) -> Result<Vec<u8>, postcard::Error> {
    let body = postcard::to_allocvec(msg)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Deserialize a versioned binary payload into a [`WireMessage`].
pub fn deserialize_message(data: &[u8]) -> Result<WireMessage, MessageError> {
    let (&version, body) = data.split_first().ok_or(MessageError::EmptyPayload)?;
    if version != PROTOCOL_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
