//! The client session: owns every piece of per-connection state and advances
//! it once per frame.
//!
//! Inbound messages are queued with [`NetClientSession::receive`] and handled
//! on the next [`NetClientSession::update`]. Outbound messages go through
//! [`NetClientSession::send`] and are collected by the transport task with
//! [`NetClientSession::drain_outgoing`].

use std::collections::VecDeque;

use bitflags::bitflags;
use plasma_config::Config;
use plasma_net::{Message, PagingRoom, PlayerId, Uoid, WireMessage, deserialize_message};

use crate::clock::ServerClock;
use crate::error::{LinkError, SendError};
use crate::events::SessionEvent;
use crate::linking::{AgeLink, LinkEvent, LinkState, LinkingManager};
use crate::pending::{DrainReport, InitialStateCounter, PendingLoads};
use crate::screener::{Direction, MessageScreener};
use crate::sdl::DescriptorRegistry;
use crate::transport::{NetChannel, Transport};
use crate::voice::{ListChange, VoiceEngine, VoiceSettings};
use crate::world::{ObjectDirectory, SessionHost};

bitflags! {
    /// Session state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SessionFlags: u16 {
        /// The initial age state burst is being received.
        const LOADING_INITIAL_AGE_STATE = 1 << 0;
        /// The server has not yet said how many initial states to expect.
        const NEED_INITIAL_AGE_STATE_COUNT = 1 << 1;
        /// The age is loaded and play has started.
        const PLAYING_GAME = 1 << 2;
        /// Networking is off; nothing is sent or handled.
        const DISABLED = 1 << 3;
        /// A disable has been requested and applies on the next update.
        const DISABLE_ON_NEXT_UPDATE = 1 << 4;
        /// The player may not chat or talk.
        const SILENCE_PLAYER = 1 << 5;
        /// The player may not link.
        const BAN_LINKING = 1 << 6;
    }
}

/// Session tunables, usually built from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Voice routing.
    pub voice: VoiceSettings,
    /// Include ourselves in outgoing voice receivers.
    pub echo_voice: bool,
    /// Seconds between server clock samples.
    pub clock_sample_interval: f64,
    /// Seconds before a join or leave is considered failed.
    pub link_timeout: f64,
    /// Screen game messages in both directions.
    pub screen_messages: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            voice: VoiceSettings::from(&config.voice),
            echo_voice: config.voice.echo,
            clock_sample_interval: config.session.clock_sample_interval_secs,
            link_timeout: config.session.link_timeout_secs,
            screen_messages: config.session.screen_messages,
        }
    }
}

/// A message ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    /// Channel the message travels on.
    pub channel: NetChannel,
    /// The stamped message.
    pub wire: WireMessage,
}

/// Client-side state for one connection to a game server.
#[derive(Debug)]
pub struct NetClientSession {
    pub(crate) settings: SessionSettings,
    pub(crate) local_player: PlayerId,
    pub(crate) flags: SessionFlags,
    pub(crate) transport: Transport,
    pub(crate) voice: VoiceEngine,
    pub(crate) pending: PendingLoads,
    pub(crate) initial_states: InitialStateCounter,
    pub(crate) descriptors: DescriptorRegistry,
    pub(crate) screener: MessageScreener,
    pub(crate) clock: ServerClock,
    pub(crate) linking: LinkingManager,
    pub(crate) is_owner: bool,
    pub(crate) events: Vec<SessionEvent>,
    inbox: VecDeque<WireMessage>,
    outbox: VecDeque<OutgoingMessage>,
    held_paging: VecDeque<PagingRoom>,
    disable_request: Option<(bool, String)>,
}

impl NetClientSession {
    /// Create a session for `local_player`.
    pub fn new(settings: SessionSettings, local_player: PlayerId) -> Self {
        Self {
            voice: VoiceEngine::new(settings.voice.clone()),
            clock: ServerClock::new(settings.clock_sample_interval),
            linking: LinkingManager::new(settings.link_timeout),
            settings,
            local_player,
            flags: SessionFlags::empty(),
            transport: Transport::new(),
            pending: PendingLoads::new(),
            initial_states: InitialStateCounter::default(),
            descriptors: DescriptorRegistry::new(),
            screener: MessageScreener,
            is_owner: false,
            events: Vec::new(),
            inbox: VecDeque::new(),
            outbox: VecDeque::new(),
            held_paging: VecDeque::new(),
            disable_request: None,
        }
    }

    pub fn local_player(&self) -> PlayerId {
        self.local_player
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.contains(SessionFlags::DISABLED)
    }

    pub fn is_playing(&self) -> bool {
        self.flags.contains(SessionFlags::PLAYING_GAME)
    }

    pub fn is_loading_initial_state(&self) -> bool {
        self.flags.contains(SessionFlags::LOADING_INITIAL_AGE_STATE)
    }

    /// Whether we own the age's shared objects.
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn voice(&self) -> &VoiceEngine {
        &self.voice
    }

    pub fn pending(&self) -> &PendingLoads {
        &self.pending
    }

    pub fn initial_states(&self) -> &InitialStateCounter {
        &self.initial_states
    }

    pub fn linking(&self) -> &LinkingManager {
        &self.linking
    }

    pub fn descriptors(&self) -> &DescriptorRegistry {
        &self.descriptors
    }

    /// Registry of known state descriptors, filled by the host at startup.
    pub fn descriptors_mut(&mut self) -> &mut DescriptorRegistry {
        &mut self.descriptors
    }

    // -- Inbound -------------------------------------------------------------

    /// Queue a decoded message for the next update.
    pub fn receive(&mut self, wire: WireMessage) {
        self.inbox.push_back(wire);
    }

    /// Decode and queue raw payload bytes. Undecodable payloads are dropped.
    pub fn receive_bytes(&mut self, bytes: &[u8]) -> bool {
        match deserialize_message(bytes) {
            Ok(wire) => {
                self.receive(wire);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, len = bytes.len(), "dropping undecodable message");
                false
            }
        }
    }

    /// Messages waiting for the next update.
    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    /// Advance the session by one frame.
    pub fn update<H: SessionHost + ?Sized>(&mut self, host: &mut H) {
        if let Some((show_dialog, reason)) = self.disable_request.take() {
            self.disable_net(show_dialog, reason);
        }
        if self.is_disabled() {
            return;
        }
        let now = host.now();
        let sys_now = host.sys_now();

        while let Some(wire) = self.inbox.pop_front() {
            self.dispatch(wire, host);
            if self.disable_request.is_some() {
                break;
            }
        }

        if self.is_playing() {
            self.flush_held_paging(sys_now);
        }
        self.drain_pending(host);

        if let Some(change) = self.voice.tick(now, &mut self.transport, &*host) {
            self.push_list_change(change);
        }

        if let Some(event) = self.linking.check_timeout(now) {
            self.on_link_event(event);
        }
        if let Some(event) = self.linking.step(now, host) {
            self.on_link_event(event);
        }
    }

    /// Deliver queued state, unless the initial burst is still incomplete.
    /// Stale records are only dropped once play has started and no join is
    /// in flight.
    fn drain_pending<H: ObjectDirectory + ?Sized>(&mut self, host: &mut H) -> DrainReport {
        if self.is_loading_initial_state() && !self.initial_states.is_complete() {
            return DrainReport {
                remaining: self.pending.len(),
                ..DrainReport::default()
            };
        }
        let steady_state = self.is_playing() && self.linking.state() != LinkState::Joining;
        self.pending.drain(host, steady_state)
    }

    /// Start a new initial state burst. Called when a join starts.
    pub fn begin_initial_state_load(&mut self) {
        self.flags.remove(SessionFlags::PLAYING_GAME);
        self.flags.insert(
            SessionFlags::LOADING_INITIAL_AGE_STATE | SessionFlags::NEED_INITIAL_AGE_STATE_COUNT,
        );
        self.initial_states.reset();
        self.clock.reset(true);
        tracing::debug!("waiting for initial age state");
    }

    /// Finish loading once every announced initial state has arrived.
    pub(crate) fn check_initial_states<H: ObjectDirectory + ?Sized>(&mut self, host: &mut H) {
        if !self.is_loading_initial_state() || !self.initial_states.is_complete() {
            return;
        }
        self.flags.remove(
            SessionFlags::LOADING_INITIAL_AGE_STATE | SessionFlags::NEED_INITIAL_AGE_STATE_COUNT,
        );
        let count = self.initial_states.received();
        tracing::info!(count, "all initial age states received");

        let report = self.pending.drain(host, false);
        if report.remaining > 0 {
            tracing::debug!(remaining = report.remaining, "initial states still waiting for objects");
        }
        self.flags.insert(SessionFlags::PLAYING_GAME);
        self.events
            .push(SessionEvent::AllInitialStatesReceived { count });
    }

    pub(crate) fn push_list_change(&mut self, change: ListChange) {
        self.events
            .extend(change.stopped.into_iter().map(SessionEvent::StopListening));
        self.events
            .extend(change.started.into_iter().map(SessionEvent::StartListening));
    }

    // -- Outbound ------------------------------------------------------------

    /// Queue `message` for the server, stamped with the estimated server time.
    ///
    /// Voice with nobody to talk to is silently skipped. Paging notifications
    /// are held until play starts.
    pub fn send(&mut self, mut message: Message, sys_now: f64) -> Result<(), SendError> {
        if self.is_disabled() || self.disable_request.is_some() {
            return Err(SendError::Disabled);
        }
        let silenced = self.flags.contains(SessionFlags::SILENCE_PLAYER);

        let channel = match &mut message {
            Message::Voice(voice) => {
                if silenced {
                    return Err(SendError::Silenced);
                }
                voice.receivers = self
                    .voice
                    .talk_receivers(self.local_player, self.settings.echo_voice);
                if voice.receivers.is_empty() {
                    tracing::trace!("no voice receivers, skipping send");
                    return Ok(());
                }
                NetChannel::Voice
            }
            Message::GameMessage(game) => {
                if silenced && game.msg.is_chat() {
                    return Err(SendError::Silenced);
                }
                if self.settings.screen_messages {
                    self.screener
                        .screen(&game.msg, Direction::Outgoing)
                        .map_err(|rejection| SendError::Screened(rejection.msg_type))?;
                }
                NetChannel::Default
            }
            Message::ListenListUpdate(update) => {
                self.transport.clear_channel(NetChannel::ListenList);
                for &id in &update.receivers {
                    let p2p = self
                        .transport
                        .member(id)
                        .is_some_and(|member| member.is_peer_to_peer());
                    if p2p {
                        self.transport.subscribe(id, NetChannel::ListenList);
                    }
                }
                NetChannel::ListenList
            }
            Message::PagingRoom(paging) if !self.is_playing() => {
                tracing::debug!(rooms = paging.rooms.len(), "holding paging message until play starts");
                self.held_paging.push_back(paging.clone());
                return Ok(());
            }
            _ => NetChannel::Default,
        };

        self.push_outgoing(channel, message, sys_now);
        Ok(())
    }

    fn push_outgoing(&mut self, channel: NetChannel, message: Message, sys_now: f64) {
        let server_ms = (self.clock.server_time(sys_now) * 1000.0).max(0.0) as u64;
        self.outbox.push_back(OutgoingMessage {
            channel,
            wire: WireMessage::stamped(message, server_ms),
        });
    }

    fn flush_held_paging(&mut self, sys_now: f64) {
        while let Some(paging) = self.held_paging.pop_front() {
            self.push_outgoing(NetChannel::Default, Message::PagingRoom(paging), sys_now);
        }
    }

    /// Paging notifications waiting for play to start.
    pub fn held_paging_len(&self) -> usize {
        self.held_paging.len()
    }

    /// Take every message queued for the wire, in send order.
    pub fn drain_outgoing(&mut self) -> Vec<OutgoingMessage> {
        self.outbox.drain(..).collect()
    }

    /// Take every event produced since the last call.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Disable / shutdown ----------------------------------------------------

    /// Ask for networking to be switched off at the start of the next update.
    /// When several requests arrive first one wins.
    pub fn queue_disable_net(&mut self, show_dialog: bool, reason: impl Into<String>) {
        if self.is_disabled() || self.disable_request.is_some() {
            return;
        }
        let reason = reason.into();
        tracing::warn!(%reason, "networking will be disabled");
        self.flags.insert(SessionFlags::DISABLE_ON_NEXT_UPDATE);
        self.disable_request = Some((show_dialog, reason));
    }

    fn disable_net(&mut self, show_dialog: bool, reason: String) {
        self.flags.remove(SessionFlags::DISABLE_ON_NEXT_UPDATE);
        self.flags.insert(SessionFlags::DISABLED);
        tracing::error!(%reason, "networking disabled");
        self.events
            .push(SessionEvent::NetDisabled { show_dialog, reason });
    }

    /// Tear down all per-age state. An in-flight join or leave keeps its
    /// wait marker so its completion is still consumed.
    pub fn shutdown(&mut self) {
        tracing::info!("shutting down client session");
        self.linking.clear_queue();
        self.unload_remote_state();
        self.inbox.clear();
        self.outbox.clear();
        self.clock.reset(false);
        self.is_owner = false;
        self.flags.remove(
            SessionFlags::PLAYING_GAME
                | SessionFlags::LOADING_INITIAL_AGE_STATE
                | SessionFlags::NEED_INITIAL_AGE_STATE_COUNT,
        );
    }

    /// Forget every remote member and their avatars, voice, and queued state.
    fn unload_remote_state(&mut self) {
        for member in self.transport.clear() {
            if let Some(avatar) = member.avatar {
                self.events.push(SessionEvent::UnloadRemoteAvatar {
                    player_id: member.player_id,
                    avatar,
                });
            }
        }
        if self.transport.take_roster_changed() {
            self.events.push(SessionEvent::RosterChanged);
        }
        self.voice.clear();
        self.pending.clear();
        self.initial_states.reset();
        self.held_paging.clear();
    }

    // -- Player restrictions -------------------------------------------------

    pub fn set_silenced(&mut self, silenced: bool) {
        self.flags.set(SessionFlags::SILENCE_PLAYER, silenced);
    }

    pub fn is_silenced(&self) -> bool {
        self.flags.contains(SessionFlags::SILENCE_PLAYER)
    }

    pub fn set_linking_banned(&mut self, banned: bool) {
        self.flags.set(SessionFlags::BAN_LINKING, banned);
        self.linking.set_linking_banned(banned);
    }

    // -- Voice tuning ----------------------------------------------------------

    /// Change the listening radius.
    pub fn set_max_listen_distance(&mut self, distance: f32) {
        self.voice.set_max_listen_distance(distance);
    }

    /// Change the listen list size; negative means unbounded.
    pub fn set_max_list_size(&mut self, max: i32) {
        self.voice.set_max_list_size(max);
    }

    pub fn set_echo_voice(&mut self, echo: bool) {
        self.settings.echo_voice = echo;
    }

    // -- Linking -------------------------------------------------------------

    /// Queue a link to `link`, leaving the current age first.
    pub fn link_to_age(&mut self, link: AgeLink) -> Result<(), LinkError> {
        self.linking.link_to_age(link)
    }

    /// Queue a link back to the previous age.
    pub fn link_to_prev_age(&mut self) -> Result<(), LinkError> {
        self.linking.link_to_prev_age()
    }

    /// Queue a leave of the current age.
    pub fn leave_age(&mut self, quitting: bool) {
        self.linking.leave_age(quitting);
    }

    /// Completion callback for [`crate::AgeTransitions::begin_join`].
    pub fn age_joined(&mut self, result: Result<(), String>) {
        self.complete_link(result);
    }

    /// Completion callback for [`crate::AgeTransitions::begin_leave`].
    pub fn age_left(&mut self, result: Result<(), String>) {
        self.complete_link(result);
    }

    fn complete_link(&mut self, result: Result<(), String>) {
        if let Some(event) = self.linking.complete(result) {
            self.on_link_event(event);
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match &event {
            LinkEvent::JoinStarted(_) => self.begin_initial_state_load(),
            LinkEvent::LeaveStarted { .. } => self.flags.remove(SessionFlags::PLAYING_GAME),
            LinkEvent::JoinFailed { .. } => self.flags.remove(
                SessionFlags::LOADING_INITIAL_AGE_STATE
                    | SessionFlags::NEED_INITIAL_AGE_STATE_COUNT,
            ),
            LinkEvent::Left | LinkEvent::LeaveFailed { .. } => self.unload_remote_state(),
            LinkEvent::Joined(_) => {}
        }
        self.events.push(SessionEvent::Link(event));
    }

    // -- Queries -------------------------------------------------------------

    /// Whether this client controls `uoid`.
    ///
    /// Clones belong to the player that spawned them. Everything else belongs
    /// to the group owner. With networking disabled everything is local.
    pub fn is_locally_owned(&self, uoid: &Uoid) -> bool {
        if self.is_disabled() {
            return true;
        }
        if uoid.is_clone() {
            if uoid.clone_player_id == self.local_player {
                return true;
            }
            if self.transport.find_member(uoid.clone_player_id).is_some() {
                return false;
            }
        }
        self.is_owner
    }

    /// Estimated server wall time for local wall time `sys_now`.
    pub fn server_time(&self, sys_now: f64) -> f64 {
        self.clock.server_time(sys_now)
    }

    /// Current server clock offset in seconds.
    pub fn server_time_offset(&self) -> f64 {
        self.clock.offset()
    }

    pub fn reset_server_time_offset(&mut self, delayed: bool) {
        self.clock.reset(delayed);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
