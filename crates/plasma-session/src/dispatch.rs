//! Inbound message handlers.

use plasma_net::{
    GameMessage, GroupOwner, InitialAgeStateSent, ListenListUpdate, LoadClone, MemberUpdate,
    MembersList, Message, SdlState, Terminated, Voice, VoiceListCommand, WireMessage,
};

use crate::events::SessionEvent;
use crate::screener::Direction;
use crate::sdl::{apply_flags, read_header};
use crate::session::{NetClientSession, SessionFlags};
use crate::transport::TransportFlags;
use crate::voice::ListenListMode;
use crate::world::SessionHost;

/// Reason given when an incoming state record cannot be matched to a schema.
pub const SDL_DESC_PROBLEM: &str = "SDL Desc Problem";

/// Outcome of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    Handled,
    Error,
}

impl NetClientSession {
    /// Handle one inbound message immediately.
    ///
    /// [`NetClientSession::update`] calls this for every queued message; hosts
    /// that already run their own loop may call it directly.
    pub fn dispatch<H: SessionHost + ?Sized>(
        &mut self,
        wire: WireMessage,
        host: &mut H,
    ) -> HandlerStatus {
        self.clock
            .observe(wire.sent_at_secs(), host.now(), host.sys_now());

        let tag = wire.message.tag();
        tracing::trace!(?tag, "handling message");
        let status = match wire.message {
            Message::Terminated(m) => self.on_terminated(m),
            Message::GroupOwner(m) => self.on_group_owner(m),
            Message::InitialAgeStateSent(m) => self.on_initial_age_state_sent(m, host),
            Message::MembersList(m) => self.on_members_list(m),
            Message::MemberUpdate(m) => self.on_member_update(m),
            Message::SdlState(m) => self.on_sdl_state(m, host),
            Message::GameMessage(m) => self.on_game_message(m),
            Message::LoadClone(m) => self.on_load_clone(m, host),
            Message::PagingRoom(_) => {
                tracing::warn!("paging messages are client to server only");
                HandlerStatus::Error
            }
            Message::Voice(m) => self.on_voice(m, host),
            Message::ListenListUpdate(m) => self.on_listen_list_update(m),
            Message::VoiceListCommand(m) => self.on_voice_list_command(m),
        };
        if self.transport.take_roster_changed() {
            self.voice.request_resync();
            self.events.push(SessionEvent::RosterChanged);
        }
        status
    }

    fn on_terminated(&mut self, m: Terminated) -> HandlerStatus {
        tracing::warn!(reason = %m.reason, "server terminated the session");
        self.events.push(SessionEvent::Terminated {
            reason: m.reason.clone(),
        });
        self.queue_disable_net(true, m.reason);
        HandlerStatus::Handled
    }

    fn on_group_owner(&mut self, m: GroupOwner) -> HandlerStatus {
        if self.is_owner != m.is_owner {
            tracing::info!(is_owner = m.is_owner, "group ownership changed");
        }
        self.is_owner = m.is_owner;
        self.events.push(SessionEvent::OwnershipChanged {
            is_owner: m.is_owner,
        });
        HandlerStatus::Handled
    }

    fn on_initial_age_state_sent<H: SessionHost + ?Sized>(
        &mut self,
        m: InitialAgeStateSent,
        host: &mut H,
    ) -> HandlerStatus {
        tracing::info!(
            expected = m.num_initial_states,
            received = self.initial_states.received(),
            "initial age state count announced"
        );
        self.initial_states.set_required(m.num_initial_states);
        self.flags
            .remove(SessionFlags::NEED_INITIAL_AGE_STATE_COUNT);
        self.check_initial_states(host);
        HandlerStatus::Handled
    }

    fn on_members_list(&mut self, m: MembersList) -> HandlerStatus {
        let previous = self.transport.remove_non_server_members();
        for info in &m.members {
            if info.player_id == self.local_player {
                continue;
            }
            self.transport.add_member(info);
            if info.avatar.is_none() {
                let known = previous
                    .iter()
                    .find(|old| old.player_id == info.player_id)
                    .and_then(|old| old.avatar.clone());
                if let (Some(avatar), Some(member)) =
                    (known, self.transport.member_mut(info.player_id))
                {
                    member.avatar = Some(avatar);
                }
            }
        }
        for old in &previous {
            if self.transport.find_member(old.player_id).is_none()
                && self.voice.forget(old.player_id)
            {
                self.events.push(SessionEvent::StopListening(old.player_id));
            }
        }
        tracing::debug!(members = self.transport.len(), "roster replaced");
        HandlerStatus::Handled
    }

    fn on_member_update(&mut self, m: MemberUpdate) -> HandlerStatus {
        let id = m.member.player_id;
        if id == self.local_player {
            return HandlerStatus::Handled;
        }
        if m.adding {
            self.transport.add_member(&m.member);
        } else if self.transport.remove_member(id).is_some() && self.voice.forget(id) {
            self.events.push(SessionEvent::StopListening(id));
        }
        HandlerStatus::Handled
    }

    fn on_sdl_state<H: SessionHost + ?Sized>(&mut self, m: SdlState, host: &mut H) -> HandlerStatus {
        let header = match read_header(&m.state) {
            Ok(header) => header,
            Err(e) => {
                tracing::error!(object = %m.object, error = %e, "unreadable state record");
                self.queue_disable_net(true, SDL_DESC_PROBLEM);
                return HandlerStatus::Error;
            }
        };
        if let Err(e) = self.descriptors.find(&header) {
            tracing::error!(object = %m.object, error = %e, "state descriptor mismatch");
            self.queue_disable_net(true, SDL_DESC_PROBLEM);
            return HandlerStatus::Error;
        }

        if self.is_loading_initial_state()
            && !m.initial_state
            && !self.initial_states.is_complete()
        {
            tracing::debug!(object = %m.object, "ignoring non-initial state while loading");
            return HandlerStatus::Handled;
        }

        let flags = apply_flags(&header, m.initial_state);
        if let Err(e) = self.pending.enqueue(m.state, m.object, m.player_id, flags) {
            tracing::error!(error = %e, "failed to queue state record");
            self.queue_disable_net(true, SDL_DESC_PROBLEM);
            return HandlerStatus::Error;
        }
        if m.initial_state {
            self.initial_states.record_received();
            self.check_initial_states(host);
        }
        HandlerStatus::Handled
    }

    fn on_game_message(&mut self, m: GameMessage) -> HandlerStatus {
        if self.settings.screen_messages
            && self.screener.screen(&m.msg, Direction::Incoming).is_err()
        {
            return HandlerStatus::Handled;
        }
        if let Some(member) = m.player_id.and_then(|id| self.transport.member_mut(id)) {
            member.transport_flags.insert(TransportFlags::SENDING_ACTIONS);
        }
        let deliver_at = m
            .delivery_time_ms
            .map(|ms| self.clock.local_time(ms as f64 / 1000.0));
        self.events.push(SessionEvent::GameMessage {
            player_id: m.player_id,
            msg: m.msg,
            deliver_at,
        });
        HandlerStatus::Handled
    }

    fn on_load_clone<H: SessionHost + ?Sized>(&mut self, m: LoadClone, host: &mut H) -> HandlerStatus {
        if m.is_initial_state {
            self.initial_states.record_received();
        }

        let from_local = m.player_id == self.local_player;
        // Unloads are forwarded even for players no longer in the age.
        if m.is_loading && !from_local && self.transport.find_member(m.player_id).is_none() {
            tracing::debug!(player_id = m.player_id, clone = %m.clone, "clone load from player not in age, ignoring");
        } else {
            if m.is_player {
                if let Some(member) = self.transport.member_mut(m.player_id) {
                    member.avatar = m.is_loading.then(|| m.clone.clone());
                }
            }
            tracing::debug!(clone = %m.clone, loading = m.is_loading, "clone request");
            self.events.push(SessionEvent::LoadClone(m));
        }

        self.check_initial_states(host);
        HandlerStatus::Handled
    }

    fn on_voice<H: SessionHost + ?Sized>(&mut self, m: Voice, host: &mut H) -> HandlerStatus {
        if host.is_ignoring(m.player_id) {
            tracing::trace!(player_id = m.player_id, "voice from ignored player");
            return HandlerStatus::Handled;
        }
        if !self.voice.accepts_voice_from(m.player_id) {
            tracing::trace!(player_id = m.player_id, "voice from player not in forced list");
            return HandlerStatus::Handled;
        }
        let Some(member) = self.transport.member_mut(m.player_id) else {
            tracing::debug!(player_id = m.player_id, "voice from unknown member");
            return HandlerStatus::Handled;
        };
        member.transport_flags.insert(TransportFlags::SENDING_VOICE);
        let Some(avatar) = member.avatar.as_ref().and_then(|uoid| host.resolve(uoid)) else {
            tracing::debug!(player_id = m.player_id, "voice from member without a loaded avatar");
            return HandlerStatus::Handled;
        };
        host.play_voice(avatar, &m.data, m.num_frames, m.flags);
        HandlerStatus::Handled
    }

    fn on_listen_list_update(&mut self, m: ListenListUpdate) -> HandlerStatus {
        if self.transport.find_member(m.player_id).is_none() {
            tracing::debug!(player_id = m.player_id, "listen list update from unknown member");
            return HandlerStatus::Handled;
        }
        if m.adding {
            self.voice.talk_list_add(m.player_id);
        } else {
            self.voice.talk_list_remove(m.player_id);
        }
        HandlerStatus::Handled
    }

    fn on_voice_list_command(&mut self, m: VoiceListCommand) -> HandlerStatus {
        match m {
            VoiceListCommand::Forced { author, members } => {
                if let Some(change) =
                    self.voice
                        .apply_forced(author, &members, self.local_player, &self.transport)
                {
                    self.push_list_change(change);
                }
            }
            VoiceListCommand::Distance => {
                let change = self.voice.set_mode(ListenListMode::Distance);
                self.push_list_change(change);
            }
        }
        HandlerStatus::Handled
    }
}
