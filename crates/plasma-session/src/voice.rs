//! Proximity voice routing.
//!
//! The listen list holds the members whose voice we play back; the talk list
//! holds the members we send our voice to. In distance mode the engine picks
//! the nearest members at a fixed interval. In forced mode the server names
//! them explicitly.
//!
//! Every eligible member is measured on each pass. The peer-to-peer
//! restriction only limits who may become a candidate, so cached distances
//! stay current for UI consumers regardless of that setting.

use plasma_config::VoiceConfig;
use plasma_net::PlayerId;

use crate::transport::Transport;
use crate::world::{IgnoreList, ObjectDirectory, PositionService};

/// How the listen list is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenListMode {
    /// Nearest members within range.
    Distance,
    /// Members named by a server command.
    Forced,
}

/// Tunables for [`VoiceEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    /// Master switch.
    pub enabled: bool,
    /// Maximum listen-list size, `None` for unbounded.
    pub max_list_size: Option<usize>,
    /// Squared distance beyond which members are not heard.
    pub max_listen_distance_sq: f32,
    /// Seconds between distance passes.
    pub update_interval: f64,
    /// Keep the talk list equal to the listen list.
    pub same_talk_and_listen: bool,
    /// Only peer-to-peer members are candidates.
    pub peer_to_peer_only: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self::from(&VoiceConfig::default())
    }
}

impl From<&VoiceConfig> for VoiceSettings {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_list_size: list_size_limit(config.max_list_size),
            max_listen_distance_sq: config.max_listen_distance_sq(),
            update_interval: config.update_interval_secs,
            same_talk_and_listen: config.same_talk_and_listen,
            peer_to_peer_only: config.peer_to_peer_only,
        }
    }
}

/// Convert the configured size, where any negative value means unbounded.
pub fn list_size_limit(max: i32) -> Option<usize> {
    usize::try_from(max).ok()
}

/// An ordered list of player ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerList {
    ids: Vec<PlayerId>,
}

impl PlayerList {
    /// Whether `id` is in the list.
    pub fn contains(&self, id: PlayerId) -> bool {
        self.ids.contains(&id)
    }

    /// Ids in list order.
    pub fn ids(&self) -> &[PlayerId] {
        &self.ids
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Same members, in any order.
    pub fn same_members(&self, other: &[PlayerId]) -> bool {
        self.ids.len() == other.len() && other.iter().all(|id| self.ids.contains(id))
    }

    fn add(&mut self, id: PlayerId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    fn remove(&mut self, id: PlayerId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|&x| x != id);
        self.ids.len() != before
    }

    fn clear(&mut self) {
        self.ids.clear();
    }
}

/// Result of a listen-list replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListChange {
    /// Members we stopped listening to, notified before `started`.
    pub stopped: Vec<PlayerId>,
    /// Members we started listening to.
    pub started: Vec<PlayerId>,
}

/// Listen/talk list state machine.
#[derive(Debug)]
pub struct VoiceEngine {
    settings: VoiceSettings,
    mode: ListenListMode,
    listen: PlayerList,
    talk: PlayerList,
    /// `None` means a pass is due on the next tick.
    next_update: Option<f64>,
    force_resync: bool,
}

impl VoiceEngine {
    /// Create an engine in distance mode with empty lists.
    pub fn new(settings: VoiceSettings) -> Self {
        Self {
            settings,
            mode: ListenListMode::Distance,
            listen: PlayerList::default(),
            talk: PlayerList::default(),
            next_update: None,
            force_resync: false,
        }
    }

    /// Current settings.
    pub fn settings(&self) -> &VoiceSettings {
        &self.settings
    }

    /// Current mode.
    pub fn mode(&self) -> ListenListMode {
        self.mode
    }

    /// Members we listen to.
    pub fn listen_list(&self) -> &PlayerList {
        &self.listen
    }

    /// Members we talk to.
    pub fn talk_list(&self) -> &PlayerList {
        &self.talk
    }

    /// Switch modes. Clears both lists and makes the next tick recompute.
    ///
    /// Returns the members that were dropped from the listen list.
    pub fn set_mode(&mut self, mode: ListenListMode) -> ListChange {
        if mode != self.mode {
            tracing::info!(?mode, "listen list mode changed");
        }
        self.mode = mode;
        self.next_update = None;
        self.talk.clear();
        ListChange {
            stopped: std::mem::take(&mut self.listen.ids),
            started: Vec::new(),
        }
    }

    /// Force the next pass to replace the lists even if membership is unchanged.
    pub fn request_resync(&mut self) {
        self.force_resync = true;
    }

    /// Change the listening radius. Takes effect on the next pass.
    pub fn set_max_listen_distance(&mut self, distance: f32) {
        self.settings.max_listen_distance_sq = distance * distance;
        self.request_resync();
    }

    /// Change the list size limit; any negative value means unbounded.
    pub fn set_max_list_size(&mut self, max: i32) {
        self.settings.max_list_size = list_size_limit(max);
        self.request_resync();
    }

    /// Turn listen-list computation on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
    }

    /// Drop `id` from both lists, used when the member leaves the roster.
    ///
    /// Returns whether `id` was in the listen list, so the caller can report
    /// that listening stopped.
    pub fn forget(&mut self, id: PlayerId) -> bool {
        self.talk.remove(id);
        self.listen.remove(id)
    }

    /// Clear all state, keeping settings and mode.
    pub fn clear(&mut self) {
        self.listen.clear();
        self.talk.clear();
        self.next_update = None;
        self.force_resync = false;
    }

    /// A remote member started listening to us.
    pub fn talk_list_add(&mut self, id: PlayerId) -> bool {
        self.talk.add(id)
    }

    /// A remote member stopped listening to us.
    pub fn talk_list_remove(&mut self, id: PlayerId) -> bool {
        self.talk.remove(id)
    }

    /// Whether voice from `id` should be played.
    pub fn accepts_voice_from(&self, id: PlayerId) -> bool {
        match self.mode {
            ListenListMode::Distance => true,
            ListenListMode::Forced => self.listen.contains(id),
        }
    }

    /// Receivers for an outgoing voice message.
    pub fn talk_receivers(&self, local_player: PlayerId, echo: bool) -> Vec<PlayerId> {
        let mut receivers = self.talk.ids.clone();
        if echo && !receivers.contains(&local_player) {
            receivers.push(local_player);
        }
        receivers
    }

    /// Run a distance pass if one is due.
    ///
    /// Writes each measured member's cached distance into `transport`. Returns
    /// the list change when the listen list was replaced.
    pub fn tick<H>(&mut self, now: f64, transport: &mut Transport, host: &H) -> Option<ListChange>
    where
        H: PositionService + ObjectDirectory + IgnoreList + ?Sized,
    {
        if self.mode != ListenListMode::Distance || !self.settings.enabled {
            return None;
        }
        let local_pos = host
            .local_avatar()
            .and_then(|avatar| host.world_position(avatar))?;
        if self.next_update.is_some_and(|due| now < due) {
            return None;
        }
        self.next_update = Some(now + self.settings.update_interval);

        // Sorted nearest first; equal distances keep measurement order.
        let mut nearest: Vec<(f32, PlayerId)> = Vec::new();
        for member in transport.members_mut() {
            if member.is_server() || host.is_ignoring(member.player_id) {
                member.distance_sq = f32::MAX;
                continue;
            }
            let Some(pos) = member
                .avatar
                .as_ref()
                .and_then(|uoid| host.resolve(uoid))
                .and_then(|obj| host.world_position(obj))
            else {
                member.distance_sq = f32::MAX;
                continue;
            };

            let dist_sq = local_pos.distance_squared(pos);
            member.distance_sq = dist_sq;

            if self.settings.peer_to_peer_only && !member.is_peer_to_peer() {
                continue;
            }
            if dist_sq > self.settings.max_listen_distance_sq {
                continue;
            }
            let at = nearest.partition_point(|&(d, _)| d <= dist_sq);
            match self.settings.max_list_size {
                Some(limit) if nearest.len() >= limit => {
                    if at < nearest.len() {
                        nearest.insert(at, (dist_sq, member.player_id));
                        nearest.truncate(limit);
                    }
                }
                _ => nearest.insert(at, (dist_sq, member.player_id)),
            }
        }

        let candidates: Vec<PlayerId> = nearest.into_iter().map(|(_, id)| id).collect();
        if !self.force_resync && self.listen.same_members(&candidates) {
            return None;
        }
        Some(self.replace_listen_list(candidates))
    }

    /// Apply a forced listen-list command.
    ///
    /// Ignored unless `members` names `author`. Members that are not in the
    /// roster, and the local player, are left out of the list.
    ///
    /// Switching into forced mode resets the timer and talk list like
    /// [`VoiceEngine::set_mode`], but the listen list is replaced by diff so
    /// members kept across the switch get no notices.
    pub fn apply_forced(
        &mut self,
        author: PlayerId,
        members: &[PlayerId],
        local_player: PlayerId,
        transport: &Transport,
    ) -> Option<ListChange> {
        if !members.contains(&author) {
            tracing::debug!(author, "forced listen list does not name its author, ignoring");
            return None;
        }
        if self.mode != ListenListMode::Forced {
            tracing::info!(author, "listen list forced by server");
            self.mode = ListenListMode::Forced;
            self.next_update = None;
            self.talk.clear();
        }
        let mut ids = Vec::with_capacity(members.len());
        for &id in members {
            if id != local_player && transport.find_member(id).is_some() && !ids.contains(&id) {
                ids.push(id);
            }
        }
        Some(self.replace_listen_list(ids))
    }

    fn replace_listen_list(&mut self, ids: Vec<PlayerId>) -> ListChange {
        let stopped = self
            .listen
            .ids
            .iter()
            .copied()
            .filter(|id| !ids.contains(id))
            .collect();
        let started = ids
            .iter()
            .copied()
            .filter(|&id| !self.listen.contains(id))
            .collect();

        self.listen = PlayerList { ids };
        self.force_resync = false;
        if self.settings.same_talk_and_listen {
            self.talk = self.listen.clone();
        }
        tracing::debug!(listen = ?self.listen.ids, "listen list replaced");
        ListChange { stopped, started }
    }
}
