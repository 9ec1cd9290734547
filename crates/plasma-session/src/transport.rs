//! Member registry: who currently shares the age with us.
//!
//! Members live in a `Vec` with an id index beside it, so lookups by player
//! id are O(1) and iteration order is the order members were announced.
//! Only dispatch handlers add or remove members. The voice engine writes the
//! cached distance and nothing else.

use bitflags::bitflags;
use plasma_net::{MemberInfo, PlayerId, Uoid};
use rustc_hash::FxHashMap;

bitflags! {
    /// Properties announced by the server.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemberFlags: u8 {
        /// The member is a server process.
        const SERVER = 1 << 0;
        /// The member is reachable peer-to-peer.
        const PEER_TO_PEER = 1 << 1;
    }
}

bitflags! {
    /// Activity observed locally.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransportFlags: u8 {
        /// Voice frames have arrived from this member.
        const SENDING_VOICE = 1 << 0;
        /// Game messages have arrived from this member.
        const SENDING_ACTIONS = 1 << 1;
    }
}

/// Logical channel an outgoing message is sent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetChannel {
    /// Ordinary game traffic.
    Default,
    /// Voice frames.
    Voice,
    /// Listen-list updates.
    ListenList,
}

/// One remote participant.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// Stable player identifier.
    pub player_id: PlayerId,
    /// Display name.
    pub player_name: String,
    /// Transient network address.
    pub address: Option<String>,
    /// Transient network port.
    pub port: u16,
    /// Staff level.
    pub ccr_level: u8,
    /// Avatar clone, once it has been loaded.
    pub avatar: Option<Uoid>,
    /// Squared distance to the local avatar, as of the last voice pass.
    pub distance_sq: f32,
    /// Server-announced flags.
    pub flags: MemberFlags,
    /// Locally observed activity.
    pub transport_flags: TransportFlags,
    /// Channel groups this member is subscribed to.
    pub subscriptions: Vec<NetChannel>,
}

impl Member {
    fn from_info(info: &MemberInfo) -> Self {
        let mut member = Self {
            player_id: info.player_id,
            player_name: String::new(),
            address: None,
            port: 0,
            ccr_level: 0,
            avatar: None,
            distance_sq: f32::MAX,
            flags: MemberFlags::empty(),
            transport_flags: TransportFlags::empty(),
            subscriptions: Vec::new(),
        };
        member.update_from(info);
        member
    }

    fn update_from(&mut self, info: &MemberInfo) {
        self.player_name.clone_from(&info.player_name);
        self.address.clone_from(&info.address);
        self.port = info.port;
        self.ccr_level = info.ccr_level;
        if info.avatar.is_some() {
            self.avatar.clone_from(&info.avatar);
        }
        self.flags.set(MemberFlags::SERVER, info.is_server);
        self.flags.set(MemberFlags::PEER_TO_PEER, info.peer_to_peer);
    }

    /// Whether the member is a server process.
    pub fn is_server(&self) -> bool {
        self.flags.contains(MemberFlags::SERVER)
    }

    /// Whether the member is reachable peer-to-peer.
    pub fn is_peer_to_peer(&self) -> bool {
        self.flags.contains(MemberFlags::PEER_TO_PEER)
    }

    /// Whether the member holds a staff role.
    pub fn is_ccr(&self) -> bool {
        self.ccr_level > 0
    }
}

/// The roster of remote members.
#[derive(Debug, Default)]
pub struct Transport {
    members: Vec<Member>,
    index: FxHashMap<PlayerId, usize>,
    roster_changed: bool,
}

impl Transport {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `info`, or update the existing entry with the same player id.
    ///
    /// Returns the member's index either way.
    pub fn add_member(&mut self, info: &MemberInfo) -> usize {
        self.roster_changed = true;
        if let Some(&idx) = self.index.get(&info.player_id) {
            tracing::debug!(player_id = info.player_id, "updating member");
            self.members[idx].update_from(info);
            return idx;
        }
        tracing::debug!(
            player_id = info.player_id,
            name = %info.player_name,
            "adding member"
        );
        let idx = self.members.len();
        self.members.push(Member::from_info(info));
        self.index.insert(info.player_id, idx);
        idx
    }

    /// Remove the member with `player_id`. Logs and does nothing if absent.
    pub fn remove_member(&mut self, player_id: PlayerId) -> Option<Member> {
        let Some(idx) = self.index.remove(&player_id) else {
            tracing::warn!(player_id, "can't remove member, not in roster");
            return None;
        };
        let member = self.members.remove(idx);
        for (i, m) in self.members.iter().enumerate().skip(idx) {
            self.index.insert(m.player_id, i);
        }
        self.roster_changed = true;
        tracing::debug!(player_id, "removed member");
        Some(member)
    }

    /// Remove every member that is not a server. Returns the removed members.
    pub fn remove_non_server_members(&mut self) -> Vec<Member> {
        let (servers, players): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.members).into_iter().partition(Member::is_server);
        self.members = servers;
        self.reindex();
        if !players.is_empty() {
            self.roster_changed = true;
        }
        players
    }

    /// Remove everyone.
    pub fn clear(&mut self) -> Vec<Member> {
        self.index.clear();
        if !self.members.is_empty() {
            self.roster_changed = true;
        }
        std::mem::take(&mut self.members)
    }

    /// Index of the member with `player_id`.
    pub fn find_member(&self, player_id: PlayerId) -> Option<usize> {
        self.index.get(&player_id).copied()
    }

    /// The member with `player_id`.
    pub fn member(&self, player_id: PlayerId) -> Option<&Member> {
        self.find_member(player_id).map(|idx| &self.members[idx])
    }

    /// Mutable access to the member with `player_id`.
    pub fn member_mut(&mut self, player_id: PlayerId) -> Option<&mut Member> {
        self.find_member(player_id)
            .map(move |idx| &mut self.members[idx])
    }

    /// Case-insensitive lookup by display name.
    pub fn find_member_by_name(&self, name: &str) -> Option<&Member> {
        self.members
            .iter()
            .find(|m| m.player_name.eq_ignore_ascii_case(name))
    }

    /// Member at `idx`.
    pub fn member_at(&self, idx: usize) -> Option<&Member> {
        self.members.get(idx)
    }

    /// All members in announcement order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub(crate) fn members_mut(&mut self) -> &mut [Member] {
        &mut self.members
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members ordered by cached distance, nearest first. Ties keep roster order.
    pub fn members_dist_sorted(&self) -> Vec<&Member> {
        let mut sorted: Vec<&Member> = self.members.iter().collect();
        sorted.sort_by(|a, b| a.distance_sq.total_cmp(&b.distance_sq));
        sorted
    }

    /// Report and reset whether the roster changed since the last call.
    pub fn take_roster_changed(&mut self) -> bool {
        std::mem::take(&mut self.roster_changed)
    }

    /// Subscribe `player_id` to `channel`.
    pub fn subscribe(&mut self, player_id: PlayerId, channel: NetChannel) -> bool {
        match self.member_mut(player_id) {
            Some(m) => {
                if !m.subscriptions.contains(&channel) {
                    m.subscriptions.push(channel);
                }
                true
            }
            None => false,
        }
    }

    /// Remove every member from `channel`.
    pub fn clear_channel(&mut self, channel: NetChannel) {
        for m in &mut self.members {
            m.subscriptions.retain(|c| *c != channel);
        }
    }

    /// Player ids subscribed to `channel`.
    pub fn subscribers(&self, channel: NetChannel) -> Vec<PlayerId> {
        self.members
            .iter()
            .filter(|m| m.subscriptions.contains(&channel))
            .map(|m| m.player_id)
            .collect()
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, m) in self.members.iter().enumerate() {
            self.index.insert(m.player_id, i);
        }
    }
}
