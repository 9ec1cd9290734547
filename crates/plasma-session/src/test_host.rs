//! In-memory host used by the unit tests.

use glam::Vec3;
use plasma_net::{Location, PlayerId, Uoid};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::linking::AgeLink;
use crate::pending::StateDelivery;
use crate::world::{
    AgeTransitions, Clock, IgnoreList, ObjectDirectory, ObjectRef, PositionService, VoicePlayback,
};

/// Class index used for avatar clones in tests.
const AVATAR_CLASS: u16 = 0x0001;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayedVoice {
    pub avatar: ObjectRef,
    pub data: Vec<u8>,
    pub num_frames: u8,
    pub flags: u8,
}

#[derive(Debug, Default)]
pub struct MockHost {
    names: FxHashMap<Uoid, ObjectRef>,
    finals: FxHashSet<ObjectRef>,
    positions: FxHashMap<ObjectRef, Vec3>,
    ignored: FxHashSet<PlayerId>,
    local_avatar: Option<ObjectRef>,
    next_ref: u64,
    pub now: f64,
    pub sys_now: f64,
    pub delivered: Vec<(ObjectRef, StateDelivery)>,
    pub played: Vec<PlayedVoice>,
    pub joins: Vec<AgeLink>,
    pub leaves: Vec<bool>,
}

impl MockHost {
    /// Avatar clone identity for `player`.
    pub fn avatar_uoid(player: PlayerId) -> Uoid {
        Uoid::new(Location::new(0), AVATAR_CLASS, "Male").cloned_for(player, player)
    }

    pub fn add_object(&mut self, uoid: Uoid, is_final: bool) -> ObjectRef {
        self.next_ref += 1;
        let obj = ObjectRef(self.next_ref);
        self.names.insert(uoid, obj);
        if is_final {
            self.finals.insert(obj);
        }
        obj
    }

    pub fn make_final(&mut self, obj: ObjectRef) {
        self.finals.insert(obj);
    }

    /// Unregister the name; the object itself stays alive.
    pub fn forget_name(&mut self, uoid: &Uoid) {
        self.names.remove(uoid);
    }

    pub fn move_to(&mut self, uoid: &Uoid, pos: Vec3) {
        if let Some(&obj) = self.names.get(uoid) {
            self.positions.insert(obj, pos);
        }
    }

    pub fn spawn_local_avatar(&mut self, pos: Vec3) -> ObjectRef {
        let obj = self.add_object(Uoid::new(Location::new(0), AVATAR_CLASS, "LocalAvatar"), true);
        self.positions.insert(obj, pos);
        self.local_avatar = Some(obj);
        obj
    }

    pub fn ignore(&mut self, player: PlayerId) {
        self.ignored.insert(player);
    }

    pub fn advance(&mut self, secs: f64) {
        self.now += secs;
        self.sys_now += secs;
    }
}

impl ObjectDirectory for MockHost {
    fn resolve(&self, uoid: &Uoid) -> Option<ObjectRef> {
        self.names.get(uoid).copied()
    }

    fn is_final(&self, obj: ObjectRef) -> bool {
        self.finals.contains(&obj)
    }

    fn deliver_state(&mut self, obj: ObjectRef, delivery: StateDelivery) {
        self.delivered.push((obj, delivery));
    }
}

impl PositionService for MockHost {
    fn local_avatar(&self) -> Option<ObjectRef> {
        self.local_avatar
    }

    fn world_position(&self, avatar: ObjectRef) -> Option<Vec3> {
        self.positions.get(&avatar).copied()
    }
}

impl IgnoreList for MockHost {
    fn is_ignoring(&self, player: PlayerId) -> bool {
        self.ignored.contains(&player)
    }
}

impl VoicePlayback for MockHost {
    fn play_voice(&mut self, avatar: ObjectRef, data: &[u8], num_frames: u8, flags: u8) {
        self.played.push(PlayedVoice {
            avatar,
            data: data.to_vec(),
            num_frames,
            flags,
        });
    }
}

impl AgeTransitions for MockHost {
    fn begin_join(&mut self, link: &AgeLink) {
        self.joins.push(link.clone());
    }

    fn begin_leave(&mut self, quitting: bool) {
        self.leaves.push(quitting);
    }
}

impl Clock for MockHost {
    fn now(&self) -> f64 {
        self.now
    }

    fn sys_now(&self) -> f64 {
        self.sys_now
    }
}
