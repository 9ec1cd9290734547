//! A host with no scene: objects are registered as clones arrive, avatars
//! stand where the server last put them, and age loads finish immediately.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use glam::Vec3;
use plasma_net::{PlayerId, Uoid};
use plasma_session::{
    AgeLink, AgeTransitions, Clock, IgnoreList, NetClientSession, ObjectDirectory, ObjectRef,
    PositionService, StateDelivery, VoicePlayback,
};
use rustc_hash::{FxHashMap, FxHashSet};

enum Transition {
    Join(AgeLink),
    Leave,
}

pub struct HeadlessHost {
    started: Instant,
    objects: FxHashMap<Uoid, ObjectRef>,
    positions: FxHashMap<ObjectRef, Vec3>,
    ignored: FxHashSet<PlayerId>,
    local_avatar: Option<ObjectRef>,
    next_ref: u64,
    transition: Option<Transition>,
    pub states_applied: usize,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            objects: FxHashMap::default(),
            positions: FxHashMap::default(),
            ignored: FxHashSet::default(),
            local_avatar: None,
            next_ref: 0,
            transition: None,
            states_applied: 0,
        }
    }

    /// Register `uoid` as a loaded, final object.
    pub fn load_object(&mut self, uoid: Uoid) -> ObjectRef {
        if let Some(&obj) = self.objects.get(&uoid) {
            return obj;
        }
        self.next_ref += 1;
        let obj = ObjectRef(self.next_ref);
        tracing::debug!(%uoid, ?obj, "object loaded");
        self.objects.insert(uoid, obj);
        self.positions.insert(obj, Vec3::ZERO);
        obj
    }

    pub fn unload_object(&mut self, uoid: &Uoid) {
        if let Some(obj) = self.objects.remove(uoid) {
            self.positions.remove(&obj);
            if self.local_avatar == Some(obj) {
                self.local_avatar = None;
            }
        }
    }

    pub fn set_local_avatar(&mut self, uoid: Uoid) {
        let obj = self.load_object(uoid);
        self.local_avatar = Some(obj);
    }

    pub fn ignore(&mut self, player: PlayerId) {
        self.ignored.insert(player);
    }

    /// Report any join or leave started since the last call as finished.
    pub fn finish_transitions(&mut self, session: &mut NetClientSession) {
        match self.transition.take() {
            Some(Transition::Join(link)) => {
                tracing::info!(age = %link.age_name, "age loaded");
                session.age_joined(Ok(()));
            }
            Some(Transition::Leave) => {
                self.objects.clear();
                self.positions.clear();
                self.local_avatar = None;
                session.age_left(Ok(()));
            }
            None => {}
        }
    }
}

impl ObjectDirectory for HeadlessHost {
    fn resolve(&self, uoid: &Uoid) -> Option<ObjectRef> {
        self.objects.get(uoid).copied()
    }

    fn is_final(&self, obj: ObjectRef) -> bool {
        self.positions.contains_key(&obj)
    }

    fn deliver_state(&mut self, obj: ObjectRef, delivery: StateDelivery) {
        tracing::trace!(?obj, descriptor = %delivery.header.descriptor, "state applied");
        self.states_applied += 1;
    }
}

impl PositionService for HeadlessHost {
    fn local_avatar(&self) -> Option<ObjectRef> {
        self.local_avatar
    }

    fn world_position(&self, avatar: ObjectRef) -> Option<Vec3> {
        self.positions.get(&avatar).copied()
    }
}

impl IgnoreList for HeadlessHost {
    fn is_ignoring(&self, player: PlayerId) -> bool {
        self.ignored.contains(&player)
    }
}

impl VoicePlayback for HeadlessHost {
    fn play_voice(&mut self, avatar: ObjectRef, data: &[u8], num_frames: u8, _flags: u8) {
        tracing::trace!(?avatar, bytes = data.len(), num_frames, "voice received");
    }
}

impl AgeTransitions for HeadlessHost {
    fn begin_join(&mut self, link: &AgeLink) {
        tracing::info!(age = %link.age_name, spawn = %link.spawn_point, "joining age");
        self.transition = Some(Transition::Join(link.clone()));
    }

    fn begin_leave(&mut self, quitting: bool) {
        tracing::info!(quitting, "leaving age");
        self.transition = Some(Transition::Leave);
    }
}

impl Clock for HeadlessHost {
    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn sys_now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }
}
