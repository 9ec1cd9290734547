//! Pending state deliveries.
//!
//! State often arrives before its object exists, so each record waits in a
//! FIFO queue until the object resolves and is final. While the initial age
//! state is loading nothing is delivered at all: [`InitialStateCounter`]
//! holds the gate shut until the announced number of initial states has
//! arrived.

use std::collections::VecDeque;

use plasma_net::{PlayerId, Uoid};

use crate::sdl::{ApplyFlags, SdlError, StateHeader, read_header};
use crate::world::{ObjectDirectory, ObjectRef};

/// A record handed to its destination object.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDelivery {
    /// Object identity the record was addressed to.
    pub target: Uoid,
    /// Descriptor name and version.
    pub header: StateHeader,
    /// Encoded [`crate::sdl::StateRecord`].
    pub payload: Vec<u8>,
    /// Player that produced the state.
    pub player_id: Option<PlayerId>,
    /// How to apply the record.
    pub flags: ApplyFlags,
}

/// A queued record.
#[derive(Debug, Clone)]
pub struct PendingLoad {
    /// Destination identity.
    pub target: Uoid,
    /// Parsed descriptor header.
    pub header: StateHeader,
    /// Encoded record.
    pub payload: Vec<u8>,
    /// Originating player.
    pub player_id: Option<PlayerId>,
    /// How to apply the record.
    pub flags: ApplyFlags,
    /// Destination, once resolved.
    pub resolved: Option<ObjectRef>,
}

/// Outcome of one [`PendingLoads::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Records handed to their objects.
    pub delivered: usize,
    /// Records dropped as stale.
    pub dropped: usize,
    /// Records still waiting.
    pub remaining: usize,
}

/// FIFO queue of records waiting for their objects.
#[derive(Debug, Default)]
pub struct PendingLoads {
    queue: VecDeque<PendingLoad>,
}

impl PendingLoads {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `payload` for `target`. Only the header is parsed here.
    pub fn enqueue(
        &mut self,
        payload: Vec<u8>,
        target: Uoid,
        player_id: Option<PlayerId>,
        flags: ApplyFlags,
    ) -> Result<&PendingLoad, SdlError> {
        let header = read_header(&payload)?;
        tracing::trace!(%target, descriptor = %header.descriptor, "queued pending load");
        self.queue.push_back(PendingLoad {
            target,
            header,
            payload,
            player_id,
            flags,
            resolved: None,
        });
        Ok(&self.queue[self.queue.len() - 1])
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued records in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingLoad> {
        self.queue.iter()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Deliver every record whose object is resolvable and final, in order.
    ///
    /// In steady-state play an unresolvable target is stale and its record is
    /// dropped. Before that, it stays queued.
    pub fn drain<H: ObjectDirectory + ?Sized>(
        &mut self,
        host: &mut H,
        steady_state: bool,
    ) -> DrainReport {
        let mut report = DrainReport::default();
        self.queue.retain_mut(|load| {
            let obj = match load.resolved {
                Some(obj) => obj,
                None => match host.resolve(&load.target) {
                    Some(obj) => *load.resolved.insert(obj),
                    None if steady_state => {
                        tracing::warn!(
                            target = %load.target,
                            descriptor = %load.header.descriptor,
                            "dropping state for object that no longer exists"
                        );
                        report.dropped += 1;
                        return false;
                    }
                    None => return true,
                },
            };
            if !host.is_final(obj) {
                return true;
            }
            host.deliver_state(
                obj,
                StateDelivery {
                    target: load.target.clone(),
                    header: load.header.clone(),
                    payload: std::mem::take(&mut load.payload),
                    player_id: load.player_id,
                    flags: load.flags,
                },
            );
            report.delivered += 1;
            false
        });
        report.remaining = self.queue.len();
        if report.delivered > 0 || report.dropped > 0 {
            tracing::debug!(?report, "pending loads drained");
        }
        report
    }
}

/// Tracks the initial age state burst.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitialStateCounter {
    required: Option<u32>,
    received: u32,
}

impl InitialStateCounter {
    /// Forget any previous age's counts.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record the announced total.
    pub fn set_required(&mut self, count: u32) {
        self.required = Some(count);
    }

    /// Count one initial state.
    pub fn record_received(&mut self) {
        self.received = self.received.saturating_add(1);
    }

    /// Announced total, if known.
    pub fn required(&self) -> Option<u32> {
        self.required
    }

    /// Initial states received so far.
    pub fn received(&self) -> u32 {
        self.received
    }

    /// The total is known and has been reached.
    pub fn is_complete(&self) -> bool {
        self.required.is_some_and(|required| self.received >= required)
    }
}
