//! Age linking: an op queue that leaves and joins ages one step at a time.
//!
//! A join or leave starts an asynchronous sub-operation on the host and parks
//! a [`LinkOp::Wait`] at the front of the queue. Nothing else runs until the
//! host reports completion or the wait times out.

use std::collections::VecDeque;

use crate::error::LinkError;
use crate::world::AgeTransitions;

/// Destination of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeLink {
    /// Age file name.
    pub age_name: String,
    /// Specific instance, or `None` for the default public instance.
    pub instance: Option<String>,
    /// Spawn point to arrive at.
    pub spawn_point: String,
}

impl AgeLink {
    /// Link to the default instance of `age_name`, arriving at the default spawn point.
    pub fn new(age_name: impl Into<String>) -> Self {
        Self {
            age_name: age_name.into(),
            instance: None,
            spawn_point: "LinkInPointDefault".to_string(),
        }
    }
}

/// One queued operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOp {
    /// Does nothing.
    NoOp,
    /// Blocks the queue until the in-flight sub-operation completes.
    Wait,
    /// Join an age.
    JoinAge(AgeLink),
    /// Leave the current age.
    LeaveAge {
        /// The client is shutting down.
        quitting: bool,
    },
}

/// Linking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No transition in progress.
    Idle,
    /// A join is in flight.
    Joining,
    /// A leave is in flight.
    Leaving,
}

/// Notifications produced by the linking manager.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A join sub-operation started.
    JoinStarted(AgeLink),
    /// A leave sub-operation started.
    LeaveStarted {
        /// The client is shutting down.
        quitting: bool,
    },
    /// Joined the age.
    Joined(AgeLink),
    /// The join failed; the rest of the queue was dropped.
    JoinFailed {
        /// Age we tried to join.
        link: AgeLink,
        /// Human-readable failure message.
        reason: String,
    },
    /// Left the age.
    Left,
    /// The leave failed; we are considered out of the age anyway.
    LeaveFailed {
        /// Human-readable failure message.
        reason: String,
    },
}

#[derive(Debug, Clone)]
enum InFlight {
    Join { link: AgeLink, deadline: f64 },
    Leave { deadline: f64 },
}

impl InFlight {
    fn deadline(&self) -> f64 {
        match self {
            InFlight::Join { deadline, .. } | InFlight::Leave { deadline } => *deadline,
        }
    }
}

/// Sequences age joins and leaves.
#[derive(Debug)]
pub struct LinkingManager {
    queue: VecDeque<LinkOp>,
    state: LinkState,
    in_flight: Option<InFlight>,
    current_age: Option<AgeLink>,
    prev_age: Option<AgeLink>,
    timeout: f64,
    linking_banned: bool,
}

impl LinkingManager {
    /// Create an idle manager whose sub-operations time out after `timeout` seconds.
    pub fn new(timeout: f64) -> Self {
        Self {
            queue: VecDeque::new(),
            state: LinkState::Idle,
            in_flight: None,
            current_age: None,
            prev_age: None,
            timeout,
            linking_banned: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Age we are currently in.
    pub fn current_age(&self) -> Option<&AgeLink> {
        self.current_age.as_ref()
    }

    /// Age we were in before the current one.
    pub fn prev_age(&self) -> Option<&AgeLink> {
        self.prev_age.as_ref()
    }

    /// Queued operations, front first.
    pub fn queued(&self) -> impl Iterator<Item = &LinkOp> {
        self.queue.iter()
    }

    /// Whether a sub-operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Staff can ban a player from linking.
    pub fn set_linking_banned(&mut self, banned: bool) {
        self.linking_banned = banned;
    }

    /// Whether linking is banned.
    pub fn is_linking_banned(&self) -> bool {
        self.linking_banned
    }

    /// Append an operation.
    pub fn queue_op(&mut self, op: LinkOp) {
        tracing::debug!(?op, "queued link op");
        self.queue.push_back(op);
    }

    /// Queue a link to `link`, leaving the current age first if we will be in one.
    pub fn link_to_age(&mut self, link: AgeLink) -> Result<(), LinkError> {
        if self.linking_banned {
            return Err(LinkError::Banned);
        }
        if self.will_be_linked() {
            self.queue_op(LinkOp::LeaveAge { quitting: false });
        }
        self.queue_op(LinkOp::JoinAge(link));
        Ok(())
    }

    /// Queue a link back to the previous age.
    pub fn link_to_prev_age(&mut self) -> Result<(), LinkError> {
        let link = self.prev_age.clone().ok_or(LinkError::NoPreviousAge)?;
        self.link_to_age(link)
    }

    /// Queue a leave.
    pub fn leave_age(&mut self, quitting: bool) {
        self.queue_op(LinkOp::LeaveAge { quitting });
    }

    /// Drop every queued operation. An in-flight sub-operation keeps its wait.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
        if self.in_flight.is_some() {
            self.queue.push_back(LinkOp::Wait);
        }
    }

    /// Execute at most one queued operation.
    pub fn step<H: AgeTransitions + ?Sized>(&mut self, now: f64, host: &mut H) -> Option<LinkEvent> {
        loop {
            match self.queue.front()? {
                LinkOp::Wait if self.in_flight.is_some() => return None,
                _ => {}
            }
            let op = self.queue.pop_front()?;
            tracing::debug!(?op, "executing link op");
            match op {
                LinkOp::NoOp => return None,
                LinkOp::Wait => {
                    tracing::warn!("stray wait op with nothing in flight, skipping");
                }
                LinkOp::JoinAge(link) => {
                    self.state = LinkState::Joining;
                    host.begin_join(&link);
                    self.in_flight = Some(InFlight::Join {
                        link: link.clone(),
                        deadline: now + self.timeout,
                    });
                    self.queue.push_front(LinkOp::Wait);
                    return Some(LinkEvent::JoinStarted(link));
                }
                LinkOp::LeaveAge { quitting } => {
                    self.state = LinkState::Leaving;
                    host.begin_leave(quitting);
                    self.in_flight = Some(InFlight::Leave {
                        deadline: now + self.timeout,
                    });
                    self.queue.push_front(LinkOp::Wait);
                    return Some(LinkEvent::LeaveStarted { quitting });
                }
            }
        }
    }

    /// Fail the in-flight sub-operation if its deadline has passed.
    pub fn check_timeout(&mut self, now: f64) -> Option<LinkEvent> {
        let deadline = self.in_flight.as_ref()?.deadline();
        if now < deadline {
            return None;
        }
        tracing::warn!(state = ?self.state, "link operation timed out");
        self.complete(Err("timed out".to_string()))
    }

    /// Report the in-flight sub-operation's result.
    ///
    /// Returns `None` when nothing was in flight, for example a late callback
    /// after a timeout already failed the operation.
    pub fn complete(&mut self, result: Result<(), String>) -> Option<LinkEvent> {
        let Some(in_flight) = self.in_flight.take() else {
            tracing::warn!("link completion with nothing in flight, ignoring");
            return None;
        };
        if self.queue.front() == Some(&LinkOp::Wait) {
            self.queue.pop_front();
        }
        self.state = LinkState::Idle;

        let event = match (in_flight, result) {
            (InFlight::Join { link, .. }, Ok(())) => {
                tracing::info!(age = %link.age_name, "joined age");
                self.current_age = Some(link.clone());
                LinkEvent::Joined(link)
            }
            (InFlight::Join { link, .. }, Err(reason)) => {
                tracing::warn!(age = %link.age_name, %reason, "join failed, dropping queued link ops");
                self.queue.clear();
                LinkEvent::JoinFailed { link, reason }
            }
            (InFlight::Leave { .. }, Ok(())) => {
                self.leave_current_age();
                LinkEvent::Left
            }
            (InFlight::Leave { .. }, Err(reason)) => {
                tracing::warn!(%reason, "leave failed, continuing as if out of the age");
                self.leave_current_age();
                LinkEvent::LeaveFailed { reason }
            }
        };
        Some(event)
    }

    fn leave_current_age(&mut self) {
        if let Some(age) = self.current_age.take() {
            self.prev_age = Some(age);
        }
    }

    /// Whether we will be in an age once everything queued so far has run.
    fn will_be_linked(&self) -> bool {
        let mut linked = match &self.in_flight {
            Some(InFlight::Join { .. }) => true,
            Some(InFlight::Leave { .. }) => false,
            None => self.current_age.is_some(),
        };
        for op in &self.queue {
            match op {
                LinkOp::JoinAge(_) => linked = true,
                LinkOp::LeaveAge { .. } => linked = false,
                LinkOp::NoOp | LinkOp::Wait => {}
            }
        }
        linked
    }
}
