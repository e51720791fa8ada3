use keeper_proto::protocol::{Notification, PlayerStatus, Track};
use std::time::Instant;

/// Normalized change reported by either event source.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    StatusChanged(PlayerStatus),
    QueueChanged(Vec<Track>),
}

impl ChangeEvent {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeEvent::StatusChanged(_) => "status",
            ChangeEvent::QueueChanged(_) => "queue",
        }
    }
}

impl From<Notification> for ChangeEvent {
    fn from(n: Notification) -> Self {
        match n {
            Notification::State(status) => ChangeEvent::StatusChanged(status),
            Notification::Queue(queue) => ChangeEvent::QueueChanged(queue),
        }
    }
}

/// One full read of the player, as returned by `getState` + `getQueue`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub status: PlayerStatus,
    pub queue: Vec<Track>,
}

/// An event stamped with its arrival time.  The stamp is taken before the
/// event waits on the reconciler lock, so the feedback guard can tell
/// whether it arrived during one of our own mutations.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub event: ChangeEvent,
    pub received_at: Instant,
}

impl Envelope {
    pub fn now(event: ChangeEvent) -> Self {
        Self {
            event,
            received_at: Instant::now(),
        }
    }

    pub fn at(event: ChangeEvent, received_at: Instant) -> Self {
        Self { event, received_at }
    }
}
