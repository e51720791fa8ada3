//! Suppression of the player's echoes of our own mutations.
//!
//! Every outbound mutation sequence runs inside a session.  A session knows
//! which notifications the mutation is going to provoke, so an inbound event
//! is only discarded when it arrived while a *correlated* session was open
//! (or shortly after it closed, for late echoes).  Unrelated events that
//! happen to arrive during the same window are admitted.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use keeper_proto::protocol::PlaybackState;

use crate::events::{ChangeEvent, Envelope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The remote mutation a session wraps.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// `ClearQueue` then `AddToQueue(remaining)`.
    Removal {
        removed: String,
        remaining: Vec<String>,
    },
    /// `ReplaceAndPlay(uri)`.
    Replace { uri: String },
}

impl Mutation {
    /// Whether `event` is one the player emits in reaction to this mutation.
    /// A `stop` for a track seen playing since the mutation started is the
    /// end of real playback, never an echo.
    fn provokes(&self, event: &ChangeEvent, played: &HashSet<String>) -> bool {
        match (self, event) {
            (Mutation::Removal { remaining, .. }, ChangeEvent::QueueChanged(queue)) => {
                queue.is_empty()
                    || (queue.len() == remaining.len()
                        && queue.iter().zip(remaining).all(|(t, uri)| &t.uri == uri))
            }
            (Mutation::Removal { removed, remaining }, ChangeEvent::StatusChanged(status)) => {
                status.state == PlaybackState::Stop
                    && !played.contains(&status.uri)
                    && (&status.uri == removed || remaining.contains(&status.uri))
            }
            (Mutation::Replace { .. }, ChangeEvent::StatusChanged(status)) => {
                status.state == PlaybackState::Stop && !played.contains(&status.uri)
            }
            // the replaced queue is reported like any other queue change
            (Mutation::Replace { .. }, ChangeEvent::QueueChanged(_)) => false,
        }
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mutation::Removal { removed, remaining } => {
                write!(f, "removal of {} ({} left)", removed, remaining.len())
            }
            Mutation::Replace { uri } => write!(f, "replace with {}", uri),
        }
    }
}

#[derive(Debug)]
struct Session {
    id: SessionId,
    mutation: Mutation,
    opened_at: Instant,
    closed_at: Option<Instant>,
    /// Uris reported playing since the session opened.
    played: HashSet<String>,
}

impl Session {
    fn covers(&self, at: Instant, linger: Duration) -> bool {
        at >= self.opened_at && self.closed_at.map_or(true, |closed| at <= closed + linger)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Suppressed(SessionId),
}

#[derive(Debug)]
pub struct FeedbackGuard {
    next_id: u64,
    linger: Duration,
    sessions: VecDeque<Session>,
}

impl FeedbackGuard {
    pub fn new(linger: Duration) -> Self {
        Self {
            next_id: 1,
            linger,
            sessions: VecDeque::new(),
        }
    }

    pub fn arm(&mut self, mutation: Mutation) -> SessionId {
        self.arm_at(mutation, Instant::now())
    }

    pub fn arm_at(&mut self, mutation: Mutation, now: Instant) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions.push_back(Session {
            id,
            mutation,
            opened_at: now,
            closed_at: None,
            played: HashSet::new(),
        });
        id
    }

    /// Closes a session.  Must be called whether or not the mutation
    /// succeeded.
    pub fn disarm(&mut self, id: SessionId) {
        self.disarm_at(id, Instant::now());
    }

    pub fn disarm_at(&mut self, id: SessionId, now: Instant) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
            session.closed_at.get_or_insert(now);
        }
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.sessions.iter().any(|s| s.closed_at.is_none())
    }

    /// Records that the player started `uri`, so its eventual `stop` is
    /// treated as real playback ending.
    pub fn note_playing(&mut self, uri: &str) {
        for session in self.sessions.iter_mut() {
            session.played.insert(uri.to_string());
        }
    }

    pub fn admit(&mut self, envelope: &Envelope) -> Admission {
        self.prune(Instant::now());
        let linger = self.linger;
        self.sessions
            .iter()
            .find(|s| {
                s.covers(envelope.received_at, linger)
                    && s.mutation.provokes(&envelope.event, &s.played)
            })
            .map_or(Admission::Admitted, |s| Admission::Suppressed(s.id))
    }

    fn prune(&mut self, now: Instant) {
        let linger = self.linger;
        self.sessions
            .retain(|s| s.closed_at.map_or(true, |closed| now <= closed + linger));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_proto::protocol::{PlayerStatus, Track};

    fn queue(uris: &[&str]) -> ChangeEvent {
        ChangeEvent::QueueChanged(uris.iter().map(|u| Track::new(*u, "", "")).collect())
    }

    fn status(state: PlaybackState, uri: &str) -> ChangeEvent {
        ChangeEvent::StatusChanged(PlayerStatus::new(state, &Track::new(uri, "", "")))
    }

    fn removal(removed: &str, remaining: &[&str]) -> Mutation {
        Mutation::Removal {
            removed: removed.to_string(),
            remaining: remaining.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[test]
    fn test_removal_echoes_are_suppressed_while_armed() {
        let mut guard = FeedbackGuard::new(Duration::from_millis(500));
        let t0 = Instant::now();
        let id = guard.arm_at(removal("a", &["b", "c"]), t0);
        assert!(guard.is_armed());

        let during = t0 + Duration::from_millis(5);
        for event in [
            queue(&[]),
            queue(&["b", "c"]),
            status(PlaybackState::Stop, "a"),
            status(PlaybackState::Stop, "b"),
        ] {
            assert_eq!(guard.admit(&Envelope::at(event, during)), Admission::Suppressed(id));
        }
    }

    #[test]
    fn test_unrelated_events_pass_while_armed() {
        let mut guard = FeedbackGuard::new(Duration::from_millis(500));
        let t0 = Instant::now();
        guard.arm_at(removal("a", &["b", "c"]), t0);

        let during = t0 + Duration::from_millis(5);
        for event in [
            queue(&["b", "c", "z"]),
            status(PlaybackState::Play, "b"),
            status(PlaybackState::Stop, "z"),
        ] {
            assert_eq!(guard.admit(&Envelope::at(event, during)), Admission::Admitted);
        }
    }

    #[test]
    fn test_replace_suppresses_stops_but_not_queue() {
        let mut guard = FeedbackGuard::new(Duration::from_millis(500));
        let t0 = Instant::now();
        let id = guard.arm_at(Mutation::Replace { uri: "x".to_string() }, t0);
        let during = t0 + Duration::from_millis(1);

        assert_eq!(
            guard.admit(&Envelope::at(status(PlaybackState::Stop, "old"), during)),
            Admission::Suppressed(id)
        );
        assert_eq!(guard.admit(&Envelope::at(queue(&["x"]), during)), Admission::Admitted);
        assert_eq!(
            guard.admit(&Envelope::at(status(PlaybackState::Play, "x"), during)),
            Admission::Admitted
        );
    }

    #[test]
    fn test_events_before_arming_are_admitted() {
        let mut guard = FeedbackGuard::new(Duration::from_millis(500));
        let t0 = Instant::now();
        let early = Envelope::at(queue(&[]), t0);
        guard.arm_at(removal("a", &[]), t0 + Duration::from_millis(10));
        assert_eq!(guard.admit(&early), Admission::Admitted);
    }

    #[test]
    fn test_late_echo_within_linger_is_suppressed() {
        let mut guard = FeedbackGuard::new(Duration::from_secs(60));
        let t0 = Instant::now();
        let id = guard.arm_at(removal("a", &["b"]), t0);
        guard.disarm_at(id, t0 + Duration::from_millis(20));
        assert!(!guard.is_armed());

        let late = Envelope::at(queue(&["b"]), t0 + Duration::from_millis(200));
        assert_eq!(guard.admit(&late), Admission::Suppressed(id));

        let much_later = Envelope::at(queue(&["b"]), t0 + Duration::from_secs(120));
        assert_eq!(guard.admit(&much_later), Admission::Admitted);
    }

    #[test]
    fn test_stop_after_playing_is_not_an_echo() {
        let mut guard = FeedbackGuard::new(Duration::from_secs(60));
        let t0 = Instant::now();
        let id = guard.arm_at(removal("a", &["b", "c"]), t0);
        guard.disarm_at(id, t0 + Duration::from_millis(5));

        let after = t0 + Duration::from_millis(50);
        assert_eq!(
            guard.admit(&Envelope::at(status(PlaybackState::Stop, "b"), after)),
            Admission::Suppressed(id)
        );

        guard.note_playing("b");
        assert_eq!(
            guard.admit(&Envelope::at(status(PlaybackState::Stop, "b"), after)),
            Admission::Admitted
        );
        assert_eq!(
            guard.admit(&Envelope::at(status(PlaybackState::Stop, "c"), after)),
            Admission::Suppressed(id)
        );
    }

    #[test]
    fn test_mutation_display() {
        assert_eq!(removal("a", &["b"]).to_string(), "removal of a (1 left)");
        assert_eq!(
            Mutation::Replace { uri: "x".to_string() }.to_string(),
            "replace with x"
        );
    }

    #[test]
    fn test_expired_sessions_are_pruned() {
        let mut guard = FeedbackGuard::new(Duration::ZERO);
        let t0 = Instant::now();
        let id = guard.arm_at(removal("a", &[]), t0);
        guard.disarm_at(id, t0);
        std::thread::sleep(Duration::from_millis(2));
        guard.admit(&Envelope::now(queue(&["q"])));
        assert!(guard.sessions.is_empty());
    }
}
