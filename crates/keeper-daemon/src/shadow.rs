use keeper_proto::protocol::{PlaybackState, PlayerStatus, Snapshot, Track};
use std::collections::HashSet;
use tracing::warn;

/// Local model of the player: last status, queue and play history.
///
/// Only the reconciler mutates it.  The queue never holds two entries with
/// the same uri and the history only grows.
#[derive(Debug, Default)]
pub struct ShadowState {
    status: PlayerStatus,
    queue: Vec<Track>,
    history: Vec<Track>,
}

impl ShadowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self) -> &[Track] {
        &self.queue
    }

    pub fn history(&self) -> &[Track] {
        &self.history
    }

    pub fn last_played(&self) -> Option<&Track> {
        self.history.last()
    }

    /// The `n`-th most recent history entry; 0 is the last one.
    pub fn played_ago(&self, n: usize) -> Option<&Track> {
        self.history.iter().rev().nth(n)
    }

    pub fn is_stopped(&self) -> bool {
        self.status.state == PlaybackState::Stop
    }

    pub fn record_status(&mut self, status: &PlayerStatus) {
        self.status = status.clone();
    }

    /// Appends the reported track unless it is already the last entry.
    pub fn push_history(&mut self, status: &PlayerStatus) -> bool {
        if self.last_played().map(|t| t.uri.as_str()) == Some(status.uri.as_str()) {
            return false;
        }
        self.history.push(status.track());
        true
    }

    /// Adopts a reported queue, keeping the first occurrence of a repeated uri.
    pub fn replace_queue(&mut self, tracks: &[Track]) {
        self.queue = unique_by_uri(tracks);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status.clone(),
            queue: self.queue.clone(),
            history: self.history.clone(),
        }
    }
}

pub fn unique_by_uri(tracks: &[Track]) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .iter()
        .filter(|t| {
            let fresh = seen.insert(t.uri.as_str());
            if !fresh {
                warn!("duplicate uri {} in reported queue dropped", t.uri);
            }
            fresh
        })
        .cloned()
        .collect()
}
