//! Queue snapshot diffing shared by the reconciler and the poll source.

use keeper_proto::protocol::{PlayerStatus, Track};
use std::collections::HashSet;

/// An entry that appears in only one of the two snapshots, with its index in
/// the snapshot it appears in.
#[derive(Debug, Clone, PartialEq)]
pub struct Positioned {
    pub index: usize,
    pub track: Track,
}

/// Uri-set difference between the shadow queue and a reported one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueDiff {
    pub added: Vec<Positioned>,
    pub removed: Vec<Positioned>,
}

impl QueueDiff {
    pub fn between(old: &[Track], new: &[Track]) -> Self {
        let old_uris: HashSet<&str> = old.iter().map(|t| t.uri.as_str()).collect();
        let new_uris: HashSet<&str> = new.iter().map(|t| t.uri.as_str()).collect();

        let added = new
            .iter()
            .enumerate()
            .filter(|(_, t)| !old_uris.contains(t.uri.as_str()))
            .map(|(index, t)| Positioned {
                index,
                track: t.clone(),
            })
            .collect();
        let removed = old
            .iter()
            .enumerate()
            .filter(|(_, t)| !new_uris.contains(t.uri.as_str()))
            .map(|(index, t)| Positioned {
                index,
                track: t.clone(),
            })
            .collect();

        Self { added, removed }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// True when both queues list the same uris in the same order.
pub fn same_order(a: &[Track], b: &[Track]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.uri == y.uri)
}

/// A poll tick reports a status change only when the transport state or
/// the current track moved.
pub fn status_changed(previous: Option<&PlayerStatus>, current: &PlayerStatus) -> bool {
    match previous {
        Some(p) => p.state != current.state || p.uri != current.uri,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_proto::protocol::PlaybackState;

    fn tracks(uris: &[&str]) -> Vec<Track> {
        uris.iter().map(|u| Track::new(*u, u.to_uppercase(), "X")).collect()
    }

    #[test]
    fn test_diff_reports_positions() {
        let diff = QueueDiff::between(&tracks(&["a", "b", "c"]), &tracks(&["b", "c", "d"]));
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].index, 2);
        assert_eq!(diff.added[0].track.uri, "d");
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].index, 0);
        assert_eq!(diff.removed[0].track.uri, "a");
    }

    #[test]
    fn test_reorder_is_not_a_set_change() {
        let old = tracks(&["a", "b"]);
        let new = tracks(&["b", "a"]);
        assert!(QueueDiff::between(&old, &new).is_empty());
        assert!(!same_order(&old, &new));
        assert!(same_order(&old, &tracks(&["a", "b"])));
    }

    #[test]
    fn test_status_change_ignores_position() {
        let a = Track::new("a", "A", "X");
        let playing = PlayerStatus::new(PlaybackState::Play, &a);
        assert!(status_changed(None, &playing));
        assert!(!status_changed(Some(&playing), &playing.clone().with_position(3)));
        let stopped = PlayerStatus::new(PlaybackState::Stop, &a);
        assert!(status_changed(Some(&playing), &stopped));
    }
}
