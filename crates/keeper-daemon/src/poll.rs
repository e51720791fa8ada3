//! Periodic polling of the player, for setups where it cannot reach our
//! webhook.  Each tick reads `getState` then `getQueue` and turns whatever
//! moved since the previous tick into change events, status first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::diff::{same_order, status_changed};
use crate::error::PlayerError;
use crate::events::{ChangeEvent, Envelope, Observation};
use crate::player::PlayerApi;
use crate::reconciler::SharedReconciler;
use crate::source::{deliver, ChangeEventSource};

pub struct PollSource {
    player: Arc<dyn PlayerApi>,
    interval: Duration,
    last: Option<Observation>,
}

impl PollSource {
    /// `initial` is the observation the reconciler was seeded from, so the
    /// first tick only reports what changed after seeding.
    pub fn new(
        player: Arc<dyn PlayerApi>,
        interval: Duration,
        initial: Option<Observation>,
    ) -> Self {
        Self {
            player,
            interval,
            last: initial,
        }
    }

    async fn observe(&self) -> Result<Observation, PlayerError> {
        let status = self.player.get_state().await?;
        let queue = self.player.get_queue().await?;
        Ok(Observation { status, queue })
    }

    /// Events that take the previous observation to `current`.
    pub fn changes(&mut self, current: Observation) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        let previous = self.last.as_ref();

        if status_changed(previous.map(|o| &o.status), &current.status) {
            events.push(ChangeEvent::StatusChanged(current.status.clone()));
        }
        if previous.map_or(true, |o| !same_order(&o.queue, &current.queue)) {
            events.push(ChangeEvent::QueueChanged(current.queue.clone()));
        }

        self.last = Some(current);
        events
    }

    /// One poll cycle.  A failed read skips the tick and keeps the previous
    /// observation, so the change is picked up on the next one.
    ///
    /// Once a delivered event has changed the player, the rest of the
    /// observation predates that change: it is dropped and the player is
    /// read again to become the new baseline.
    pub async fn tick(&mut self, reconciler: &SharedReconciler) -> usize {
        let observation = match self.observe().await {
            Ok(o) => o,
            Err(e) => {
                warn!("poll: cannot read player, skipping tick: {}", e);
                return 0;
            }
        };
        let received_at = Instant::now();

        let mut delivered = 0;
        for event in self.changes(observation) {
            debug!("poll: {} changed", event.label());
            delivered += 1;
            match deliver(reconciler, Envelope::at(event, received_at)).await {
                Some(outcome) if !outcome.touched_player() => {}
                _ => {
                    self.rebaseline().await;
                    break;
                }
            }
        }
        delivered
    }

    async fn rebaseline(&mut self) {
        match self.observe().await {
            Ok(o) => {
                debug!("poll: baseline after mutation: {} tracks queued", o.queue.len());
                self.last = Some(o);
            }
            Err(e) => warn!("poll: cannot re-read player after mutation: {}", e),
        }
    }
}

#[async_trait]
impl ChangeEventSource for PollSource {
    fn name(&self) -> &'static str {
        "poll"
    }

    async fn run(
        self: Box<Self>,
        reconciler: SharedReconciler,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut poll = *self;
        info!("polling player every {:?}", poll.interval);
        let mut ticker = tokio::time::interval(poll.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    poll.tick(&reconciler).await;
                }
            }
        }
        info!("poller stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picker::LibraryPicker;
    use crate::player::mock::{Call, MockPlayer};
    use crate::reconciler::{Reconciler, Settings};
    use crate::store::recording::RecordingStore;
    use keeper_proto::protocol::{PlaybackState, PlayerStatus, Track};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tracks(uris: &[&str]) -> Vec<Track> {
        uris.iter().map(|u| Track::new(*u, u.to_uppercase(), "X")).collect()
    }

    fn status(state: PlaybackState, uri: &str) -> PlayerStatus {
        PlayerStatus::new(state, &Track::new(uri, uri.to_uppercase(), "X"))
    }

    fn observation(state: PlaybackState, uri: &str, queue: &[&str]) -> Observation {
        Observation {
            status: status(state, uri),
            queue: tracks(queue),
        }
    }

    fn stopped(uri: &str) -> PlayerStatus {
        status(PlaybackState::Stop, uri).with_position(0)
    }

    /// A reconciler seeded from a player that is playing `playing`.
    async fn seeded(
        remote: &[&str],
        playing: &str,
        catalog: &[&str],
        settings: Settings,
    ) -> (Arc<MockPlayer>, SharedReconciler, Observation) {
        let player = MockPlayer::with_queue(&tracks(remote));
        player.set_status(status(PlaybackState::Play, playing));
        let picker = LibraryPicker::with_rng(tracks(catalog), StdRng::seed_from_u64(7));
        let mut reconciler = Reconciler::new(
            player.clone(),
            Box::new(RecordingStore::default()),
            picker,
            settings,
        );
        let seen = reconciler.seed().await.unwrap();
        (player, reconciler.into_shared(), seen)
    }

    fn source(initial: Option<Observation>) -> PollSource {
        PollSource::new(MockPlayer::with_queue(&[]), Duration::from_secs(1), initial)
    }

    #[test]
    fn test_first_observation_reports_everything() {
        let mut poll = source(None);
        let events = poll.changes(observation(PlaybackState::Play, "a", &["a", "b"]));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].label(), "status");
        assert_eq!(events[1].label(), "queue");
    }

    #[test]
    fn test_unchanged_observation_is_quiet() {
        let seen = observation(PlaybackState::Play, "a", &["a", "b"]);
        let mut poll = source(Some(seen.clone()));
        assert!(poll.changes(seen).is_empty());
    }

    #[test]
    fn test_position_alone_is_not_a_status_change() {
        let mut poll = source(Some(observation(PlaybackState::Play, "a", &["a"])));
        let mut moved = observation(PlaybackState::Play, "a", &["a"]);
        moved.status.position = Some(3);
        assert!(poll.changes(moved).is_empty());
    }

    #[test]
    fn test_reorder_reports_queue_only() {
        let mut poll = source(Some(observation(PlaybackState::Play, "a", &["a", "b"])));
        let events = poll.changes(observation(PlaybackState::Play, "a", &["b", "a"]));
        assert_eq!(events, vec![ChangeEvent::QueueChanged(tracks(&["b", "a"]))]);
    }

    #[test]
    fn test_stop_reported_before_queue() {
        let mut poll = source(Some(observation(PlaybackState::Play, "a", &["a", "b"])));
        let events = poll.changes(observation(PlaybackState::Stop, "a", &["b"]));
        assert_eq!(
            events,
            vec![
                ChangeEvent::StatusChanged(status(PlaybackState::Stop, "a")),
                ChangeEvent::QueueChanged(tracks(&["b"])),
            ]
        );
    }

    #[tokio::test]
    async fn test_tick_feeds_reconciler() {
        let player = MockPlayer::with_queue(&tracks(&["a", "b"]));
        player.set_status(status(PlaybackState::Play, "a"));
        let reconciler = Reconciler::new(
            player.clone(),
            Box::new(RecordingStore::default()),
            LibraryPicker::new(Vec::new()),
            Settings::default(),
        )
        .into_shared();

        let mut poll = PollSource::new(player.clone(), Duration::from_secs(1), None);
        assert_eq!(poll.tick(&reconciler).await, 2);

        {
            let reconciler = reconciler.lock().await;
            assert_eq!(reconciler.shadow().queue(), &tracks(&["a", "b"])[..]);
            assert_eq!(reconciler.shadow().last_played().map(|t| t.uri.as_str()), Some("a"));
        }

        player.set_queue(&tracks(&["a", "b", "c"]));
        assert_eq!(poll.tick(&reconciler).await, 1);
        assert_eq!(reconciler.lock().await.shadow().queue().len(), 3);
        assert!(player.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_stop_and_external_add_in_one_tick() {
        let (player, reconciler, seen) =
            seeded(&["a", "b"], "a", &["x"], Settings::default()).await;
        let mut poll = PollSource::new(player.clone(), Duration::from_secs(1), Some(seen));

        // `a` finished and `c` was queued from elsewhere before the read
        player.set_queue(&tracks(&["a", "b", "c"]));
        player.set_status(stopped("a"));
        poll.tick(&reconciler).await;

        assert_eq!(player.remote_uris(), vec!["b", "c"]);
        assert_eq!(reconciler.lock().await.shadow().queue(), &tracks(&["b", "c"])[..]);

        for uri in ["b", "c"] {
            player.set_status(status(PlaybackState::Play, uri));
            poll.tick(&reconciler).await;
            player.set_status(stopped(uri));
            poll.tick(&reconciler).await;
        }

        assert!(reconciler.lock().await.shadow().queue().is_empty());
        assert_eq!(
            player.mutating_calls().last(),
            Some(&Call::ReplaceAndPlay("x".to_string()))
        );
    }

    #[tokio::test]
    async fn test_parked_head_after_refill_is_not_removed() {
        let settings = Settings {
            echo_linger: Duration::from_millis(10),
            ..Settings::default()
        };
        let (player, reconciler, seen) = seeded(&["a", "b", "c"], "a", &[], settings).await;

        // after a refill the player sits stopped on the new head
        let weak = Arc::downgrade(&player);
        player.on_call(move |call| {
            if let (Call::AddToQueue(uris), Some(player)) = (call, weak.upgrade()) {
                if let Some(head) = uris.first() {
                    player.set_status(stopped(head));
                }
            }
        });
        let mut poll = PollSource::new(player.clone(), Duration::from_millis(30), Some(seen));

        player.set_status(stopped("a"));
        poll.tick(&reconciler).await;
        assert_eq!(player.remote_uris(), vec!["b", "c"]);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(poll.tick(&reconciler).await, 0);
        assert_eq!(player.remote_uris(), vec!["b", "c"]);
        assert_eq!(player.mutating_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_read_skips_tick() {
        let player = MockPlayer::with_queue(&tracks(&["a"]));
        *player.fail_on.lock().unwrap() = Some(Call::GetQueue);
        let reconciler = Reconciler::new(
            player.clone(),
            Box::new(RecordingStore::default()),
            LibraryPicker::new(Vec::new()),
            Settings::default(),
        )
        .into_shared();

        let mut poll = PollSource::new(player.clone(), Duration::from_secs(1), None);
        assert_eq!(poll.tick(&reconciler).await, 0);
        assert!(reconciler.lock().await.shadow().queue().is_empty());

        *player.fail_on.lock().unwrap() = None;
        assert_eq!(poll.tick(&reconciler).await, 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let player = MockPlayer::with_queue(&[]);
        let reconciler = Reconciler::new(
            player.clone(),
            Box::new(RecordingStore::default()),
            LibraryPicker::new(Vec::new()),
            Settings::default(),
        )
        .into_shared();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let poll: Box<dyn ChangeEventSource> =
            Box::new(PollSource::new(player, Duration::from_millis(10), None));
        assert_eq!(poll.name(), "poll");
        poll.run(reconciler, shutdown).await.unwrap();
    }
}
