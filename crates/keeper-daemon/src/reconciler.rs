//! Reconciliation of reported player state against the shadow model.
//!
//! One `Reconciler` owns the shadow state, the feedback guard and the
//! fallback catalog.  Sources share it as `SharedReconciler`; the mutex is
//! the single serialization point, held for the whole of an event including
//! the outbound player calls it makes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use keeper_proto::protocol::{PlaybackState, PlayerStatus, Track};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::diff::{same_order, QueueDiff};
use crate::error::PlayerError;
use crate::events::{ChangeEvent, Envelope, Observation};
use crate::guard::{Admission, FeedbackGuard, Mutation, SessionId};
use crate::picker::LibraryPicker;
use crate::player::PlayerApi;
use crate::shadow::{unique_by_uri, ShadowState};
use crate::store::PersistenceStore;

pub type SharedReconciler = Arc<Mutex<Reconciler>>;

#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub resume_after_removal: bool,
    pub echo_linger: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resume_after_removal: false,
            echo_linger: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Fallback {
    #[default]
    NotNeeded,
    Played(String),
    CatalogExhausted,
}

/// What a single event did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Applied {
    pub persisted: usize,
    pub removed: usize,
    /// Clear-and-refill sequences sent to the player.
    pub refills: usize,
    pub fallback: Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing state-affecting happened.
    Unchanged,
    /// Dropped as an echo of one of our own mutations.
    Suppressed(SessionId),
    /// A queue snapshot taken before the shadow last re-read the player.
    Stale,
    Applied(Applied),
}

impl Outcome {
    /// Whether handling the event changed the player's queue or playback.
    pub fn touched_player(&self) -> bool {
        match self {
            Outcome::Applied(applied) => {
                applied.refills > 0 || matches!(applied.fallback, Fallback::Played(_))
            }
            _ => false,
        }
    }
}

impl Applied {
    fn into_outcome(self) -> Outcome {
        if self == Applied::default() {
            Outcome::Unchanged
        } else {
            Outcome::Applied(self)
        }
    }
}

pub struct Reconciler {
    player: Arc<dyn PlayerApi>,
    store: Box<dyn PersistenceStore>,
    picker: LibraryPicker,
    guard: FeedbackGuard,
    shadow: ShadowState,
    /// Taken just before the last `get_queue` the shadow queue adopted.
    queue_read_at: Option<Instant>,
    resume_after_removal: bool,
}

impl Reconciler {
    pub fn new(
        player: Arc<dyn PlayerApi>,
        store: Box<dyn PersistenceStore>,
        picker: LibraryPicker,
        settings: Settings,
    ) -> Self {
        Self {
            player,
            store,
            picker,
            guard: FeedbackGuard::new(settings.echo_linger),
            shadow: ShadowState::new(),
            queue_read_at: None,
            resume_after_removal: settings.resume_after_removal,
        }
    }

    pub fn into_shared(self) -> SharedReconciler {
        Arc::new(Mutex::new(self))
    }

    pub fn shadow(&self) -> &ShadowState {
        &self.shadow
    }

    /// Loads the player's current state and queue into the empty shadow
    /// model.  Starts a fallback track when the player has nothing queued.
    pub async fn seed(&mut self) -> Result<Observation, PlayerError> {
        let status = self.player.get_state().await?;
        debug!("initial player state: {:?}", status);
        self.queue_read_at = Some(Instant::now());
        let queue = self.player.get_queue().await?;
        debug!("initial player queue: {} tracks", queue.len());

        if !self.shadow.queue().is_empty() {
            error!(
                "seed: shadow queue not empty ({} tracks), overwriting",
                self.shadow.queue().len()
            );
        }
        self.shadow.record_status(&status);
        if status.state == PlaybackState::Play && status.has_track() {
            self.shadow.push_history(&status);
        }
        self.shadow.replace_queue(&queue);

        let mut applied = Applied::default();
        self.persist(&mut applied).await;
        if queue.is_empty() {
            applied.fallback = self.play_fallback().await?;
        }
        debug!("seeded: {:?}", applied);
        Ok(Observation { status, queue })
    }

    pub async fn on_change_event(&mut self, envelope: Envelope) -> Result<Outcome, PlayerError> {
        if let ChangeEvent::QueueChanged(_) = envelope.event {
            if self.queue_read_at.is_some_and(|read| envelope.received_at < read) {
                debug!("[EVENT IGNORED] queue snapshot predates the last queue read");
                return Ok(Outcome::Stale);
            }
        }
        if let Admission::Suppressed(session) = self.guard.admit(&envelope) {
            debug!(
                "[EVENT IGNORED] {} event echoes session {}: {:?}",
                envelope.event.label(),
                session,
                envelope.event
            );
            return Ok(Outcome::Suppressed(session));
        }
        debug!("evaluate {} event: {:?}", envelope.event.label(), envelope.event);

        match envelope.event {
            ChangeEvent::StatusChanged(status) => self.on_status(status).await,
            ChangeEvent::QueueChanged(queue) => self.on_queue(queue).await,
        }
    }

    async fn on_status(&mut self, status: PlayerStatus) -> Result<Outcome, PlayerError> {
        self.shadow.record_status(&status);
        if !status.has_track() {
            debug!("{} without a track, nothing to reconcile", status.state);
            return Ok(Outcome::Unchanged);
        }
        info!(
            "{}: {} - {} ({})",
            status.state, status.artist, status.title, status.uri
        );

        let mut applied = Applied::default();
        match status.state {
            PlaybackState::Play => {
                self.guard.note_playing(&status.uri);
                if self.shadow.push_history(&status) {
                    self.persist(&mut applied).await;
                }
            }
            PlaybackState::Pause => {}
            PlaybackState::Stop => {
                self.on_stop(&status, &mut applied).await?;
                if self.shadow.queue().is_empty() {
                    applied.fallback = self.play_fallback().await?;
                }
            }
        }
        Ok(applied.into_outcome())
    }

    async fn on_stop(
        &mut self,
        status: &PlayerStatus,
        applied: &mut Applied,
    ) -> Result<(), PlayerError> {
        match status.position {
            None => {
                let uri = match self.shadow.last_played() {
                    Some(last) => {
                        if last.uri != status.uri {
                            warn!(
                                "uri mismatch: stop reported {} but last played is {}",
                                status.uri, last.uri
                            );
                        }
                        last.uri.clone()
                    }
                    None => {
                        warn!("stop for {} with empty history", status.uri);
                        status.uri.clone()
                    }
                };
                self.remove_everywhere(&uri, applied).await?;
                self.persist(applied).await;
            }
            Some(0) => {
                if let Some(last) = self.shadow.last_played() {
                    if last.uri != status.uri {
                        warn!(
                            "uri mismatch: stop reported {} but last played is {}",
                            status.uri, last.uri
                        );
                    }
                }
                self.remove_everywhere(&status.uri, applied).await?;
                self.persist(applied).await;
            }
            Some(consumed) => {
                // The player reported the stop for the track waiting at
                // `position`; the `position` tracks played before it are done.
                for back in 0..consumed as usize {
                    let uri = match self.shadow.played_ago(back) {
                        Some(track) => track.uri.clone(),
                        None => {
                            error!(
                                "history has no entry {} back (length {}), skipping",
                                back,
                                self.shadow.history().len()
                            );
                            continue;
                        }
                    };
                    self.remove_everywhere(&uri, applied).await?;
                    self.persist(applied).await;
                }
            }
        }
        Ok(())
    }

    async fn on_queue(&mut self, reported: Vec<Track>) -> Result<Outcome, PlayerError> {
        let reported = unique_by_uri(&reported);
        let diff = QueueDiff::between(self.shadow.queue(), &reported);

        if diff.is_empty() {
            if same_order(self.shadow.queue(), &reported) {
                return Ok(Outcome::Unchanged);
            }
            info!("queue reordered ({} tracks)", reported.len());
            self.shadow.replace_queue(&reported);
            let mut applied = Applied::default();
            self.persist(&mut applied).await;
            return Ok(applied.into_outcome());
        }

        for added in &diff.added {
            info!("song added to queue position {}: {}", added.index, added.track);
        }
        let last_played = self.shadow.last_played().map(|t| t.uri.clone());
        for removed in &diff.removed {
            if last_played.as_deref() == Some(removed.track.uri.as_str()) {
                debug!("played song left the queue: {}", removed.track);
            } else {
                info!(
                    "song removed from queue position {}: {}",
                    removed.index, removed.track
                );
            }
        }

        self.shadow.replace_queue(&reported);
        let mut applied = Applied::default();
        self.persist(&mut applied).await;

        if self.shadow.queue().is_empty() && self.shadow.is_stopped() {
            applied.fallback = self.play_fallback().await?;
        }
        Ok(applied.into_outcome())
    }

    /// Removes `uri` from the player's queue (clear, then re-add the rest).
    /// The shadow queue then adopts what the player holds, so snapshots
    /// taken before this read are stale.
    async fn remove_everywhere(
        &mut self,
        uri: &str,
        applied: &mut Applied,
    ) -> Result<(), PlayerError> {
        let read_at = Instant::now();
        let mut remaining = self.player.get_queue().await?;
        match remaining.iter().position(|t| t.uri == uri) {
            Some(idx) => {
                let removed = remaining.remove(idx);
                debug!("remove song from player queue position {}: {}", idx, removed);

                let mutation = Mutation::Removal {
                    removed: removed.uri.clone(),
                    remaining: remaining.iter().map(|t| t.uri.clone()).collect(),
                };
                debug!("session for {}", mutation);
                let session = self.guard.arm(mutation);
                let result = self.clear_and_refill(&remaining).await;
                self.guard.disarm(session);
                result?;
                applied.refills += 1;
            }
            None => error!("uri not found in player queue: {}", uri),
        }

        if self.shadow.queue().iter().any(|t| t.uri == uri) {
            applied.removed += 1;
        }
        self.shadow.replace_queue(&remaining);
        self.queue_read_at = Some(read_at);
        Ok(())
    }

    async fn clear_and_refill(&self, remaining: &[Track]) -> Result<(), PlayerError> {
        self.player.clear_queue().await?;
        if !remaining.is_empty() {
            debug!("populate the queue with the {} remaining tracks", remaining.len());
            self.player.add_to_queue(remaining).await?;
            if self.resume_after_removal {
                self.player.play(0).await?;
            }
        }
        Ok(())
    }

    async fn play_fallback(&mut self) -> Result<Fallback, PlayerError> {
        let Some(track) = self.picker.pick() else {
            warn!("cannot play fallback track, catalog is empty");
            return Ok(Fallback::CatalogExhausted);
        };
        info!(
            "queue empty, playing fallback {} ({} left in catalog)",
            track,
            self.picker.remaining()
        );

        let mutation = Mutation::Replace {
            uri: track.uri.clone(),
        };
        debug!("session for {}", mutation);
        let session = self.guard.arm(mutation);
        let result = self.player.replace_and_play(&track).await;
        self.guard.disarm(session);
        result?;
        Ok(Fallback::Played(track.uri))
    }

    async fn persist(&self, applied: &mut Applied) {
        match self.store.save(&self.shadow.snapshot()).await {
            Ok(()) => applied.persisted += 1,
            Err(e) => warn!("snapshot write failed: {}", e),
        }
    }
}
