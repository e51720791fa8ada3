use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::events::Envelope;
use crate::reconciler::{Outcome, SharedReconciler};

/// Something that turns player activity into change events for the
/// reconciler.  Push and poll delivery are interchangeable.
#[async_trait]
pub trait ChangeEventSource: Send {
    fn name(&self) -> &'static str;

    async fn run(
        self: Box<Self>,
        reconciler: SharedReconciler,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()>;
}

/// Hands one event to the reconciler, waiting for any event already in
/// progress.  Player failures end the event, not the source: the next full
/// snapshot brings the shadow model back in line.
pub async fn deliver(reconciler: &SharedReconciler, envelope: Envelope) -> Option<Outcome> {
    let label = envelope.event.label();
    let mut reconciler = reconciler.lock().await;
    match reconciler.on_change_event(envelope).await {
        Ok(outcome) => {
            debug!("{} event -> {:?}", label, outcome);
            Some(outcome)
        }
        Err(e) => {
            error!("{} event failed: {}", label, e);
            None
        }
    }
}
