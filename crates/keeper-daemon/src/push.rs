//! Webhook receiver for the player's push notifications.
//!
//! Serves `POST {webhook_path}` (default `/playerstatus`).  Each body is one
//! notification, handed to the reconciler within the request.  The player
//! always gets `200`, even for bodies we cannot read.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use keeper_proto::config::CallbackConfig;
use keeper_proto::protocol::Notification;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::events::Envelope;
use crate::reconciler::SharedReconciler;
use crate::source::{deliver, ChangeEventSource};

#[derive(Clone)]
struct PushState {
    reconciler: SharedReconciler,
}

pub struct PushSource {
    listener: TcpListener,
    webhook_path: String,
}

impl PushSource {
    /// Binds the listener up front so the player is only told about the
    /// callback once something is listening on it.
    pub async fn bind(config: &CallbackConfig) -> anyhow::Result<Self> {
        let addr = format!("{}:{}", config.bind_address, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind webhook listener {}: {}", addr, e))?;
        Ok(Self {
            listener,
            webhook_path: normalize_path(&config.webhook_path),
        })
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

pub fn router(webhook_path: &str, reconciler: SharedReconciler) -> Router {
    Router::new()
        .route(webhook_path, post(receive_notification))
        .layer(TraceLayer::new_for_http())
        .with_state(PushState { reconciler })
}

async fn receive_notification(State(state): State<PushState>, body: Bytes) -> StatusCode {
    match Notification::decode(&body) {
        Ok(notification) => {
            let envelope = Envelope::now(notification.into());
            deliver(&state.reconciler, envelope).await;
        }
        Err(e) => warn!(
            "push: unreadable notification ({}): {}",
            e,
            String::from_utf8_lossy(&body)
        ),
    }
    StatusCode::OK
}

#[async_trait]
impl ChangeEventSource for PushSource {
    fn name(&self) -> &'static str {
        "push"
    }

    async fn run(
        self: Box<Self>,
        reconciler: SharedReconciler,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let app = router(&self.webhook_path, reconciler);
        info!(
            "webhook listening on http://{}{}",
            self.listener.local_addr()?,
            self.webhook_path
        );
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        info!("webhook stopped");
        Ok(())
    }
}
