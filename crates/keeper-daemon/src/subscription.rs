//! Push notification subscription handshake.
//!
//! Best effort: failures are logged and never retried.

use serde_json::json;
use tracing::{debug, error, info};

use crate::error::PlayerError;
use crate::player::VolumioClient;

const ENDPOINT: &str = "pushNotificationUrls";

pub async fn register(client: &VolumioClient, callback_url: &str) {
    set_registration(client, callback_url, true).await;
}

pub async fn unregister(client: &VolumioClient, callback_url: &str) {
    set_registration(client, callback_url, false).await;
}

async fn set_registration(client: &VolumioClient, callback_url: &str, register: bool) {
    let url = client.url(ENDPOINT);
    let body = json!({ "url": callback_url });
    let request = if register {
        client.http().post(&url)
    } else {
        client.http().delete(&url)
    };
    debug!(
        "subscription: {} {} <-- {}",
        if register { "POST" } else { "DELETE" },
        url,
        body
    );

    if let Err(e) = request.json(&body).send().await {
        error!("subscription: request to {} failed: {}", url, e);
        return;
    }

    // sanity check
    match fetch_registered(client).await {
        Ok(urls) => {
            let present = urls.iter().any(|u| u == callback_url);
            if present != register {
                error!(
                    "subscription: {} is {}registered after {}",
                    callback_url,
                    if present { "still " } else { "not " },
                    if register { "register" } else { "unregister" }
                );
            } else {
                info!(
                    "subscription: {} {}",
                    callback_url,
                    if register { "registered" } else { "unregistered" }
                );
            }
        }
        Err(e) => error!("subscription: cannot verify registration: {}", e),
    }
}

async fn fetch_registered(client: &VolumioClient) -> Result<Vec<String>, PlayerError> {
    let response = client.http().get(client.url(ENDPOINT)).send().await?;
    let body = response.bytes().await?;
    parse_registered(&body).map_err(|e| PlayerError::decode(ENDPOINT, e))
}

/// The player answers with a bare list of urls.
fn parse_registered(body: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_slice(body)
}
