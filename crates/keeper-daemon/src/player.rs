//! Player REST client.
//!
//! `PlayerApi` is the seam the reconciler and the poll source talk through;
//! `VolumioClient` is the HTTP implementation against `http://{host}/api/v1`.
//! No request timeout is applied: a hung player blocks the caller.
use async_trait::async_trait;
use keeper_proto::protocol::{PlayerStatus, QueueResponse, Track};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::error::PlayerError;

#[async_trait]
pub trait PlayerApi: Send + Sync {
    async fn get_state(&self) -> Result<PlayerStatus, PlayerError>;
    async fn get_queue(&self) -> Result<Vec<Track>, PlayerError>;
    async fn clear_queue(&self) -> Result<(), PlayerError>;
    async fn add_to_queue(&self, tracks: &[Track]) -> Result<(), PlayerError>;
    async fn replace_and_play(&self, track: &Track) -> Result<(), PlayerError>;
    async fn play(&self, index: usize) -> Result<(), PlayerError>;
}

#[derive(Clone)]
pub struct VolumioClient {
    base_url: String,
    client: Client,
}

impl VolumioClient {
    pub fn new(host: &str) -> Self {
        Self {
            base_url: format!("http://{}/api/v1", host),
            client: Client::new(),
        }
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, PlayerError> {
        let url = self.url(endpoint);
        debug!("requesting: GET {}", url);
        let response = self.client.get(&url).send().await?;
        check_status(endpoint, &response)?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| PlayerError::decode(endpoint, e))
    }

    async fn command(&self, query: &str) -> Result<(), PlayerError> {
        let endpoint = format!("commands/?{}", query);
        let url = self.url(&endpoint);
        debug!("requesting: GET {}", url);
        let response = self.client.get(&url).send().await?;
        check_status(&endpoint, &response)
    }

    async fn post<B>(&self, endpoint: &str, body: &B) -> Result<(), PlayerError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(endpoint);
        let response = self.client.post(&url).json(body).send().await?;
        check_status(endpoint, &response)
    }
}

fn check_status(endpoint: &str, response: &reqwest::Response) -> Result<(), PlayerError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(PlayerError::status(endpoint, status.as_u16()))
    }
}

#[async_trait]
impl PlayerApi for VolumioClient {
    async fn get_state(&self) -> Result<PlayerStatus, PlayerError> {
        self.get_json("getState").await
    }

    async fn get_queue(&self) -> Result<Vec<Track>, PlayerError> {
        let response: QueueResponse = self.get_json("getQueue").await?;
        Ok(response.queue)
    }

    async fn clear_queue(&self) -> Result<(), PlayerError> {
        self.command("cmd=clearQueue").await
    }

    async fn add_to_queue(&self, tracks: &[Track]) -> Result<(), PlayerError> {
        let items: Vec<_> = tracks.iter().map(|t| json!({ "uri": t.uri })).collect();
        debug!("requesting: POST addToQueue <-- {} items", items.len());
        self.post("addToQueue", &items).await
    }

    async fn replace_and_play(&self, track: &Track) -> Result<(), PlayerError> {
        let body = json!({ "uri": track.uri, "name": track.title, "artist": track.artist });
        debug!("requesting: POST replaceAndPlay <-- {}", body);
        self.post("replaceAndPlay", &body).await
    }

    async fn play(&self, index: usize) -> Result<(), PlayerError> {
        self.command(&format!("cmd=play&N={}", index)).await
    }
}
