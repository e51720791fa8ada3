use thiserror::Error;

/// Failure talking to the player's REST API.
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("player request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("cannot decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PlayerError {
    pub fn status(endpoint: &str, status: u16) -> Self {
        PlayerError::Status {
            endpoint: endpoint.to_string(),
            status,
        }
    }

    pub fn decode(endpoint: &str, source: serde_json::Error) -> Self {
        PlayerError::Decode {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}
