use serde::{Deserialize, Serialize};

/// A queue or library entry.  `uri` is the identity key; two tracks with the
/// same uri are the same track regardless of their metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "WireTrack")]
pub struct Track {
    pub uri: String,
    pub title: String,
    pub artist: String,
}

impl Track {
    pub fn new(
        uri: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            title: title.into(),
            artist: artist.into(),
        }
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {} ({})", self.artist, self.title, self.uri)
    }
}

/// Queue items coming from the player name the title either `title` or
/// `name`, depending on the service that produced them.
#[derive(Debug, Deserialize)]
struct WireTrack {
    uri: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    artist: Option<String>,
}

impl From<WireTrack> for Track {
    fn from(w: WireTrack) -> Self {
        Self {
            uri: w.uri,
            title: w.title.or(w.name).unwrap_or_default(),
            artist: w.artist.unwrap_or_default(),
        }
    }
}

/// Transport state as reported by the player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stop,
    Play,
    Pause,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PlaybackState::Stop => "stop",
            PlaybackState::Play => "play",
            PlaybackState::Pause => "pause",
        };
        f.write_str(label)
    }
}

/// Player status as delivered by `getState` or a `state` push notification.
///
/// `position` is the queue index of the reported track.  On a `stop` it
/// doubles as the number of queue-head entries already consumed, since the
/// player reports the *next* queued track once the previous one finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlayerStatus {
    #[serde(rename = "status", default)]
    pub state: PlaybackState,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub uri: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

impl PlayerStatus {
    pub fn new(state: PlaybackState, track: &Track) -> Self {
        Self {
            state,
            uri: track.uri.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            position: None,
        }
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    /// The player reports an empty uri while nothing is loaded.
    pub fn has_track(&self) -> bool {
        !self.uri.is_empty()
    }

    pub fn track(&self) -> Track {
        Track {
            uri: self.uri.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
        }
    }
}

// Web radio entries report `null` metadata.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Push notification body posted by the player to the callback url.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "item", content = "data", rename_all = "lowercase")]
pub enum Notification {
    State(PlayerStatus),
    Queue(Vec<Track>),
}

impl Notification {
    pub fn decode(body: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// `getQueue` response envelope; the catalog fixture uses the same shape.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueResponse {
    #[serde(default)]
    pub queue: Vec<Track>,
}

/// Point-in-time copy of the shadow model, written for post-mortem analysis.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Snapshot {
    pub status: PlayerStatus,
    pub queue: Vec<Track>,
    pub history: Vec<Track>,
}
