//! Fallback catalog fixture loading.
//!
//! The fixture is a queue export from the player (`{"queue": [...]}`), so
//! entries may name their title either `title` or `name`.

use crate::protocol::{QueueResponse, Track};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

pub fn load_catalog(path: &Path) -> anyhow::Result<Vec<Track>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read catalog {}: {}", path.display(), e))?;
    parse_catalog_from_str(&content)
}

pub fn parse_catalog_from_str(content: &str) -> anyhow::Result<Vec<Track>> {
    let export: QueueResponse = serde_json::from_str(content)?;
    let mut seen = HashSet::new();
    let tracks = export
        .queue
        .into_iter()
        .filter(|t| {
            if seen.insert(t.uri.clone()) {
                true
            } else {
                warn!("catalog: duplicate uri {} ignored", t.uri);
                false
            }
        })
        .collect();
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog_dedups_by_uri() {
        let json = r#"{"queue": [
            {"uri": "a", "name": "A", "artist": "X"},
            {"uri": "b", "name": "B", "artist": "Y"},
            {"uri": "a", "name": "A again", "artist": "X"}
        ]}"#;
        let tracks = parse_catalog_from_str(json).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].title, "A");
    }

    #[test]
    fn test_parse_catalog_rejects_garbage() {
        assert!(parse_catalog_from_str(r#"{"queue": 5}"#).is_err());
    }

    #[test]
    fn test_missing_catalog_names_the_path() {
        let err = load_catalog(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/catalog.json"));
    }
}
