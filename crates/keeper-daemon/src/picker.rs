use keeper_proto::protocol::Track;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Draws fallback tracks from the catalog without replacement.  Once the
/// catalog is empty it stays empty for the life of the process.
pub struct LibraryPicker {
    catalog: Vec<Track>,
    rng: StdRng,
}

impl LibraryPicker {
    pub fn new(catalog: Vec<Track>) -> Self {
        Self::with_rng(catalog, StdRng::from_entropy())
    }

    pub fn with_rng(catalog: Vec<Track>, rng: StdRng) -> Self {
        Self { catalog, rng }
    }

    pub fn pick(&mut self) -> Option<Track> {
        if self.catalog.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..self.catalog.len());
        Some(self.catalog.swap_remove(idx))
    }

    pub fn remaining(&self) -> usize {
        self.catalog.len()
    }
}
