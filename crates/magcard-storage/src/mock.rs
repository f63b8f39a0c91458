//! In-memory track store for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use magcard_core::{Result, TrackSet};

use crate::TrackStore;

/// Store keeping card images in a map instead of on disk.
///
/// Behaves like [`FileTrackStore`](crate::FileTrackStore): loading an
/// unknown path creates a blank card there. Clones share the same map, so
/// a test can keep one handle and inspect what the reader persisted
/// through the other.
#[derive(Debug, Default, Clone)]
pub struct MemoryTrackStore {
    images: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemoryTrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an image before handing the store to the reader.
    pub fn put(&self, path: impl Into<PathBuf>, image: Vec<u8>) {
        let mut images = self.images.lock().unwrap_or_else(|e| e.into_inner());
        images.insert(path.into(), image);
    }

    /// Raw image bytes currently stored for `path`, if any.
    pub fn image(&self, path: &Path) -> Option<Vec<u8>> {
        let images = self.images.lock().unwrap_or_else(|e| e.into_inner());
        images.get(path).cloned()
    }

    /// Number of distinct card images held.
    pub fn len(&self) -> usize {
        let images = self.images.lock().unwrap_or_else(|e| e.into_inner());
        images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrackStore for MemoryTrackStore {
    fn load(&self, path: &Path) -> Result<TrackSet> {
        let mut images = self.images.lock().unwrap_or_else(|e| e.into_inner());
        match images.get(path) {
            Some(image) => TrackSet::from_image(image),
            None => {
                let blank = TrackSet::new();
                images.insert(path.to_path_buf(), blank.to_image());
                Ok(blank)
            }
        }
    }

    fn save(&self, path: &Path, tracks: &TrackSet) -> Result<()> {
        let mut images = self.images.lock().unwrap_or_else(|e| e.into_inner());
        images.insert(path.to_path_buf(), tracks.to_image());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_path_creates_blank_image() {
        let store = MemoryTrackStore::new();
        let tracks = store.load(Path::new("card.bin")).unwrap();
        assert_eq!(tracks, TrackSet::new());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn save_is_observable() {
        let store = MemoryTrackStore::new();
        let mut tracks = TrackSet::new();
        tracks
            .write_selected(
                &magcard_core::TrackSelection::from_selector(b'0').unwrap(),
                &[0x77; magcard_core::constants::TRACK_LEN],
            )
            .unwrap();

        store.save(Path::new("card.bin"), &tracks).unwrap();
        let image = store.image(Path::new("card.bin")).unwrap();
        assert_eq!(&image[..4], &[0x77, 0x77, 0x77, 0x77]);
    }
}
