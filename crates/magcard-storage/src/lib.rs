//! Persistence for card track images.
//!
//! Each virtual card is one flat binary file holding the three tracks back
//! to back, 207 bytes total. The reader state machine reloads the image
//! before every Read and persists it after every mutating command, so the
//! file on disk always matches what the game board last observed.
//!
//! [`TrackStore`] is the seam between the state machine and the filesystem;
//! [`MemoryTrackStore`](mock::MemoryTrackStore) backs tests without touching
//! disk.

pub mod mock;

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use magcard_core::{Result, TrackSet, constants::CARD_IMAGE_LEN};

/// Load and save card images by path.
pub trait TrackStore: Send {
    /// Load the card image at `path`.
    ///
    /// A missing file is not an error: the store creates a zero-filled
    /// image there and returns a blank card, which is how a freshly
    /// inserted card with no history behaves.
    ///
    /// # Errors
    /// Fails on unreadable files and on images that are not exactly
    /// 207 bytes. A wrong-sized file is never partially read.
    fn load(&self, path: &Path) -> Result<TrackSet>;

    /// Persist `tracks` to `path`, replacing whatever was there.
    fn save(&self, path: &Path, tracks: &TrackSet) -> Result<()>;
}

/// Filesystem-backed store used by the daemon.
#[derive(Debug, Default)]
pub struct FileTrackStore;

impl FileTrackStore {
    pub fn new() -> Self {
        FileTrackStore
    }
}

impl TrackStore for FileTrackStore {
    fn load(&self, path: &Path) -> Result<TrackSet> {
        if !path.exists() {
            info!(path = %path.display(), "no card image on disk, creating a blank card");
            let blank = TrackSet::new();
            self.save(path, &blank)?;
            return Ok(blank);
        }

        let image = fs::read(path)?;
        debug!(path = %path.display(), len = image.len(), "loaded card image");
        TrackSet::from_image(&image)
    }

    fn save(&self, path: &Path, tracks: &TrackSet) -> Result<()> {
        let image = tracks.to_image();
        debug_assert_eq!(image.len(), CARD_IMAGE_LEN);
        fs::write(path, &image)?;
        debug!(path = %path.display(), "persisted card image");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magcard_core::TrackSelection;
    use std::path::PathBuf;

    fn scratch_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("magcard-store-{}-{}", std::process::id(), name));
        path
    }

    #[test]
    fn missing_file_becomes_blank_card() {
        let path = scratch_path("missing.bin");
        let _ = fs::remove_file(&path);

        let store = FileTrackStore::new();
        let tracks = store.load(&path).unwrap();
        assert_eq!(tracks, TrackSet::new());

        // The blank image was written out so later loads see the same card.
        let on_disk = fs::read(&path).unwrap();
        assert_eq!(on_disk, vec![0u8; CARD_IMAGE_LEN]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn save_then_load_round_trips() {
        let path = scratch_path("roundtrip.bin");
        let store = FileTrackStore::new();

        let mut tracks = TrackSet::new();
        tracks
            .write_selected(
                &TrackSelection::from_selector(b'6').unwrap(),
                &vec![0x5Au8; CARD_IMAGE_LEN],
            )
            .unwrap();

        store.save(&path, &tracks).unwrap();
        assert_eq!(store.load(&path).unwrap(), tracks);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn wrong_sized_image_is_rejected() {
        let path = scratch_path("truncated.bin");
        fs::write(&path, vec![0u8; CARD_IMAGE_LEN - 1]).unwrap();

        let store = FileTrackStore::new();
        assert!(store.load(&path).is_err());

        let _ = fs::remove_file(&path);
    }
}
