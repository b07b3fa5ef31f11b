//! Engine boundary traits
//!
//! The emulation engines themselves live outside this crate. Hosts plug them
//! in by implementing one of these traits:
//!
//! - [`MultiFormatEngine`] / [`MusicEmulator`]: engines that open a song,
//!   index its tracks natively and expose per-channel voices
//! - [`ChipEngine`]: engines that start from a single track image and may
//!   request companion library files by name while doing so
//!
//! Library lookups go through an explicit [`LibraryResolver`] handle handed to
//! every session, so several sessions of the same engine family can coexist.

use crate::container::{Container, SongBuffer};
use std::sync::Arc;

/// Errors reported by engine implementations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine does not recognize the data it was given
    #[error("unrecognized data: {0}")]
    Unrecognized(String),

    /// A library file the image depends on could not be resolved
    #[error("missing library: {0}")]
    MissingLibrary(String),

    /// Emulation failed
    #[error("{0}")]
    Failed(String),
}

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Source of companion files referenced by a track image (`_lib` tags and similar).
pub trait LibraryResolver: Send + Sync {
    /// Return a copy of the named file, or `None` when it is not available.
    fn load_library(&self, name: &str) -> Option<Vec<u8>>;
}

/// Resolves library names against the index of the archive a track came from.
///
/// Lookup is case-insensitive and matches name prefixes, first match in
/// on-disk order wins.
#[derive(Debug, Clone)]
pub struct ArchiveLibraries {
    song: SongBuffer,
    container: Arc<Container>,
}

impl ArchiveLibraries {
    /// Bind a resolver to a song and its parsed archive index.
    pub fn new(song: SongBuffer, container: Arc<Container>) -> Self {
        ArchiveLibraries { song, container }
    }
}

impl LibraryResolver for ArchiveLibraries {
    fn load_library(&self, name: &str) -> Option<Vec<u8>> {
        let (index, _) = self.container.find_by_name(name)?;
        self.container.copy_track(self.song.as_bytes(), index).ok()
    }
}

/// Factory for multi-format emulator sessions.
pub trait MultiFormatEngine: Send + Sync {
    /// Open `data` for playback at `sample_rate`.
    fn open(&self, data: &[u8], sample_rate: u32) -> EngineResult<Box<dyn MusicEmulator>>;
}

/// One opened multi-format song.
pub trait MusicEmulator: Send {
    /// Number of tracks the engine found in the data.
    fn track_count(&self) -> usize;

    /// Start a 0-based track.
    fn start_track(&mut self, track: usize) -> EngineResult<()>;

    /// Fill `out` completely with interleaved stereo samples.
    fn play(&mut self, out: &mut [i16]) -> EngineResult<()>;

    /// Number of independently mutable voices.
    fn voice_count(&self) -> usize;

    /// Name of a voice.
    fn voice_name(&self, voice: usize) -> Option<String>;

    /// Mute or unmute a voice.
    fn mute_voice(&mut self, voice: usize, muted: bool);
}

/// Single-track engine started from an image copied out of an archive.
pub trait ChipEngine: Send {
    /// Start playback of `image`. The engine may keep `libraries` for the
    /// lifetime of the session.
    fn start(&mut self, image: Vec<u8>, libraries: Arc<dyn LibraryResolver>) -> EngineResult<()>;

    /// Fill `out` with exactly `frames` interleaved stereo frames.
    fn generate(&mut self, out: &mut [i16], frames: usize) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ArchiveBuilder, ContainerFormat};

    #[test]
    fn test_archive_libraries_lookup() {
        let data = ArchiveBuilder::new(ContainerFormat::PSF_ARCHIVE)
            .track("game.minipsf", vec![1, 2, 3])
            .track("Game.PSFLIB", vec![9, 8])
            .build()
            .unwrap();
        let container = Arc::new(Container::parse(&data, ContainerFormat::PSF_ARCHIVE).unwrap());
        let libraries = ArchiveLibraries::new(SongBuffer::from(data), container);

        assert_eq!(libraries.load_library("game.psflib"), Some(vec![9, 8]));
        assert_eq!(libraries.load_library("nothere.psflib"), None);
    }

    #[test]
    fn test_engine_error_display() {
        assert_eq!(
            EngineError::MissingLibrary("a.psflib".into()).to_string(),
            "missing library: a.psflib"
        );
    }
}
