//! Archive-fed single-chip backends (DSF, PSF, PSF2, SSF and 2SF).
//!
//! These engines only ever see one track image at a time. The song must be a
//! `"PSF Song Archive"`; each `start_track` copies the selected member out and
//! hands it to the engine together with a resolver over the same archive, so
//! `_lib` references inside the image find their companions.

use super::engine::{ArchiveLibraries, ChipEngine};
use super::{frame_slice, BackendKind, Capabilities, CodecPlugin, TrackCursor, TrackSelector};
use crate::container::{Container, ContainerFormat, SongBuffer};
use crate::{PlayerError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Session state that only exists once a song has been accepted.
struct LoadedArchive {
    song: SongBuffer,
    container: Arc<Container>,
}

/// [`CodecPlugin`] over a [`ChipEngine`].
pub struct ArchiveBackend {
    kind: BackendKind,
    engine: Box<dyn ChipEngine>,
    loaded: Option<LoadedArchive>,
    tracks: TrackCursor,
    started: bool,
}

impl ArchiveBackend {
    /// Wrap `engine` as a backend of the given family.
    ///
    /// `kind` only affects naming; [`BackendKind::GameMusic`] is accepted but
    /// the registry never builds one that way.
    pub fn new(kind: BackendKind, engine: Box<dyn ChipEngine>) -> Self {
        ArchiveBackend {
            kind,
            engine,
            loaded: None,
            tracks: TrackCursor::default(),
            started: false,
        }
    }
}

impl CodecPlugin for ArchiveBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::CONTAINER | Capabilities::LIBRARY_LOOKUP
    }

    fn init(&mut self, song: SongBuffer) -> Result<()> {
        self.loaded = None;
        self.tracks = TrackCursor::default();
        self.started = false;

        let container = Container::detect(song.as_bytes(), ContainerFormat::PSF_ARCHIVE)?
            .ok_or_else(|| {
                PlayerError::CorruptInput(format!(
                    "{} backend requires a PSF song archive",
                    self.kind
                ))
            })?;

        debug!(kind = %self.kind, tracks = container.track_count(), "archive loaded");
        self.tracks = TrackCursor::new(container.track_count());
        self.loaded = Some(LoadedArchive {
            song,
            container: Arc::new(container),
        });
        Ok(())
    }

    fn start_track(&mut self, track: TrackSelector) -> Result<()> {
        let loaded = self.loaded.as_ref().ok_or(PlayerError::NoSongLoaded)?;
        let index = self.tracks.resolve(track)?;

        let image = loaded.container.copy_track(loaded.song.as_bytes(), index)?;
        let libraries = Arc::new(ArchiveLibraries::new(
            loaded.song.clone(),
            Arc::clone(&loaded.container),
        ));

        self.started = false;
        if let Err(e) = self.engine.start(image, libraries) {
            warn!(kind = %self.kind, track = index, error = %e, "engine rejected track");
            return Err(PlayerError::DecodeFailure(format!("track {index}: {e}")));
        }

        self.tracks.select(index);
        self.started = true;
        Ok(())
    }

    fn generate_stereo_frames(&mut self, out: &mut [i16], frame_count: usize) -> Result<()> {
        if !self.started {
            return Err(PlayerError::DecodeFailure("no track started".into()));
        }
        let out = frame_slice(out, frame_count)?;
        self.engine
            .generate(out, frame_count)
            .map_err(|e| PlayerError::DecodeFailure(e.to_string()))
    }

    fn track_count(&self) -> usize {
        self.tracks.count()
    }

    fn current_track(&self) -> usize {
        self.tracks.current()
    }

    fn next_track(&mut self) -> usize {
        self.tracks.next()
    }

    fn previous_track(&mut self) -> usize {
        self.tracks.previous()
    }

    fn voice_count(&self) -> usize {
        1
    }

    fn voice_name(&self, voice: usize) -> Option<String> {
        (voice == 0).then(|| self.kind.master_voice_name().to_string())
    }

    fn set_voice_state(&mut self, _voice: usize, _enabled: bool) -> Result<()> {
        Err(PlayerError::VoiceToggleUnsupported(self.kind))
    }

    fn track_name(&self, track: usize) -> Option<&str> {
        let loaded = self.loaded.as_ref()?;
        loaded.container.entry(track).ok()?.name.as_deref()
    }
}
