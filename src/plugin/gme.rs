//! Multi-format game music backend.
//!
//! Plain songs are opened once at `init` and the engine's own track index is
//! used. Songs wrapped in a `"Game Music Files"` archive get a fresh emulator
//! per track, scoped to that track's byte range.

use super::engine::{MultiFormatEngine, MusicEmulator};
use super::{frame_slice, BackendKind, Capabilities, CodecPlugin, TrackCursor, TrackSelector};
use crate::container::{Container, ContainerFormat, SongBuffer};
use crate::{PlayerError, Result, MASTER_FREQUENCY};
use std::sync::Arc;
use tracing::debug;

/// [`CodecPlugin`] over a [`MultiFormatEngine`].
pub struct GameMusicBackend {
    engine: Arc<dyn MultiFormatEngine>,
    sample_rate: u32,
    song: Option<SongBuffer>,
    container: Option<Container>,
    emulator: Option<Box<dyn MusicEmulator>>,
    tracks: TrackCursor,
    voice_count: usize,
    started: bool,
}

impl GameMusicBackend {
    /// Create an uninitialized backend rendering at [`MASTER_FREQUENCY`].
    pub fn new(engine: Arc<dyn MultiFormatEngine>) -> Self {
        GameMusicBackend {
            engine,
            sample_rate: MASTER_FREQUENCY,
            song: None,
            container: None,
            emulator: None,
            tracks: TrackCursor::default(),
            voice_count: 0,
            started: false,
        }
    }

    fn reset(&mut self) {
        self.song = None;
        self.container = None;
        self.emulator = None;
        self.tracks = TrackCursor::default();
        self.voice_count = 0;
        self.started = false;
    }

    /// Open a new emulator on one archive member and start its first track.
    fn open_member(
        &self,
        song: &SongBuffer,
        container: &Container,
        index: usize,
    ) -> Result<Box<dyn MusicEmulator>> {
        let bytes = container.track_bytes(song.as_bytes(), index)?;
        let mut emulator = self
            .engine
            .open(bytes, self.sample_rate)
            .map_err(|e| PlayerError::DecodeFailure(format!("track {index}: {e}")))?;
        emulator
            .start_track(0)
            .map_err(|e| PlayerError::DecodeFailure(format!("track {index}: {e}")))?;
        Ok(emulator)
    }
}

impl CodecPlugin for GameMusicBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::GameMusic
    }

    fn capabilities(&self) -> Capabilities {
        let layout = if self.container.is_some() {
            Capabilities::CONTAINER
        } else {
            Capabilities::NATIVE_MULTI_TRACK
        };
        layout | Capabilities::VOICE_TOGGLE
    }

    fn init(&mut self, song: SongBuffer) -> Result<()> {
        self.reset();

        if let Some(container) = Container::detect(song.as_bytes(), ContainerFormat::GAME_MUSIC)? {
            debug!(tracks = container.track_count(), "game music archive detected");
            self.tracks = TrackCursor::new(container.track_count());
            self.container = Some(container);
        } else {
            let emulator = self
                .engine
                .open(song.as_bytes(), self.sample_rate)
                .map_err(|e| PlayerError::CorruptInput(e.to_string()))?;
            let count = emulator.track_count();
            if count == 0 {
                return Err(PlayerError::CorruptInput("song contains no tracks".into()));
            }
            self.tracks = TrackCursor::new(count);
            self.voice_count = emulator.voice_count();
            self.emulator = Some(emulator);
        }

        self.song = Some(song);
        Ok(())
    }

    fn start_track(&mut self, track: TrackSelector) -> Result<()> {
        let song = self.song.clone().ok_or(PlayerError::NoSongLoaded)?;
        let index = self.tracks.resolve(track)?;
        self.started = false;

        if let Some(container) = &self.container {
            // Previous member's emulator is destroyed before the new one goes live
            self.emulator = None;
            let emulator = self.open_member(&song, container, index)?;
            self.emulator = Some(emulator);
        } else {
            let emulator = self.emulator.as_mut().ok_or(PlayerError::NoSongLoaded)?;
            emulator
                .start_track(index)
                .map_err(|e| PlayerError::DecodeFailure(format!("track {index}: {e}")))?;
        }

        self.voice_count = self.emulator.as_ref().map_or(0, |emu| emu.voice_count());
        self.tracks.select(index);
        self.started = true;
        Ok(())
    }

    fn generate_stereo_frames(&mut self, out: &mut [i16], frame_count: usize) -> Result<()> {
        let emulator = match self.emulator.as_mut() {
            Some(emulator) if self.started => emulator,
            _ => return Err(PlayerError::DecodeFailure("no track started".into())),
        };
        emulator
            .play(frame_slice(out, frame_count)?)
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
        self.voice_count
    }

    fn voice_name(&self, voice: usize) -> Option<String> {
        if voice >= self.voice_count {
            return None;
        }
        self.emulator.as_ref()?.voice_name(voice)
    }

    fn set_voice_state(&mut self, voice: usize, enabled: bool) -> Result<()> {
        if voice >= self.voice_count {
            return Err(PlayerError::InvalidVoice {
                voice,
                count: self.voice_count,
            });
        }
        let emulator = self.emulator.as_mut().ok_or(PlayerError::NoSongLoaded)?;
        emulator.mute_voice(voice, !enabled);
        Ok(())
    }
}
