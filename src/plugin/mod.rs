//! Codec plugin contract
//!
//! Every decoding backend is driven through [`CodecPlugin`], regardless of how
//! its engine indexes tracks or models voices.
//!
//! # Backends
//!
//! - [`GameMusicBackend`] - multi-format engine with native multi-track songs,
//!   optionally wrapped in a `"Game Music Files"` archive
//! - [`ArchiveBackend`] - single-chip PSF-family engines (DSF/PSF/PSF2/SSF) and
//!   the dual-CPU 2SF engine, fed from `"PSF Song Archive"` containers
//!
//! The concrete backend is chosen at load time by [`BackendKind`] through a
//! [`BackendRegistry`] that the host fills with engine implementations.

mod archive;
mod engine;
mod gme;
mod pcm;
mod registry;

pub use archive::ArchiveBackend;
pub use engine::{
    ArchiveLibraries, ChipEngine, EngineError, EngineResult, LibraryResolver, MultiFormatEngine,
    MusicEmulator,
};
pub use gme::GameMusicBackend;
pub use pcm::PcmEngine;
pub use registry::{BackendRegistry, ChipEngineFactory};

use crate::container::{ContainerFormat, SongBuffer};
use crate::{PlayerError, Result, SAMPLES_PER_FRAME};
use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::fmt;
use std::str::FromStr;

/// Backend families, numbered the way hosts select them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum BackendKind {
    /// Multi-format game music engine
    GameMusic = 1,
    /// Sega Dreamcast sound format
    Dsf = 2,
    /// PlayStation sound format
    Psf = 3,
    /// PlayStation 2 sound format
    Psf2 = 4,
    /// Sega Saturn sound format
    Ssf = 5,
    /// Nintendo DS sound format (dual-CPU engine)
    TwoSf = 6,
}

impl BackendKind {
    /// Every backend family in engine-number order.
    pub const ALL: [BackendKind; 6] = [
        BackendKind::GameMusic,
        BackendKind::Dsf,
        BackendKind::Psf,
        BackendKind::Psf2,
        BackendKind::Ssf,
        BackendKind::TwoSf,
    ];

    /// Map a 1-based engine number to a backend.
    pub fn from_engine_number(number: u32) -> Option<Self> {
        BackendKind::from_u32(number)
    }

    /// 1-based engine number of this backend.
    pub fn engine_number(self) -> u32 {
        self as u32
    }

    /// Short identifier, also accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::GameMusic => "gme",
            BackendKind::Dsf => "dsf",
            BackendKind::Psf => "psf",
            BackendKind::Psf2 => "psf2",
            BackendKind::Ssf => "ssf",
            BackendKind::TwoSf => "2sf",
        }
    }

    /// Archive wrapper this backend understands.
    pub fn container_format(self) -> ContainerFormat {
        match self {
            BackendKind::GameMusic => ContainerFormat::GAME_MUSIC,
            _ => ContainerFormat::PSF_ARCHIVE,
        }
    }

    /// Name of the synthetic master voice reported by single-voice backends.
    pub fn master_voice_name(self) -> &'static str {
        match self {
            BackendKind::GameMusic => "Master",
            BackendKind::Dsf => "Dreamcast AICA",
            BackendKind::Psf => "PlayStation SPU",
            BackendKind::Psf2 => "PlayStation 2 SPU2",
            BackendKind::Ssf => "Saturn SCSP",
            BackendKind::TwoSf => "Nintendo DS Audio",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = PlayerError;

    fn from_str(value: &str) -> Result<Self> {
        if let Ok(number) = value.parse::<u32>() {
            return BackendKind::from_engine_number(number).ok_or_else(|| {
                PlayerError::ConfigError(format!("invalid engine number: {number}"))
            });
        }
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| PlayerError::ConfigError(format!("unknown backend: {value}")))
    }
}

bitflags! {
    /// What a backend instance can do with the currently loaded song
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// Engine indexes tracks itself (no archive wrapper)
        const NATIVE_MULTI_TRACK = 0x01;
        /// Tracks come from a container archive
        const CONTAINER = 0x02;
        /// Individual voices can be muted
        const VOICE_TOGGLE = 0x04;
        /// Engine may request companion files by name from the archive
        const LIBRARY_LOOKUP = 0x08;
    }
}

/// Which track `start_track` should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSelector {
    /// Restart whatever track is presently selected
    Current,
    /// Select and start a 0-based track
    Index(usize),
}

/// Uniform interface over every decoding backend.
///
/// State machine: uninitialized, then initialized by [`init`](Self::init)
/// (track count fixed, current track 0), then track-started by
/// [`start_track`](Self::start_track). Only a new `init` leaves the
/// track-started state.
pub trait CodecPlugin: Send {
    /// Backend family of this instance.
    fn kind(&self) -> BackendKind;

    /// Capabilities for the currently loaded song.
    fn capabilities(&self) -> Capabilities;

    /// Inspect `song`, fix the track count and reset the current track to 0.
    ///
    /// Unrecognized or corrupt data is reported as [`PlayerError::CorruptInput`].
    fn init(&mut self, song: SongBuffer) -> Result<()>;

    /// Start a track. Out-of-range indices fail with
    /// [`PlayerError::UnsupportedTrack`] before any state changes.
    fn start_track(&mut self, track: TrackSelector) -> Result<()>;

    /// Synthesize exactly `frame_count` interleaved stereo frames into `out`.
    fn generate_stereo_frames(&mut self, out: &mut [i16], frame_count: usize) -> Result<()>;

    /// Number of tracks, fixed after `init`.
    fn track_count(&self) -> usize;

    /// Selected 0-based track.
    fn current_track(&self) -> usize;

    /// Select the following track, wrapping to 0. Does not start it.
    fn next_track(&mut self) -> usize;

    /// Select the preceding track, wrapping to the last one. Does not start it.
    fn previous_track(&mut self) -> usize;

    /// Number of voices of the started track.
    fn voice_count(&self) -> usize;

    /// Human-readable voice name.
    fn voice_name(&self, voice: usize) -> Option<String>;

    /// Whether [`set_voice_state`](Self::set_voice_state) has any effect.
    fn voices_can_be_toggled(&self) -> bool {
        self.capabilities().contains(Capabilities::VOICE_TOGGLE)
    }

    /// Enable or mute one voice.
    fn set_voice_state(&mut self, voice: usize, enabled: bool) -> Result<()>;

    /// Name recorded for a track in the archive index, if any.
    fn track_name(&self, _track: usize) -> Option<&str> {
        None
    }
}

/// Track numbering shared by every backend: a fixed count and a wrapping cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TrackCursor {
    count: usize,
    current: usize,
}

impl TrackCursor {
    pub(crate) fn new(count: usize) -> Self {
        TrackCursor { count, current: 0 }
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn current(&self) -> usize {
        self.current
    }

    /// Resolve a selector to a valid index without changing the cursor.
    pub(crate) fn resolve(&self, track: TrackSelector) -> Result<usize> {
        let index = match track {
            TrackSelector::Current => self.current,
            TrackSelector::Index(index) => index,
        };
        if index >= self.count {
            return Err(PlayerError::UnsupportedTrack {
                index,
                count: self.count,
            });
        }
        Ok(index)
    }

    pub(crate) fn select(&mut self, index: usize) {
        debug_assert!(index < self.count);
        self.current = index;
    }

    pub(crate) fn next(&mut self) -> usize {
        if self.count > 0 {
            self.current = (self.current + 1) % self.count;
        }
        self.current
    }

    pub(crate) fn previous(&mut self) -> usize {
        if self.count > 0 {
            self.current = self.current.checked_sub(1).unwrap_or(self.count - 1);
        }
        self.current
    }
}

/// Borrow exactly `frame_count` frames worth of samples from `out`.
pub(crate) fn frame_slice(out: &mut [i16], frame_count: usize) -> Result<&mut [i16]> {
    let samples = frame_count * SAMPLES_PER_FRAME;
    let len = out.len();
    out.get_mut(..samples).ok_or_else(|| {
        PlayerError::DecodeFailure(format!(
            "output holds {len} samples, {frame_count} frames need {samples}"
        ))
    })
}
