//! Chip-music playback core
//!
//! Drives heterogeneous audio-emulation engines (multi-format game music
//! engines, single-chip PSF-family engines, the dual-CPU Nintendo DS engine)
//! through one codec plugin contract, and streams their output through a
//! real-time ring buffer to an audio sink.
//!
//! # Features
//! - Multi-track container archives (`"PSF Song Archive"` indexed records and
//!   `"Game Music Files"` offset tables) with bounds-checked parsing
//! - Uniform [`CodecPlugin`] trait selected at load time by [`BackendKind`]
//! - [`PlaybackController`] with track navigation and a voice mute table that
//!   survives track switches
//! - Producer/consumer [`FrameRing`] pipeline that never holds its lock across
//!   synthesis and never blocks the audio callback indefinitely
//!
//! # Crate feature flags
//! - `streaming` (opt-in): rodio-backed [`streaming::AudioDevice`] pulling from the pipeline
//! - `export` (opt-in): offline WAV rendering via `hound`
//!
//! # Quick start
//! ```no_run
//! use chipstream_player::{
//!     BackendKind, BackendRegistry, PcmEngine, PipelineConfig, PlaybackController, TrackChange,
//! };
//!
//! let mut registry = BackendRegistry::new();
//! registry
//!     .register_chip_engine(BackendKind::Psf, || Box::new(PcmEngine::new()))
//!     .unwrap();
//!
//! let mut controller = PlaybackController::new(PipelineConfig::default()).unwrap();
//! let data = std::fs::read("songs.psfarchive").unwrap();
//! controller
//!     .load_song(&data, registry.create(BackendKind::Psf).unwrap())
//!     .unwrap();
//! controller.switch_track(TrackChange::Index(0)).unwrap();
//!
//! // Host scheduler side
//! controller.pump();
//!
//! // Audio callback side
//! let consumer = controller.consumer();
//! let mut out = vec![0i16; 2048];
//! consumer.drain_into(&mut out);
//! ```

#![warn(missing_docs)]

pub mod container; // Multi-track archive demuxing
pub mod controller; // Playback session and voice muting
#[cfg(feature = "export")]
pub mod export; // Offline rendering
pub mod pipeline; // Ring buffer producer/consumer
pub mod plugin; // Codec plugin contract and backends
#[cfg(feature = "streaming")]
pub mod streaming; // Audio Output & Streaming

use std::collections::TryReserveError;

/// Output sample rate every backend renders at.
pub const MASTER_FREQUENCY: u32 = 44_100;

/// Interleaved samples per stereo frame.
pub const SAMPLES_PER_FRAME: usize = 2;

/// Error types for playback operations
#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    /// Allocation for a song buffer, decode context or ring failed
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Bad magic, count or offsets in a container, or a backend rejected the bytes
    #[error("Corrupt input: {0}")]
    CorruptInput(String),

    /// A backend failed while starting a track or generating frames
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    /// Requested track outside `[0, count)`
    #[error("Unsupported track {index} (track count: {count})")]
    UnsupportedTrack {
        /// Requested 0-based track index
        index: usize,
        /// Number of tracks in the song
        count: usize,
    },

    /// Requested voice outside `[0, count)`
    #[error("Invalid voice {voice} (voice count: {count})")]
    InvalidVoice {
        /// Requested voice index
        voice: usize,
        /// Number of voices the backend reports
        count: usize,
    },

    /// The backend exposes a single master voice that cannot be muted
    #[error("Voices cannot be toggled on the {0} backend")]
    VoiceToggleUnsupported(BackendKind),

    /// Operation needs a loaded (and initialized) song
    #[error("No song loaded")]
    NoSongLoaded,

    /// No engine was registered for the requested backend
    #[error("No engine registered for backend {0}")]
    BackendUnavailable(BackendKind),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Audio device error
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFileError(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TryReserveError> for PlayerError {
    fn from(err: TryReserveError) -> Self {
        PlayerError::OutOfMemory(err.to_string())
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlayerError>;

pub use container::{Container, ContainerFormat, ContainerLayout, SongBuffer, TrackIndexEntry};
pub use controller::{PlaybackController, SessionState, TrackChange, VoiceInfo, VoiceMuteTable};
pub use pipeline::{
    Consumer, FrameRing, PipelineConfig, PipelineStats, Producer, RefillOutcome, RefillSource,
    RefillTimer,
};
pub use plugin::{
    ArchiveBackend, BackendKind, BackendRegistry, Capabilities, ChipEngine, CodecPlugin,
    EngineError, GameMusicBackend, LibraryResolver, MultiFormatEngine, MusicEmulator, PcmEngine,
    TrackSelector,
};
