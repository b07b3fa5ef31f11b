//! Playback session control
//!
//! [`PlaybackController`] owns the active plugin and its decode context, the
//! voice mute table and the producer side of the pipeline. It mediates track
//! navigation so the audio callback only ever sees either silence or frames
//! of a fully started track.

mod voices;

pub use voices::{VoiceMuteTable, MAX_VOICES};

use crate::container::SongBuffer;
use crate::pipeline::{
    Consumer, FrameRing, PipelineConfig, PipelineStats, Producer, RefillOutcome, RefillSource,
};
use crate::plugin::{BackendKind, CodecPlugin, TrackSelector};
use crate::{PlayerError, Result};
use std::sync::Arc;
use tracing::{error, info};

/// Lifecycle of the playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No song loaded
    Empty,
    /// Song loaded and initialized, no track started yet
    Ready,
    /// A track is started and the pipeline is running
    Playing,
    /// Track started but the consumer is held silent
    Paused,
    /// Playback stopped; a track switch starts it again
    Stopped,
    /// Starting or decoding a track failed
    Failed,
}

/// Target of [`PlaybackController::switch_track`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackChange {
    /// 0-based track index
    Index(usize),
    /// Restart the selected track
    Current,
    /// Following track, wrapping to the first
    Next,
    /// Preceding track, wrapping to the last
    Previous,
}

/// One entry of the voice listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    /// Voice number
    pub index: usize,
    /// Name reported by the backend
    pub name: String,
    /// Whether the mute table silences this voice
    pub muted: bool,
}

/// Owns one playback session.
pub struct PlaybackController {
    ring: Arc<FrameRing>,
    producer: Producer,
    plugin: Option<Box<dyn CodecPlugin>>,
    mutes: VoiceMuteTable,
    state: SessionState,
}

impl PlaybackController {
    /// Create a controller with an empty, paused pipeline.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let ring = Arc::new(FrameRing::new(config)?);
        let producer = ring.producer();
        Ok(PlaybackController {
            ring,
            producer,
            plugin: None,
            mutes: VoiceMuteTable::new(),
            state: SessionState::Empty,
        })
    }

    /// Replace the active song.
    ///
    /// `bytes` are copied into a fresh [`SongBuffer`] and handed to
    /// `plugin.init`. On any failure nothing becomes active and the pipeline
    /// stays empty. On success every voice is unmuted and the session is
    /// [`SessionState::Ready`]; call [`switch_track`](Self::switch_track) to
    /// start playing.
    pub fn load_song(&mut self, bytes: &[u8], mut plugin: Box<dyn CodecPlugin>) -> Result<()> {
        self.ring.pause();
        self.ring.reset(false);
        self.plugin = None;
        self.state = SessionState::Empty;

        let song = SongBuffer::copy_from(bytes)?;
        if let Err(e) = plugin.init(song) {
            error!(kind = %plugin.kind(), error = %e, "song rejected");
            return Err(e);
        }

        info!(
            kind = %plugin.kind(),
            bytes = bytes.len(),
            tracks = plugin.track_count(),
            "song loaded"
        );
        self.mutes.clear();
        self.plugin = Some(plugin);
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Start another track and return its 0-based index.
    ///
    /// Invalid indices are rejected before anything changes. Otherwise the
    /// consumer is silenced, the ring emptied, the track started, the mute
    /// table re-applied and playback resumed, in that order. If the track
    /// cannot start or the mutes cannot be re-applied, the session is
    /// [`SessionState::Failed`] and the consumer stays silent.
    pub fn switch_track(&mut self, change: TrackChange) -> Result<usize> {
        let plugin = self.plugin.as_deref_mut().ok_or(PlayerError::NoSongLoaded)?;
        let count = plugin.track_count();
        let current = plugin.current_track();
        if count == 0 {
            return Err(PlayerError::UnsupportedTrack { index: current, count });
        }

        let target = match change {
            TrackChange::Index(index) if index >= count => {
                return Err(PlayerError::UnsupportedTrack { index, count });
            }
            TrackChange::Index(index) => index,
            TrackChange::Current => current,
            TrackChange::Next => (current + 1) % count,
            TrackChange::Previous => (current + count - 1) % count,
        };

        self.ring.pause();
        self.ring.reset(true);

        if let Err(e) = plugin.start_track(TrackSelector::Index(target)) {
            error!(track = target, error = %e, "track failed to start");
            self.state = SessionState::Failed;
            return Err(e);
        }
        if let Err(e) = self.mutes.apply(plugin) {
            error!(track = target, error = %e, "could not re-apply voice mutes");
            self.state = SessionState::Failed;
            return Err(e);
        }

        self.ring.resume();
        self.state = SessionState::Playing;
        info!(track = target + 1, of = count, "track started");
        Ok(target)
    }

    /// Flip one voice's mute state and push it to the backend.
    ///
    /// Returns whether the voice is now enabled.
    pub fn toggle_voice(&mut self, voice: usize) -> Result<bool> {
        let plugin = self.plugin.as_deref_mut().ok_or(PlayerError::NoSongLoaded)?;
        if !plugin.voices_can_be_toggled() {
            return Err(PlayerError::VoiceToggleUnsupported(plugin.kind()));
        }
        let count = plugin.voice_count();
        if voice >= count {
            return Err(PlayerError::InvalidVoice { voice, count });
        }

        let muted = self.mutes.toggle(voice)?;
        if let Err(e) = plugin.set_voice_state(voice, !muted) {
            self.mutes.set_muted(voice, !muted)?;
            return Err(e);
        }
        Ok(!muted)
    }

    /// Whether the mute table silences `voice`
    pub fn is_voice_muted(&self, voice: usize) -> bool {
        self.mutes.is_muted(voice)
    }

    /// The producer operation: refill the ring if needed.
    ///
    /// Call this periodically (every `producer_interval_ms`) from the host
    /// scheduler or let a [`RefillTimer`](crate::RefillTimer) do it.
    pub fn pump(&mut self) -> RefillOutcome {
        let Some(plugin) = self.plugin.as_deref_mut() else {
            return RefillOutcome::Idle;
        };
        let outcome = self.producer.refill(plugin);
        if matches!(outcome, RefillOutcome::DecodeFailed(_)) {
            self.state = SessionState::Failed;
        }
        outcome
    }

    /// Handle for the audio callback.
    pub fn consumer(&self) -> Consumer {
        self.ring.consumer()
    }

    /// Silence the consumer without losing the backlog.
    pub fn pause(&mut self) {
        if self.state == SessionState::Playing {
            self.ring.pause();
            self.state = SessionState::Paused;
        }
    }

    /// Undo [`pause`](Self::pause).
    pub fn resume(&mut self) {
        if self.state == SessionState::Paused {
            self.ring.resume();
            self.state = SessionState::Playing;
        }
    }

    /// Stop playback and empty the pipeline. The song stays loaded.
    pub fn stop(&mut self) {
        self.ring.pause();
        self.ring.reset(false);
        if self.plugin.is_some() {
            self.state = SessionState::Stopped;
        }
    }

    /// Session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Backend family of the loaded song
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.plugin.as_ref().map(|plugin| plugin.kind())
    }

    /// Tracks in the loaded song (0 when none is loaded)
    pub fn track_count(&self) -> usize {
        self.plugin.as_ref().map_or(0, |plugin| plugin.track_count())
    }

    /// Selected track as shown to users, counting from 1
    pub fn current_track_number(&self) -> Option<usize> {
        self.plugin.as_ref().map(|plugin| plugin.current_track() + 1)
    }

    /// Archive name of the selected track, if the container records one
    pub fn current_track_name(&self) -> Option<&str> {
        let plugin = self.plugin.as_ref()?;
        plugin.track_name(plugin.current_track())
    }

    /// Voices of the started track with their mute state
    pub fn voices(&self) -> Vec<VoiceInfo> {
        let Some(plugin) = self.plugin.as_ref() else {
            return Vec::new();
        };
        (0..plugin.voice_count())
            .map(|index| VoiceInfo {
                index,
                name: plugin
                    .voice_name(index)
                    .unwrap_or_else(|| format!("Voice {}", index + 1)),
                muted: self.mutes.is_muted(index),
            })
            .collect()
    }

    /// Whether the loaded backend can mute individual voices
    pub fn voices_can_be_toggled(&self) -> bool {
        self.plugin
            .as_ref()
            .is_some_and(|plugin| plugin.voices_can_be_toggled())
    }

    /// Pipeline health counters
    pub fn stats(&self) -> PipelineStats {
        self.ring.stats()
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        self.ring.config()
    }

    /// Mutable access to the loaded plugin, for offline rendering.
    ///
    /// Generating frames through it advances the same decode context the
    /// producer uses.
    pub fn plugin_mut(&mut self) -> Option<&mut (dyn CodecPlugin + 'static)> {
        self.plugin.as_deref_mut()
    }
}

impl RefillSource for PlaybackController {
    fn pump(&mut self) -> RefillOutcome {
        PlaybackController::pump(self)
    }
}
