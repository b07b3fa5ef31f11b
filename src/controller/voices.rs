//! Per-voice mute table that outlives decode contexts.

use crate::plugin::CodecPlugin;
use crate::{PlayerError, Result};

/// Most voices any backend exposes.
pub const MAX_VOICES: usize = 32;

/// Fixed-capacity mute flags indexed by voice number.
///
/// Kept by the controller rather than the backend so a track switch (which
/// may replace the whole decode context) does not lose them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceMuteTable {
    muted: [bool; MAX_VOICES],
}

impl VoiceMuteTable {
    /// All voices enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `voice` is muted. Voices past the table are never muted.
    pub fn is_muted(&self, voice: usize) -> bool {
        self.muted.get(voice).copied().unwrap_or(false)
    }

    /// Set one entry.
    pub fn set_muted(&mut self, voice: usize, muted: bool) -> Result<()> {
        let slot = self.muted.get_mut(voice).ok_or(PlayerError::InvalidVoice {
            voice,
            count: MAX_VOICES,
        })?;
        *slot = muted;
        Ok(())
    }

    /// Flip one entry and return the new muted state.
    pub fn toggle(&mut self, voice: usize) -> Result<bool> {
        let muted = !self.is_muted(voice);
        self.set_muted(voice, muted)?;
        Ok(muted)
    }

    /// Unmute everything.
    pub fn clear(&mut self) {
        self.muted = [false; MAX_VOICES];
    }

    /// Number of muted voices
    pub fn muted_count(&self) -> usize {
        self.muted.iter().filter(|&&m| m).count()
    }

    /// Push every entry below the plugin's voice count into the plugin.
    ///
    /// Does nothing for backends whose voices cannot be toggled.
    pub fn apply(&self, plugin: &mut dyn CodecPlugin) -> Result<()> {
        if !plugin.voices_can_be_toggled() {
            return Ok(());
        }
        let voices = plugin.voice_count().min(MAX_VOICES);
        for voice in 0..voices {
            plugin.set_voice_state(voice, !self.muted[voice])?;
        }
        Ok(())
    }
}
