//! Offline rendering of a started track to audio files

mod wav;

pub use wav::{export_to_wav, export_to_wav_with_config};

use crate::{PlayerError, Result, MASTER_FREQUENCY};

/// Frames rendered per plugin call while exporting.
const RENDER_CHUNK_FRAMES: usize = 4096;

/// Export configuration
///
/// Output is always written at [`MASTER_FREQUENCY`], the rate every backend
/// renders at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportConfig {
    /// Length of the rendered audio in seconds
    pub duration_secs: f32,
    /// Linear fade applied to the last seconds (0 disables it)
    pub fade_out_duration: f32,
}

impl ExportConfig {
    /// Render `duration_secs` seconds at [`MASTER_FREQUENCY`] without a fade.
    pub fn seconds(duration_secs: f32) -> Self {
        ExportConfig {
            duration_secs,
            fade_out_duration: 0.0,
        }
    }

    /// Set the fade-out length.
    pub fn fade_out(mut self, seconds: f32) -> Self {
        self.fade_out_duration = seconds;
        self
    }

    /// Total stereo frames to render.
    pub fn frame_count(&self) -> usize {
        (self.duration_secs.max(0.0) * MASTER_FREQUENCY as f32).round() as usize
    }

    fn validate(&self) -> Result<()> {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(PlayerError::ConfigError(format!(
                "cannot render {}s of audio",
                self.duration_secs
            )));
        }
        Ok(())
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self::seconds(180.0).fade_out(3.0)
    }
}

/// Linearly fade the last `duration` seconds of interleaved stereo samples to silence.
pub(crate) fn apply_fade_out(samples: &mut [i16], duration: f32, sample_rate: u32) {
    let total_frames = samples.len() / crate::SAMPLES_PER_FRAME;
    let fade_frames = ((duration.max(0.0) * sample_rate as f32) as usize).min(total_frames);
    if fade_frames == 0 {
        return;
    }

    let start = total_frames - fade_frames;
    for (i, frame) in samples[start * crate::SAMPLES_PER_FRAME..]
        .chunks_exact_mut(crate::SAMPLES_PER_FRAME)
        .enumerate()
    {
        let gain = 1.0 - (i + 1) as f32 / fade_frames as f32;
        for sample in frame {
            *sample = (*sample as f32 * gain) as i16;
        }
    }
}
