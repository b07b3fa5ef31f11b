//! Reference chip engine playing raw PCM images.
//!
//! The image is read as interleaved little-endian i16 stereo frames and
//! looped forever. Useful for wiring a host up before a real emulator is
//! available, and as a deterministic engine in tests.

use super::engine::{ChipEngine, EngineError, EngineResult, LibraryResolver};
use crate::SAMPLES_PER_FRAME;
use std::sync::Arc;

/// Looping raw PCM [`ChipEngine`].
#[derive(Debug, Default)]
pub struct PcmEngine {
    samples: Vec<i16>,
    position: usize,
}

impl PcmEngine {
    /// Create an engine with nothing loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of complete frames in the loaded image.
    pub fn frame_count(&self) -> usize {
        self.samples.len() / SAMPLES_PER_FRAME
    }
}

impl ChipEngine for PcmEngine {
    fn start(&mut self, image: Vec<u8>, _libraries: Arc<dyn LibraryResolver>) -> EngineResult<()> {
        let frame_bytes = SAMPLES_PER_FRAME * 2;
        let whole = image.len() / frame_bytes * frame_bytes;
        if whole == 0 {
            return Err(EngineError::Unrecognized(format!(
                "{}-byte image holds no complete stereo frame",
                image.len()
            )));
        }

        self.samples = image[..whole]
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        self.position = 0;
        Ok(())
    }

    fn generate(&mut self, out: &mut [i16], frames: usize) -> EngineResult<()> {
        if self.samples.is_empty() {
            return Err(EngineError::Failed("no image started".into()));
        }
        let wanted = frames * SAMPLES_PER_FRAME;
        let out = out
            .get_mut(..wanted)
            .ok_or_else(|| EngineError::Failed(format!("output too short for {frames} frames")))?;

        let mut filled = 0;
        while filled < wanted {
            let chunk = (wanted - filled).min(self.samples.len() - self.position);
            out[filled..filled + chunk]
                .copy_from_slice(&self.samples[self.position..self.position + chunk]);
            filled += chunk;
            self.position = (self.position + chunk) % self.samples.len();
        }
        Ok(())
    }
}
