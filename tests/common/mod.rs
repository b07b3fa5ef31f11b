//! Shared fixtures for integration tests
#![allow(dead_code)]

use chipstream_player::{plugin::EngineResult, EngineError, MultiFormatEngine, MusicEmulator};
use parking_lot::Mutex;
use std::sync::Arc;

/// Little-endian bytes of interleaved samples.
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Decode little-endian i16 samples.
pub fn decode_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Mute calls observed by every emulator a [`ToneEngine`] has opened.
pub type MuteLog = Arc<Mutex<Vec<(usize, bool)>>>;

/// Multi-format engine whose songs are `b"TONE" + [track_count, voice_count]`.
///
/// Each track plays a constant `track index + 1` on both channels, zeroed
/// while voice 0 is muted.
#[derive(Default)]
pub struct ToneEngine {
    pub mutes: MuteLog,
}

impl MultiFormatEngine for ToneEngine {
    fn open(&self, data: &[u8], _sample_rate: u32) -> EngineResult<Box<dyn MusicEmulator>> {
        match data {
            [b'T', b'O', b'N', b'E', tracks, voices, ..] => Ok(Box::new(ToneEmulator {
                tracks: *tracks as usize,
                voices: *voices as usize,
                current: None,
                muted: vec![false; *voices as usize],
                log: Arc::clone(&self.mutes),
            })),
            _ => Err(EngineError::Unrecognized("not a tone song".into())),
        }
    }
}

struct ToneEmulator {
    tracks: usize,
    voices: usize,
    current: Option<usize>,
    muted: Vec<bool>,
    log: MuteLog,
}

impl MusicEmulator for ToneEmulator {
    fn track_count(&self) -> usize {
        self.tracks
    }

    fn start_track(&mut self, track: usize) -> EngineResult<()> {
        if track >= self.tracks {
            return Err(EngineError::Failed(format!("no track {track}")));
        }
        self.current = Some(track);
        Ok(())
    }

    fn play(&mut self, out: &mut [i16]) -> EngineResult<()> {
        let track = self
            .current
            .ok_or_else(|| EngineError::Failed("not started".into()))?;
        let level = if self.muted.first().copied().unwrap_or(false) {
            0
        } else {
            track as i16 + 1
        };
        out.fill(level);
        Ok(())
    }

    fn voice_count(&self) -> usize {
        self.voices
    }

    fn voice_name(&self, voice: usize) -> Option<String> {
        Some(format!("Pulse {}", voice + 1))
    }

    fn mute_voice(&mut self, voice: usize, muted: bool) {
        if let Some(slot) = self.muted.get_mut(voice) {
            *slot = muted;
        }
        self.log.lock().push((voice, muted));
    }
}

/// A tone song with the given track and voice counts.
pub fn tone_song(tracks: u8, voices: u8) -> Vec<u8> {
    vec![b'T', b'O', b'N', b'E', tracks, voices]
}
