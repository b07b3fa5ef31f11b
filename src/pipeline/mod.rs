//! Real-time ring buffer pipeline
//!
//! A periodic producer keeps a backlog of synthesized frames ahead of a
//! pull-based consumer (the audio callback):
//!
//! - [`Producer`]: tops the backlog up from a [`CodecPlugin`](crate::CodecPlugin)
//!   whenever it falls below the low-water mark. Synthesis happens outside the
//!   ring lock into producer-owned scratch storage.
//! - [`Consumer`]: copies whatever is available under a bounded lock wait and
//!   pads the rest with silence. It never blocks indefinitely.
//!
//! Both sides share one [`FrameRing`]. Memory use is fixed at the ring
//! capacity regardless of song length.

mod ring_buffer;
mod scheduler;

pub use ring_buffer::{Consumer, FrameRing, PipelineStats, Producer, RefillOutcome};
pub use scheduler::{RefillSource, RefillTimer};

use crate::{PlayerError, Result, MASTER_FREQUENCY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest the consumer waits for the ring lock before emitting silence.
pub const CONSUMER_LOCK_TIMEOUT: Duration = Duration::from_millis(1);

/// Largest ring the pipeline will allocate (512 MB of stereo i16 frames).
pub const MAX_RING_FRAMES: usize = 512 * 1024 * 1024 / (crate::SAMPLES_PER_FRAME * 2);

/// Configuration for the producer/consumer pipeline
///
/// All sizes are in stereo frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output sample rate in Hz. Every backend renders at
    /// [`MASTER_FREQUENCY`], so this is fixed to that value.
    pub sample_rate: u32,

    /// Ring capacity. Larger rings allow bigger backlogs, not more latency.
    pub ring_capacity_frames: usize,

    /// Backlog below which the producer refills
    pub low_water_frames: usize,

    /// Backlog a normal refill tops up to
    pub refill_target_frames: usize,

    /// Backlog the first refill after a track switch tops up to
    pub prebuffer_frames: usize,

    /// Interval between producer invocations in milliseconds
    pub producer_interval_ms: u64,
}

impl PipelineConfig {
    /// Small backlog for interactive use
    /// Target = 2048 frames ≈ 46ms @ 44.1kHz
    pub fn low_latency() -> Self {
        PipelineConfig {
            sample_rate: MASTER_FREQUENCY,
            ring_capacity_frames: 8192,
            low_water_frames: 1024,
            refill_target_frames: 2048,
            prebuffer_frames: 2048,
            producer_interval_ms: 5,
        }
    }

    /// Generous backlog for hosts with irregular scheduling
    /// Target = 16384 frames ≈ 372ms @ 44.1kHz
    pub fn stable() -> Self {
        PipelineConfig {
            sample_rate: MASTER_FREQUENCY,
            ring_capacity_frames: 44_100,
            low_water_frames: 8192,
            refill_target_frames: 16_384,
            prebuffer_frames: 16_384,
            producer_interval_ms: 5,
        }
    }

    /// Check the sample rate, mark ordering and sizes.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(PlayerError::ConfigError(msg));

        if self.sample_rate != MASTER_FREQUENCY {
            return fail(format!(
                "sample rate {} Hz is unsupported; backends render at {MASTER_FREQUENCY} Hz",
                self.sample_rate
            ));
        }
        if self.ring_capacity_frames == 0 {
            return fail("ring capacity must be greater than 0".into());
        }
        if self.ring_capacity_frames > MAX_RING_FRAMES {
            return fail(format!(
                "ring capacity {} exceeds maximum safe size {MAX_RING_FRAMES}",
                self.ring_capacity_frames
            ));
        }
        if self.refill_target_frames == 0 || self.refill_target_frames > self.ring_capacity_frames {
            return fail(format!(
                "refill target {} must lie in 1..={}",
                self.refill_target_frames, self.ring_capacity_frames
            ));
        }
        if self.low_water_frames > self.refill_target_frames {
            return fail(format!(
                "low-water mark {} is above the refill target {}",
                self.low_water_frames, self.refill_target_frames
            ));
        }
        if self.prebuffer_frames > self.ring_capacity_frames {
            return fail(format!(
                "pre-buffer target {} exceeds ring capacity {}",
                self.prebuffer_frames, self.ring_capacity_frames
            ));
        }
        if self.producer_interval_ms == 0 {
            return fail("producer interval must be greater than 0".into());
        }
        Ok(())
    }

    /// Steady-state backlog latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.refill_target_frames as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Producer interval as a [`Duration`]
    pub fn producer_interval(&self) -> Duration {
        Duration::from_millis(self.producer_interval_ms)
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_json::from_str(json).map_err(|e| PlayerError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PlayerError::ConfigError(e.to_string()))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            sample_rate: MASTER_FREQUENCY,
            ring_capacity_frames: 44_100,
            low_water_frames: 2048,
            refill_target_frames: 4096,
            prebuffer_frames: 8192,
            producer_interval_ms: 5,
        }
    }
}
