//! Audio output through the system device
//!
//! Wraps a rodio sink whose source pulls from the pipeline [`Consumer`](crate::Consumer).
//! The device callback never waits on the producer: an empty or busy ring
//! is played as silence.

pub mod audio_device;

pub use audio_device::{AudioDevice, ConsumerSource};

/// Stereo frames pulled from the ring per batch.
pub const SOURCE_BATCH_FRAMES: usize = 1024;
