//! Audio device integration using rodio

use super::SOURCE_BATCH_FRAMES;
use crate::pipeline::Consumer;
use crate::{PlayerError, Result, MASTER_FREQUENCY, SAMPLES_PER_FRAME};
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// rodio source draining the pipeline in batches.
pub struct ConsumerSource {
    consumer: Consumer,
    finished: Arc<AtomicBool>,
    /// Batch buffer so the ring lock is taken once per batch, not per sample
    buffer: Vec<i16>,
    buffer_pos: usize,
}

impl ConsumerSource {
    /// Create a stereo source at [`MASTER_FREQUENCY`].
    pub fn new(consumer: Consumer, finished: Arc<AtomicBool>) -> Self {
        let len = SOURCE_BATCH_FRAMES * SAMPLES_PER_FRAME;
        ConsumerSource {
            consumer,
            finished,
            buffer: vec![0; len],
            buffer_pos: len,
        }
    }
}

impl Source for ConsumerSource {
    fn current_frame_len(&self) -> Option<usize> {
        // Format never changes mid-stream
        None
    }

    fn channels(&self) -> u16 {
        SAMPLES_PER_FRAME as u16
    }

    fn sample_rate(&self) -> u32 {
        MASTER_FREQUENCY
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for ConsumerSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        if self.buffer_pos >= self.buffer.len() {
            // Underrun padding is already silence
            self.consumer.drain_into(&mut self.buffer);
            self.buffer_pos = 0;
        }

        let sample = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        Some(sample)
    }
}

/// Audio playback device using rodio
pub struct AudioDevice {
    _stream: OutputStream,
    sink: Sink,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl AudioDevice {
    /// Open the default output device and start pulling from `consumer`.
    pub fn new(consumer: Consumer) -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default().map_err(|e| {
            PlayerError::AudioDeviceError(format!("failed to open output stream: {e}"))
        })?;
        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| PlayerError::AudioDeviceError(format!("failed to create sink: {e}")))?;

        let finished = Arc::new(AtomicBool::new(false));
        sink.append(ConsumerSource::new(consumer, Arc::clone(&finished)));
        info!(sample_rate = MASTER_FREQUENCY, "audio device started");

        Ok(AudioDevice {
            _stream: stream,
            sink,
            running: Arc::new(AtomicBool::new(true)),
            finished,
        })
    }

    /// Pause the device
    pub fn pause(&self) {
        self.sink.pause();
    }

    /// Resume the device
    pub fn play(&self) {
        self.sink.play();
    }

    /// Whether the device has not been dropped
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Let the source end instead of playing silence forever.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    /// Block until the sink drains (only returns after [`finish`](Self::finish)).
    pub fn wait_for_finish(&self) {
        self.sink.sleep_until_end();
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.pause();
        self.running.store(false, Ordering::Relaxed);
    }
}
