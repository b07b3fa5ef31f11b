//! Frame ring shared by the producer and the audio callback
//!
//! Cursors count frames monotonically and map into the sample array modulo
//! the capacity, so `read <= write <= read + capacity` always holds and the
//! backlog is simply `write - read`.
//!
//! # Thread Safety
//! - One [`Producer`] (host scheduler) advances `write`
//! - Any number of [`Consumer`] handles (audio callback) advance `read`
//! - One `parking_lot::Mutex` guards the array, both cursors and the epoch.
//!   Synthesis never happens while it is held.

use super::{PipelineConfig, CONSUMER_LOCK_TIMEOUT};
use crate::plugin::CodecPlugin;
use crate::{Result, SAMPLES_PER_FRAME};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// What a single producer invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefillOutcome {
    /// Backlog above the low-water mark, paused, or nothing started
    Idle,
    /// Frames were synthesized and published
    Filled {
        /// Number of frames published
        frames: usize,
    },
    /// The ring was reset while synthesizing; the frames were discarded
    Stale,
    /// Publishing would have exceeded the capacity; the frames were discarded
    Skipped,
    /// The plugin failed; production stays halted until the ring is reset
    DecodeFailed(String),
    /// A previous decode failure is still in effect
    Halted,
}

/// Pipeline health counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    /// Frames published by the producer
    pub frames_produced: u64,
    /// Frames handed to the consumer
    pub frames_consumed: u64,
    /// Consumer requests that could not be fully served while playing
    pub underruns: u64,
    /// Refills dropped because they would have overrun the ring
    pub skipped_refills: u64,
    /// Refills dropped because a reset happened during synthesis
    pub stale_refills: u64,
    /// Consumer calls that gave up waiting for the lock
    pub lock_timeouts: u64,
    /// Frames waiting to be consumed
    pub backlog_frames: usize,
    /// Backlog relative to capacity (0.0 to 1.0)
    pub fill_percentage: f32,
}

#[derive(Debug)]
struct RingState {
    samples: Box<[i16]>,
    read: u64,
    write: u64,
    /// Bumped on every reset; refills started under an older epoch are stale
    epoch: u64,
    prebuffering: bool,
    paused: bool,
    halted: bool,
    frames_produced: u64,
    frames_consumed: u64,
    underruns: u64,
    skipped_refills: u64,
    stale_refills: u64,
}

impl RingState {
    fn backlog(&self) -> usize {
        (self.write - self.read) as usize
    }
}

/// Fixed-capacity ring of interleaved stereo i16 frames.
#[derive(Debug)]
pub struct FrameRing {
    state: Mutex<RingState>,
    config: PipelineConfig,
    lock_timeouts: AtomicU64,
}

impl FrameRing {
    /// Allocate a ring sized by `config`.
    ///
    /// # Errors
    ///
    /// [`ConfigError`](crate::PlayerError::ConfigError) for an invalid
    /// configuration, [`OutOfMemory`](crate::PlayerError::OutOfMemory) when the
    /// sample array cannot be allocated.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let len = config.ring_capacity_frames * SAMPLES_PER_FRAME;
        let mut samples = Vec::new();
        samples.try_reserve_exact(len)?;
        samples.resize(len, 0i16);

        Ok(FrameRing {
            state: Mutex::new(RingState {
                samples: samples.into_boxed_slice(),
                read: 0,
                write: 0,
                epoch: 0,
                prebuffering: false,
                // Nothing to play until a track is started
                paused: true,
                halted: false,
                frames_produced: 0,
                frames_consumed: 0,
                underruns: 0,
                skipped_refills: 0,
                stale_refills: 0,
            }),
            config,
            lock_timeouts: AtomicU64::new(0),
        })
    }

    /// Configuration the ring was built with
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Capacity in frames
    pub fn capacity(&self) -> usize {
        self.config.ring_capacity_frames
    }

    /// Frames currently waiting to be consumed
    pub fn backlog(&self) -> usize {
        self.state.lock().backlog()
    }

    /// Raw `(read, write)` cursors
    pub fn cursors(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.read, state.write)
    }

    /// Stop the consumer pulling and the producer refilling.
    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    /// Let both sides run again.
    pub fn resume(&self) {
        self.state.lock().paused = false;
    }

    /// Whether the ring is paused
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Whether a decode failure has halted production
    pub fn is_halted(&self) -> bool {
        self.state.lock().halted
    }

    /// Empty the ring and start a new epoch.
    ///
    /// Both cursors move together under the lock. A refill that began before
    /// the reset is discarded when it tries to publish. With `prebuffer` the
    /// next refill tops up to the pre-buffer target instead of the normal one.
    pub fn reset(&self, prebuffer: bool) {
        let mut state = self.state.lock();
        state.read = 0;
        state.write = 0;
        state.epoch += 1;
        state.prebuffering = prebuffer;
        state.halted = false;
        trace!(epoch = state.epoch, "ring reset");
    }

    /// Snapshot of the health counters
    pub fn stats(&self) -> PipelineStats {
        let state = self.state.lock();
        let backlog = state.backlog();
        PipelineStats {
            frames_produced: state.frames_produced,
            frames_consumed: state.frames_consumed,
            underruns: state.underruns,
            skipped_refills: state.skipped_refills,
            stale_refills: state.stale_refills,
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            backlog_frames: backlog,
            fill_percentage: backlog as f32 / self.capacity() as f32,
        }
    }

    /// Create the producer side. Only one should be driven at a time.
    pub fn producer(self: &Arc<Self>) -> Producer {
        Producer {
            ring: Arc::clone(self),
            scratch: Vec::new(),
        }
    }

    /// Create a consumer handle.
    pub fn consumer(self: &Arc<Self>) -> Consumer {
        Consumer {
            ring: Arc::clone(self),
        }
    }
}

/// Copy `src` frames into the ring starting at frame index `start`,
/// splitting at the wrap boundary.
fn copy_into_ring(ring: &mut [i16], start: usize, src: &[i16]) {
    let start = start * SAMPLES_PER_FRAME;
    let first = src.len().min(ring.len() - start);
    ring[start..start + first].copy_from_slice(&src[..first]);
    ring[..src.len() - first].copy_from_slice(&src[first..]);
}

/// Copy ring frames starting at frame index `start` into `dest`,
/// splitting at the wrap boundary.
fn copy_from_ring(ring: &[i16], start: usize, dest: &mut [i16]) {
    let start = start * SAMPLES_PER_FRAME;
    let first = dest.len().min(ring.len() - start);
    dest[..first].copy_from_slice(&ring[start..start + first]);
    let rest = dest.len() - first;
    dest[first..].copy_from_slice(&ring[..rest]);
}

/// Refilling side of the pipeline.
pub struct Producer {
    ring: Arc<FrameRing>,
    scratch: Vec<i16>,
}

impl Producer {
    /// The ring this producer fills
    pub fn ring(&self) -> &Arc<FrameRing> {
        &self.ring
    }

    /// Top the backlog up from `plugin` if it has fallen below the low-water
    /// mark (or below the pre-buffer target right after a reset).
    ///
    /// The span to synthesize is requested from the plugin in one call, or two
    /// when it crosses the wrap boundary, into scratch storage. The lock is
    /// then taken once to copy the frames in and publish the write cursor.
    pub fn refill(&mut self, plugin: &mut dyn CodecPlugin) -> RefillOutcome {
        let capacity = self.ring.capacity();
        let config = *self.ring.config();

        let (write, epoch, frames) = {
            let mut state = self.ring.state.lock();
            if state.halted {
                return RefillOutcome::Halted;
            }
            if state.paused {
                return RefillOutcome::Idle;
            }

            let backlog = state.backlog();
            let target = if state.prebuffering {
                config.prebuffer_frames.max(config.refill_target_frames)
            } else if backlog < config.low_water_frames {
                config.refill_target_frames
            } else {
                return RefillOutcome::Idle;
            };
            let target = target.min(capacity);
            if backlog >= target {
                state.prebuffering = false;
                return RefillOutcome::Idle;
            }
            (state.write, state.epoch, target - backlog)
        };

        let samples = frames * SAMPLES_PER_FRAME;
        if self.scratch.len() < samples {
            if let Err(e) = self.scratch.try_reserve(samples - self.scratch.len()) {
                error!(error = %e, "refill scratch allocation failed");
                return RefillOutcome::Skipped;
            }
            self.scratch.resize(samples, 0);
        }

        let start = (write % capacity as u64) as usize;
        let first = frames.min(capacity - start);
        let second = frames - first;

        let scratch = &mut self.scratch[..samples];
        let (head, tail) = scratch.split_at_mut(first * SAMPLES_PER_FRAME);
        let generated = plugin
            .generate_stereo_frames(head, first)
            .and_then(|()| match second {
                0 => Ok(()),
                _ => plugin.generate_stereo_frames(tail, second),
            });

        let mut state = self.ring.state.lock();
        if let Err(e) = generated {
            if state.epoch == epoch && !state.halted {
                state.halted = true;
                error!(kind = %plugin.kind(), error = %e, "decode failed, production halted");
                return RefillOutcome::DecodeFailed(e.to_string());
            }
            state.stale_refills += 1;
            return RefillOutcome::Stale;
        }

        if state.epoch != epoch {
            state.stale_refills += 1;
            debug!(frames, "discarding refill from before reset");
            return RefillOutcome::Stale;
        }
        if state.backlog() + frames > capacity {
            state.skipped_refills += 1;
            debug!(frames, backlog = state.backlog(), "refill would overrun ring");
            return RefillOutcome::Skipped;
        }

        copy_into_ring(&mut state.samples, start, &self.scratch[..samples]);
        state.write += frames as u64;
        state.frames_produced += frames as u64;
        state.prebuffering = false;
        RefillOutcome::Filled { frames }
    }
}

/// Draining side of the pipeline, safe to call from an audio callback.
#[derive(Clone)]
pub struct Consumer {
    ring: Arc<FrameRing>,
}

impl Consumer {
    /// Fill `out` (interleaved stereo) from the ring.
    ///
    /// Copies `min(requested, available)` frames, advances the read cursor by
    /// exactly that many and pads the remainder with silence. Returns the
    /// number of frames copied. Gives up after a short bounded wait for the
    /// lock and returns silence instead of stalling the device.
    pub fn drain_into(&self, out: &mut [i16]) -> usize {
        let requested = out.len() / SAMPLES_PER_FRAME;

        let Some(mut state) = self.ring.state.try_lock_for(CONSUMER_LOCK_TIMEOUT) else {
            self.ring.lock_timeouts.fetch_add(1, Ordering::Relaxed);
            out.fill(0);
            return 0;
        };

        if state.paused {
            drop(state);
            out.fill(0);
            return 0;
        }

        let available = state.backlog();
        let frames = requested.min(available);
        if frames < requested {
            state.underruns += 1;
        }

        let copied = frames * SAMPLES_PER_FRAME;
        if frames > 0 {
            let start = (state.read % self.ring.capacity() as u64) as usize;
            copy_from_ring(&state.samples, start, &mut out[..copied]);
            state.read += frames as u64;
            state.frames_consumed += frames as u64;
        }
        drop(state);

        out[copied..].fill(0);
        frames
    }

    /// Frames currently available without underrun
    pub fn available(&self) -> usize {
        self.ring.backlog()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::SongBuffer;
    use crate::plugin::{BackendKind, Capabilities, TrackSelector};
    use crate::PlayerError;
    use std::sync::atomic::AtomicBool;
    use std::time::{Duration, Instant};

    /// Emits a rising frame counter on both channels; can be told to fail.
    #[derive(Default)]
    struct CountingPlugin {
        next: i16,
        calls: Vec<usize>,
        fail: bool,
    }

    impl CodecPlugin for CountingPlugin {
        fn kind(&self) -> BackendKind {
            BackendKind::Psf
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::empty()
        }
        fn init(&mut self, _song: SongBuffer) -> Result<()> {
            Ok(())
        }
        fn start_track(&mut self, _track: TrackSelector) -> Result<()> {
            Ok(())
        }
        fn generate_stereo_frames(&mut self, out: &mut [i16], frame_count: usize) -> Result<()> {
            if self.fail {
                return Err(PlayerError::DecodeFailure("boom".into()));
            }
            self.calls.push(frame_count);
            for frame in out[..frame_count * 2].chunks_exact_mut(2) {
                frame.fill(self.next);
                self.next = self.next.wrapping_add(1);
            }
            Ok(())
        }
        fn track_count(&self) -> usize {
            1
        }
        fn current_track(&self) -> usize {
            0
        }
        fn next_track(&mut self) -> usize {
            0
        }
        fn previous_track(&mut self) -> usize {
            0
        }
        fn voice_count(&self) -> usize {
            1
        }
        fn voice_name(&self, _voice: usize) -> Option<String> {
            None
        }
        fn set_voice_state(&mut self, _voice: usize, _enabled: bool) -> Result<()> {
            Ok(())
        }
    }

    fn config(capacity: usize, low: usize, target: usize) -> PipelineConfig {
        PipelineConfig {
            ring_capacity_frames: capacity,
            low_water_frames: low,
            refill_target_frames: target,
            prebuffer_frames: target,
            ..PipelineConfig::default()
        }
    }

    fn running_ring(config: PipelineConfig) -> Arc<FrameRing> {
        let ring = Arc::new(FrameRing::new(config).unwrap());
        ring.reset(false);
        ring.resume();
        ring
    }

    #[test]
    fn test_new_ring_is_paused_and_silent() {
        let ring = Arc::new(FrameRing::new(PipelineConfig::default()).unwrap());
        let mut out = [7i16; 8];
        assert_eq!(ring.consumer().drain_into(&mut out), 0);
        assert_eq!(out, [0; 8]);
        assert_eq!(ring.stats().underruns, 0, "paused reads are not underruns");
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(FrameRing::new(config(0, 0, 0)).is_err());
    }

    #[test]
    fn test_refill_only_below_low_water() {
        let ring = running_ring(config(64, 8, 16));
        let mut producer = ring.producer();
        let mut plugin = CountingPlugin::default();

        assert_eq!(producer.refill(&mut plugin), RefillOutcome::Filled { frames: 16 });
        assert_eq!(producer.refill(&mut plugin), RefillOutcome::Idle);

        let mut out = [0i16; 20];
        assert_eq!(ring.consumer().drain_into(&mut out), 10);
        assert_eq!(ring.backlog(), 6);
        assert_eq!(producer.refill(&mut plugin), RefillOutcome::Filled { frames: 10 });
        assert_eq!(ring.backlog(), 16);
    }

    #[test]
    fn test_wrap_splits_generation() {
        let ring = running_ring(config(16, 8, 12));
        let mut producer = ring.producer();
        let mut plugin = CountingPlugin::default();
        let consumer = ring.consumer();

        producer.refill(&mut plugin);
        let mut out = [0i16; 2 * 10];
        consumer.drain_into(&mut out);

        // write = 12, backlog 2: the next 10 frames span indices 12..16 and 0..6
        assert_eq!(producer.refill(&mut plugin), RefillOutcome::Filled { frames: 10 });
        assert_eq!(plugin.calls, vec![12, 4, 6]);

        let mut out = [0i16; 2 * 12];
        assert_eq!(consumer.drain_into(&mut out), 12);
        let left: Vec<i16> = out.chunks_exact(2).map(|f| f[0]).collect();
        assert_eq!(left, (10..22).collect::<Vec<i16>>());
    }

    #[test]
    fn test_over_request_is_short_copy() {
        let ring = running_ring(config(32, 4, 8));
        let mut producer = ring.producer();
        producer.refill(&mut CountingPlugin::default());

        let mut out = [9i16; 2 * 20];
        assert_eq!(ring.consumer().drain_into(&mut out), 8);
        assert!(out[16..].iter().all(|&s| s == 0));
        let (read, write) = ring.cursors();
        assert_eq!(read, write);
        assert_eq!(ring.stats().underruns, 1);

        // Empty ring: silence and no cursor movement
        assert_eq!(ring.consumer().drain_into(&mut out), 0);
        assert_eq!(ring.cursors(), (8, 8));
    }

    #[test]
    fn test_reset_discards_in_flight_refill() {
        let ring = running_ring(config(32, 4, 8));
        let mut producer = ring.producer();

        /// Resets the ring from inside synthesis, as a concurrent track switch would.
        struct ResettingPlugin {
            inner: CountingPlugin,
            ring: Arc<FrameRing>,
        }
        impl CodecPlugin for ResettingPlugin {
            fn kind(&self) -> BackendKind {
                self.inner.kind()
            }
            fn capabilities(&self) -> Capabilities {
                self.inner.capabilities()
            }
            fn init(&mut self, song: SongBuffer) -> Result<()> {
                self.inner.init(song)
            }
            fn start_track(&mut self, track: TrackSelector) -> Result<()> {
                self.inner.start_track(track)
            }
            fn generate_stereo_frames(&mut self, out: &mut [i16], n: usize) -> Result<()> {
                self.ring.reset(false);
                self.inner.generate_stereo_frames(out, n)
            }
            fn track_count(&self) -> usize {
                1
            }
            fn current_track(&self) -> usize {
                0
            }
            fn next_track(&mut self) -> usize {
                0
            }
            fn previous_track(&mut self) -> usize {
                0
            }
            fn voice_count(&self) -> usize {
                1
            }
            fn voice_name(&self, _voice: usize) -> Option<String> {
                None
            }
            fn set_voice_state(&mut self, _voice: usize, _enabled: bool) -> Result<()> {
                Ok(())
            }
        }

        let mut plugin = ResettingPlugin {
            inner: CountingPlugin::default(),
            ring: Arc::clone(&ring),
        };
        assert_eq!(producer.refill(&mut plugin), RefillOutcome::Stale);
        assert_eq!(ring.cursors(), (0, 0));
        assert_eq!(ring.stats().stale_refills, 1);
    }

    #[test]
    fn test_decode_failure_halts_until_reset() {
        let ring = running_ring(config(32, 4, 8));
        let mut producer = ring.producer();
        let mut plugin = CountingPlugin {
            fail: true,
            ..CountingPlugin::default()
        };

        assert!(matches!(producer.refill(&mut plugin), RefillOutcome::DecodeFailed(_)));
        assert_eq!(producer.refill(&mut plugin), RefillOutcome::Halted);
        assert!(ring.is_halted());

        plugin.fail = false;
        ring.reset(false);
        assert_eq!(producer.refill(&mut plugin), RefillOutcome::Filled { frames: 8 });
    }

    #[test]
    fn test_prebuffer_after_reset() {
        let mut cfg = config(64, 4, 8);
        cfg.prebuffer_frames = 32;
        let ring = running_ring(cfg);
        let mut producer = ring.producer();
        let mut plugin = CountingPlugin::default();

        ring.reset(true);
        assert_eq!(producer.refill(&mut plugin), RefillOutcome::Filled { frames: 32 });
        assert_eq!(producer.refill(&mut plugin), RefillOutcome::Idle);
    }

    #[test]
    fn test_paused_ring_does_not_refill() {
        let ring = running_ring(config(32, 4, 8));
        ring.pause();
        assert_eq!(
            ring.producer().refill(&mut CountingPlugin::default()),
            RefillOutcome::Idle
        );
    }

    #[test]
    fn test_threaded_producer_and_consumer_keep_order() {
        const FRAMES: usize = 200_000;
        let ring = running_ring(config(4096, 1024, 2048));
        let capacity = ring.capacity() as u64;
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let mut producer = ring.producer();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut plugin = CountingPlugin::default();
                while !stop.load(Ordering::Relaxed) {
                    producer.refill(&mut plugin);
                    plugin.calls.clear();
                    std::thread::yield_now();
                }
            })
        };

        let consumer = ring.consumer();
        let mut out = [0i16; 2 * 256];
        let mut expected = 0i16;
        let mut received = 0usize;
        let deadline = Instant::now() + Duration::from_secs(60);
        while received < FRAMES {
            assert!(Instant::now() < deadline, "stalled after {received} frames");
            let frames = consumer.drain_into(&mut out);
            for frame in out[..frames * 2].chunks_exact(2) {
                assert_eq!(frame[0], frame[1]);
                assert_eq!(frame[0], expected, "frame {received} out of order");
                expected = expected.wrapping_add(1);
                received += 1;
            }
            let (read, write) = ring.cursors();
            assert!(read <= write && write <= read + capacity, "cursors {read}/{write}");
            if frames == 0 {
                std::thread::yield_now();
            }
        }

        stop.store(true, Ordering::Relaxed);
        worker.join().unwrap();
        let stats = ring.stats();
        assert_eq!(stats.frames_consumed, received as u64);
        assert!(stats.frames_produced >= stats.frames_consumed);
        assert_eq!(stats.skipped_refills, 0);
    }

    #[test]
    fn test_stats_fill_percentage() {
        let ring = running_ring(config(100, 10, 50));
        ring.producer().refill(&mut CountingPlugin::default());
        let stats = ring.stats();
        assert_eq!(stats.frames_produced, 50);
        assert_eq!(stats.backlog_frames, 50);
        assert!((stats.fill_percentage - 0.5).abs() < f32::EPSILON);
    }
}
