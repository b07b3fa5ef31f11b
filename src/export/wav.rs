//! WAV file export functionality

use super::{apply_fade_out, ExportConfig, RENDER_CHUNK_FRAMES};
use crate::plugin::CodecPlugin;
use crate::{PlayerError, Result, MASTER_FREQUENCY, SAMPLES_PER_FRAME};
use std::path::Path;
use tracing::info;

/// Render the started track to a 16-bit stereo WAV with [`ExportConfig::default`].
///
/// # Examples
///
/// ```no_run
/// use chipstream_player::export::export_to_wav;
/// use chipstream_player::{BackendKind, BackendRegistry, PcmEngine, SongBuffer, TrackSelector};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut registry = BackendRegistry::new();
/// registry.register_chip_engine(BackendKind::Psf, || Box::new(PcmEngine::new()))?;
/// let mut plugin = registry.create(BackendKind::Psf)?;
/// plugin.init(SongBuffer::from(std::fs::read("songs.psfarchive")?))?;
/// plugin.start_track(TrackSelector::Index(0))?;
///
/// export_to_wav(plugin.as_mut(), "output.wav")?;
/// # Ok(())
/// # }
/// ```
pub fn export_to_wav<P: AsRef<Path>>(plugin: &mut dyn CodecPlugin, output_path: P) -> Result<()> {
    export_to_wav_with_config(plugin, output_path, ExportConfig::default())
}

/// Render the started track to a 16-bit stereo WAV.
///
/// The plugin must already have a track started; rendering continues from
/// wherever its decode context currently is.
pub fn export_to_wav_with_config<P: AsRef<Path>>(
    plugin: &mut dyn CodecPlugin,
    output_path: P,
    config: ExportConfig,
) -> Result<()> {
    config.validate()?;
    let total_frames = config.frame_count();

    info!(
        frames = total_frames,
        track = plugin.current_track() + 1,
        "rendering track"
    );
    let mut samples = Vec::new();
    samples.try_reserve_exact(total_frames * SAMPLES_PER_FRAME)?;
    samples.resize(total_frames * SAMPLES_PER_FRAME, 0i16);

    for chunk in samples.chunks_mut(RENDER_CHUNK_FRAMES * SAMPLES_PER_FRAME) {
        let frames = chunk.len() / SAMPLES_PER_FRAME;
        plugin.generate_stereo_frames(chunk, frames)?;
    }

    if config.fade_out_duration > 0.0 {
        apply_fade_out(&mut samples, config.fade_out_duration, MASTER_FREQUENCY);
    }

    write_wav_file(output_path.as_ref(), &samples, MASTER_FREQUENCY)?;
    info!(path = %output_path.as_ref().display(), "export complete");
    Ok(())
}

/// Write interleaved stereo samples to a WAV file
fn write_wav_file(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: SAMPLES_PER_FRAME as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| PlayerError::AudioFileError(format!("failed to create WAV file: {e}")))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| PlayerError::AudioFileError(format!("failed to write sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| PlayerError::AudioFileError(format!("failed to finalize WAV file: {e}")))?;
    Ok(())
}
