//! Offline WAV render: drive a synth to end of stream and write 16-bit PCM
//! to disk, no audio device involved.
//!
//! This is the non-realtime sibling of the device output path; there is no
//! ring in between because the writer consumes frames as fast as the synth
//! renders them.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::info;

use crate::{
    buffering::FrameBuffer,
    engine::EngineConfig,
    error::Result,
    output::f32_to_i16,
    synth::SynthHandle,
};

/// Render `synth` from its current position to end of stream into a WAV file
/// at `path` (16-bit PCM, interleaved, `config.channels` x
/// `config.sample_rate`).
///
/// Returns the number of samples written per channel.
///
/// # Errors
/// Propagates synth render failures and `hound`/IO errors. A partially
/// written file is left on disk in that case.
pub fn render_to_wav(synth: &SynthHandle, path: &Path, config: &EngineConfig) -> Result<u64> {
    let spec = WavSpec {
        channels: config.channels as u16,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let mut frame = FrameBuffer::new(config.channels, config.frame_length);
    let mut synth = synth.0.lock();
    let mut written: u64 = 0;

    loop {
        let count = synth.render(&mut frame)?;
        if count == 0 {
            break;
        }
        for i in 0..count {
            for channel in 0..config.channels {
                writer.write_sample(f32_to_i16(frame.channel(channel)[i]))?;
            }
        }
        written += count as u64;
    }

    writer.finalize()?;
    info!(samples = written, path = %path.display(), "wav render complete");
    Ok(written)
}
