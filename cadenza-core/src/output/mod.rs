//! Audio playback via cpal backend.
//!
//! # Design constraints
//!
//! The cpal output callback runs on an OS audio thread at elevated (up to
//! TIME_CRITICAL on Windows) priority. It **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! This module satisfies that contract by draining the frame ring through
//! [`FramePool::take`], which only touches atomic cursors and an uncontended
//! `try_lock`. When the ring is empty the callback writes silence for the
//! rest of the cycle, counts an underrun and returns; it never waits for the
//! producer.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioOutput` therefore must be created and dropped on the same
//! thread. The engine accomplishes this by calling `open_with_preference`
//! inside `spawn_blocking`, on the thread that then runs the producer loop.

pub mod device;
pub mod wav;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::{
    buffering::FramePool,
    engine::{EngineConfig, PlaybackDiagnostics},
    error::{CadenzaError, Result},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active audio output stream.
///
/// **Not `Send`**: `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct AudioOutput {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag; set to `false` to make the callback emit silence only.
    running: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Open an output device by preferred name, otherwise fall back to the
    /// default output device and then the first available device, and start
    /// a stream at the configured rate and channel count.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        pool: FramePool,
        running: Arc<AtomicBool>,
        paused: Arc<AtomicBool>,
        diagnostics: Arc<PlaybackDiagnostics>,
        config: &EngineConfig,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.output_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });

                    if selected_device.is_none() {
                        warn!(
                            "preferred output device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list output devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_output_device() {
            default
        } else {
            let mut devices = host
                .output_devices()
                .map_err(|e| CadenzaError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(CadenzaError::NoDefaultOutputDevice)?;
            warn!("no default output device, falling back to first available output");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening output device"
        );

        let supported = device
            .default_output_config()
            .map_err(|e| CadenzaError::AudioDevice(e.to_string()))?;

        let channels = u16::try_from(config.channels).map_err(|_| {
            CadenzaError::InvalidConfig(format!("unsupported channel count: {}", config.channels))
        })?;

        info!(
            sample_rate = config.sample_rate,
            channels,
            frame_length = config.frame_length,
            "audio config requested"
        );

        let stream_config = StreamConfig {
            channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let mut feeder = FrameFeeder::new(pool, Arc::clone(&running), paused, diagnostics, config);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info| {
                    feeder.fill(data);
                },
                |err| error!("audio stream error: {err}"),
                None,
            ),

            SampleFormat::I16 => {
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _info| {
                        mix_buf.resize(data.len(), 0.0);
                        feeder.fill(&mut mix_buf);
                        for (dst, src) in data.iter_mut().zip(mix_buf.iter()) {
                            *dst = f32_to_i16(*src);
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            SampleFormat::U8 => {
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [u8], _info| {
                        mix_buf.resize(data.len(), 0.0);
                        feeder.fill(&mut mix_buf);
                        for (dst, src) in data.iter_mut().zip(mix_buf.iter()) {
                            *dst = f32_to_u8(*src);
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(CadenzaError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| CadenzaError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CadenzaError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
        })
    }

    /// Open the system default output device.
    ///
    /// Must be called from the thread that will also drop this value. In
    /// practice this means calling it inside `tokio::task::spawn_blocking`.
    ///
    /// # Errors
    /// Returns `CadenzaError::NoDefaultOutputDevice` when no output device is
    /// available, or `CadenzaError::AudioStream` if cpal fails to build the
    /// stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(
        pool: FramePool,
        running: Arc<AtomicBool>,
        paused: Arc<AtomicBool>,
        diagnostics: Arc<PlaybackDiagnostics>,
        config: &EngineConfig,
    ) -> Result<Self> {
        Self::open_with_preference(pool, running, paused, diagnostics, config, None)
    }

    /// Stop: signal the callback to emit silence on its next invocation.
    #[cfg(feature = "audio-cpal")]
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioOutput {
    pub fn open_with_preference(
        _pool: FramePool,
        _running: Arc<AtomicBool>,
        _paused: Arc<AtomicBool>,
        _diagnostics: Arc<PlaybackDiagnostics>,
        _config: &EngineConfig,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(CadenzaError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(
        pool: FramePool,
        running: Arc<AtomicBool>,
        paused: Arc<AtomicBool>,
        diagnostics: Arc<PlaybackDiagnostics>,
        config: &EngineConfig,
    ) -> Result<Self> {
        Self::open_with_preference(pool, running, paused, diagnostics, config, None)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Callback-side state: drains whole frames from the ring and hands out
/// interleaved f32 samples in whatever sized chunks the device asks for.
///
/// The scratch buffer is allocated once up front; the callback itself only
/// copies.
#[cfg(any(feature = "audio-cpal", test))]
struct FrameFeeder {
    pool: FramePool,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    diagnostics: Arc<PlaybackDiagnostics>,
    channels: usize,
    /// Current frame, interleaved. Refilled from the ring when exhausted.
    scratch: Vec<f32>,
    scratch_pos: usize,
}

#[cfg(any(feature = "audio-cpal", test))]
impl FrameFeeder {
    fn new(
        pool: FramePool,
        running: Arc<AtomicBool>,
        paused: Arc<AtomicBool>,
        diagnostics: Arc<PlaybackDiagnostics>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            pool,
            running,
            paused,
            diagnostics,
            channels: config.channels,
            scratch: Vec::with_capacity(config.channels * config.frame_length),
            scratch_pos: 0,
        }
    }

    /// Fill `out` with interleaved samples; silence wherever no data is
    /// available. Bounded time, no blocking, no allocation.
    fn fill(&mut self, out: &mut [f32]) {
        if !self.running.load(Ordering::Relaxed) || self.paused.load(Ordering::Relaxed) {
            out.fill(0.0);
            return;
        }

        let mut written = 0;
        while written < out.len() {
            if self.scratch_pos >= self.scratch.len() {
                match self.pool.take() {
                    Some(frame) => {
                        interleave(&frame, self.channels, &mut self.scratch);
                        self.scratch_pos = 0;
                        self.diagnostics.frames_played.fetch_add(1, Ordering::Relaxed);
                    }
                    None => {
                        // Underrun: substitute silence for the rest of this
                        // cycle and return immediately.
                        self.diagnostics.underruns.fetch_add(1, Ordering::Relaxed);
                        out[written..].fill(0.0);
                        return;
                    }
                }
            }

            let available = self.scratch.len() - self.scratch_pos;
            let count = (out.len() - written).min(available);
            out[written..written + count]
                .copy_from_slice(&self.scratch[self.scratch_pos..self.scratch_pos + count]);
            written += count;
            self.scratch_pos += count;
        }
    }
}

/// Interleave a planar frame into `dst`, preserving channel order.
/// `dst` must have been allocated with sufficient capacity; `resize` within
/// capacity does not allocate.
#[cfg(any(feature = "audio-cpal", test))]
fn interleave(frame: &crate::buffering::FrameBuffer, channels: usize, dst: &mut Vec<f32>) {
    let frame_length = frame.frame_length();
    dst.resize(channels * frame_length, 0.0);
    for channel in 0..channels {
        let plane = frame.channel(channel);
        for (i, sample) in plane.iter().enumerate() {
            dst[i * channels + channel] = *sample;
        }
    }
}

pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32_767.0) as i16
}

#[cfg(any(feature = "audio-cpal", test))]
fn f32_to_u8(sample: f32) -> u8 {
    ((sample.clamp(-1.0, 1.0) * 127.0) + 128.0) as u8
}
