//! Synthesis backend abstraction.
//!
//! The `Synthesizer` trait decouples the producer loop from any specific
//! backend (stub tone generator, a native MIDI synth binding, a decoder).
//! The shape mirrors what a sequencing synth actually offers: render the
//! next block, seek to a sample position, report progress.
//!
//! `&mut self` on `render` intentionally expresses that backends are
//! stateful: sequencer position, voice state, reverb tails. All mutation is
//! serialised through `SynthHandle`'s `parking_lot::Mutex`.

pub mod stub;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffering::FrameBuffer;
use crate::error::Result;

pub use stub::SineSynth;

/// Contract for synthesis backends.
pub trait Synthesizer: Send + 'static {
    /// One-time setup: load instrument patches, allocate voice state. Called
    /// once before playback starts.
    ///
    /// # Errors
    /// Returns an error if backend resources are missing or corrupt.
    fn warm_up(&mut self) -> Result<()>;

    /// Render the next block of audio into `frame`, writing the same number
    /// of samples into every channel starting at sample 0.
    ///
    /// # Returns
    /// The number of samples written per channel. `0` means end of stream.
    /// A short count (`0 < n < frame.frame_length()`) is valid for the final
    /// block; the caller pads the tail with silence.
    ///
    /// May take variable time; it is never called from the real-time path.
    fn render(&mut self, frame: &mut FrameBuffer) -> Result<usize>;

    /// Jump to an absolute sample position.
    fn seek(&mut self, position: u64) -> Result<()>;

    /// Current playback position in samples.
    fn position(&self) -> u64;

    /// Approximate total length in samples, if known.
    fn total_samples(&self) -> Option<u64>;

    /// Reset all internal state (e.g. between playback sessions).
    fn reset(&mut self);
}

/// Thread-safe reference-counted handle to any `Synthesizer` implementor.
///
/// Uses `parking_lot::Mutex` for non-poisoning locks; the producer loop is
/// the only steady-state lock holder, control calls (seek, warm-up) contend
/// only briefly.
#[derive(Clone)]
pub struct SynthHandle(pub Arc<Mutex<dyn Synthesizer>>);

impl SynthHandle {
    /// Wrap any `Synthesizer` in a `SynthHandle`.
    pub fn new<S: Synthesizer>(synth: S) -> Self {
        Self(Arc::new(Mutex::new(synth)))
    }
}

impl std::fmt::Debug for SynthHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthHandle").finish_non_exhaustive()
    }
}
