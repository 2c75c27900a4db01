//! # cadenza-core
//!
//! Reusable MIDI playback engine SDK.
//!
//! ## Architecture
//!
//! ```text
//! Synthesizer → producer loop (spawn_blocking) → FramePool (SPSC frame ring)
//!                                                      │
//!                                            cpal output callback
//!                                                      │
//!                                                audio device
//! ```
//!
//! The output callback is zero-alloc and non-blocking: on underrun it plays
//! silence and returns. All variable-time work (the synth render) happens on
//! the producer thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffering;
pub mod engine;
pub mod error;
pub mod events;
pub mod output;
pub mod synth;

// Convenience re-exports for downstream crates
pub use buffering::{FrameBuffer, FramePool};
pub use engine::{CadenzaEngine, DiagnosticsSnapshot, EngineConfig};
pub use error::CadenzaError;
pub use events::{PlaybackProgressEvent, PlayerStatus, PlayerStatusEvent};
pub use synth::{SineSynth, SynthHandle, Synthesizer};
