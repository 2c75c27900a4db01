//! `SineSynth`: stub backend that renders a fixed-length test tone.
//!
//! Stands in for a native MIDI synth during development and in tests: fully
//! deterministic (sample values depend only on absolute position), finite,
//! seekable. Lets the engine, ring and WAV paths run end-to-end with no
//! native library and no audio hardware.

use std::f32::consts::TAU;

use tracing::debug;

use crate::buffering::FrameBuffer;
use crate::error::Result;
use crate::synth::Synthesizer;

/// Deterministic sine tone generator.
pub struct SineSynth {
    sample_rate: u32,
    frequency: f32,
    amplitude: f32,
    total_samples: u64,
    position: u64,
}

impl SineSynth {
    /// A tone of `frequency` Hz lasting `total_samples` samples.
    pub fn new(sample_rate: u32, frequency: f32, total_samples: u64) -> Self {
        Self {
            sample_rate,
            frequency,
            amplitude: 0.25,
            total_samples,
            position: 0,
        }
    }

    fn sample_at(&self, position: u64) -> f32 {
        let t = position as f32 / self.sample_rate as f32;
        self.amplitude * (TAU * self.frequency * t).sin()
    }
}

impl Synthesizer for SineSynth {
    fn warm_up(&mut self) -> Result<()> {
        debug!("SineSynth::warm_up is a no-op");
        Ok(())
    }

    fn render(&mut self, frame: &mut FrameBuffer) -> Result<usize> {
        let remaining = self.total_samples.saturating_sub(self.position);
        let count = (frame.frame_length() as u64).min(remaining) as usize;

        for i in 0..count {
            let sample = self.sample_at(self.position + i as u64);
            for channel in 0..frame.channels() {
                frame.channel_mut(channel)[i] = sample;
            }
        }

        self.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        self.position = position.min(self.total_samples);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn total_samples(&self) -> Option<u64> {
        Some(self.total_samples)
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}
