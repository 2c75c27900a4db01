//! Planar PCM frame: the unit of transfer between the synth producer and the
//! output callback.

/// A fixed-shape block of multichannel PCM, one sample array per channel.
///
/// Allocated once when the pool is built; contents are overwritten in place
/// by the producer and copied out by the consumer. The shape never changes
/// after construction.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// One planar sample array per channel, each `frame_length` long.
    planes: Vec<Vec<f32>>,
    frame_length: usize,
}

impl FrameBuffer {
    /// Allocate a zeroed frame with `channels` planes of `frame_length`
    /// samples each.
    pub fn new(channels: usize, frame_length: usize) -> Self {
        Self {
            planes: vec![vec![0.0; frame_length]; channels],
            frame_length,
        }
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    /// Samples per channel.
    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// Immutable view of one channel's samples.
    ///
    /// # Panics
    /// Panics if `channel >= self.channels()`.
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.planes[channel]
    }

    /// Mutable view of one channel's samples.
    ///
    /// # Panics
    /// Panics if `channel >= self.channels()`.
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.planes[channel]
    }

    /// Zero every sample in every channel.
    pub fn silence(&mut self) {
        for plane in &mut self.planes {
            plane.fill(0.0);
        }
    }

    /// Zero the tail of every channel starting at sample index `from`.
    ///
    /// Used when the synth renders short: the committed frame must still be
    /// `frame_length` samples of defined audio.
    pub fn fill_tail_silence(&mut self, from: usize) {
        let from = from.min(self.frame_length);
        for plane in &mut self.planes {
            plane[from..].fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FrameBuffer;

    #[test]
    fn new_frame_has_requested_shape_and_is_silent() {
        let frame = FrameBuffer::new(2, 128);
        assert_eq!(frame.channels(), 2);
        assert_eq!(frame.frame_length(), 128);
        for c in 0..2 {
            assert_eq!(frame.channel(c).len(), 128);
            assert!(frame.channel(c).iter().all(|s| *s == 0.0));
        }
    }

    #[test]
    fn fill_tail_silence_keeps_head_intact() {
        let mut frame = FrameBuffer::new(2, 8);
        for c in 0..2 {
            frame.channel_mut(c).fill(0.5);
        }
        frame.fill_tail_silence(3);
        for c in 0..2 {
            assert_eq!(frame.channel(c)[..3], [0.5, 0.5, 0.5]);
            assert!(frame.channel(c)[3..].iter().all(|s| *s == 0.0));
        }
    }

    #[test]
    fn fill_tail_silence_past_end_is_a_no_op() {
        let mut frame = FrameBuffer::new(1, 4);
        frame.channel_mut(0).fill(1.0);
        frame.fill_tail_silence(9);
        assert!(frame.channel(0).iter().all(|s| *s == 1.0));
    }
}
