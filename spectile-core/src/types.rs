use std::sync::Arc;

/// Decoded audio as handed over by the playback engine.
///
/// Channel data is shared with playback; anything that needs to own samples
/// (the render worker) takes a fresh copy via [`AudioBuffer::channel_copy`].
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    channels: Vec<Arc<Vec<f32>>>,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::from_channels(vec![samples], sample_rate)
    }

    /// Build from planar channel data. Channels shorter than the first are
    /// kept as-is; duration follows the first channel.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.first().map(|c| c.len()).unwrap_or(0);
        let duration_secs = if sample_rate == 0 {
            0.0
        } else {
            frames as f64 / sample_rate as f64
        };
        Self {
            channels: channels.into_iter().map(Arc::new).collect(),
            sample_rate,
            duration_secs,
        }
    }

    /// Split interleaved frames into planar channels.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        let channel_count = channel_count.max(1);
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, &s) in channels.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        Self::from_channels(channels, sample_rate)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    /// Owned copy of one channel, safe to move across a thread boundary
    /// without touching the buffer backing playback.
    pub fn channel_copy(&self, index: usize) -> Vec<f32> {
        self.channel(index).map(<[f32]>::to_vec).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_first_channel() {
        let buf = AudioBuffer::mono(vec![0.0; 48_000 * 3], 48_000);
        assert!((buf.duration_secs - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_interleaved_split() {
        let buf = AudioBuffer::from_interleaved(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 2, 10);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.channel(0), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(buf.channel(1), Some(&[-1.0, -2.0, -3.0][..]));
        assert!((buf.duration_secs - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_channel_copy_leaves_source_intact() {
        let buf = AudioBuffer::mono(vec![0.5; 16], 8);
        let mut copy = buf.channel_copy(0);
        copy.clear();
        assert_eq!(buf.channel(0).map(|c| c.len()), Some(16));
    }

    #[test]
    fn test_zero_sample_rate_has_no_duration() {
        let buf = AudioBuffer::mono(vec![0.0; 16], 0);
        assert_eq!(buf.duration_secs, 0.0);
    }
}
