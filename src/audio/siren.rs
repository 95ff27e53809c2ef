use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

/// Pulsed two-tone siren used as the grace-period alarm.
/// Alternates between `high_freq` and `low_freq` every half second with a
/// short gap so it stays audible over street noise.
pub struct SirenTone {
    high_freq: f32,
    low_freq: f32,
    sample_rate: u32,
    /// Position within the current one-second cycle. Both tones are whole
    /// hertz, so wrapping here keeps the waveform continuous.
    num_sample: u32,
}

impl SirenTone {
    pub fn new() -> Self {
        Self {
            high_freq: 960.0,
            low_freq: 720.0,
            sample_rate: 44100,
            num_sample: 0,
        }
    }
}

impl Iterator for SirenTone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let t = self.num_sample as f32 / self.sample_rate as f32;
        self.num_sample = (self.num_sample + 1) % self.sample_rate;

        // 50ms of silence at the end of each half cycle
        if (t % 0.5) > 0.45 {
            return Some(0.0);
        }

        let freq = if t < 0.5 {
            self.high_freq
        } else {
            self.low_freq
        };

        Some((2.0 * PI * freq * t).sin() * 0.35)
    }
}

impl Source for SirenTone {
    fn current_frame_len(&self) -> Option<usize> {
        None // Infinite stream
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None // Loops until the sink is stopped
    }
}
