use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{LedSuitError, Result};

mod output;

pub use output::AudioPlayer;

/// Decoded PCM audio, interleaved when it has more than one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(LedSuitError::invalid("sample rate must be positive"));
        }
        if channels == 0 {
            return Err(LedSuitError::UnsupportedChannels(0));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Single channel clip.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(samples, sample_rate, 1)
    }

    /// Decodes a WAV file into normalised `f32` samples.
    pub fn load_wav(path: &Path) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        let clip = Self::new(samples, spec.sample_rate, spec.channels)?;
        tracing::info!(
            path = %path.display(),
            duration = clip.duration_seconds(),
            sample_rate = clip.sample_rate,
            channels = clip.channels,
            "loaded audio file"
        );
        Ok(clip)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Averages all channels into a single one.
    pub fn to_mono(&self) -> AudioClip {
        if self.channels == 1 {
            return self.clone();
        }

        let channels = self.channels as usize;
        let samples = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        AudioClip {
            samples,
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }
}

/// Playback position shared between the real-time audio thread, which
/// writes it, and the control thread, which polls it. Cloning yields another
/// handle onto the same position.
#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    shared: Arc<ClockState>,
}

#[derive(Debug, Default)]
struct ClockState {
    position_bits: AtomicU64,
    duration_bits: AtomicU64,
    playing: AtomicBool,
}

impl PlaybackClock {
    pub fn new(duration_seconds: f64) -> Self {
        let clock = Self::default();
        clock.set_duration(duration_seconds);
        clock
    }

    pub fn duration(&self) -> f64 {
        f64::from_bits(self.shared.duration_bits.load(Ordering::Acquire))
    }

    pub fn set_duration(&self, duration_seconds: f64) {
        let duration = if duration_seconds.is_finite() {
            duration_seconds.max(0.0)
        } else {
            0.0
        };
        self.shared
            .duration_bits
            .store(duration.to_bits(), Ordering::Release);
    }

    /// Current playback time in seconds.
    pub fn position(&self) -> f64 {
        f64::from_bits(self.shared.position_bits.load(Ordering::Acquire))
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    pub fn play(&self) {
        self.shared.playing.store(true, Ordering::Release);
    }

    pub fn pause(&self) {
        self.shared.playing.store(false, Ordering::Release);
    }

    /// Pauses and rewinds to the start.
    pub fn stop(&self) {
        self.pause();
        self.store_position(0.0);
    }

    /// Moves the playback position. Positions outside `[0, duration]` are
    /// rejected.
    pub fn seek(&self, seconds: f64) -> Result<()> {
        let duration = self.duration();
        if !(0.0..=duration).contains(&seconds) {
            return Err(LedSuitError::invalid(format!(
                "seek position {seconds:.3}s is outside 0..{duration:.3}s"
            )));
        }
        self.store_position(seconds);
        tracing::debug!(seconds, "seeked playback clock");
        Ok(())
    }

    /// Advances the position by `delta` seconds, saturating at the duration.
    /// Returns `true` once the end has been reached.
    pub fn advance(&self, delta: f64) -> bool {
        let duration = self.duration();
        let update = self.shared.position_bits.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |bits| {
                let next = (f64::from_bits(bits) + delta.max(0.0)).min(duration);
                Some(next.to_bits())
            },
        );
        let previous = match update {
            Ok(bits) | Err(bits) => f64::from_bits(bits),
        };
        previous + delta.max(0.0) >= duration
    }

    fn store_position(&self, seconds: f64) {
        self.shared
            .position_bits
            .store(seconds.to_bits(), Ordering::Release);
    }
}

/// Background thread that advances a [`PlaybackClock`] in wall time while it
/// is playing. Headless stand-in for [`AudioPlayer`] when no output device
/// is wanted.
#[derive(Debug)]
pub struct WallClockDriver {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WallClockDriver {
    pub fn spawn(clock: PlaybackClock, tick: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::spawn(move || {
            let mut last = Instant::now();
            while !stop_flag.load(Ordering::Acquire) {
                thread::sleep(tick);
                let now = Instant::now();
                let elapsed = now.duration_since(last).as_secs_f64();
                last = now;

                if clock.is_playing() && clock.advance(elapsed) {
                    clock.pause();
                    tracing::info!("playback finished");
                    break;
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Stops the thread and waits for it to exit.
    pub fn stop(mut self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| LedSuitError::msg("playback driver thread panicked")),
            None => Ok(()),
        }
    }
}

impl Drop for WallClockDriver {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.join_inner();
    }
}
