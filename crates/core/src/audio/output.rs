//! Audible playback through the default output device.

use std::{fmt, sync::Arc};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SizedSample,
};

use crate::{AudioClip, LedSuitError, PlaybackClock, Result};

/// Plays a clip on the default output device. The device callback is the
/// real-time thread that advances the [`PlaybackClock`]; the control thread
/// only starts, pauses and seeks it.
pub struct AudioPlayer {
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}

impl AudioPlayer {
    /// Opens the default output device and starts a stream that renders
    /// `clip` whenever `clock` is playing. Failing to get a device is fatal
    /// to the caller.
    pub fn start(clip: &AudioClip, clock: PlaybackClock) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| LedSuitError::AudioDevice("no output device available".into()))?;

        let supported = device
            .default_output_config()
            .map_err(|err| LedSuitError::AudioDevice(err.to_string()))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let renderer = ClipRenderer::new(clip, clock);
        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, renderer)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, renderer)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, renderer)?,
            format => {
                return Err(LedSuitError::AudioDevice(format!(
                    "unsupported sample format {format:?}"
                )))
            }
        };
        stream
            .play()
            .map_err(|err| LedSuitError::AudioDevice(err.to_string()))?;

        tracing::info!(
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio output started"
        );
        Ok(Self {
            _stream: stream,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl fmt::Debug for AudioPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioPlayer")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    renderer: ClipRenderer,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let rate = config.sample_rate.0;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                renderer.render(data, channels, rate)
            },
            |err| tracing::error!(%err, "audio output stream error"),
            None,
        )
        .map_err(|err| LedSuitError::AudioDevice(err.to_string()))
}

/// Callback side of the player: copies clip samples at the clock position
/// into device buffers and advances the clock by what it wrote.
#[derive(Debug, Clone)]
pub(crate) struct ClipRenderer {
    samples: Arc<[f32]>,
    channels: usize,
    sample_rate: u32,
    clock: PlaybackClock,
}

impl ClipRenderer {
    pub(crate) fn new(clip: &AudioClip, clock: PlaybackClock) -> Self {
        Self {
            samples: Arc::from(clip.samples()),
            channels: clip.channels() as usize,
            sample_rate: clip.sample_rate(),
            clock,
        }
    }

    /// Fills one interleaved device buffer. Nearest-sample resampling; clip
    /// channels wrap onto device channels, so mono plays on every speaker.
    pub(crate) fn render<T>(&self, data: &mut [T], out_channels: usize, out_rate: u32)
    where
        T: Sample + FromSample<f32>,
    {
        if !self.clock.is_playing() || out_channels == 0 || out_rate == 0 {
            data.fill(T::EQUILIBRIUM);
            return;
        }

        let total_frames = self.samples.len() / self.channels;
        let step = self.sample_rate as f64 / out_rate as f64;
        let mut source = self.clock.position() * self.sample_rate as f64;

        for frame in data.chunks_mut(out_channels) {
            let index = source as usize;
            for (channel, out) in frame.iter_mut().enumerate() {
                let value = if index < total_frames {
                    self.samples[index * self.channels + channel % self.channels]
                } else {
                    0.0
                };
                *out = T::from_sample(value);
            }
            source += step;
        }

        let frames = data.len() / out_channels;
        if self.clock.advance(frames as f64 / out_rate as f64) {
            self.clock.pause();
            tracing::info!("playback finished");
        }
    }
}
