use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{AudioClip, LedSuitError, Result, SpectrogramConfig};

/// Upper bound on the number of logarithmic frequency rows.
pub const MAX_LOG_BINS: usize = 128;

/// Floor applied before the display log scale, in normalised units.
const DISPLAY_FLOOR: f32 = 0.01;

/// Normalised, log-frequency magnitude matrix of a whole audio file.
///
/// Rows are frequency bins (row 0 is the lowest band), columns are time
/// frames. Values lie in `[0, 1]`. The matrix is never mutated after
/// [`SpectrogramEngine::compute`] returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrogram {
    values: Vec<Vec<f32>>,
    frames: usize,
    sample_rate: u32,
    max_frequency: f32,
    duration_seconds: f64,
    fft_size: usize,
    hop_size: usize,
}

impl Spectrogram {
    /// Spectrogram with no rows or frames, used before any audio is loaded.
    pub fn empty() -> Self {
        Self {
            values: Vec::new(),
            frames: 0,
            sample_rate: 0,
            max_frequency: 0.0,
            duration_seconds: 0.0,
            fft_size: 0,
            hop_size: 0,
        }
    }

    pub fn bins(&self) -> usize {
        self.values.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0 || self.values.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn max_frequency(&self) -> f32 {
        self.max_frequency
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn value(&self, bin: usize, frame: usize) -> Option<f32> {
        self.values.get(bin).and_then(|row| row.get(frame)).copied()
    }

    pub fn row(&self, bin: usize) -> Option<&[f32]> {
        self.values.get(bin).map(Vec::as_slice)
    }

    /// Frame that is playing at `seconds`, clamped to the last frame.
    pub fn frame_index_for_time(&self, seconds: f64) -> usize {
        if self.frames == 0 || self.duration_seconds <= 0.0 || !seconds.is_finite() {
            return 0;
        }
        let frame = (seconds.max(0.0) / self.duration_seconds * self.frames as f64) as usize;
        frame.min(self.frames - 1)
    }

    /// Box-filters the matrix down to `target_frames` x `target_bins` and
    /// applies the display log scale. The source matrix is left untouched.
    pub fn downsample(&self, target_frames: usize, target_bins: usize) -> DisplayGrid {
        let bins = self.bins();
        if self.is_empty() || target_frames == 0 || target_bins == 0 {
            return DisplayGrid::default();
        }

        let time_step = self.frames as f32 / target_frames as f32;
        let bin_step = bins as f32 / target_bins as f32;
        let mut values = vec![vec![0.0_f32; target_frames]; target_bins];

        for (i, out_row) in values.iter_mut().enumerate() {
            let bin_start = (i as f32 * bin_step) as usize;
            let bin_end = (((i + 1) as f32 * bin_step) as usize).min(bins);

            for (j, cell) in out_row.iter_mut().enumerate() {
                let frame_start = (j as f32 * time_step) as usize;
                let frame_end = (((j + 1) as f32 * time_step) as usize).min(self.frames);

                let mut sum = 0.0;
                let mut count = 0;
                for row in &self.values[bin_start..bin_end.max(bin_start)] {
                    for value in &row[frame_start..frame_end.max(frame_start)] {
                        sum += *value;
                        count += 1;
                    }
                }

                let average = if count > 0 { sum / count as f32 } else { 0.0 };
                *cell = display_scale(average);
            }
        }

        DisplayGrid {
            frames: target_frames,
            bins: target_bins,
            values,
        }
    }
}

/// Read-only display copy produced by [`Spectrogram::downsample`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayGrid {
    pub frames: usize,
    pub bins: usize,
    pub values: Vec<Vec<f32>>,
}

/// Maps `[0.01, 10]` logarithmically onto `[0, 1]`.
fn display_scale(value: f32) -> f32 {
    (value.max(DISPLAY_FLOOR).log10() - DISPLAY_FLOOR.log10()) / (10.0_f32.log10() - DISPLAY_FLOOR.log10())
}

/// HSV color of one spectrogram cell: blue for silence through red for the
/// loudest band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayColor {
    pub hue: u16,
    pub saturation: u8,
    pub value: u8,
}

pub fn display_color(normalized: f32) -> DisplayColor {
    let intensity = (normalized.clamp(0.0, 1.0) * 255.0) as i32;
    DisplayColor {
        hue: (240 - intensity).clamp(0, 240) as u16,
        saturation: 255,
        value: intensity.clamp(0, 255) as u8,
    }
}

/// Highest linear FFT bin that is kept for a given frequency cut-off.
pub fn max_bin_for(max_frequency: f32, sample_rate: u32, fft_size: usize) -> usize {
    let half = fft_size / 2;
    let nyquist = sample_rate as f32 / 2.0;
    if nyquist <= 0.0 || !max_frequency.is_finite() || max_frequency <= 0.0 {
        return 0;
    }
    let bin = (max_frequency / nyquist * half as f32) as usize;
    bin.min(half)
}

/// Edges of `log_bins` logarithmically spaced rows over linear bins
/// `0..=max_bin`. Row `i` averages linear bins `edges[i]..edges[i + 1]`.
pub fn log_bin_edges(max_bin: usize, log_bins: usize) -> Vec<usize> {
    if log_bins == 0 {
        return vec![0];
    }
    let span = ((max_bin + 1) as f64).log10();
    (0..=log_bins)
        .map(|i| {
            let edge = 10_f64.powf(i as f64 / log_bins as f64 * span) - 1.0;
            ((edge + 1e-9).floor().max(0.0) as usize).min(max_bin)
        })
        .collect()
}

/// Short-time FFT front end that turns mono PCM into a [`Spectrogram`].
pub struct SpectrogramEngine {
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl Default for SpectrogramEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrogramEngine {
    pub fn new() -> Self {
        Self {
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    /// Runs the analysis over the whole clip.
    ///
    /// Every frame is Hann-windowed and transformed; linear magnitudes up to
    /// `max_frequency` are averaged into at most [`MAX_LOG_BINS`] log-spaced
    /// rows. A second pass rescales everything by
    /// `log10(1 + v) / log10(1 + max)`.
    pub fn compute(&mut self, clip: &AudioClip, params: &SpectrogramConfig) -> Result<Spectrogram> {
        if clip.channels() != 1 {
            return Err(LedSuitError::UnsupportedChannels(clip.channels()));
        }
        let fft_size = params.fft_size;
        let hop_size = params.hop_size;
        if fft_size < 2 {
            return Err(LedSuitError::invalid("fft size must be at least 2"));
        }
        if hop_size == 0 {
            return Err(LedSuitError::invalid("hop size must be positive"));
        }
        let samples = clip.samples();
        if samples.len() < fft_size {
            return Err(LedSuitError::InsufficientSamples {
                samples: samples.len(),
                fft_size,
            });
        }
        if clip.sample_rate() != params.sample_rate {
            tracing::warn!(
                expected = params.sample_rate,
                actual = clip.sample_rate(),
                "analysing clip at its native sample rate"
            );
        }

        let sample_rate = clip.sample_rate();
        let frames = (samples.len() - fft_size) / hop_size + 1;
        let max_bin = max_bin_for(params.max_frequency, sample_rate, fft_size);
        let log_bins = max_bin.min(MAX_LOG_BINS);
        let edges = log_bin_edges(max_bin, log_bins);

        let mut values = vec![vec![0.0_f32; frames]; log_bins];
        let mut linear = vec![0.0_f32; max_bin + 1];
        let mut max_magnitude = 0.0_f32;

        let fft = self.prepare_fft(fft_size);
        for frame in 0..frames {
            let start = frame * hop_size;
            let window = &samples[start..start + fft_size];
            for ((input, sample), weight) in fft.input.iter_mut().zip(window).zip(&fft.window) {
                *input = sample * weight;
            }

            fft.plan
                .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

            for (magnitude, bin) in linear.iter_mut().zip(&fft.spectrum) {
                *magnitude = bin.norm();
            }

            for (row, range) in values.iter_mut().zip(edges.windows(2)) {
                let band = &linear[range[0]..range[1].max(range[0])];
                let average = if band.is_empty() {
                    0.0
                } else {
                    band.iter().sum::<f32>() / band.len() as f32
                };
                row[frame] = average;
                max_magnitude = max_magnitude.max(average);
            }
        }

        let log_max = (1.0 + max_magnitude).log10();
        for row in &mut values {
            for value in row.iter_mut() {
                *value = if log_max > 0.0 {
                    ((1.0 + *value).log10() / log_max).clamp(0.0, 1.0)
                } else {
                    0.0
                };
            }
        }

        tracing::info!(frames, bins = log_bins, max_bin, "spectrogram computed");

        Ok(Spectrogram {
            values,
            frames,
            sample_rate,
            max_frequency: params.max_frequency,
            duration_seconds: clip.duration_seconds(),
            fft_size,
            hop_size,
        })
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        if self.fft.as_ref().map(|fft| fft.size != size).unwrap_or(false) {
            self.fft = None;
        }

        let planner = &mut self.fft_planner;
        self.fft.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            FftResources {
                size,
                scratch: plan.make_scratch_vec(),
                spectrum: plan.make_output_vec(),
                input: plan.make_input_vec(),
                window: (0..size).map(|i| hann_value(i, size)).collect(),
                plan,
            }
        })
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
    window: Vec<f32>,
}

impl fmt::Debug for SpectrogramEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrogramEngine")
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
