//! Fundamental frequency detection via normalized autocorrelation
//!
//! The autocorrelation of a window is computed through the FFT
//! (power spectrum, then inverse transform) on a buffer zero-padded to at
//! least twice the window, so every lag is a true linear sum. Each lag is
//! normalized by the number of overlapping sample pairs, which keeps the
//! multiples of the period at about the same height as the period itself.
//! The detector therefore takes the *first* peak that comes close to the
//! strongest one instead of the strongest alone.

use crate::error::{ConfigError, Result};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;
use tracing::debug;

/// Detector tuning knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Lowest frequency reported as voiced (Hz)
    ///
    /// Lags are searched up to half the window, so the effective floor is
    /// never below `sample_rate / (window / 2)`; see
    /// [`effective_min_frequency`](Self::effective_min_frequency).
    pub min_frequency: f32,
    /// Highest frequency reported as voiced (Hz)
    pub max_frequency: f32,
    /// Minimum `r(lag) / r(0)` for a voiced decision
    pub voiced_threshold: f32,
    /// Mean-square energy below which a window counts as silence
    pub silence_threshold: f32,
    /// Weight of the previous smoothed value, 0.0 disables smoothing
    pub smoothing: f32,
    /// A peak within this fraction of the strongest one wins if it comes first
    pub octave_tolerance: f32,
    /// Refine the peak lag with parabolic interpolation
    pub interpolate: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_frequency: 50.0,
            max_frequency: 1000.0,
            voiced_threshold: 0.3,
            silence_threshold: 1e-6,
            smoothing: 0.8,
            octave_tolerance: 0.9,
            interpolate: true,
        }
    }
}

impl DetectorConfig {
    /// Check every knob against the sample rate the detector will run at
    pub fn validate(&self, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(sample_rate));
        }
        let nyquist = sample_rate as f32 / 2.0;
        if !(self.min_frequency.is_finite()
            && self.max_frequency.is_finite()
            && self.min_frequency > 0.0
            && self.min_frequency < self.max_frequency
            && self.max_frequency <= nyquist)
        {
            return Err(ConfigError::InvalidFrequencyRange {
                min: self.min_frequency,
                max: self.max_frequency,
            });
        }
        if !(0.0..=1.0).contains(&self.voiced_threshold) {
            return Err(ConfigError::InvalidDetectorParameter {
                name: "voiced_threshold",
                value: self.voiced_threshold,
            });
        }
        if !(self.silence_threshold.is_finite() && self.silence_threshold >= 0.0) {
            return Err(ConfigError::InvalidDetectorParameter {
                name: "silence_threshold",
                value: self.silence_threshold,
            });
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ConfigError::InvalidDetectorParameter {
                name: "smoothing",
                value: self.smoothing,
            });
        }
        if !(self.octave_tolerance > 0.0 && self.octave_tolerance <= 1.0) {
            return Err(ConfigError::InvalidDetectorParameter {
                name: "octave_tolerance",
                value: self.octave_tolerance,
            });
        }
        Ok(())
    }

    /// Lowest frequency a `window_len`-sample window can report as voiced
    pub fn effective_min_frequency(&self, sample_rate: u32, window_len: usize) -> f32 {
        let max_lag = (window_len / 2).max(1);
        self.min_frequency.max(sample_rate as f32 / max_lag as f32)
    }
}

/// Unsmoothed result of analyzing a single window
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawPitch {
    /// Candidate frequency, `None` when no correlation peak exists
    pub frequency_hz: Option<f32>,
    pub confidence: f32,
    pub voiced: bool,
}

/// Smoothed, voicing-gated pitch estimate
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchEstimate {
    /// Smoothed frequency. While unvoiced this is the held value, if any.
    pub frequency_hz: Option<f32>,
    /// Confidence of the current window in [0, 1]
    pub confidence: f32,
    pub voiced: bool,
}

impl PitchEstimate {
    /// Frequency to correct toward from, only present when voiced
    pub fn voiced_frequency(&self) -> Option<f32> {
        if self.voiced {
            self.frequency_hz
        } else {
            None
        }
    }
}

/// Cross-window smoothing state
///
/// Voiced windows are blended in exponentially. Unvoiced windows leave the
/// value untouched so short gaps (consonants, breaths) do not make the
/// estimate sag toward zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct PitchTracker {
    smoothed: Option<f32>,
}

impl PitchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last smoothed frequency
    pub fn current(&self) -> Option<f32> {
        self.smoothed
    }

    /// Blend a voiced frequency in; the first one is taken as-is
    pub fn update(&mut self, frequency_hz: f32, smoothing: f32) -> f32 {
        let next = match self.smoothed {
            Some(previous) => smoothing * previous + (1.0 - smoothing) * frequency_hz,
            None => frequency_hz,
        };
        self.smoothed = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.smoothed = None;
    }
}

/// Autocorrelation pitch detector
///
/// All buffers are sized at construction for `max_window` samples, so
/// [`analyze`](Self::analyze) and [`detect`](Self::detect) never allocate.
pub struct PitchDetector {
    sample_rate: u32,
    max_window: usize,
    config: DetectorConfig,
    fft_size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    /// Pre-allocated FFT buffers
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Normalized autocorrelation, indexed by lag
    correlation: Vec<f32>,
}

impl PitchDetector {
    /// Detector with default tuning for windows of up to `max_window` samples
    pub fn new(sample_rate: u32, max_window: usize) -> Result<Self> {
        Self::with_config(sample_rate, max_window, DetectorConfig::default())
    }

    pub fn with_config(sample_rate: u32, max_window: usize, config: DetectorConfig) -> Result<Self> {
        config.validate(sample_rate)?;
        let max_window = max_window.max(2);
        let fft_size = (2 * max_window).next_power_of_two();

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        debug!(sample_rate, max_window, fft_size, "pitch detector planned");

        Ok(Self {
            sample_rate,
            max_window,
            config,
            fft_size,
            forward,
            inverse,
            spectrum: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            correlation: vec![0.0; max_window / 2 + 2],
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Longest window analyzed; longer input is truncated to this
    pub fn max_window(&self) -> usize {
        self.max_window
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Lowest frequency detectable at the full window length
    pub fn lowest_detectable_frequency(&self) -> f32 {
        self.config.effective_min_frequency(self.sample_rate, self.max_window)
    }

    /// Swap in new tuning; the old tuning stays on error
    pub fn set_config(&mut self, config: DetectorConfig) -> Result<()> {
        config.validate(self.sample_rate)?;
        self.config = config;
        Ok(())
    }

    /// Analyze one window without any cross-window smoothing
    pub fn analyze(&mut self, window: &[f32]) -> RawPitch {
        let len = window.len().min(self.max_window);
        if len < 2 {
            return RawPitch::default();
        }
        let window = &window[..len];

        let energy = window.iter().map(|x| x * x).sum::<f32>() / len as f32;
        if !(energy > self.config.silence_threshold) {
            return RawPitch::default();
        }

        let sr = self.sample_rate as f32;
        let min_lag = ((sr / self.config.max_frequency).floor() as usize).max(1);
        let max_lag = ((sr / self.config.min_frequency).ceil() as usize).min(len / 2);
        if max_lag <= min_lag {
            return RawPitch::default();
        }

        self.autocorrelate(window, max_lag + 1);
        let r = &self.correlation;
        let r0 = r[0];

        // Strongest lag in range
        let mut best_lag = min_lag;
        let mut best = f32::NEG_INFINITY;
        for (lag, &value) in r.iter().enumerate().take(max_lag + 1).skip(min_lag) {
            if value > best {
                best = value;
                best_lag = lag;
            }
        }
        if !(best > 0.0 && r0 > 0.0) {
            return RawPitch::default();
        }

        // First local peak that comes close to the strongest one
        let threshold = self.config.octave_tolerance * best;
        let is_peak = |lag: usize| r[lag] >= r[lag - 1] && r[lag] >= r[lag + 1];
        let lag = (min_lag..=max_lag)
            .find(|&lag| r[lag] >= threshold && is_peak(lag))
            .unwrap_or(best_lag);

        let mut period = lag as f32;
        if self.config.interpolate {
            let (a, b, c) = (r[lag - 1], r[lag], r[lag + 1]);
            let denominator = a - 2.0 * b + c;
            if denominator < 0.0 {
                period += (0.5 * (a - c) / denominator).clamp(-0.5, 0.5);
            }
        }

        let frequency = sr / period;
        let confidence = (r[lag] / r0).clamp(0.0, 1.0);
        let in_range =
            frequency >= self.config.min_frequency && frequency <= self.config.max_frequency;

        RawPitch {
            frequency_hz: Some(frequency),
            confidence,
            voiced: confidence >= self.config.voiced_threshold && in_range,
        }
    }

    /// Analyze one window and fold the result into `tracker`
    pub fn detect(&mut self, window: &[f32], tracker: &mut PitchTracker) -> PitchEstimate {
        let raw = self.analyze(window);
        match raw.frequency_hz {
            Some(frequency) if raw.voiced => PitchEstimate {
                frequency_hz: Some(tracker.update(frequency, self.config.smoothing)),
                confidence: raw.confidence,
                voiced: true,
            },
            _ => PitchEstimate {
                frequency_hz: tracker.current(),
                confidence: raw.confidence,
                voiced: false,
            },
        }
    }

    /// Fill `correlation[..=max_lag]` with `Σ x[i]·x[i+lag] / (len − lag)`
    fn autocorrelate(&mut self, window: &[f32], max_lag: usize) {
        let len = window.len();
        for (slot, &x) in self.spectrum.iter_mut().zip(window) {
            *slot = Complex::new(x, 0.0);
        }
        for slot in self.spectrum.iter_mut().skip(len) {
            *slot = Complex::new(0.0, 0.0);
        }

        self.forward
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);
        for bin in self.spectrum.iter_mut() {
            *bin = Complex::new(bin.norm_sqr(), 0.0);
        }
        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        // rustfft leaves the round trip scaled by the transform size
        let scale = 1.0 / self.fft_size as f32;
        for (lag, value) in self.correlation.iter_mut().enumerate().take(max_lag + 1) {
            *value = self.spectrum[lag].re * scale / (len - lag) as f32;
        }
    }
}
