//! Pitch corrector - period-synchronous delay-line resampling
//!
//! A single read tap moves through the signal at `ratio` samples per output
//! sample. Its delay `d` (positive = past, negative = look-ahead) therefore
//! drifts by `1 - ratio` each sample. Before the tap runs out of history or
//! look-ahead it is moved by a whole number of detected periods and the two
//! taps are crossfaded. Both taps sit on the same phase of the waveform so
//! the crossfade neither cancels nor doubles energy.
//!
//! At ratio 1.0 with `d = 0` the tap reads the input sample-for-sample.

use pitchsnap_analysis::{ConfigError, PitchEstimate, Result};

/// Lowest applied pitch ratio (one octave down)
pub const MIN_RATIO: f32 = 0.5;
/// Highest applied pitch ratio (one octave up)
pub const MAX_RATIO: f32 = 2.0;

/// Minimum past input kept for the read tap, in samples
const MIN_HISTORY: usize = 2048;
/// Crossfade length bounds for tap relocation
const MIN_CROSSFADE: usize = 16;
const MAX_CROSSFADE: usize = 256;

/// Glide rate and wet/dry blend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionConfig {
    /// Fraction of the remaining ratio gap closed per hop, in (0, 1]
    pub retune_speed: f32,
    /// 0.0 = original signal, 1.0 = fully corrected
    pub strength: f32,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            retune_speed: 1.0,
            strength: 1.0,
        }
    }
}

impl CorrectionConfig {
    pub fn new(retune_speed: f32, strength: f32) -> Result<Self> {
        let config = Self {
            retune_speed,
            strength,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.retune_speed > 0.0 && self.retune_speed <= 1.0) {
            return Err(ConfigError::InvalidRetuneSpeed(self.retune_speed));
        }
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(ConfigError::InvalidStrength(self.strength));
        }
        Ok(())
    }
}

/// Persistent applied pitch ratio
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlideState {
    applied_ratio: f32,
}

impl Default for GlideState {
    fn default() -> Self {
        Self { applied_ratio: 1.0 }
    }
}

impl GlideState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ratio(&self) -> f32 {
        self.applied_ratio
    }

    /// Close `retune_speed` of the gap to `desired`, clamped to the ratio bounds
    pub fn step(&mut self, desired: f32, retune_speed: f32) -> f32 {
        let next = self.applied_ratio + (desired - self.applied_ratio) * retune_speed;
        self.applied_ratio = next.clamp(MIN_RATIO, MAX_RATIO);
        self.applied_ratio
    }

    pub fn reset(&mut self) {
        self.applied_ratio = 1.0;
    }
}

/// In-flight tap relocation
#[derive(Debug, Clone, Copy)]
struct Crossfade {
    /// Delay of the tap being faded in
    target: f32,
    position: usize,
}

/// Hop-by-hop pitch corrector
///
/// Holds its own copy of recent input so a hop can be read at a delay.
/// The glide state is owned by the caller and passed into every call.
pub struct PitchCorrector {
    sample_rate: f32,
    lookahead: usize,
    config: CorrectionConfig,
    /// Input immediately preceding the current hop, oldest first
    history: Vec<f32>,
    crossfade_len: usize,
    /// Tap delay bounds (see module docs)
    min_delay: f32,
    max_delay: f32,
    delay: f32,
    fade: Option<Crossfade>,
}

impl PitchCorrector {
    /// Corrector for hops followed by `lookahead` samples of future context
    pub fn new(sample_rate: u32, lookahead: usize) -> Self {
        let history_len = lookahead.max(MIN_HISTORY);
        let crossfade_len =
            (lookahead.saturating_sub(1) / 4).clamp(MIN_CROSSFADE, MAX_CROSSFADE);
        let fade = crossfade_len as f32;

        Self {
            sample_rate: sample_rate as f32,
            lookahead,
            config: CorrectionConfig::default(),
            history: vec![0.0; history_len],
            crossfade_len,
            // At most zero, so the unity-ratio tap is always in bounds
            min_delay: (fade - (lookahead as f32 - 1.0)).min(0.0),
            max_delay: (history_len - 1) as f32 - fade,
            delay: 0.0,
            fade: None,
        }
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    /// Replace the correction settings; the glide state is untouched
    pub fn set_config(&mut self, config: CorrectionConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Look-ahead expected after each hop
    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    /// Correct one hop into `out[..hop.len()]`
    ///
    /// `lookahead` is the input that follows `hop`. Unvoiced windows, a
    /// missing target and zero strength copy the hop through unchanged and
    /// leave `glide` where it was.
    pub fn correct(
        &mut self,
        hop: &[f32],
        lookahead: &[f32],
        estimate: &PitchEstimate,
        target_hz: Option<f32>,
        glide: &mut GlideState,
        out: &mut [f32],
    ) {
        let len = hop.len().min(out.len());
        let out = &mut out[..len];
        let hop = &hop[..len];

        let retune = match (estimate.voiced_frequency(), target_hz) {
            (Some(detected), Some(target)) if self.config.strength > 0.0 => {
                let desired = target / detected;
                (desired.is_finite() && desired > 0.0).then_some((detected, desired))
            }
            _ => None,
        };

        match retune {
            Some((detected, desired)) => {
                let from = glide.ratio();
                let to = glide.step(desired, self.config.retune_speed);
                let period = self.sample_rate / detected;
                self.shift(hop, lookahead, period, (from, to), out);

                let strength = self.config.strength;
                for (y, &x) in out.iter_mut().zip(hop) {
                    *y = (1.0 - strength) * x + strength * *y;
                }
            }
            None => {
                out.copy_from_slice(hop);
                self.delay = 0.0;
                self.fade = None;
            }
        }

        self.push_history(hop);
    }

    /// Forget history and tap position
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.delay = 0.0;
        self.fade = None;
    }

    /// Resample `hop` into `out`, ramping the ratio linearly across the hop
    fn shift(
        &mut self,
        hop: &[f32],
        lookahead: &[f32],
        period: f32,
        (from, to): (f32, f32),
        out: &mut [f32],
    ) {
        let len = out.len();
        let mut delay = self.delay;
        let mut fade = self.fade;

        for (i, y) in out.iter_mut().enumerate() {
            let ratio = from + (to - from) * (i + 1) as f32 / len as f32;
            let drift = 1.0 - ratio;

            if fade.is_none() {
                fade = self
                    .relocation(delay, period)
                    .map(|target| Crossfade { target, position: 0 });
            }

            let position = i as f32;
            let mut sample = read_tap(&self.history, hop, lookahead, position - delay);
            if let Some(f) = fade.as_mut() {
                let gain = (f.position as f32 + 0.5) / self.crossfade_len as f32;
                let incoming = read_tap(&self.history, hop, lookahead, position - f.target);
                sample = (1.0 - gain) * sample + gain * incoming;
                f.target += drift;
                f.position += 1;
            }
            *y = sample;

            delay += drift;
            if let Some(f) = fade {
                if f.position >= self.crossfade_len {
                    delay = f.target;
                    fade = None;
                }
            }
        }

        self.delay = delay;
        self.fade = fade;
    }

    /// New tap delay when `delay` has left its bounds
    fn relocation(&self, delay: f32, period: f32) -> Option<f32> {
        let (lo, hi) = (self.min_delay, self.max_delay);
        if delay < lo {
            let periods = ((hi - delay) / period).floor();
            Some(if periods >= 1.0 { delay + periods * period } else { hi })
        } else if delay > hi {
            let periods = ((delay - lo) / period).floor();
            Some(if periods >= 1.0 { delay - periods * period } else { lo })
        } else {
            None
        }
    }

    fn push_history(&mut self, hop: &[f32]) {
        let history_len = self.history.len();
        if hop.len() >= history_len {
            self.history.copy_from_slice(&hop[hop.len() - history_len..]);
        } else {
            self.history.copy_within(hop.len().., 0);
            self.history[history_len - hop.len()..].copy_from_slice(hop);
        }
    }
}

/// Linear-interpolated read at `t` samples from the start of the hop
///
/// Negative `t` reads history, `t >= hop.len()` reads look-ahead. Positions
/// outside the available span are clamped to its ends.
#[inline]
fn read_tap(history: &[f32], hop: &[f32], lookahead: &[f32], t: f32) -> f32 {
    let span = (hop.len() + lookahead.len()) as isize;
    let t = t.clamp(-(history.len() as f32), (span - 1) as f32);
    let base = t.floor();
    let frac = t - base;
    let index = base as isize;

    let at = |i: isize| -> f32 {
        if i < 0 {
            history[(history.len() as isize + i) as usize]
        } else if (i as usize) < hop.len() {
            hop[i as usize]
        } else {
            lookahead[i as usize - hop.len()]
        }
    };

    let s0 = at(index);
    let s1 = if index + 1 < span { at(index + 1) } else { s0 };
    s0 + (s1 - s0) * frac
}
