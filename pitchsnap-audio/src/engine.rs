//! Pitch-correction engine - orchestrates buffer, detector, quantizer and corrector
//!
//! Each hop cycle:
//! 1. Swap in any pending configuration
//! 2. Peek one window from the stream buffer and detect its pitch
//! 3. Read one hop, snap the pitch to the scale and correct the hop
//!
//! The stream buffer is primed with `window - hop` zeros, so output lags
//! input by exactly that many samples from the very first call.

use crate::corrector::{CorrectionConfig, GlideState, PitchCorrector};
use crate::report::{report_channel, PitchReport, ReportReader, ReportWriter};
use crate::stream_buffer::StreamBuffer;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use pitchsnap_analysis::{
    ConfigError, DetectorConfig, PitchDetector, PitchEstimate, PitchTracker, Result, ScaleConfig,
    ScaleQuantizer,
};
use tracing::{debug, info, warn};

/// Fixed construction parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Analysis span per detection, hop plus look-ahead
    pub window_size: usize,
    /// New samples consumed per cycle
    pub hop_size: usize,
    /// Stream buffer slots; one is kept free
    pub buffer_capacity: usize,
    pub detector: DetectorConfig,
}

impl EngineConfig {
    pub fn new(
        sample_rate: u32,
        window_size: usize,
        hop_size: usize,
        buffer_capacity: usize,
    ) -> Self {
        Self {
            sample_rate,
            window_size,
            hop_size,
            buffer_capacity,
            detector: DetectorConfig::default(),
        }
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.hop_size == 0 || self.window_size <= self.hop_size {
            return Err(ConfigError::InvalidFrameSizes {
                window: self.window_size,
                hop: self.hop_size,
            });
        }
        if self.buffer_capacity <= self.window_size {
            return Err(ConfigError::BufferTooSmall {
                capacity: self.buffer_capacity,
                window: self.window_size,
            });
        }
        self.detector.validate(self.sample_rate)
    }

    /// Constant input-to-output delay in samples
    pub fn latency_samples(&self) -> usize {
        self.window_size - self.hop_size
    }

    /// Lowest pitch the window can detect, at least `detector.min_frequency`
    pub fn lowest_detectable_frequency(&self) -> f32 {
        self.detector
            .effective_min_frequency(self.sample_rate, self.window_size)
    }
}

/// Where the engine is within its hop cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    /// Fewer than one window of unread samples
    #[default]
    AwaitingInput,
    /// A full window is buffered and about to be processed
    WindowReady,
    /// The last cycle emitted a corrected hop
    Emitted,
}

/// Running counters, cleared by [`Engine::reset`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub hops_processed: u64,
    pub voiced_hops: u64,
    pub samples_in: u64,
    pub samples_out: u64,
    /// Input not accepted because the buffer was full
    pub samples_rejected: u64,
    pub backpressure_events: u64,
    pub config_swaps: u64,
    pub reports_dropped: u64,
}

/// Scale and correction settings swapped in together
#[derive(Debug, Clone, Copy, PartialEq)]
struct ConfigUpdate {
    scale: ScaleConfig,
    correction: CorrectionConfig,
}

impl ConfigUpdate {
    fn new(scale: ScaleConfig, correction: CorrectionConfig) -> Result<Self> {
        scale.validate()?;
        correction.validate()?;
        Ok(Self { scale, correction })
    }
}

/// Cross-thread handle for reconfiguring a running engine
///
/// Backed by a single-slot channel. A submission that finds the slot still
/// occupied evicts the older value, so the engine always picks up the most
/// recent settings at its next hop boundary.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: Sender<ConfigUpdate>,
    /// Used only to evict a stale update
    rx: Receiver<ConfigUpdate>,
}

impl ConfigHandle {
    /// Validate and hand over new settings; never blocks
    pub fn submit(&self, scale: ScaleConfig, correction: CorrectionConfig) -> Result<()> {
        let mut update = ConfigUpdate::new(scale, correction)?;
        loop {
            match self.tx.try_send(update) {
                Ok(()) => break,
                Err(TrySendError::Full(rejected)) => {
                    let _ = self.rx.try_recv();
                    update = rejected;
                }
                // Unreachable while this handle holds a receiver
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
        debug!(scale = %scale, "config submitted");
        Ok(())
    }

    /// True if an update is waiting for the engine
    pub fn is_pending(&self) -> bool {
        !self.tx.is_empty()
    }
}

/// Output of one [`Engine::process`] call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Processed<'a> {
    /// Corrected samples emitted by this call, whole hops only
    pub samples: &'a [f32],
    /// Input samples accepted; the caller resubmits the rest later
    pub consumed: usize,
}

/// Real-time pitch-correction engine
///
/// Intended for exclusive use by one audio thread. All buffers are sized at
/// construction, so [`process`](Self::process) does not allocate.
pub struct Engine {
    config: EngineConfig,
    buffer: StreamBuffer,
    detector: PitchDetector,
    tracker: PitchTracker,
    quantizer: ScaleQuantizer,
    corrector: PitchCorrector,
    glide: GlideState,
    /// Scratch for the peeked window and the consumed hop
    window: Vec<f32>,
    hop: Vec<f32>,
    output: Vec<f32>,
    /// Set by `configure`, applied at the next hop boundary
    staged: Option<ConfigUpdate>,
    pending_tx: Sender<ConfigUpdate>,
    pending_rx: Receiver<ConfigUpdate>,
    reports: Option<ReportWriter>,
    state: CycleState,
    hop_count: u64,
    last_estimate: PitchEstimate,
    stats: EngineStats,
}

impl Engine {
    pub fn new(
        sample_rate: u32,
        window_size: usize,
        hop_size: usize,
        buffer_capacity: usize,
    ) -> Result<Self> {
        Self::with_config(EngineConfig::new(
            sample_rate,
            window_size,
            hop_size,
            buffer_capacity,
        ))
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let detector =
            PitchDetector::with_config(config.sample_rate, config.window_size, config.detector)?;
        let (pending_tx, pending_rx) = bounded(1);

        let mut engine = Self {
            config,
            buffer: StreamBuffer::new(config.buffer_capacity),
            detector,
            tracker: PitchTracker::new(),
            quantizer: ScaleQuantizer::default(),
            corrector: PitchCorrector::new(config.sample_rate, config.latency_samples()),
            glide: GlideState::new(),
            window: vec![0.0; config.window_size],
            hop: vec![0.0; config.hop_size],
            output: Vec::with_capacity(config.buffer_capacity),
            staged: None,
            pending_tx,
            pending_rx,
            reports: None,
            state: CycleState::AwaitingInput,
            hop_count: 0,
            last_estimate: PitchEstimate::default(),
            stats: EngineStats::default(),
        };
        engine.prime();

        let floor = config.lowest_detectable_frequency();
        if floor > config.detector.min_frequency {
            warn!(
                min_frequency = config.detector.min_frequency,
                effective = floor,
                window = config.window_size,
                "window too short for the detection floor"
            );
        }
        info!(
            sample_rate = config.sample_rate,
            window = config.window_size,
            hop = config.hop_size,
            capacity = config.buffer_capacity,
            latency = config.latency_samples(),
            "pitch engine ready"
        );
        Ok(engine)
    }

    /// Stage new settings for the next hop boundary
    ///
    /// On error nothing is staged and the current settings stay in force.
    pub fn configure(&mut self, scale: ScaleConfig, correction: CorrectionConfig) -> Result<()> {
        let update = ConfigUpdate::new(scale, correction)?;
        info!(
            scale = %scale,
            retune_speed = correction.retune_speed,
            strength = correction.strength,
            "engine reconfigured"
        );
        self.staged = Some(update);
        Ok(())
    }

    /// Handle for reconfiguring from another thread
    pub fn config_handle(&self) -> ConfigHandle {
        ConfigHandle {
            tx: self.pending_tx.clone(),
            rx: self.pending_rx.clone(),
        }
    }

    /// Start emitting one [`PitchReport`] per hop, replacing any earlier reader
    pub fn attach_reports(&mut self, capacity: usize) -> ReportReader {
        let (writer, reader) = report_channel(capacity);
        self.reports = Some(writer);
        debug!(capacity, "pitch reports attached");
        reader
    }

    pub fn detach_reports(&mut self) {
        self.reports = None;
    }

    /// Accept input and emit every hop that became complete
    ///
    /// `consumed` may be less than `input.len()` when the buffer is full;
    /// that is backpressure, not an error.
    pub fn process(&mut self, input: &[f32]) -> Processed<'_> {
        self.output.clear();

        let consumed = self.buffer.write(input);
        self.stats.samples_in += consumed as u64;
        if consumed < input.len() {
            self.stats.samples_rejected += (input.len() - consumed) as u64;
            self.stats.backpressure_events += 1;
        }

        let hop_size = self.config.hop_size;
        self.state = CycleState::AwaitingInput;
        while self.buffer.available() >= self.config.window_size {
            self.state = CycleState::WindowReady;
            self.apply_pending();

            self.buffer.peek(&mut self.window);
            let estimate = self.detector.detect(&self.window, &mut self.tracker);
            self.buffer.read(&mut self.hop);

            let target = estimate
                .voiced_frequency()
                .and_then(|frequency| self.quantizer.snap(frequency));

            let start = self.output.len();
            self.output.resize(start + hop_size, 0.0);
            self.corrector.correct(
                &self.hop,
                &self.window[hop_size..],
                &estimate,
                target,
                &mut self.glide,
                &mut self.output[start..],
            );

            self.emit_report(&estimate, target);
            self.last_estimate = estimate;
            self.hop_count += 1;
            self.stats.hops_processed += 1;
            if estimate.voiced {
                self.stats.voiced_hops += 1;
            }
            self.state = CycleState::Emitted;
        }

        self.stats.samples_out += self.output.len() as u64;
        Processed {
            samples: &self.output,
            consumed,
        }
    }

    /// Drop buffered audio and all cross-hop state
    ///
    /// Configuration (including anything staged) is kept.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.tracker.reset();
        self.glide.reset();
        self.corrector.reset();
        self.output.clear();
        self.hop_count = 0;
        self.last_estimate = PitchEstimate::default();
        self.stats = EngineStats::default();
        self.state = CycleState::AwaitingInput;
        self.prime();
        debug!("engine reset");
    }

    pub fn latency_samples(&self) -> usize {
        self.config.latency_samples()
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn window_size(&self) -> usize {
        self.config.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.config.hop_size
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pitches below this are never voiced at the configured window size
    pub fn lowest_detectable_frequency(&self) -> f32 {
        self.detector.lowest_detectable_frequency()
    }

    /// Scale currently in force (not a staged one)
    pub fn scale_config(&self) -> &ScaleConfig {
        self.quantizer.config()
    }

    pub fn correction_config(&self) -> &CorrectionConfig {
        self.corrector.config()
    }

    pub fn cycle_state(&self) -> CycleState {
        self.state
    }

    /// Hops emitted since construction or the last reset
    pub fn hop_count(&self) -> u64 {
        self.hop_count
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Pitch ratio currently applied by the corrector
    pub fn current_ratio(&self) -> f32 {
        self.glide.ratio()
    }

    pub fn last_estimate(&self) -> PitchEstimate {
        self.last_estimate
    }

    /// Fill the look-ahead span with silence
    fn prime(&mut self) {
        self.buffer.write_silence(self.config.latency_samples());
    }

    /// Apply the staged update, then any newer one from a [`ConfigHandle`]
    fn apply_pending(&mut self) {
        if let Some(update) = self.staged.take() {
            self.apply(update);
        }
        if let Ok(update) = self.pending_rx.try_recv() {
            self.apply(update);
        }
    }

    fn apply(&mut self, update: ConfigUpdate) {
        // Both halves were validated before they were queued
        self.quantizer.set_config(update.scale);
        if self.corrector.set_config(update.correction).is_ok() {
            self.stats.config_swaps += 1;
        }
    }

    fn emit_report(&mut self, estimate: &PitchEstimate, target: Option<f32>) {
        let Some(writer) = self.reports.as_mut() else {
            return;
        };
        let report = PitchReport {
            hop_index: self.hop_count,
            detected_hz: estimate.frequency_hz,
            target_hz: target,
            confidence: estimate.confidence,
            voiced: estimate.voiced,
            applied_ratio: self.glide.ratio(),
        };
        if !writer.push(report) {
            self.stats.reports_dropped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitchsnap_analysis::{PitchClass, ScaleKind};
    use std::f32::consts::PI;

    const SR: u32 = 44100;
    const WINDOW: usize = 2048;
    const HOP: usize = 256;
    const CAPACITY: usize = 8192;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn engine() -> Engine {
        init_tracing();
        Engine::new(SR, WINDOW, HOP, CAPACITY).unwrap()
    }

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / SR as f32).sin() * 0.5)
            .collect()
    }

    /// Feed `input` in `chunk`-sized calls, resubmitting on backpressure
    fn run(engine: &mut Engine, input: &[f32], chunk: usize) -> Vec<f32> {
        let mut output = Vec::new();
        let mut pos = 0;
        while pos < input.len() {
            let end = (pos + chunk).min(input.len());
            let processed = engine.process(&input[pos..end]);
            output.extend_from_slice(processed.samples);
            pos += processed.consumed;
        }
        output
    }

    fn zero_crossing_frequency(signal: &[f32]) -> f32 {
        let mut crossings = Vec::new();
        for i in 1..signal.len() {
            let (a, b) = (signal[i - 1], signal[i]);
            if a < 0.0 && b >= 0.0 {
                crossings.push((i - 1) as f32 + a / (a - b));
            }
        }
        let first = crossings[0];
        let last = crossings[crossings.len() - 1];
        (crossings.len() - 1) as f32 * SR as f32 / (last - first)
    }

    #[test]
    fn test_impulse_latency() {
        let mut engine = Engine::new(SR, 1024, 256, 4096).unwrap();
        assert_eq!(engine.latency_samples(), 768);

        let mut input = vec![0.0; 4096];
        input[0] = 1.0;
        let output = run(&mut engine, &input, 333);

        let peak = output
            .iter()
            .position(|&s| s != 0.0)
            .expect("impulse never came out");
        assert_eq!(peak, 768);
        assert_eq!(output[768], 1.0);
    }

    #[test]
    fn test_latency_after_reset() {
        let mut engine = engine();
        run(&mut engine, &sine(220.0, 10_000), 512);
        engine.reset();

        let mut input = vec![0.0; 6000];
        input[10] = 0.8;
        let output = run(&mut engine, &input, 1000);
        let peak = output.iter().position(|&s| s != 0.0).unwrap();
        assert_eq!(peak, 10 + WINDOW - HOP);
    }

    #[test]
    fn test_output_is_whole_hops() {
        let mut engine = engine();
        // 1792 primed + 255 < 2048: no hop yet
        let processed = engine.process(&[0.1; 255]);
        assert_eq!(processed.consumed, 255);
        assert!(processed.samples.is_empty());
        assert_eq!(engine.cycle_state(), CycleState::AwaitingInput);

        let processed = engine.process(&[0.1; 1]);
        assert_eq!(processed.samples.len(), HOP);
        assert_eq!(engine.cycle_state(), CycleState::Emitted);
        assert_eq!(engine.hop_count(), 1);
    }

    #[test]
    fn test_backpressure() {
        let mut engine = Engine::new(SR, 1024, 256, 2049).unwrap();
        // 768 primed samples leave 1280 free slots
        let input = vec![0.0; 4000];
        let processed = engine.process(&input);
        assert_eq!(processed.consumed, 1280);
        assert_eq!(processed.samples.len(), 1280);

        let stats = engine.stats();
        assert_eq!(stats.samples_rejected, 2720);
        assert_eq!(stats.backpressure_events, 1);
        assert_eq!(stats.hops_processed, 5);

        let processed = engine.process(&input[1280..]);
        assert_eq!(processed.consumed, 1280);
    }

    #[test]
    fn test_stream_is_delayed_copy_at_zero_strength() {
        let mut engine = engine();
        engine
            .configure(ScaleConfig::default(), CorrectionConfig::new(1.0, 0.0).unwrap())
            .unwrap();

        let input = sine(233.0, 20_000);
        let output = run(&mut engine, &input, 700);
        let latency = engine.latency_samples();

        assert!(output.len() > latency + 10_000);
        for (i, &y) in output.iter().enumerate() {
            let expected = if i < latency { 0.0 } else { input[i - latency] };
            assert_eq!(y, expected, "sample {}", i);
        }
    }

    #[test]
    fn test_sine_snaps_to_scale() {
        let mut engine = engine();
        let input = sine(226.0, SR as usize * 2);
        let output = run(&mut engine, &input, 512);

        // 226 Hz is 46 cents above A3 and Bb is not in C major
        let tail = &output[output.len() / 2..];
        let measured = zero_crossing_frequency(tail);
        assert!(
            (measured / 220.0 - 1.0).abs() < 0.01,
            "expected ~220 Hz, measured {} Hz",
            measured
        );
        assert!(engine.stats().voiced_hops > 0);
        assert!((engine.current_ratio() - 220.0 / 226.0).abs() < 0.01);
    }

    #[test]
    fn test_configure_applies_at_hop_boundary() {
        let mut engine = engine();
        let chromatic = ScaleConfig::from_kind(PitchClass::C, ScaleKind::Chromatic);
        let slow = CorrectionConfig::new(0.25, 0.8).unwrap();

        engine.configure(chromatic, slow).unwrap();
        assert_eq!(*engine.scale_config(), ScaleConfig::default());

        // Not enough input to complete a hop
        engine.process(&[0.0; 100]);
        assert_eq!(*engine.scale_config(), ScaleConfig::default());
        assert_eq!(engine.stats().config_swaps, 0);

        engine.process(&[0.0; 200]);
        assert_eq!(*engine.scale_config(), chromatic);
        assert_eq!(*engine.correction_config(), slow);
        assert_eq!(engine.stats().config_swaps, 1);
    }

    #[test]
    fn test_configure_rejects_invalid_and_keeps_old() {
        let mut engine = engine();
        let bad = CorrectionConfig {
            retune_speed: 0.0,
            strength: 1.0,
        };
        assert_eq!(
            engine.configure(ScaleConfig::default(), bad),
            Err(ConfigError::InvalidRetuneSpeed(0.0))
        );
        run(&mut engine, &[0.0; 4096], 4096);
        assert_eq!(*engine.correction_config(), CorrectionConfig::default());
        assert_eq!(engine.stats().config_swaps, 0);
    }

    #[test]
    fn test_config_handle_latest_wins() {
        let mut engine = engine();
        let handle = engine.config_handle();
        let minor = ScaleConfig::from_kind(PitchClass::A, ScaleKind::NaturalMinor);
        let blues = ScaleConfig::from_kind(PitchClass::E, ScaleKind::Blues);

        std::thread::spawn(move || {
            handle.submit(minor, CorrectionConfig::default()).unwrap();
            handle.submit(blues, CorrectionConfig::default()).unwrap();
            assert!(handle.is_pending());
        })
        .join()
        .unwrap();

        run(&mut engine, &[0.0; 1024], 1024);
        assert_eq!(*engine.scale_config(), blues);
        assert_eq!(engine.stats().config_swaps, 1);
    }

    #[test]
    fn test_config_handle_validates() {
        let engine = engine();
        let handle = engine.config_handle();
        let result = handle.submit(
            ScaleConfig::default(),
            CorrectionConfig {
                retune_speed: 0.5,
                strength: 2.0,
            },
        );
        assert_eq!(result, Err(ConfigError::InvalidStrength(2.0)));
        assert!(!handle.is_pending());
    }

    #[test]
    fn test_reports() {
        let mut engine = engine();
        let mut reader = engine.attach_reports(1024);
        run(&mut engine, &sine(226.0, SR as usize), 512);

        let reports: Vec<PitchReport> = reader.drain().collect();
        assert_eq!(reports.len() as u64, engine.hop_count());
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.hop_index, i as u64);
        }

        let last = reports.last().unwrap();
        assert!(last.voiced);
        let target = last.target_hz.unwrap();
        assert!((target - 220.0).abs() < 0.01, "target {}", target);
        assert_eq!(engine.stats().reports_dropped, 0);
    }

    #[test]
    fn test_full_report_ring_is_counted() {
        let mut engine = engine();
        let _reader = engine.attach_reports(4);
        run(&mut engine, &[0.0; 4096], 4096);
        let stats = engine.stats();
        assert_eq!(stats.reports_dropped, stats.hops_processed - 4);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut engine = engine();
        run(&mut engine, &sine(226.0, 20_000), 512);
        assert!(engine.hop_count() > 0);
        assert!(engine.current_ratio() < 1.0);

        engine.reset();
        assert_eq!(engine.hop_count(), 0);
        assert_eq!(engine.stats(), EngineStats::default());
        assert_eq!(engine.current_ratio(), 1.0);
        assert_eq!(engine.cycle_state(), CycleState::AwaitingInput);
        assert_eq!(engine.last_estimate(), PitchEstimate::default());
    }

    #[test]
    fn test_construction_errors() {
        assert_eq!(
            Engine::new(0, 1024, 256, 4096).err(),
            Some(ConfigError::InvalidSampleRate(0))
        );
        assert_eq!(
            Engine::new(SR, 256, 256, 4096).err(),
            Some(ConfigError::InvalidFrameSizes { window: 256, hop: 256 })
        );
        assert_eq!(
            Engine::new(SR, 1024, 0, 4096).err(),
            Some(ConfigError::InvalidFrameSizes { window: 1024, hop: 0 })
        );
        assert_eq!(
            Engine::new(SR, 1024, 256, 1024).err(),
            Some(ConfigError::BufferTooSmall {
                capacity: 1024,
                window: 1024
            })
        );
    }

    #[test]
    fn test_short_window_raises_detection_floor() {
        init_tracing();
        let short = Engine::new(SR, 1024, 256, 4096).unwrap();
        let floor = short.lowest_detectable_frequency();
        assert!((floor - SR as f32 / 512.0).abs() < 1e-3, "floor {}", floor);
        assert_eq!(short.engine_config().lowest_detectable_frequency(), floor);

        // 2048 samples reach lags of 1024, below the 50 Hz default
        let long = engine();
        assert_eq!(long.lowest_detectable_frequency(), 50.0);
    }

    #[test]
    fn test_independent_instances() {
        let mut a = engine();
        let mut b = engine();
        a.configure(
            ScaleConfig::from_kind(PitchClass::D, ScaleKind::Dorian),
            CorrectionConfig::default(),
        )
        .unwrap();
        run(&mut a, &[0.0; 4096], 4096);
        run(&mut b, &[0.0; 4096], 4096);
        assert_ne!(a.scale_config(), b.scale_config());
    }
}
