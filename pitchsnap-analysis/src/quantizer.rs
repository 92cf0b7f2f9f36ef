//! Scale quantizer: maps any frequency to the nearest in-key pitch
//!
//! The mapping works on the continuous semitone number `s` of the input:
//! 1. Split `s` into an octave and a remainder in [0, 12) relative to the root
//! 2. Pick the scale offset closest to the remainder. The lowest offset of the
//!    next octave is a candidate too, so a remainder just below 12 can wrap up
//! 3. Ties go to the lower candidate
//!
//! The result is monotonic non-decreasing in frequency and idempotent.

use crate::scale::{PitchClass, ScaleConfig};
use std::fmt;

/// Nearest in-key note for a frequency
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteInfo {
    /// Frequency of the in-key note in Hz
    pub frequency: f32,
    /// MIDI note number (69 = A4 at the default tuning)
    pub midi_note: i32,
    pub pitch_class: PitchClass,
    /// Scientific pitch octave (C4 = MIDI 60)
    pub octave: i32,
    /// Deviation of the input from the note, in cents
    pub cents_offset: f32,
}

impl fmt::Display for NoteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {:+.1}c",
            self.pitch_class, self.octave, self.cents_offset
        )
    }
}

/// Stateless-per-call frequency quantizer
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleQuantizer {
    config: ScaleConfig,
}

impl ScaleQuantizer {
    pub fn new(config: ScaleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScaleConfig {
        &self.config
    }

    /// Replace the scale wholesale
    pub fn set_config(&mut self, config: ScaleConfig) {
        self.config = config;
    }

    /// Continuous semitone number of `frequency` under the configured tuning
    pub fn frequency_to_semitone(&self, frequency: f64) -> f64 {
        self.config.tuning().frequency_to_semitone(frequency)
    }

    /// Frequency of `semitone` under the configured tuning
    pub fn semitone_to_frequency(&self, semitone: f64) -> f64 {
        self.config.tuning().semitone_to_frequency(semitone)
    }

    /// Nearest in-key semitone number (always an integer value)
    pub fn snap_semitone(&self, semitone: f64) -> f64 {
        let root = self.config.root().index() as f64;
        let intervals = self.config.intervals();

        let relative = semitone - root;
        let octave = (relative / 12.0).floor();
        let remainder = relative - octave * 12.0;

        // Candidates ascending: the scale, then next octave's bottom
        let above = intervals.first() as f64 + 12.0;
        let candidates = intervals
            .as_slice()
            .iter()
            .map(|&i| i as f64)
            .chain(std::iter::once(above));

        let mut chosen = intervals.first() as f64;
        let mut best_distance = f64::INFINITY;
        for candidate in candidates {
            let distance = (remainder - candidate).abs();
            // Strict comparison keeps the lower candidate on ties
            if distance < best_distance {
                best_distance = distance;
                chosen = candidate;
            }
        }

        octave * 12.0 + root + chosen
    }

    /// Snap a frequency to the nearest in-key frequency
    ///
    /// Returns `None` for non-finite or non-positive input.
    pub fn snap(&self, frequency_hz: f32) -> Option<f32> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return None;
        }
        let semitone = self.frequency_to_semitone(frequency_hz as f64);
        let snapped = self.snap_semitone(semitone);
        Some(self.semitone_to_frequency(snapped) as f32)
    }

    /// Nearest in-key note with the input's deviation in cents
    pub fn nearest_note(&self, frequency_hz: f32) -> Option<NoteInfo> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return None;
        }
        let frequency = frequency_hz as f64;
        let snapped = self.snap_semitone(self.frequency_to_semitone(frequency));
        let snapped_frequency = self.semitone_to_frequency(snapped);
        let midi_note = snapped.round() as i32;

        Some(NoteInfo {
            frequency: snapped_frequency as f32,
            midi_note,
            pitch_class: PitchClass::from_semitone(midi_note),
            octave: midi_note.div_euclid(12) - 1,
            cents_offset: (1200.0 * (frequency / snapped_frequency).log2()) as f32,
        })
    }
}
