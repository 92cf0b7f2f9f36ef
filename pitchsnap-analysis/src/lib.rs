//! Pitch analysis for pitchsnap
//!
//! Provides autocorrelation pitch detection, the scale/tuning model and
//! the scale quantizer that maps detected pitches to in-key targets.

mod error;
mod pitch;
mod quantizer;
mod scale;

pub use error::{ConfigError, Result};
pub use pitch::{DetectorConfig, PitchDetector, PitchEstimate, PitchTracker, RawPitch};
pub use quantizer::{NoteInfo, ScaleQuantizer};
pub use scale::{IntervalSet, PitchClass, ScaleConfig, ScaleKind, Tuning, A4_FREQ, A4_SEMITONE};
