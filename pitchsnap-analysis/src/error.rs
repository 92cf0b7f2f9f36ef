//! Configuration errors shared by every pitchsnap stage

use thiserror::Error;

/// Rejected configuration.
///
/// Raised only at construction or `configure()` time. The component that
/// rejected the value keeps whatever valid configuration it had before.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("scale must contain at least one interval")]
    EmptyIntervals,
    #[error("interval {0} appears more than once")]
    DuplicateInterval(u8),
    #[error("interval {0} is outside 0..=11")]
    IntervalOutOfRange(u8),
    #[error("root pitch class {0} is outside 0..=11")]
    RootOutOfRange(u8),
    #[error("reference frequency must be positive and finite, got {0}")]
    InvalidReferenceFrequency(f64),
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),
    #[error("window size {window} must be larger than a non-zero hop size {hop}")]
    InvalidFrameSizes { window: usize, hop: usize },
    #[error("buffer capacity {capacity} must exceed the window size {window}")]
    BufferTooSmall { capacity: usize, window: usize },
    #[error("retune speed must be in (0, 1], got {0}")]
    InvalidRetuneSpeed(f32),
    #[error("strength must be in [0, 1], got {0}")]
    InvalidStrength(f32),
    #[error("invalid detection range {min} Hz - {max} Hz")]
    InvalidFrequencyRange { min: f32, max: f32 },
    #[error("invalid detector parameter `{name}`: {value}")]
    InvalidDetectorParameter { name: &'static str, value: f32 },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
