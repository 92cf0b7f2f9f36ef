//! Real-time pitch-correction engine for pitchsnap
//!
//! This module provides the per-hop processing pipeline:
//! - StreamBuffer: fixed-capacity circular sample store
//! - PitchCorrector: delay-line resampling toward a target pitch
//! - Engine: buffer -> detect -> snap -> correct, one hop at a time
//! - Reports: optional per-hop pitch reports for a UI thread
//! - Settings: scale and correction persistence

mod corrector;
mod engine;
mod report;
mod settings;
mod stream_buffer;
mod util;

pub use corrector::{CorrectionConfig, GlideState, PitchCorrector, MAX_RATIO, MIN_RATIO};
pub use engine::{ConfigHandle, CycleState, Engine, EngineConfig, EngineStats, Processed};
pub use report::{PitchReport, ReportReader};
pub use settings::{Settings, SettingsError};
pub use stream_buffer::StreamBuffer;
pub use util::{downmix_interleaved, recommended_hop_size};

pub use pitchsnap_analysis::{
    ConfigError, DetectorConfig, NoteInfo, PitchClass, PitchEstimate, ScaleConfig, ScaleKind,
    ScaleQuantizer, Tuning,
};
