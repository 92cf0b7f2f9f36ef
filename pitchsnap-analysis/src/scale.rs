//! Scale and tuning model
//!
//! Pitch classes, preset scale kinds, validated interval sets and the
//! reference tuning used to move between Hz and semitone numbers.

use crate::error::{ConfigError, Result};
use std::fmt;

/// Pitch class (12 possible, 0 = C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PitchClass {
    #[default]
    C,
    Db,
    D,
    Eb,
    E,
    F,
    Gb,
    G,
    Ab,
    A,
    Bb,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::Db,
        PitchClass::D,
        PitchClass::Eb,
        PitchClass::E,
        PitchClass::F,
        PitchClass::Gb,
        PitchClass::G,
        PitchClass::Ab,
        PitchClass::A,
        PitchClass::Bb,
        PitchClass::B,
    ];

    /// Semitone class (0-11, where 0=C)
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Pitch class from a semitone class, `None` outside 0-11
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Pitch class of any (possibly negative) semitone number
    pub fn from_semitone(semitone: i32) -> Self {
        Self::ALL[semitone.rem_euclid(12) as usize]
    }

    /// Parse a note name such as "C", "F#", "Bb" or "db"
    ///
    /// Accepts one letter followed by any number of `#`/`b` accidentals.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars.next()?;
        let natural: i32 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let mut offset = 0i32;
        for c in chars {
            match c {
                '#' | '♯' => offset += 1,
                'b' | '♭' => offset -= 1,
                _ => return None,
            }
        }

        Some(Self::from_semitone(natural + offset))
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use PitchClass::*;
        let s = match self {
            C => "C",
            Db => "Db",
            D => "D",
            Eb => "Eb",
            E => "E",
            F => "F",
            Gb => "Gb",
            G => "G",
            Ab => "Ab",
            A => "A",
            Bb => "Bb",
            B => "B",
        };
        write!(f, "{}", s)
    }
}

/// Preset scale shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScaleKind {
    Chromatic,
    /// Ionian
    #[default]
    Major,
    /// Aeolian
    NaturalMinor,
    HarmonicMinor,
    PentatonicMajor,
    PentatonicMinor,
    Blues,
    Dorian,
    Mixolydian,
}

impl ScaleKind {
    pub const ALL: [ScaleKind; 9] = [
        ScaleKind::Chromatic,
        ScaleKind::Major,
        ScaleKind::NaturalMinor,
        ScaleKind::HarmonicMinor,
        ScaleKind::PentatonicMajor,
        ScaleKind::PentatonicMinor,
        ScaleKind::Blues,
        ScaleKind::Dorian,
        ScaleKind::Mixolydian,
    ];

    /// Semitone offsets from the root, ascending
    pub fn intervals(self) -> &'static [u8] {
        use ScaleKind::*;
        match self {
            Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            Major => &[0, 2, 4, 5, 7, 9, 11],
            NaturalMinor => &[0, 2, 3, 5, 7, 8, 10],
            HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            PentatonicMajor => &[0, 2, 4, 7, 9],
            PentatonicMinor => &[0, 3, 5, 7, 10],
            Blues => &[0, 3, 5, 6, 7, 10],
            Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
        }
    }

    /// Name used in settings files
    pub fn name(self) -> &'static str {
        use ScaleKind::*;
        match self {
            Chromatic => "chromatic",
            Major => "major",
            NaturalMinor => "minor",
            HarmonicMinor => "harmonic-minor",
            PentatonicMajor => "pentatonic-major",
            PentatonicMinor => "pentatonic-minor",
            Blues => "blues",
            Dorian => "dorian",
            Mixolydian => "mixolydian",
        }
    }

    /// Parse a scale name (case-insensitive, `_` and `-` interchangeable)
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "ionian" => return Some(ScaleKind::Major),
            "aeolian" | "natural-minor" => return Some(ScaleKind::NaturalMinor),
            "pentatonic" => return Some(ScaleKind::PentatonicMajor),
            _ => {}
        }
        Self::ALL.into_iter().find(|kind| kind.name() == normalized)
    }
}

impl fmt::Display for ScaleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ascending, duplicate-free set of semitone offsets in 0-11
///
/// Stored inline so a scale can cross threads and be dropped on the audio
/// thread without touching the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntervalSet {
    intervals: [u8; 12],
    len: u8,
}

impl IntervalSet {
    /// Build from offsets in any order
    pub fn new(intervals: &[u8]) -> Result<Self> {
        if intervals.is_empty() {
            return Err(ConfigError::EmptyIntervals);
        }

        let mut seen = [false; 12];
        for &interval in intervals {
            if interval > 11 {
                return Err(ConfigError::IntervalOutOfRange(interval));
            }
            if seen[interval as usize] {
                return Err(ConfigError::DuplicateInterval(interval));
            }
            seen[interval as usize] = true;
        }

        let mut set = Self {
            intervals: [0; 12],
            len: 0,
        };
        for interval in 0..12u8 {
            if seen[interval as usize] {
                set.intervals[set.len as usize] = interval;
                set.len += 1;
            }
        }
        Ok(set)
    }

    pub fn from_kind(kind: ScaleKind) -> Self {
        let intervals = kind.intervals();
        let mut set = Self {
            intervals: [0; 12],
            len: intervals.len() as u8,
        };
        set.intervals[..intervals.len()].copy_from_slice(intervals);
        set
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.intervals[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false for a constructed set
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, interval: u8) -> bool {
        self.as_slice().contains(&interval)
    }

    /// Lowest offset
    pub fn first(&self) -> u8 {
        self.intervals[0]
    }

    /// Highest offset
    pub fn last(&self) -> u8 {
        self.intervals[self.len as usize - 1]
    }

    /// Preset kind with exactly these offsets, if any
    pub fn kind(&self) -> Option<ScaleKind> {
        ScaleKind::ALL
            .into_iter()
            .find(|kind| kind.intervals() == self.as_slice())
    }
}

impl Default for IntervalSet {
    fn default() -> Self {
        Self::from_kind(ScaleKind::Major)
    }
}

/// MIDI semitone number of A4
pub const A4_SEMITONE: f64 = 69.0;
/// Concert pitch
pub const A4_FREQ: f64 = 440.0;

/// Reference tuning: which frequency sits on which semitone number
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    reference_frequency: f64,
    reference_semitone: f64,
}

impl Tuning {
    pub fn new(reference_frequency: f64, reference_semitone: f64) -> Result<Self> {
        if !(reference_frequency.is_finite() && reference_frequency > 0.0) {
            return Err(ConfigError::InvalidReferenceFrequency(reference_frequency));
        }
        if !reference_semitone.is_finite() {
            return Err(ConfigError::InvalidReferenceFrequency(reference_frequency));
        }
        Ok(Self {
            reference_frequency,
            reference_semitone,
        })
    }

    /// Tuning with `reference_frequency` on A4 (semitone 69)
    pub fn with_a4(reference_frequency: f64) -> Result<Self> {
        Self::new(reference_frequency, A4_SEMITONE)
    }

    pub fn reference_frequency(&self) -> f64 {
        self.reference_frequency
    }

    pub fn reference_semitone(&self) -> f64 {
        self.reference_semitone
    }

    /// Continuous semitone number of a frequency
    #[inline]
    pub fn frequency_to_semitone(&self, frequency: f64) -> f64 {
        self.reference_semitone + 12.0 * (frequency / self.reference_frequency).log2()
    }

    /// Frequency of a (possibly fractional) semitone number
    #[inline]
    pub fn semitone_to_frequency(&self, semitone: f64) -> f64 {
        self.reference_frequency * ((semitone - self.reference_semitone) / 12.0).exp2()
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            reference_frequency: A4_FREQ,
            reference_semitone: A4_SEMITONE,
        }
    }
}

/// Scale/key the quantizer snaps to
///
/// Immutable once built; replace the whole value to change it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleConfig {
    root: PitchClass,
    intervals: IntervalSet,
    tuning: Tuning,
}

impl ScaleConfig {
    /// Validated scale from raw parts
    ///
    /// # Arguments
    /// * `root_class` - Semitone class of the root (0-11, 0=C)
    /// * `intervals` - Offsets from the root, each in 0-11, no duplicates
    /// * `reference_frequency` - Frequency of A4 (semitone 69)
    pub fn new(root_class: u8, intervals: &[u8], reference_frequency: f64) -> Result<Self> {
        let root =
            PitchClass::from_index(root_class).ok_or(ConfigError::RootOutOfRange(root_class))?;
        Ok(Self {
            root,
            intervals: IntervalSet::new(intervals)?,
            tuning: Tuning::with_a4(reference_frequency)?,
        })
    }

    /// Preset scale at concert pitch
    pub fn from_kind(root: PitchClass, kind: ScaleKind) -> Self {
        Self {
            root,
            intervals: IntervalSet::from_kind(kind),
            tuning: Tuning::default(),
        }
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_intervals(mut self, intervals: IntervalSet) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn root(&self) -> PitchClass {
        self.root
    }

    pub fn intervals(&self) -> &IntervalSet {
        &self.intervals
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn reference_frequency(&self) -> f64 {
        self.tuning.reference_frequency
    }

    /// Re-check invariants (all enforced at construction)
    pub fn validate(&self) -> Result<()> {
        if self.intervals.is_empty() {
            return Err(ConfigError::EmptyIntervals);
        }
        Tuning::new(self.tuning.reference_frequency, self.tuning.reference_semitone)?;
        Ok(())
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self::from_kind(PitchClass::C, ScaleKind::Major)
    }
}

impl fmt::Display for ScaleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.intervals.kind() {
            Some(kind) => write!(f, "{} {}", self.root, kind)?,
            None => write!(f, "{} {:?}", self.root, self.intervals.as_slice())?,
        }
        if self.tuning != Tuning::default() {
            write!(f, " @ {} Hz", self.tuning.reference_frequency)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_class_roundtrip() {
        for (i, pc) in PitchClass::ALL.iter().enumerate() {
            assert_eq!(pc.index() as usize, i);
            assert_eq!(PitchClass::from_index(i as u8), Some(*pc));
            assert_eq!(PitchClass::parse(&pc.to_string()), Some(*pc));
        }
        assert_eq!(PitchClass::from_index(12), None);
    }

    #[test]
    fn test_pitch_class_parse_accidentals() {
        assert_eq!(PitchClass::parse("C#"), Some(PitchClass::Db));
        assert_eq!(PitchClass::parse("db"), Some(PitchClass::Db));
        assert_eq!(PitchClass::parse("Cb"), Some(PitchClass::B));
        assert_eq!(PitchClass::parse("B#"), Some(PitchClass::C));
        assert_eq!(PitchClass::parse(" F# "), Some(PitchClass::Gb));
        assert_eq!(PitchClass::parse("H"), None);
        assert_eq!(PitchClass::parse(""), None);
        assert_eq!(PitchClass::parse("C4"), None);
    }

    #[test]
    fn test_from_semitone_negative() {
        assert_eq!(PitchClass::from_semitone(-1), PitchClass::B);
        assert_eq!(PitchClass::from_semitone(69), PitchClass::A);
    }

    #[test]
    fn test_interval_set_sorts_input() {
        let set = IntervalSet::new(&[7, 0, 4]).unwrap();
        assert_eq!(set.as_slice(), &[0, 4, 7]);
        assert_eq!(set.first(), 0);
        assert_eq!(set.last(), 7);
        assert!(set.contains(4));
        assert!(!set.contains(5));
    }

    #[test]
    fn test_interval_set_rejects_invalid() {
        assert_eq!(IntervalSet::new(&[]), Err(ConfigError::EmptyIntervals));
        assert_eq!(
            IntervalSet::new(&[0, 4, 4]),
            Err(ConfigError::DuplicateInterval(4))
        );
        assert_eq!(
            IntervalSet::new(&[0, 12]),
            Err(ConfigError::IntervalOutOfRange(12))
        );
    }

    #[test]
    fn test_presets_are_valid_sets() {
        for kind in ScaleKind::ALL {
            let set = IntervalSet::new(kind.intervals()).unwrap();
            assert_eq!(set, IntervalSet::from_kind(kind));
            assert_eq!(set.kind(), Some(kind));
            assert_eq!(ScaleKind::parse(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_scale_kind_aliases() {
        assert_eq!(ScaleKind::parse("Ionian"), Some(ScaleKind::Major));
        assert_eq!(ScaleKind::parse("natural_minor"), Some(ScaleKind::NaturalMinor));
        assert_eq!(ScaleKind::parse("lydian"), None);
    }

    #[test]
    fn test_scale_config_validation() {
        assert!(ScaleConfig::new(0, &[0, 2, 4], 440.0).is_ok());
        assert_eq!(
            ScaleConfig::new(12, &[0], 440.0),
            Err(ConfigError::RootOutOfRange(12))
        );
        assert_eq!(
            ScaleConfig::new(0, &[0], 0.0),
            Err(ConfigError::InvalidReferenceFrequency(0.0))
        );
        assert!(ScaleConfig::new(0, &[0], f64::NAN).is_err());
        assert!(ScaleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_tuning_roundtrip() {
        let tuning = Tuning::default();
        for s in [-30.25, 0.0, 21.0, 60.5, 69.0, 100.125, 140.9] {
            let back = tuning.frequency_to_semitone(tuning.semitone_to_frequency(s));
            assert!((back - s).abs() < 1e-6, "{} -> {}", s, back);
        }
        assert!((tuning.semitone_to_frequency(69.0) - 440.0).abs() < 1e-9);
        assert!((tuning.semitone_to_frequency(81.0) - 880.0).abs() < 1e-9);
    }

    #[test]
    fn test_display() {
        let scale = ScaleConfig::from_kind(PitchClass::A, ScaleKind::NaturalMinor);
        assert_eq!(scale.to_string(), "A minor");
        let custom = ScaleConfig::new(2, &[0, 5], 432.0).unwrap();
        assert_eq!(custom.to_string(), "D [0, 5] @ 432 Hz");
    }
}
