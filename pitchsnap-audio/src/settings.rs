//! Settings persistence for pitchsnap
//!
//! Stores the scale and correction settings in a simple `key=value` file.

use crate::corrector::CorrectionConfig;
use pitchsnap_analysis::{ConfigError, IntervalSet, PitchClass, ScaleConfig, ScaleKind, Tuning};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors loading or saving settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("invalid setting: {0}")]
    Config(#[from] ConfigError),
}

/// Persisted engine settings
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Settings {
    pub scale: ScaleConfig,
    pub correction: CorrectionConfig,
}

impl Settings {
    /// Load settings from the default location
    ///
    /// Returns defaults if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::settings_path();
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(SettingsError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                Self::default()
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable settings");
                Self::default()
            }
        }
    }

    /// Load settings from a specific path
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<(), SettingsError> {
        self.save_to(&Self::settings_path())
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())?;
        debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Get the default settings file path
    pub fn settings_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pitchsnap")
            .join("settings.txt")
    }

    /// Parse settings from `key=value` lines
    ///
    /// `intervals` takes precedence over `scale` when both are present.
    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        let defaults = Self::default();
        let mut root = defaults.scale.root();
        let mut kind = None;
        let mut intervals = None;
        let mut reference = defaults.scale.reference_frequency();
        let mut correction = defaults.correction;

        for (index, line) in content.lines().enumerate() {
            let line_no = index + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(parse_error(line_no, format!("expected key=value, got `{}`", line)));
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "root" => {
                    root = PitchClass::parse(value)
                        .ok_or_else(|| parse_error(line_no, format!("unknown root `{}`", value)))?;
                }
                "scale" => {
                    kind = Some(ScaleKind::parse(value).ok_or_else(|| {
                        parse_error(line_no, format!("unknown scale `{}`", value))
                    })?);
                }
                "intervals" => {
                    let parsed = value
                        .split(',')
                        .map(|v| v.trim().parse::<u8>())
                        .collect::<Result<Vec<u8>, _>>()
                        .map_err(|e| parse_error(line_no, format!("bad interval list: {}", e)))?;
                    intervals = Some(IntervalSet::new(&parsed)?);
                }
                "reference" => reference = parse_number(line_no, key, value)?,
                "retune_speed" => correction.retune_speed = parse_number(line_no, key, value)?,
                "strength" => correction.strength = parse_number(line_no, key, value)?,
                _ => warn!(line = line_no, key, "ignoring unknown setting"),
            }
        }

        let intervals = intervals
            .or_else(|| kind.map(IntervalSet::from_kind))
            .unwrap_or_else(|| *defaults.scale.intervals());
        let scale = ScaleConfig::from_kind(root, ScaleKind::default())
            .with_intervals(intervals)
            .with_tuning(Tuning::with_a4(reference)?);
        correction.validate()?;

        Ok(Self { scale, correction })
    }

    /// Serialize settings to `key=value` lines
    pub fn serialize(&self) -> String {
        let mut lines = Vec::new();
        lines.push("# pitchsnap settings".to_string());
        lines.push(format!("root={}", self.scale.root()));

        let intervals = self.scale.intervals();
        match intervals.kind() {
            Some(kind) => lines.push(format!("scale={}", kind.name())),
            None => {
                let list: Vec<String> = intervals.as_slice().iter().map(|i| i.to_string()).collect();
                lines.push(format!("intervals={}", list.join(",")));
            }
        }

        lines.push(format!("reference={}", self.scale.reference_frequency()));
        lines.push(format!("retune_speed={}", self.correction.retune_speed));
        lines.push(format!("strength={}", self.correction.strength));
        lines.join("\n")
    }
}

fn parse_error(line: usize, message: String) -> SettingsError {
    SettingsError::Parse { line, message }
}

fn parse_number<T: std::str::FromStr>(line: usize, key: &str, value: &str) -> Result<T, SettingsError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| parse_error(line, format!("bad {} `{}`: {}", key, value, e)))
}
