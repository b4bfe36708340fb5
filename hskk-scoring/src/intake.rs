//! Feature intake and validation
//!
//! Turns the loosely-typed mapping returned by the acoustic collaborator into an
//! `AcousticFeatureSet`. Required keys must be present, numeric, finite and within
//! a physically plausible range. Optional measurements may be absent or carry the
//! analyzer's `--undefined--` marker. No side effects.

use crate::types::{AcousticFeatureSet, ExtendedMeasurements, RawFeatures};
use serde_json::Value;
use thiserror::Error;

/// Marker the acoustic analyzer emits for measurements it could not compute
const UNDEFINED_MARKER: &str = "--undefined--";

/// `pause_ratio` this far outside `[0, 1]` is treated as rounding noise
const PAUSE_RATIO_TOLERANCE: f64 = 0.01;

/// Why a raw feature mapping was rejected
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeatureValidationError {
    #[error("Missing required feature '{key}'")]
    Missing { key: &'static str },

    #[error("Feature '{key}' is not numeric")]
    NonNumeric { key: &'static str },

    #[error("Feature '{key}' is not finite")]
    NotFinite { key: &'static str },

    #[error("Feature '{key}' = {value} outside plausible range ({expected})")]
    OutOfRange {
        key: &'static str,
        value: f64,
        expected: &'static str,
    },
}

/// Plausibility bound for one required key
#[derive(Clone, Copy)]
enum Bound {
    Positive,
    NonNegative,
    /// Closed unit interval
    Fraction,
    /// Harmonics-to-noise ratio in dB
    Decibels,
}

impl Bound {
    fn accepts(self, value: f64) -> bool {
        match self {
            Bound::Positive => value > 0.0,
            Bound::NonNegative => value >= 0.0,
            Bound::Fraction => (0.0..=1.0).contains(&value),
            Bound::Decibels => (-20.0..=60.0).contains(&value),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Bound::Positive => "> 0",
            Bound::NonNegative => ">= 0",
            Bound::Fraction => "0..=1",
            Bound::Decibels => "-20..=60 dB",
        }
    }
}

/// Validate a raw feature mapping
pub fn validate(raw: &RawFeatures) -> Result<AcousticFeatureSet, FeatureValidationError> {
    let req = |key: &'static str, bound: Bound| required(raw, key, bound);

    let pause_ratio = clamp_pause_ratio(required_number(raw, "pause_ratio")?)?;

    Ok(AcousticFeatureSet {
        duration: req("duration", Bound::Positive)?,
        pitch_mean: req("pitch_mean", Bound::Positive)?,
        pitch_std: req("pitch_std", Bound::NonNegative)?,
        pitch_range: req("pitch_range", Bound::NonNegative)?,
        hnr_mean: req("hnr_mean", Bound::Decibels)?,
        jitter_local: req("jitter_local", Bound::Fraction)?,
        shimmer_local: req("shimmer_local", Bound::Fraction)?,
        f1_mean: req("f1_mean", Bound::NonNegative)?,
        f2_mean: req("f2_mean", Bound::NonNegative)?,
        speech_duration: req("speech_duration", Bound::NonNegative)?,
        pause_duration: req("pause_duration", Bound::NonNegative)?,
        pause_ratio,
        num_pauses: pause_count(raw)?,
        mean_pause_duration: req("mean_pause_duration", Bound::NonNegative)?,
        speech_rate: req("speech_rate", Bound::NonNegative)?,
        articulation_rate: req("articulation_rate", Bound::NonNegative)?,
        extended: extended(raw)?,
    })
}

fn required_number(raw: &RawFeatures, key: &'static str) -> Result<f64, FeatureValidationError> {
    let value = raw.get(key).ok_or(FeatureValidationError::Missing { key })?;
    let number = value
        .as_f64()
        .ok_or(FeatureValidationError::NonNumeric { key })?;
    if !number.is_finite() {
        return Err(FeatureValidationError::NotFinite { key });
    }
    Ok(number)
}

fn required(raw: &RawFeatures, key: &'static str, bound: Bound) -> Result<f64, FeatureValidationError> {
    let value = required_number(raw, key)?;
    if bound.accepts(value) {
        Ok(value)
    } else {
        Err(FeatureValidationError::OutOfRange {
            key,
            value,
            expected: bound.describe(),
        })
    }
}

fn clamp_pause_ratio(value: f64) -> Result<f64, FeatureValidationError> {
    if (-PAUSE_RATIO_TOLERANCE..=1.0 + PAUSE_RATIO_TOLERANCE).contains(&value) {
        Ok(value.clamp(0.0, 1.0))
    } else {
        Err(FeatureValidationError::OutOfRange {
            key: "pause_ratio",
            value,
            expected: "0..=1",
        })
    }
}

/// Pause count must be a non-negative whole number; `12.0` is accepted
fn pause_count(raw: &RawFeatures) -> Result<u32, FeatureValidationError> {
    const KEY: &str = "num_pauses";
    let value = required_number(raw, KEY)?;
    if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(FeatureValidationError::OutOfRange {
            key: KEY,
            value,
            expected: "non-negative integer",
        });
    }
    Ok(value as u32)
}

fn optional(raw: &RawFeatures, key: &'static str) -> Result<Option<f64>, FeatureValidationError> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim() == UNDEFINED_MARKER => Ok(None),
        Some(value) => {
            let number = value
                .as_f64()
                .ok_or(FeatureValidationError::NonNumeric { key })?;
            if number.is_finite() {
                Ok(Some(number))
            } else {
                Err(FeatureValidationError::NotFinite { key })
            }
        }
    }
}

fn extended(raw: &RawFeatures) -> Result<ExtendedMeasurements, FeatureValidationError> {
    let opt = |key: &'static str| optional(raw, key);
    Ok(ExtendedMeasurements {
        pitch_min: opt("pitch_min")?,
        pitch_max: opt("pitch_max")?,
        pitch_median: opt("pitch_median")?,
        pitch_quantile_25: opt("pitch_quantile_25")?,
        pitch_quantile_75: opt("pitch_quantile_75")?,
        f1_std: opt("f1_std")?,
        f2_std: opt("f2_std")?,
        f3_mean: opt("f3_mean")?,
        f3_std: opt("f3_std")?,
        f4_mean: opt("f4_mean")?,
        f4_std: opt("f4_std")?,
        intensity_mean: opt("intensity_mean")?,
        intensity_std: opt("intensity_std")?,
        intensity_min: opt("intensity_min")?,
        intensity_max: opt("intensity_max")?,
        spectral_centroid: opt("spectral_centroid")?,
        spectral_std: opt("spectral_std")?,
        spectral_skewness: opt("spectral_skewness")?,
        spectral_kurtosis: opt("spectral_kurtosis")?,
        hnr_std: opt("hnr_std")?,
        jitter_rap: opt("jitter_rap")?,
        jitter_ppq5: opt("jitter_ppq5")?,
        shimmer_apq3: opt("shimmer_apq3")?,
        shimmer_apq5: opt("shimmer_apq5")?,
        shimmer_apq11: opt("shimmer_apq11")?,
        cog: opt("cog")?,
        slope: opt("slope")?,
        spread: opt("spread")?,
    })
}

#[cfg(test)]
pub mod fixtures {
    use super::*;
    use serde_json::json;

    /// A clean recording: every pronunciation tier excellent, no fluency issue
    pub fn clean_features() -> RawFeatures {
        let value = json!({
            "duration": 12.5,
            "pitch_mean": 210.0,
            "pitch_std": 35.0,
            "pitch_range": 120.0,
            "hnr_mean": 22.0,
            "jitter_local": 0.008,
            "shimmer_local": 0.04,
            "f1_mean": 620.0,
            "f2_mean": 1650.0,
            "speech_duration": 11.0,
            "pause_duration": 1.5,
            "pause_ratio": 0.12,
            "num_pauses": 3,
            "mean_pause_duration": 0.5,
            "speech_rate": 180.0,
            "articulation_rate": 200.0
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    pub fn with(mut raw: RawFeatures, key: &str, value: Value) -> RawFeatures {
        raw.insert(key.to_string(), value);
        raw
    }
}
