//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - built from a JSON config file or CLI flags
//! - passed by value into the pipeline (the core never loads anything itself)
//! - echoed back in run reports

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ReconError;

/// A setting that is either resolved automatically or fixed to a positive count.
///
/// Serialized as the string `"auto"` or a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "AutoOrRepr", into = "AutoOrRepr")]
pub enum AutoOr {
    #[default]
    Auto,
    Fixed(usize),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AutoOrRepr {
    Count(usize),
    Text(String),
}

impl TryFrom<AutoOrRepr> for AutoOr {
    type Error = String;

    fn try_from(value: AutoOrRepr) -> Result<Self, Self::Error> {
        match value {
            AutoOrRepr::Count(n) => Ok(AutoOr::Fixed(n)),
            AutoOrRepr::Text(s) => s.parse(),
        }
    }
}

impl From<AutoOr> for AutoOrRepr {
    fn from(value: AutoOr) -> Self {
        match value {
            AutoOr::Auto => AutoOrRepr::Text("auto".to_string()),
            AutoOr::Fixed(n) => AutoOrRepr::Count(n),
        }
    }
}

impl FromStr for AutoOr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(AutoOr::Auto);
        }
        s.parse::<usize>()
            .map(AutoOr::Fixed)
            .map_err(|_| format!("expected 'auto' or a positive integer, got '{s}'"))
    }
}

impl fmt::Display for AutoOr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoOr::Auto => write!(f, "auto"),
            AutoOr::Fixed(n) => write!(f, "{n}"),
        }
    }
}

/// How many workers run a stage and how axis 0 is cut into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionParams {
    pub cores: AutoOr,
    pub chunksize: AutoOr,
}

impl ExecutionParams {
    pub fn new(cores: AutoOr, chunksize: AutoOr) -> Self {
        Self { cores, chunksize }
    }

    /// Fixed worker count and chunk size, mostly for tests and benchmarks.
    pub fn fixed(cores: usize, chunksize: usize) -> Self {
        Self::new(AutoOr::Fixed(cores), AutoOr::Fixed(chunksize))
    }

    /// Reject explicit zero values; everything else is resolved per volume.
    pub fn validate(&self) -> Result<(), ReconError> {
        if self.cores == AutoOr::Fixed(0) {
            return Err(ReconError::invalid_param("execution", "cores must be >= 1"));
        }
        if self.chunksize == AutoOr::Fixed(0) {
            return Err(ReconError::invalid_param("execution", "chunksize must be >= 1"));
        }
        Ok(())
    }
}

/// Rectangular region inside a frame: columns `left..right`, rows `top..bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
}

impl Region {
    pub fn new(left: usize, top: usize, right: usize, bottom: usize) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> usize {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> usize {
        self.bottom.saturating_sub(self.top)
    }

    /// Check the region is non-empty and inside a `(height, width)` frame.
    pub fn validate(&self, stage: &str, frame: (usize, usize)) -> Result<(), ReconError> {
        let (height, width) = frame;
        if self.right <= self.left || self.bottom <= self.top {
            return Err(ReconError::invalid_region(
                stage,
                format!("region {self} is empty"),
            ));
        }
        if self.right > width || self.bottom > height {
            return Err(ReconError::invalid_region(
                stage,
                format!("region {self} exceeds frame {height}x{width}"),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[left={}, top={}, right={}, bottom={}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Which of the two ordered stage chains a stage belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pre,
    Post,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Post => "post",
        }
    }
}

/// A scalar stage parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    /// Parse a CLI-style `value` token: ints, floats, bools, `none`, else text.
    pub fn parse_token(token: &str) -> ParamValue {
        let t = token.trim();
        if t.eq_ignore_ascii_case("none") || t.eq_ignore_ascii_case("null") {
            return ParamValue::Null;
        }
        if let Ok(b) = t.parse::<bool>() {
            return ParamValue::Bool(b);
        }
        if let Ok(i) = t.parse::<i64>() {
            return ParamValue::Int(i);
        }
        if let Ok(f) = t.parse::<f64>() {
            return ParamValue::Float(f);
        }
        ParamValue::Text(t.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "none"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Raw parameter mapping for one stage.
pub type StageParams = BTreeMap<String, ParamValue>;

fn default_true() -> bool {
    true
}

/// Configurable part of a stage: only the enable flag and parameter values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub params: StageParams,
}

impl StageSettings {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            params: StageParams::new(),
        }
    }

    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }
}

/// Early-exit and skip switches for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunFlags {
    /// Stop after pre-processing.
    pub only_preproc: bool,
    /// Input is already pre-processed and reconstructed; run post-processing only.
    pub only_postproc: bool,
    /// Input is already pre-processed; start at the reconstruction handoff.
    pub reuse_preproc: bool,
    /// Post-processing becomes a pass-through.
    pub no_postproc: bool,
    /// Offer the pre-processed volume to the saver before reconstruction.
    pub save_preproc: bool,
}

/// One user- or auto-supplied rotation centre measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorObservation {
    pub slice_index: usize,
    pub cor: f64,
}

impl CorObservation {
    pub fn new(slice_index: usize, cor: f64) -> Self {
        Self { slice_index, cor }
    }
}

impl FromStr for CorObservation {
    type Err = String;

    /// Parse `SLICE=COR`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slice, cor) = s
            .split_once('=')
            .ok_or_else(|| format!("expected SLICE=COR, got '{s}'"))?;
        let slice_index = slice
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid slice index '{slice}': {e}"))?;
        let cor = cor
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid COR '{cor}': {e}"))?;
        if !cor.is_finite() {
            return Err(format!("COR must be finite, got '{cor}'"));
        }
        Ok(CorObservation { slice_index, cor })
    }
}

/// How the per-slice COR table handed to the reconstruction is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CorMode {
    /// Piecewise-linear through the observations, flat outside their range.
    #[default]
    Interpolate,
    /// Evaluate the fitted line `c + m * slice` for every slice.
    Regression,
}

/// Reconstruction geometry and algorithm selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconSettings {
    pub algorithm: String,
    pub filter: String,
    /// Angle covered by the projections, in degrees.
    pub max_angle_deg: f64,
    pub cor_mode: CorMode,
    pub cor_observations: Vec<CorObservation>,
}

impl Default for ReconSettings {
    fn default() -> Self {
        Self {
            algorithm: "gridrec".to_string(),
            filter: "shepp".to_string(),
            max_angle_deg: 360.0,
            cor_mode: CorMode::Interpolate,
            cor_observations: Vec::new(),
        }
    }
}

/// A full run's configuration as understood by the pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub execution: ExecutionParams,
    /// Crop region, also the value-scaling statistics window.
    pub region_of_interest: Option<Region>,
    /// Pre-processing stage settings keyed by stage key (e.g. `"median"`).
    pub pre: BTreeMap<String, StageSettings>,
    /// Post-processing stage settings keyed by stage key.
    pub post: BTreeMap<String, StageSettings>,
    pub flags: RunFlags,
    pub recon: ReconSettings,
}

impl PipelineConfig {
    pub fn stages(&self, phase: Phase) -> &BTreeMap<String, StageSettings> {
        match phase {
            Phase::Pre => &self.pre,
            Phase::Post => &self.post,
        }
    }

    pub fn stages_mut(&mut self, phase: Phase) -> &mut BTreeMap<String, StageSettings> {
        match phase {
            Phase::Pre => &mut self.pre,
            Phase::Post => &mut self.post,
        }
    }

    /// Builder-style helper used by front-ends and tests.
    pub fn with_stage(mut self, phase: Phase, key: &str, settings: StageSettings) -> Self {
        self.stages_mut(phase).insert(key.to_string(), settings);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_or_parses_from_json_and_str() {
        let p: ExecutionParams = serde_json::from_str(r#"{"cores":"auto","chunksize":8}"#).unwrap();
        assert_eq!(p.cores, AutoOr::Auto);
        assert_eq!(p.chunksize, AutoOr::Fixed(8));
        assert_eq!("AUTO".parse::<AutoOr>().unwrap(), AutoOr::Auto);
        assert!("-3".parse::<AutoOr>().is_err());
        assert!(serde_json::from_str::<ExecutionParams>(r#"{"cores":"many"}"#).is_err());
    }

    #[test]
    fn zero_cores_is_rejected() {
        let p = ExecutionParams::fixed(0, 4);
        assert!(matches!(p.validate(), Err(ReconError::InvalidParameter { .. })));
    }

    #[test]
    fn region_validation() {
        let r = Region::new(2, 2, 8, 6);
        assert!(r.validate("crop", (10, 10)).is_ok());
        assert!(matches!(
            r.validate("crop", (5, 10)),
            Err(ReconError::InvalidRegion { .. })
        ));
        assert!(Region::new(4, 0, 4, 3).validate("crop", (10, 10)).is_err());
    }

    #[test]
    fn observation_parses_slice_equals_cor() {
        let obs: CorObservation = "12=45.5".parse().unwrap();
        assert_eq!(obs, CorObservation::new(12, 45.5));
        assert!("12".parse::<CorObservation>().is_err());
        assert!("x=1.0".parse::<CorObservation>().is_err());
    }

    #[test]
    fn stage_settings_default_to_enabled() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"pre":{"median":{"params":{"size":3}}}}"#).unwrap();
        let median = &cfg.pre["median"];
        assert!(median.enabled);
        assert_eq!(median.params["size"], ParamValue::Int(3));
    }

    #[test]
    fn param_tokens() {
        assert_eq!(ParamValue::parse_token("none"), ParamValue::Null);
        assert_eq!(ParamValue::parse_token("3"), ParamValue::Int(3));
        assert_eq!(ParamValue::parse_token("0.5"), ParamValue::Float(0.5));
        assert_eq!(ParamValue::parse_token("reflect"), ParamValue::Text("reflect".into()));
    }
}
