//! Stage parameter declarations and typed access.
//!
//! Each stage declares its parameters as a static `ParamSpec` table. A
//! `ParamReader` checks a raw `StageParams` mapping against that table (unknown
//! names, wrong kinds) and hands out typed values with defaults applied. Range
//! checks stay with the stage, which knows what "valid" means.

use crate::domain::{ParamValue, StageParams};
use crate::error::ReconError;

use super::frame::MAX_KERNEL_RADIUS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
    Bool,
    Text,
}

impl ParamKind {
    pub fn label(self) -> &'static str {
        match self {
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Bool => "bool",
            ParamKind::Text => "text",
        }
    }
}

/// Compile-time default value of a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    /// No default: the parameter is unset unless given.
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(&'static str),
}

impl DefaultValue {
    fn to_value(self) -> ParamValue {
        match self {
            DefaultValue::None => ParamValue::Null,
            DefaultValue::Int(v) => ParamValue::Int(v),
            DefaultValue::Float(v) => ParamValue::Float(v),
            DefaultValue::Bool(v) => ParamValue::Bool(v),
            DefaultValue::Text(v) => ParamValue::Text(v.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: DefaultValue,
    pub doc: &'static str,
}

impl ParamSpec {
    pub const fn new(name: &'static str, kind: ParamKind, default: DefaultValue, doc: &'static str) -> Self {
        Self {
            name,
            kind,
            default,
            doc,
        }
    }

    pub fn default_label(&self) -> String {
        self.default.to_value().to_string()
    }
}

/// Validated, typed view over one stage's raw parameters.
#[derive(Debug)]
pub struct ParamReader<'a> {
    stage: &'static str,
    specs: &'static [ParamSpec],
    values: &'a StageParams,
}

impl<'a> ParamReader<'a> {
    pub fn new(
        stage: &'static str,
        specs: &'static [ParamSpec],
        values: &'a StageParams,
    ) -> Result<Self, ReconError> {
        for (name, value) in values {
            let Some(spec) = specs.iter().find(|s| s.name == name.as_str()) else {
                let known: Vec<&str> = specs.iter().map(|s| s.name).collect();
                return Err(ReconError::invalid_param(
                    stage,
                    format!("unknown parameter '{name}' (known: {})", known.join(", ")),
                ));
            };
            let ok = match (spec.kind, value) {
                (_, ParamValue::Null) => true,
                (ParamKind::Int, ParamValue::Int(_)) => true,
                (ParamKind::Float, ParamValue::Float(_) | ParamValue::Int(_)) => true,
                (ParamKind::Bool, ParamValue::Bool(_)) => true,
                (ParamKind::Text, ParamValue::Text(_)) => true,
                _ => false,
            };
            if !ok {
                return Err(ReconError::invalid_param(
                    stage,
                    format!("'{name}' must be {}, got '{value}'", spec.kind.label()),
                ));
            }
        }
        Ok(Self {
            stage,
            specs,
            values,
        })
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Error constructor bound to this stage.
    pub fn invalid(&self, message: impl Into<String>) -> ReconError {
        ReconError::invalid_param(self.stage, message)
    }

    fn value(&self, name: &str) -> ParamValue {
        if let Some(v) = self.values.get(name) {
            return v.clone();
        }
        self.specs
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.default.to_value())
            .unwrap_or(ParamValue::Null)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.value(name) {
            ParamValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.value(name) {
            ParamValue::Float(v) => Some(v),
            ParamValue::Int(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.value(name) {
            ParamValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<String> {
        match self.value(name) {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// A finite float, or an error naming the parameter.
    pub fn finite(&self, name: &str) -> Result<Option<f64>, ReconError> {
        match self.float(name) {
            Some(v) if !v.is_finite() => Err(self.invalid(format!("'{name}' must be finite, got {v}"))),
            other => Ok(other),
        }
    }

    /// An odd window size in `min..=2 * MAX_KERNEL_RADIUS + 1`.
    pub fn odd_size(&self, name: &str, min: i64) -> Result<Option<usize>, ReconError> {
        let max = 2 * MAX_KERNEL_RADIUS as i64 + 1;
        match self.int(name) {
            None => Ok(None),
            Some(v) if v < min || v > max || v % 2 == 0 => Err(self.invalid(format!(
                "'{name}' must be an odd integer in {min}..={max}, got {v}"
            ))),
            Some(v) => Ok(Some(v as usize)),
        }
    }

    /// Every parameter with defaults filled in, for handing to external kernels.
    pub fn resolved(&self) -> StageParams {
        self.specs
            .iter()
            .map(|s| (s.name.to_string(), self.value(s.name)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[ParamSpec] = &[
        ParamSpec::new("size", ParamKind::Int, DefaultValue::None, "window"),
        ParamSpec::new("sigma", ParamKind::Float, DefaultValue::Float(2.0), "width"),
        ParamSpec::new("mode", ParamKind::Text, DefaultValue::Text("reflect"), "border"),
    ];

    fn params(pairs: &[(&str, ParamValue)]) -> StageParams {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let raw = StageParams::new();
        let r = ParamReader::new("t", SPECS, &raw).unwrap();
        assert_eq!(r.int("size"), None);
        assert_eq!(r.float("sigma"), Some(2.0));
        assert_eq!(r.text("mode").as_deref(), Some("reflect"));
        assert_eq!(r.resolved().len(), 3);
    }

    #[test]
    fn ints_are_accepted_as_floats() {
        let raw = params(&[("sigma", ParamValue::Int(3))]);
        let r = ParamReader::new("t", SPECS, &raw).unwrap();
        assert_eq!(r.float("sigma"), Some(3.0));
    }

    #[test]
    fn unknown_and_mistyped_parameters_are_rejected() {
        let raw = params(&[("radius", ParamValue::Int(3))]);
        assert!(matches!(
            ParamReader::new("t", SPECS, &raw),
            Err(ReconError::InvalidParameter { .. })
        ));
        let raw = params(&[("size", ParamValue::Text("big".into()))]);
        assert!(ParamReader::new("t", SPECS, &raw).is_err());
    }

    #[test]
    fn odd_size_checks_range_and_parity() {
        for bad in [-3, 1, 4, 1_000_001] {
            let raw = params(&[("size", ParamValue::Int(bad))]);
            let r = ParamReader::new("t", SPECS, &raw).unwrap();
            assert!(r.odd_size("size", 3).is_err(), "size={bad}");
        }
        let raw = params(&[("size", ParamValue::Int(5))]);
        let r = ParamReader::new("t", SPECS, &raw).unwrap();
        assert_eq!(r.odd_size("size", 3).unwrap(), Some(5));
    }
}
