//! Typed strategy parameters.
//!
//! Strategies expose their tunables as a [`Parameters`] map and accept a new
//! assignment through `Strategy::apply`. Values are either integers or
//! floats; the optimizer enumerates them from a grid.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::BacktestError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParamValue::Int(v) => v as f64,
            ParamValue::Float(v) => v,
        }
    }

    /// Non-negative integral value, accepting floats with no fractional part.
    pub fn as_usize(&self) -> Option<usize> {
        match *self {
            ParamValue::Int(v) => usize::try_from(v).ok(),
            ParamValue::Float(v) if v >= 0.0 && v.fract() == 0.0 && v.is_finite() => {
                Some(v as usize)
            }
            ParamValue::Float(_) => None,
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl FromStr for ParamValue {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(v) = s.parse::<i64>() {
            return Ok(ParamValue::Int(v));
        }
        match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(ParamValue::Float(v)),
            _ => Err(BacktestError::invalid_parameters(format!(
                "'{}' is not a numeric parameter value",
                s
            ))),
        }
    }
}

/// Named parameter assignment for one strategy instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, ParamValue>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` on top of `self`.
    pub fn merged(&self, other: &Parameters) -> Parameters {
        let mut merged = self.clone();
        for (name, value) in other.iter() {
            merged.insert(name, value);
        }
        merged
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{}", parts.join(", "))
    }
}

pub(crate) fn window_param(params: &Parameters, name: &str) -> Result<Option<usize>, BacktestError> {
    match params.get(name) {
        None => Ok(None),
        Some(value) => match value.as_usize() {
            Some(v) if v > 0 => Ok(Some(v)),
            _ => Err(BacktestError::invalid_parameters(format!(
                "{} must be a positive integer, got {}",
                name, value
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_and_float() {
        assert_eq!("20".parse::<ParamValue>().unwrap(), ParamValue::Int(20));
        assert_eq!(" 2.5 ".parse::<ParamValue>().unwrap(), ParamValue::Float(2.5));
        assert!("abc".parse::<ParamValue>().is_err());
        assert!("NaN".parse::<ParamValue>().is_err());
    }

    #[test]
    fn as_usize_accepts_whole_floats() {
        assert_eq!(ParamValue::Float(14.0).as_usize(), Some(14));
        assert_eq!(ParamValue::Float(14.5).as_usize(), None);
        assert_eq!(ParamValue::Int(-1).as_usize(), None);
    }

    #[test]
    fn display_is_sorted() {
        let p = Parameters::new().with("short_window", 5usize).with("long_window", 20usize);
        assert_eq!(p.to_string(), "long_window=20, short_window=5");
    }

    #[test]
    fn merged_overrides() {
        let base = Parameters::new().with("a", 1i64).with("b", 2i64);
        let overlay = Parameters::new().with("b", 3i64);
        let merged = base.merged(&overlay);
        assert_eq!(merged.get("a"), Some(ParamValue::Int(1)));
        assert_eq!(merged.get("b"), Some(ParamValue::Int(3)));
    }

    #[test]
    fn window_param_rejects_zero() {
        let p = Parameters::new().with("w", 0i64);
        assert!(window_param(&p, "w").is_err());
        assert_eq!(window_param(&p, "missing").unwrap(), None);
    }

    #[test]
    fn serializes_as_plain_map() {
        let p = Parameters::new().with("short_window", 5usize).with("ratio", 0.5);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"ratio":0.5,"short_window":5}"#);
    }
}
