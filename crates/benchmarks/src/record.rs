//! Benchmark record types.
//!
//! A [`BenchmarkRecord`] pairs the configuration a trial ran under with the
//! values it measured. Both halves are open-ended string-keyed maps so that
//! different benchmarks can store different axes, but values are restricted
//! to the closed [`Scalar`] union to keep serialization deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single attribute or result value.
///
/// Deserialization tries the variants in declaration order, so a JSON
/// integer always comes back as [`Scalar::Integer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Whole number.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Free-form text.
    Text(String),
}

impl Scalar {
    /// Numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Text(_) => None,
        }
    }

    /// Integer value, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Parse a command-line value: integers first, then floats, then text.
    pub fn parse_loose(raw: &str) -> Self {
        if let Ok(v) = raw.parse::<i64>() {
            Scalar::Integer(v)
        } else if let Ok(v) = raw.parse::<f64>() {
            Scalar::Float(v)
        } else {
            Scalar::Text(raw.to_string())
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Integer(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Integer(v.into())
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::Integer(v.into())
    }
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => Scalar::Integer(v),
            Err(_) => Scalar::Float(v as f64),
        }
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

/// String-keyed map of scalars. Keys serialize in sorted order.
pub type ScalarMap = BTreeMap<String, Scalar>;

/// One measurement: the configuration of a trial and what it produced.
///
/// Records are immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkRecord {
    target_attributes: ScalarMap,
    test_result: ScalarMap,
}

impl BenchmarkRecord {
    /// Create a record from complete maps.
    pub fn new(target_attributes: ScalarMap, test_result: ScalarMap) -> Self {
        Self {
            target_attributes,
            test_result,
        }
    }

    /// Start building a record.
    pub fn builder() -> BenchmarkRecordBuilder {
        BenchmarkRecordBuilder::default()
    }

    /// Independent variables of the trial.
    pub fn target_attributes(&self) -> &ScalarMap {
        &self.target_attributes
    }

    /// Measured values.
    pub fn test_result(&self) -> &ScalarMap {
        &self.test_result
    }

    /// Look up an attribute.
    pub fn attribute(&self, key: &str) -> Option<&Scalar> {
        self.target_attributes.get(key)
    }

    /// Look up a result value.
    pub fn result(&self, key: &str) -> Option<&Scalar> {
        self.test_result.get(key)
    }

    /// Look up `key` among attributes first, then results.
    pub fn field(&self, key: &str) -> Option<&Scalar> {
        self.attribute(key).or_else(|| self.result(key))
    }
}

/// Builder for [`BenchmarkRecord`].
#[derive(Debug, Default)]
pub struct BenchmarkRecordBuilder {
    target_attributes: ScalarMap,
    test_result: ScalarMap,
}

impl BenchmarkRecordBuilder {
    /// Add a configuration attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.target_attributes.insert(key.into(), value.into());
        self
    }

    /// Add a measured value.
    pub fn result(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.test_result.insert(key.into(), value.into());
        self
    }

    /// Finish the record.
    pub fn build(self) -> BenchmarkRecord {
        BenchmarkRecord::new(self.target_attributes, self.test_result)
    }
}
