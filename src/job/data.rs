use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JobError;

/// Parameters of a single job.
///
/// Either a single scalar or a map of string keys to scalars. The value is
/// stored as raw JSON so that unsupported shapes can still be constructed
/// (e.g. when loaded from a batch file); they are rejected when a name or
/// hash is derived from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobData(Value);

/// A validated scalar job parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar<'a> {
    Str(&'a str),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for Scalar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => f.write_str(s),
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Validated view over a [`JobData`].
#[derive(Debug)]
pub enum JobDataView<'a> {
    Scalar(Scalar<'a>),
    /// Entries sorted by key.
    Map(Vec<(&'a str, Scalar<'a>)>),
}

impl JobData {
    pub fn from_value(value: Value) -> Self {
        JobData(value)
    }

    /// Build a structured job from key/value pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map: serde_json::Map<String, Value> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        JobData(Value::Object(map))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up a key of a structured job.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.as_object().and_then(|m| m.get(key))
    }

    /// Validate the data and return it with keys in sorted order.
    pub fn view(&self) -> crate::error::Result<JobDataView<'_>> {
        match &self.0 {
            Value::Object(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let scalar = as_scalar(value).ok_or_else(|| {
                        JobError::unsupported_job_data(format!(
                            "value for key '{key}' must be a string, integer or boolean, got {value}"
                        ))
                    })?;
                    entries.push((key.as_str(), scalar));
                }
                entries.sort_by(|a, b| a.0.cmp(b.0));
                Ok(JobDataView::Map(entries))
            }
            other => as_scalar(other).map(JobDataView::Scalar).ok_or_else(|| {
                JobError::unsupported_job_data(format!(
                    "job data must be a scalar or a map of scalars, got {other}"
                ))
            }),
        }
    }
}

fn as_scalar(value: &Value) -> Option<Scalar<'_>> {
    match value {
        Value::String(s) => Some(Scalar::Str(s)),
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Number(n) => n.as_i64().map(Scalar::Int),
        _ => None,
    }
}

impl From<&str> for JobData {
    fn from(s: &str) -> Self {
        JobData(Value::String(s.to_string()))
    }
}

impl From<String> for JobData {
    fn from(s: String) -> Self {
        JobData(Value::String(s))
    }
}

impl From<i64> for JobData {
    fn from(n: i64) -> Self {
        JobData(Value::from(n))
    }
}

impl From<bool> for JobData {
    fn from(b: bool) -> Self {
        JobData(Value::Bool(b))
    }
}

impl From<Value> for JobData {
    fn from(value: Value) -> Self {
        JobData(value)
    }
}

impl From<BTreeMap<String, Value>> for JobData {
    fn from(map: BTreeMap<String, Value>) -> Self {
        JobData::from_pairs(map)
    }
}
