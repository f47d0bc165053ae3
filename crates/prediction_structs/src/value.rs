use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A field value as it arrived at the boundary, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// A value taken from a JSON body.
    Json(serde_json::Value),
    /// A binary payload, e.g. a multipart file part.
    Binary(Bytes),
}

/// Raw request fields keyed by name.
pub type RawFields = HashMap<String, RawValue>;

/// A field value coerced to its declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Number(f64),
    Image(Bytes),
}

/// Validated request fields, in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedFields {
    values: Vec<(String, TypedValue)>,
}

impl TypedFields {
    #[must_use]
    pub const fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn push(&mut self, name: impl Into<String>, value: TypedValue) {
        self.values.push((name.into(), value));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.values
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// JSON-compatible prediction: a number or an arbitrarily nested list of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionValue {
    Scalar(f64),
    List(Vec<PredictionValue>),
}

impl PredictionValue {
    /// Nests a flat row-major buffer according to `shape`.
    ///
    /// An empty shape yields a scalar. Returns `None` when the buffer length
    /// does not match the shape.
    #[must_use]
    pub fn from_shaped(values: &[f32], shape: &[usize]) -> Option<Self> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return None;
        }

        Some(Self::nest(values, shape))
    }

    fn nest(values: &[f32], shape: &[usize]) -> Self {
        match shape.split_first() {
            None => Self::Scalar(values.first().copied().map_or(0.0, f64::from)),
            Some((&len, rest)) => {
                let stride: usize = rest.iter().product();
                let items = (0..len)
                    .map(|i| Self::nest(&values[i * stride..(i + 1) * stride], rest))
                    .collect();
                Self::List(items)
            }
        }
    }

    /// Whether every number in the value is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Scalar(v) => v.is_finite(),
            Self::List(items) => items.iter().all(Self::is_finite),
        }
    }

    #[must_use]
    pub const fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::List(_) => None,
        }
    }
}
