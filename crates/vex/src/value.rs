//! value representation
//!
//! A key holds exactly one of two shapes at a time:
//! - `Scalar` — a single line of words
//! - `Block` — an ordered sequence of raw, unexpanded lines
//!
//! The same type doubles as the consumer-facing output model: a resolved
//! scalar serializes as a string, a resolved block as a sequence of strings.
//! There is no `null`; an undefined-but-lax lookup produces an empty scalar.
use serde::{ser::SerializeSeq, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Scalar(String),
    Block(Vec<String>),
}

impl Value {
    pub fn is_block(&self) -> bool {
        matches!(self, Value::Block(_))
    }

    /// Shape name used in [crate::error::Error::WrongShape] messages
    pub(crate) fn shape(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "a scalar",
            Value::Block(_) => "a multi-line block",
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Scalar(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Scalar(value.to_string())
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::Block(value)
    }
}

impl From<&[&str]> for Value {
    fn from(value: &[&str]) -> Self {
        Value::Block(value.iter().map(|line| line.to_string()).collect())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Scalar(text) => f.write_str(text),
            Value::Block(lines) => f.write_str(&lines.join("\n")),
        }
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Scalar(text) => serializer.serialize_str(text),
            Value::Block(lines) => {
                let mut ser = serializer.serialize_seq(Some(lines.len()))?;
                for line in lines {
                    ser.serialize_element(line)?;
                }
                ser.end()
            }
        }
    }
}
