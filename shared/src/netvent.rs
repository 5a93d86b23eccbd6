//! Netvent: a tagged key-value table format.
//!
//! A netvent message is an integer tag line followed by a table payload:
//!
//! ```text
//! 2
//! {"rot":45.0,"x":150,"y":200}
//! ```
//!
//! The payload is compact JSON. The frame terminator `;` is always written as
//! the JSON escape `\u003b`, so a serialized message never contains it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub type Table = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Table(Table),
}

#[derive(Debug, Error)]
pub enum NetventError {
    #[error("message has no tag line")]
    MissingTag,
    #[error("invalid tag {0:?}")]
    InvalidTag(String),
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Table> for Value {
    fn from(v: Table) -> Self {
        Value::Table(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

/// Serializes `data` under `tag`. The result never contains the frame terminator.
pub fn serialize(tag: i64, data: &Table) -> Result<String, NetventError> {
    let payload = serde_json::to_string(data)?.replace(';', "\\u003b");
    Ok(format!("{tag}\n{payload}"))
}

/// Splits a message into its tag and payload table.
///
/// An empty payload decodes to an empty table.
pub fn deserialize(message: &str) -> Result<(i64, Table), NetventError> {
    let (tag, payload) = match message.split_once('\n') {
        Some((tag, payload)) => (tag, payload),
        None => (message, ""),
    };

    let tag = tag.trim();
    if tag.is_empty() {
        return Err(NetventError::MissingTag);
    }
    let tag = tag
        .parse::<i64>()
        .map_err(|_| NetventError::InvalidTag(tag.to_string()))?;

    let payload = payload.trim();
    if payload.is_empty() {
        return Ok((tag, Table::new()));
    }

    Ok((tag, serde_json::from_str(payload)?))
}
