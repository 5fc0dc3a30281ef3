// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Normalization of loosely shaped provider webhook bodies.
//!
//! Both providers send either `{ "data": { ... } }` or the same fields at the
//! top level. [`PayloadShape`] settles that once so the event parsers read
//! from a single body with an optional root fallback.

use serde_json::{Map, Value};

/// Failure to turn a raw webhook body into an event.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("webhook body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("webhook body is not a JSON object")]
    NotAnObject,
}

/// The two envelope layouts providers use.
#[derive(Debug, Clone, Copy)]
pub enum PayloadShape<'a> {
    /// Event fields live under `data`; the root may repeat some of them.
    Enveloped {
        data: &'a Map<String, Value>,
        root: &'a Map<String, Value>,
    },
    /// Event fields live at the root.
    Flat(&'a Map<String, Value>),
}

impl<'a> PayloadShape<'a> {
    pub fn of(root: &'a Value) -> Result<Self, PayloadError> {
        let root = root.as_object().ok_or(PayloadError::NotAnObject)?;
        match root.get("data").and_then(Value::as_object) {
            Some(data) => Ok(PayloadShape::Enveloped { data, root }),
            None => Ok(PayloadShape::Flat(root)),
        }
    }

    /// Object holding the event fields.
    pub fn body(&self) -> &'a Map<String, Value> {
        match self {
            PayloadShape::Enveloped { data, .. } => data,
            PayloadShape::Flat(root) => root,
        }
    }

    /// Top-level object, identical to [`Self::body`] for flat payloads.
    pub fn root(&self) -> &'a Map<String, Value> {
        match self {
            PayloadShape::Enveloped { root, .. } => root,
            PayloadShape::Flat(root) => root,
        }
    }

    /// Event body as an owned value, kept on synthetic records.
    pub fn body_value(&self) -> Value {
        Value::Object(self.body().clone())
    }
}

/// Parse raw bytes into a JSON value.
pub fn parse_json(raw: &[u8]) -> Result<Value, PayloadError> {
    Ok(serde_json::from_slice(raw)?)
}

/// First key in `keys` holding a non-empty string or a number.
pub fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| map.get(*key).and_then(as_text))
}

/// Follow a JSON pointer and read the target as text.
pub fn pointer_text(map: &Map<String, Value>, pointer: &str) -> Option<String> {
    let (head, rest) = split_pointer(pointer);
    let value = map.get(head)?;
    let target = if rest.is_empty() {
        value
    } else {
        value.pointer(rest)?
    };
    as_text(target)
}

/// First key in `keys` holding a finite number or numeric string.
pub fn first_amount(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| map.get(*key).and_then(parse_amount))
}

/// Read a number or numeric string as a finite `f64`.
pub fn parse_amount(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Upper-cased, trimmed provider status; `UNKNOWN` when absent.
pub fn normalize_status(raw: Option<String>) -> String {
    raw.map(|status| status.trim().to_ascii_uppercase())
        .filter(|status| !status.is_empty())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn split_pointer(pointer: &str) -> (&str, &str) {
    let pointer = pointer.trim_start_matches('/');
    match pointer.find('/') {
        Some(idx) => (&pointer[..idx], &pointer[idx..]),
        None => (pointer, ""),
    }
}
