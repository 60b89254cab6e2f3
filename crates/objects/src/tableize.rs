// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Property transforms applied to every object before it is serialized.

use crate::error::Error;
use serde_json::{Map, Value};

/// Rewrites an object's properties before it is buffered.
///
/// An error drops the object from its batch; the rest of the collection is unaffected.
pub trait Transform: Send + Sync {
    fn transform(&self, properties: Map<String, Value>) -> Result<Map<String, Value>, Error>;
}

/// Leaves properties untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transform for Identity {
    fn transform(&self, properties: Map<String, Value>) -> Result<Map<String, Value>, Error> {
        Ok(properties)
    }
}

/// Flattens nested objects into a single level of snake_case columns.
///
/// `{"userInfo": {"First Name": "a"}}` becomes `{"user_info_first_name": "a"}`. Arrays and
/// scalars are kept as values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tableize;

impl Transform for Tableize {
    fn transform(&self, properties: Map<String, Value>) -> Result<Map<String, Value>, Error> {
        let mut flat = Map::new();
        flatten_into(&mut flat, properties, "");
        Ok(flat)
    }
}

fn flatten_into(flat: &mut Map<String, Value>, properties: Map<String, Value>, prefix: &str) {
    for (key, value) in properties {
        let column = if prefix.is_empty() {
            snake_case(&key)
        } else {
            format!("{prefix}_{}", snake_case(&key))
        };
        match value {
            Value::Object(nested) => flatten_into(flat, nested, &column),
            other => {
                flat.insert(column, other);
            }
        }
    }
}

/// `fooBar baz-Qux` -> `foo_bar_baz_qux`
pub fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev: Option<char> = None;
    for ch in key.chars() {
        if ch.is_alphanumeric() {
            let boundary = matches!(prev, Some(p) if p.is_lowercase() || p.is_numeric())
                && ch.is_uppercase();
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev = Some(ch);
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev = None;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}
