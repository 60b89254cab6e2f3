// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single object to be written to a collection.
///
/// Only `id` and `properties` go on the wire; the collection is carried by the batch envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    #[serde(default, skip_serializing)]
    pub collection: String,
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Object {
    pub fn new(
        collection: impl Into<String>,
        id: impl Into<String>,
        properties: Map<String, Value>,
    ) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            properties,
        }
    }

    /// Checks the shape required before an object is accepted by the client
    pub fn validate(&self) -> Result<(), Error> {
        if self.collection.is_empty() {
            return Err(Error::InvalidObject(
                "collection must not be empty".to_string(),
            ));
        }
        if self.id.is_empty() {
            return Err(Error::InvalidObject("id must not be empty".to_string()));
        }
        if self.properties.is_empty() {
            return Err(Error::InvalidObject(format!(
                "object `{}` must have at least one property",
                self.id
            )));
        }
        Ok(())
    }
}
