// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! The value handed to callers of [`crate::Connection::send`] and the items
//! yielded by [`crate::Connection::subscribe`] streams.

use crate::codec::is_success_name;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A decoded `COMPLETE`/`CONTINUE` response, matched up to its request by id.
#[derive(Debug, Clone)]
pub struct RoonResponse {
    /// The status/name token, e.g. `Success` or an error name.
    pub name: String,
    /// The parsed JSON body, if any.
    pub body: Option<Value>,
}

impl RoonResponse {
    /// Whether this response's name is one of the well-known success tokens.
    pub fn is_success(&self) -> bool {
        is_success_name(&self.name)
    }

    /// The error message for a non-success response: `body.error` if present,
    /// else the name itself.
    pub fn error_message(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }
        let from_body = self
            .body
            .as_ref()
            .and_then(|b| b.get("error"))
            .and_then(|e| e.as_str())
            .map(str::to_string);
        Some(from_body.unwrap_or_else(|| self.name.clone()))
    }

    /// Deserialize the body into `T`, if present.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.body
            .clone()
            .map(serde_json::from_value)
            .transpose()
    }
}
