// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! `com.roonlabs.browse:1` session wrapper: a stateful-but-serialized browse
//! session over `browse`/`load` (spec.md §4.5).

use crate::connection::Connection;
use crate::error::ServiceError;
use crate::models::BrowseItem;
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

const SERVICE: &str = "com.roonlabs.browse:1";

fn path(method: &str) -> String {
    format!("{SERVICE}/{method}")
}

/// The cached metadata a browse session keeps between calls; the spec
/// restricts this to hierarchy/level/list identity only.
#[derive(Debug, Clone, Default)]
pub struct BrowseLevel {
    /// The hierarchy this session is currently browsing, e.g. `browse` or `search`.
    pub current_hierarchy: Option<String>,
    /// The depth of the current list, as reported by the Core.
    pub current_level: Option<u32>,
    /// The current list's title/count metadata.
    pub current_list: Option<Value>,
}

/// One page of browse results.
#[derive(Debug, Clone, Default)]
pub struct BrowseResult {
    /// The raw response body, kept alongside the typed items for fields this
    /// crate doesn't model explicitly (e.g. `action`, `is_input`).
    pub raw: Option<Value>,
}

/// A loaded page of items.
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    /// The items on this page.
    pub items: Vec<BrowseItem>,
    /// The offset this page started at.
    pub offset: Option<u32>,
    /// The total number of items in the list, if known.
    pub total_count: Option<u32>,
}

/// A browse session. Calls are expected to be issued one at a time by the
/// host (the service does not itself serialize concurrent callers).
pub struct BrowseService {
    connection: Connection,
    multi_session: bool,
    session_key: Mutex<Option<String>>,
    level: Mutex<BrowseLevel>,
}

impl BrowseService {
    /// A single-session browse service: no session key is sent.
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            multi_session: false,
            session_key: Mutex::new(None),
            level: Mutex::new(BrowseLevel::default()),
        }
    }

    /// A multi-session browse service: every request carries a fresh UUID
    /// session key (`multi_session_key`).
    pub fn new_multi_session(connection: Connection) -> Self {
        let service = Self {
            connection,
            multi_session: true,
            session_key: Mutex::new(None),
            level: Mutex::new(BrowseLevel::default()),
        };
        *service.session_key.lock() = Some(Uuid::new_v4().to_string());
        service
    }

    /// The metadata cached from the last successful `browse`/`load` call.
    pub fn level(&self) -> BrowseLevel {
        self.level.lock().clone()
    }

    fn attach_session(&self, body: &mut Value) {
        if self.multi_session {
            if let Some(key) = self.session_key.lock().clone() {
                body["multi_session_key"] = json!(key);
            }
        }
    }

    async fn send_session(&self, method: &str, mut body: Value) -> Result<crate::response::RoonResponse, ServiceError> {
        self.attach_session(&mut body);
        Ok(self.connection.send(&path(method), Some(body)).await?)
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, ServiceError> {
        let response = self.send_session(method, body).await?;
        if !response.is_success() {
            return Err(ServiceError::BrowseFailed(
                response.error_message().unwrap_or_else(|| response.name.clone()),
            ));
        }
        Ok(response.body.unwrap_or(Value::Null))
    }

    fn remember_level(&self, body: &Value) {
        let mut level = self.level.lock();
        if let Some(hierarchy) = body.get("list").and_then(|l| l.get("hierarchy")).and_then(|h| h.as_str()) {
            level.current_hierarchy = Some(hierarchy.to_string());
        }
        if let Some(current_level) = body.get("list").and_then(|l| l.get("level")).and_then(|v| v.as_u64()) {
            level.current_level = Some(current_level as u32);
        }
        if let Some(list) = body.get("list") {
            level.current_list = Some(list.clone());
        }
    }

    /// Enter a new browse hierarchy from the top.
    pub async fn browse_hierarchy(&self, hierarchy: &str, zone_or_output_id: Option<&str>) -> Result<BrowseResult, ServiceError> {
        let mut body = json!({ "hierarchy": hierarchy });
        if let Some(zone) = zone_or_output_id {
            body["zone_or_output_id"] = json!(zone);
        }
        self.browse_call(body).await
    }

    /// Browse into a specific item.
    pub async fn browse_item(&self, item_key: &str, zone_or_output_id: Option<&str>) -> Result<BrowseResult, ServiceError> {
        let mut body = json!({ "item_key": item_key });
        if let Some(zone) = zone_or_output_id {
            body["zone_or_output_id"] = json!(zone);
        }
        self.browse_call(body).await
    }

    /// Refresh the current list without changing position.
    pub async fn refresh(&self) -> Result<BrowseResult, ServiceError> {
        self.browse_call(json!({ "refresh_list": true })).await
    }

    /// Go back one level.
    pub async fn back(&self) -> Result<BrowseResult, ServiceError> {
        self.browse_call(json!({ "pop_levels": 1 })).await
    }

    /// Go back to the root of the current hierarchy.
    pub async fn back_to_root(&self) -> Result<BrowseResult, ServiceError> {
        self.browse_call(json!({ "pop_all": true })).await
    }

    /// Jump the current list's display offset, e.g. after the host scrolled.
    pub async fn set_display_offset(&self, offset: u32) -> Result<BrowseResult, ServiceError> {
        self.browse_call(json!({ "set_display_offset": offset })).await
    }

    /// Perform a text search within the current hierarchy.
    pub async fn search(&self, input: &str) -> Result<BrowseResult, ServiceError> {
        self.browse_call(json!({ "input": input })).await
    }

    async fn browse_call(&self, body: Value) -> Result<BrowseResult, ServiceError> {
        let body = self.call("browse", body).await?;
        self.remember_level(&body);
        Ok(BrowseResult { raw: Some(body) })
    }

    /// Load a page of items from the current list.
    pub async fn load(&self, offset: u32, count: Option<u32>) -> Result<LoadResult, ServiceError> {
        let mut body = json!({ "offset": offset });
        if let Some(count) = count {
            body["count"] = json!(count);
        }
        if let Some(level) = self.level.lock().current_level {
            body["level"] = json!(level);
        }
        let response = self.send_session("load", body).await?;
        if !response.is_success() {
            return Err(ServiceError::LoadFailed(
                response.error_message().unwrap_or_else(|| response.name.clone()),
            ));
        }
        let body = response.body.unwrap_or(Value::Null);

        let items: Vec<BrowseItem> = body
            .get("items")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e: serde_json::Error| ServiceError::LoadFailed(e.to_string()))?
            .unwrap_or_default();

        Ok(LoadResult {
            items,
            offset: body.get("offset").and_then(|v| v.as_u64()).map(|v| v as u32),
            total_count: body.get("list").and_then(|l| l.get("count")).and_then(|v| v.as_u64()).map(|v| v as u32),
        })
    }
}
