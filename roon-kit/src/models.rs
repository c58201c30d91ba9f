// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! Domain entities and the `Changed`-frame multi-event parsing rule
//! (spec.md §4.4.10): a small typed parser over a generic JSON map rather than
//! a full schema, per the source's own treatment of dynamic bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A logical playback target: one or more [`Output`]s playing the same content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// The zone's stable id.
    pub zone_id: String,
    /// The zone's human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// The outputs that make up this zone.
    #[serde(default)]
    pub outputs: Vec<Output>,
    /// Everything else the Core sent; domain models ignore unknown fields
    /// but keep them reachable for callers that need them.
    #[serde(flatten)]
    pub extra: Value,
}

/// A physical audio device addressable independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// The output's stable id.
    pub output_id: String,
    /// The output's human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// The id of the zone this output currently belongs to.
    #[serde(default)]
    pub zone_id: Option<String>,
    #[serde(flatten)]
    pub extra: Value,
}

/// An entry in a zone's playback queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// A per-zone monotonically increasing id for this queue entry.
    pub queue_item_id: i64,
    #[serde(flatten)]
    pub extra: Value,
}

/// A node in a browse hierarchy, as returned by `browse`/`load`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseItem {
    /// The opaque key used to browse into this item.
    #[serde(default)]
    pub item_key: Option<String>,
    /// The item's display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Secondary line shown under the title, if any.
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(flatten)]
    pub extra: Value,
}

/// One event parsed out of a `zones` stream's `Changed` frame, in the fixed
/// order the spec requires: removed, added, changed, seek_changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ZonesEvent {
    /// `zones_removed`: zone ids that no longer exist.
    Removed(Vec<String>),
    /// `zones_added`: newly created zones.
    Added(Vec<Zone>),
    /// `zones_changed`: zones whose non-seek state changed.
    Changed(Vec<Zone>),
    /// `zones_seek_changed`: zones whose playback position changed.
    SeekChanged(Vec<Value>),
}

/// One event parsed out of an `outputs` stream's `Changed` frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputsEvent {
    /// `outputs_removed`.
    Removed(Vec<String>),
    /// `outputs_added`.
    Added(Vec<Output>),
    /// `outputs_changed`.
    Changed(Vec<Output>),
}

/// One event parsed out of a `queue` stream's frames. Roon documents the
/// `Subscribed` snapshot shape with confidence; the incremental shape isn't
/// pinned down the same way, so it is forwarded raw rather than typed.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// The full current queue, sent on `Subscribed` and any full refresh.
    Snapshot(Vec<QueueItem>),
    /// An incremental update, forwarded as received.
    Changed(Value),
}

fn string_array(body: &Value, key: &str) -> Option<Vec<String>> {
    body.get(key)?.as_array().map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

fn typed_array<T: for<'de> Deserialize<'de>>(body: &Value, key: &str) -> Option<Vec<T>> {
    let array = body.get(key)?.as_array()?;
    if array.is_empty() {
        return None;
    }
    serde_json::from_value(Value::Array(array.clone())).ok()
}

fn raw_array(body: &Value, key: &str) -> Option<Vec<Value>> {
    body.get(key)?.as_array().cloned()
}

/// Parse a zones `Changed` body into events, in the order removed/added/
/// changed/seek_changed, skipping any key that is absent or empty. A body
/// with no matching keys yields no events.
pub fn parse_zones_changed(body: &Value) -> Vec<ZonesEvent> {
    let mut events = Vec::new();

    if let Some(removed) = string_array(body, "zones_removed").filter(|v| !v.is_empty()) {
        events.push(ZonesEvent::Removed(removed));
    }
    if let Some(added) = typed_array::<Zone>(body, "zones_added") {
        events.push(ZonesEvent::Added(added));
    }
    if let Some(changed) = typed_array::<Zone>(body, "zones_changed") {
        events.push(ZonesEvent::Changed(changed));
    }
    if let Some(seek) = raw_array(body, "zones_seek_changed").filter(|v| !v.is_empty()) {
        events.push(ZonesEvent::SeekChanged(seek));
    }

    events
}

/// Parse an outputs `Changed` body into events, same ordering rule as
/// [`parse_zones_changed`] (outputs have no `seek_changed` key).
pub fn parse_outputs_changed(body: &Value) -> Vec<OutputsEvent> {
    let mut events = Vec::new();

    if let Some(removed) = string_array(body, "outputs_removed").filter(|v| !v.is_empty()) {
        events.push(OutputsEvent::Removed(removed));
    }
    if let Some(added) = typed_array::<Output>(body, "outputs_added") {
        events.push(OutputsEvent::Added(added));
    }
    if let Some(changed) = typed_array::<Output>(body, "outputs_changed") {
        events.push(OutputsEvent::Changed(changed));
    }

    events
}

/// Parse a `queue` stream frame: a body carrying an `items` array (even an
/// empty one) is treated as a full snapshot and typed into [`QueueItem`]s;
/// anything else is forwarded as a raw [`QueueEvent::Changed`].
pub fn parse_queue_changed(body: &Value) -> Vec<QueueEvent> {
    match body.get("items").and_then(|v| v.as_array()) {
        Some(array) => {
            let items: Vec<QueueItem> = serde_json::from_value(Value::Array(array.clone())).unwrap_or_default();
            vec![QueueEvent::Snapshot(items)]
        }
        None => vec![QueueEvent::Changed(body.clone())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emits_one_event_per_non_empty_key_in_fixed_order() {
        let body = json!({
            "zones_removed": ["z1", "z2"],
            "zones_added": [{"zone_id": "z3", "display_name": "Group"}],
            "zones_changed": [{"zone_id": "z4", "display_name": "Other"}],
        });

        let events = parse_zones_changed(&body);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ZonesEvent::Removed(ids) if ids == &vec!["z1".to_string(), "z2".to_string()]));
        assert!(matches!(&events[1], ZonesEvent::Added(zones) if zones[0].zone_id == "z3"));
        assert!(matches!(&events[2], ZonesEvent::Changed(zones) if zones[0].zone_id == "z4"));
    }

    #[test]
    fn empty_keys_are_skipped() {
        let body = json!({ "zones_removed": [], "zones_added": [] });
        assert!(parse_zones_changed(&body).is_empty());
    }

    #[test]
    fn frame_with_no_known_keys_yields_no_events() {
        let body = json!({ "something_else": true });
        assert!(parse_zones_changed(&body).is_empty());
    }

    #[test]
    fn seek_changed_is_emitted_last() {
        let body = json!({
            "zones_changed": [{"zone_id": "z1"}],
            "zones_seek_changed": [{"zone_id": "z1", "seek_position": 42}],
        });
        let events = parse_zones_changed(&body);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ZonesEvent::Changed(_)));
        assert!(matches!(events[1], ZonesEvent::SeekChanged(_)));
    }

    #[test]
    fn outputs_changed_has_no_seek_key() {
        let body = json!({
            "outputs_removed": ["o1"],
            "outputs_changed": [{"output_id": "o2", "zone_id": "z1"}],
        });
        let events = parse_outputs_changed(&body);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], OutputsEvent::Changed(outs) if outs[0].output_id == "o2"));
    }

    #[test]
    fn queue_snapshot_is_parsed_into_typed_items() {
        let body = json!({ "items": [{"queue_item_id": 1}, {"queue_item_id": 2}] });
        let events = parse_queue_changed(&body);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], QueueEvent::Snapshot(items) if items.len() == 2 && items[0].queue_item_id == 1));
    }

    #[test]
    fn empty_queue_snapshot_is_still_a_snapshot() {
        let body = json!({ "items": [] });
        let events = parse_queue_changed(&body);
        assert!(matches!(&events[0], QueueEvent::Snapshot(items) if items.is_empty()));
    }

    #[test]
    fn queue_frame_without_items_is_forwarded_raw() {
        let body = json!({ "changes": [{"operation": "insert"}] });
        let events = parse_queue_changed(&body);
        assert!(matches!(&events[0], QueueEvent::Changed(v) if v == &body));
    }
}
