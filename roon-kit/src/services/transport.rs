// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! `com.roonlabs.transport:2` command and subscription wrapper.

use crate::connection::{Connection, SubscriptionStream};
use crate::error::{Error, ServiceError};
use crate::models::{self, Output, OutputsEvent, QueueEvent, Zone, ZonesEvent};
use crate::subscription::ActiveSlot;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

const SERVICE: &str = "com.roonlabs.transport:2";

fn path(method: &str) -> String {
    format!("{SERVICE}/{method}")
}

/// A live zones/outputs/queue subscription that yields the individual events
/// parsed out of each `Changed` frame, guarded against the stale-termination
/// bug (spec.md §4.4.9): once superseded, a stream silently stops instead of
/// clobbering the newer subscription's installed state.
struct GuardedEvents<T> {
    stream: SubscriptionStream,
    slot: Arc<ActiveSlot>,
    my_key: u64,
    pending: VecDeque<T>,
    parse: fn(&Value) -> Vec<T>,
}

impl<T> GuardedEvents<T> {
    async fn next(&mut self) -> Option<T> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if !self.slot.is_current(self.my_key) {
                return None;
            }
            let response = self.stream.next().await?;
            if let Some(body) = response.body.as_ref() {
                self.pending.extend((self.parse)(body));
            }
        }
    }
}

/// Yields [`ZonesEvent`]s for as long as this is the current `zones`
/// subscription.
pub struct ZonesSubscription(GuardedEvents<ZonesEvent>);

impl ZonesSubscription {
    /// Await the next zones event, or `None` once this subscription has
    /// ended or been superseded.
    pub async fn next(&mut self) -> Option<ZonesEvent> {
        self.0.next().await
    }
}

/// Yields [`OutputsEvent`]s for as long as this is the current `outputs`
/// subscription.
pub struct OutputsSubscription(GuardedEvents<OutputsEvent>);

impl OutputsSubscription {
    /// Await the next outputs event, or `None` once this subscription has
    /// ended or been superseded.
    pub async fn next(&mut self) -> Option<OutputsEvent> {
        self.0.next().await
    }
}

/// Yields [`QueueEvent`]s for as long as this is the current `queue`
/// subscription for its zone/output id. The `Subscribed` snapshot is typed
/// into [`crate::models::QueueItem`]s; any incremental frame is forwarded raw,
/// since Roon's incremental queue shape isn't pinned down with the same
/// confidence as the snapshot (spec.md §4.4.10).
pub struct QueueSubscription(GuardedEvents<QueueEvent>);

impl QueueSubscription {
    /// Await the next queue event, or `None` once this subscription has ended
    /// or been superseded.
    pub async fn next(&mut self) -> Option<QueueEvent> {
        self.0.next().await
    }
}

/// A thin, stateful wrapper over the transport service's commands and
/// subscriptions. One `TransportService` is meant to be shared by a single
/// host session; it is not reentrant across concurrent `browse`-style
/// sequencing the way [`crate::services::BrowseService`] is.
pub struct TransportService {
    connection: Connection,
    selected: Mutex<Option<String>>,
    zones_slot: Arc<ActiveSlot>,
    outputs_slot: Arc<ActiveSlot>,
    queue_slots: Mutex<HashMap<String, Arc<ActiveSlot>>>,
}

impl TransportService {
    /// Wrap an existing, already-registered [`Connection`].
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            selected: Mutex::new(None),
            zones_slot: Arc::new(ActiveSlot::new()),
            outputs_slot: Arc::new(ActiveSlot::new()),
            queue_slots: Mutex::new(HashMap::new()),
        }
    }

    /// Remember a zone or output id to use as the implicit target for
    /// zone-relative commands that are not given one explicitly.
    pub fn select_zone(&self, zone_or_output_id: impl Into<String>) {
        *self.selected.lock() = Some(zone_or_output_id.into());
    }

    /// The currently selected zone or output id, if any.
    pub fn selected_zone(&self) -> Option<String> {
        self.selected.lock().clone()
    }

    fn resolve_target(&self, explicit: Option<&str>) -> Result<String, ServiceError> {
        if let Some(id) = explicit {
            return Ok(id.to_string());
        }
        self.selected.lock().clone().ok_or(ServiceError::NoZoneSelected)
    }

    async fn command(&self, method: &str, body: Value) -> Result<(), ServiceError> {
        let response = self.connection.send(&path(method), Some(body)).await?;
        if !response.is_success() {
            return Err(ServiceError::CommandFailed(
                response.error_message().unwrap_or_else(|| response.name.clone()),
            ));
        }
        Ok(())
    }

    /// `subscribe_zones` — finishes any previous zones subscription first so
    /// its consumer terminates, then installs the new one.
    pub async fn subscribe_zones(&self) -> Result<ZonesSubscription, Error> {
        let my_key = self.zones_slot.install();
        let stream = self
            .connection
            .subscribe(&path("subscribe_zones"), None, Some("unsubscribe_zones"))
            .await?;
        Ok(ZonesSubscription(GuardedEvents {
            stream,
            slot: self.zones_slot.clone(),
            my_key,
            pending: VecDeque::new(),
            parse: models::parse_zones_changed,
        }))
    }

    /// `subscribe_outputs`, same latest-wins contract as [`Self::subscribe_zones`].
    pub async fn subscribe_outputs(&self) -> Result<OutputsSubscription, Error> {
        let my_key = self.outputs_slot.install();
        let stream = self
            .connection
            .subscribe(&path("subscribe_outputs"), None, Some("unsubscribe_outputs"))
            .await?;
        Ok(OutputsSubscription(GuardedEvents {
            stream,
            slot: self.outputs_slot.clone(),
            my_key,
            pending: VecDeque::new(),
            parse: models::parse_outputs_changed,
        }))
    }

    /// `subscribe_queue` for a specific zone or output id; the latest-wins
    /// slot is keyed per id, independent of other queues.
    pub async fn subscribe_queue(
        &self,
        zone_or_output_id: &str,
        max_item_count: Option<u32>,
    ) -> Result<QueueSubscription, Error> {
        let slot = self
            .queue_slots
            .lock()
            .entry(zone_or_output_id.to_string())
            .or_insert_with(|| Arc::new(ActiveSlot::new()))
            .clone();
        let my_key = slot.install();

        let mut body = json!({ "zone_or_output_id": zone_or_output_id });
        if let Some(count) = max_item_count {
            body["max_item_count"] = json!(count);
        }
        let stream = self
            .connection
            .subscribe(&path("subscribe_queue"), Some(body), Some("unsubscribe_queue"))
            .await?;
        Ok(QueueSubscription(GuardedEvents {
            stream,
            slot,
            my_key,
            pending: VecDeque::new(),
            parse: models::parse_queue_changed,
        }))
    }

    /// `get_zones` — a one-shot snapshot rather than a subscription.
    pub async fn get_zones(&self) -> Result<Vec<Zone>, ServiceError> {
        let response = self.connection.send(&path("get_zones"), None).await?;
        let zones = response
            .body
            .as_ref()
            .and_then(|b| b.get("zones"))
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e: serde_json::Error| ServiceError::CommandFailed(e.to_string()))?
            .unwrap_or_default();
        Ok(zones)
    }

    /// `get_outputs` — a one-shot snapshot rather than a subscription.
    pub async fn get_outputs(&self) -> Result<Vec<Output>, ServiceError> {
        let response = self.connection.send(&path("get_outputs"), None).await?;
        let outputs = response
            .body
            .as_ref()
            .and_then(|b| b.get("outputs"))
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e: serde_json::Error| ServiceError::CommandFailed(e.to_string()))?
            .unwrap_or_default();
        Ok(outputs)
    }

    async fn control(&self, zone_or_output_id: Option<&str>, control: &str) -> Result<(), ServiceError> {
        let target = self.resolve_target(zone_or_output_id)?;
        self.command("control", json!({ "zone_or_output_id": target, "control": control }))
            .await
    }

    /// Resume playback.
    pub async fn play(&self, zone_or_output_id: Option<&str>) -> Result<(), ServiceError> {
        self.control(zone_or_output_id, "play").await
    }

    /// Pause playback.
    pub async fn pause(&self, zone_or_output_id: Option<&str>) -> Result<(), ServiceError> {
        self.control(zone_or_output_id, "pause").await
    }

    /// Toggle play/pause.
    pub async fn play_pause(&self, zone_or_output_id: Option<&str>) -> Result<(), ServiceError> {
        self.control(zone_or_output_id, "playpause").await
    }

    /// Stop playback.
    pub async fn stop(&self, zone_or_output_id: Option<&str>) -> Result<(), ServiceError> {
        self.control(zone_or_output_id, "stop").await
    }

    /// Skip to the next track.
    pub async fn next(&self, zone_or_output_id: Option<&str>) -> Result<(), ServiceError> {
        self.control(zone_or_output_id, "next").await
    }

    /// Go back to the previous track.
    pub async fn previous(&self, zone_or_output_id: Option<&str>) -> Result<(), ServiceError> {
        self.control(zone_or_output_id, "previous").await
    }

    /// Set an output's volume to an absolute value.
    pub async fn set_volume(&self, output_id: &str, value: f64) -> Result<(), ServiceError> {
        self.command(
            "change_volume",
            json!({ "output_id": output_id, "how": "absolute", "value": value }),
        )
        .await
    }

    /// Adjust an output's volume by a relative amount.
    pub async fn adjust_volume(&self, output_id: &str, value: f64) -> Result<(), ServiceError> {
        self.command(
            "change_volume",
            json!({ "output_id": output_id, "how": "relative", "value": value }),
        )
        .await
    }

    /// Adjust an output's volume by one device-defined step.
    pub async fn step_volume(&self, output_id: &str, value: f64) -> Result<(), ServiceError> {
        self.command(
            "change_volume",
            json!({ "output_id": output_id, "how": "relative_step", "value": value }),
        )
        .await
    }

    /// Mute a single output.
    pub async fn mute(&self, output_id: &str) -> Result<(), ServiceError> {
        self.command("mute", json!({ "output_id": output_id, "how": "mute" })).await
    }

    /// Unmute a single output.
    pub async fn unmute(&self, output_id: &str) -> Result<(), ServiceError> {
        self.command("mute", json!({ "output_id": output_id, "how": "unmute" })).await
    }

    /// Mute every output.
    pub async fn mute_all(&self) -> Result<(), ServiceError> {
        self.command("mute_all", json!({ "how": "mute" })).await
    }

    /// Unmute every output.
    pub async fn unmute_all(&self) -> Result<(), ServiceError> {
        self.command("mute_all", json!({ "how": "unmute" })).await
    }

    /// Pause every zone.
    pub async fn pause_all(&self) -> Result<(), ServiceError> {
        self.command("pause_all", json!({})).await
    }

    /// Seek to an absolute position, in seconds.
    pub async fn seek(&self, zone_or_output_id: Option<&str>, seconds: f64) -> Result<(), ServiceError> {
        let target = self.resolve_target(zone_or_output_id)?;
        self.command(
            "seek",
            json!({ "zone_or_output_id": target, "how": "absolute", "seconds": seconds }),
        )
        .await
    }

    /// Seek by a relative offset, in seconds.
    pub async fn seek_relative(&self, zone_or_output_id: Option<&str>, seconds: f64) -> Result<(), ServiceError> {
        let target = self.resolve_target(zone_or_output_id)?;
        self.command(
            "seek",
            json!({ "zone_or_output_id": target, "how": "relative", "seconds": seconds }),
        )
        .await
    }

    async fn change_settings(&self, zone_or_output_id: Option<&str>, settings: Value) -> Result<(), ServiceError> {
        let target = self.resolve_target(zone_or_output_id)?;
        let mut body = settings;
        body["zone_or_output_id"] = json!(target);
        self.command("change_settings", body).await
    }

    /// Enable or disable shuffle.
    pub async fn set_shuffle(&self, zone_or_output_id: Option<&str>, shuffle: bool) -> Result<(), ServiceError> {
        self.change_settings(zone_or_output_id, json!({ "shuffle": shuffle })).await
    }

    /// Set the loop mode: `disabled`, `loop`, `loop_one`, or `next`.
    pub async fn set_loop(&self, zone_or_output_id: Option<&str>, mode: &str) -> Result<(), ServiceError> {
        self.change_settings(zone_or_output_id, json!({ "loop": mode })).await
    }

    /// Advance the loop mode to its next value.
    pub async fn cycle_loop(&self, zone_or_output_id: Option<&str>) -> Result<(), ServiceError> {
        self.change_settings(zone_or_output_id, json!({ "loop": "next" })).await
    }

    /// Enable or disable Roon Radio.
    pub async fn set_auto_radio(&self, zone_or_output_id: Option<&str>, auto_radio: bool) -> Result<(), ServiceError> {
        self.change_settings(zone_or_output_id, json!({ "auto_radio": auto_radio }))
            .await
    }

    /// Put an output into standby.
    pub async fn standby(&self, output_id: &str, control_key: Option<&str>) -> Result<(), ServiceError> {
        let mut body = json!({ "output_id": output_id });
        if let Some(key) = control_key {
            body["control_key"] = json!(key);
        }
        self.command("standby", body).await
    }

    /// Toggle an output's standby state.
    pub async fn toggle_standby(&self, output_id: &str, control_key: Option<&str>) -> Result<(), ServiceError> {
        let mut body = json!({ "output_id": output_id });
        if let Some(key) = control_key {
            body["control_key"] = json!(key);
        }
        self.command("toggle_standby", body).await
    }

    /// Fire an output's convenience switch.
    pub async fn convenience_switch(&self, output_id: &str, control_key: Option<&str>) -> Result<(), ServiceError> {
        let mut body = json!({ "output_id": output_id });
        if let Some(key) = control_key {
            body["control_key"] = json!(key);
        }
        self.command("convenience_switch", body).await
    }

    /// Move playback state from one zone or output to another.
    pub async fn transfer_zone(&self, from: &str, to: &str) -> Result<(), ServiceError> {
        self.command(
            "transfer_zone",
            json!({ "from_zone_or_output_id": from, "to_zone_or_output_id": to }),
        )
        .await
    }

    /// Group several outputs into a single zone.
    pub async fn group_outputs(&self, output_ids: &[String]) -> Result<(), ServiceError> {
        self.command("group_outputs", json!({ "output_ids": output_ids })).await
    }

    /// Remove an output from its group.
    pub async fn ungroup_outputs(&self, output_ids: &[String]) -> Result<(), ServiceError> {
        self.command("ungroup_outputs", json!({ "output_ids": output_ids })).await
    }

    /// Start playback in a zone from a specific queue entry.
    pub async fn play_from_here(&self, zone_or_output_id: &str, queue_item_id: i64) -> Result<(), ServiceError> {
        self.command(
            "play_from_here",
            json!({ "zone_or_output_id": zone_or_output_id, "queue_item_id": queue_item_id }),
        )
        .await
    }
}
