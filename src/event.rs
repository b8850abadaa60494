//! The unit of data exchanged between modules
//!
//! An [`Event`] is a mutable record built around one nested string-keyed
//! mapping. The reserved top-level keys (`timestamp`, `version`, `data`,
//! `tmp`, `errors`, `ttl`, `uuid`) are always present; everything below them
//! is addressed with dotted paths (`a.b.c`) which create intermediate
//! mappings on write. A [`Bulk`] is a bounded batch of events sharing a
//! delimiter. Queues carry an [`Envelope`], which is either of the two.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::domain::{EventTtl, SyslogLevel};
use crate::error::{Result, WishboneError};

/// Top-level keys whose root may never be deleted.
pub const EVENT_RESERVED: [&str; 7] = [
    "timestamp",
    "version",
    "data",
    "tmp",
    "errors",
    "ttl",
    "uuid",
];

/// Seconds since epoch as a float, the timestamp granularity events carry.
pub fn now_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// The Wishbone event object representation.
///
/// Holds the event data being passed from one module to the other, plus the
/// optional confirmation barrier released when every module named in
/// `confirmation_modules` has finished consuming the event.
#[derive(Debug, Clone)]
pub struct Event {
    map: Map<String, Value>,
    confirmation_modules: HashSet<String>,
    confirm: Option<Arc<Notify>>,
}

impl Event {
    /// Creates a new event wrapping `data` under the `data` key.
    pub fn new(data: Value) -> Self {
        let mut map = Map::new();
        map.insert("timestamp".into(), now_timestamp().into());
        map.insert("version".into(), 1.into());
        map.insert("data".into(), data);
        map.insert("tmp".into(), Value::Object(Map::new()));
        map.insert("errors".into(), Value::Object(Map::new()));
        map.insert("ttl".into(), EventTtl::DEFAULT.into());
        map.insert("uuid".into(), Uuid::new_v4().to_string().into());

        Self {
            map,
            confirmation_modules: HashSet::new(),
            confirm: None,
        }
    }

    /// Overrides the hop budget.
    pub fn with_ttl(mut self, ttl: EventTtl) -> Self {
        self.map.insert("ttl".into(), ttl.into_inner().into());
        self
    }

    /// Attaches a confirmation set. The waiter returned by [`Event::confirmed`]
    /// is released once [`Event::confirm`] fires.
    pub fn with_confirmation(mut self, modules: HashSet<String>) -> Self {
        if !modules.is_empty() {
            self.confirmation_modules = modules;
            self.confirm = Some(Arc::new(Notify::new()));
        }
        self
    }

    /// Builds an event from a complete dumped mapping, validating its shape.
    pub fn from_value(data: Value) -> Result<Self> {
        let mut event = Self::new(Value::Null);
        event.slurp(data)?;
        Ok(event)
    }

    /// Modules whose consumption completion releases the confirmation waiter.
    pub fn confirmation_modules(&self) -> &HashSet<String> {
        &self.confirmation_modules
    }

    /// Releases the confirmation waiter. A no-op without a confirmation set.
    ///
    /// `Notify` stores the permit, so confirming before anyone waits does not
    /// lose the wake-up.
    pub fn confirm(&self) {
        if let Some(notify) = &self.confirm {
            notify.notify_one();
        }
    }

    /// Waits until some consumer called [`Event::confirm`]. Returns
    /// immediately when the event carries no confirmation set.
    pub async fn confirmed(&self) {
        if let Some(notify) = &self.confirm {
            notify.notified().await;
        }
    }

    /// The event's uuid, if it carries one.
    pub fn uuid(&self) -> Option<String> {
        match self.map.get("uuid") {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// The remaining hop budget.
    pub fn ttl(&self) -> u64 {
        self.map.get("ttl").and_then(Value::as_u64).unwrap_or(0)
    }

    /// Burns one hop. Fails with [`WishboneError::TtlExpired`] when the
    /// budget was already exhausted.
    pub fn decrement_ttl(&mut self) -> Result<()> {
        let ttl = self.ttl();
        if ttl == 0 {
            return Err(WishboneError::TtlExpired);
        }
        self.map.insert("ttl".into(), (ttl - 1).into());
        Ok(())
    }

    /// Returns the value of `key`. An empty key or `"."` returns the whole
    /// mapping.
    pub fn get(&self, key: &str) -> Result<Value> {
        if key.is_empty() || key == "." {
            return Ok(Value::Object(self.map.clone()));
        }
        let segments: Vec<&str> = key.split('.').collect();
        let mut cursor = &self.map;
        for (i, segment) in segments.iter().enumerate() {
            let value = cursor
                .get(*segment)
                .ok_or_else(|| WishboneError::KeyMissing(key.to_string()))?;
            if i == segments.len() - 1 {
                return Ok(value.clone());
            }
            cursor = value
                .as_object()
                .ok_or_else(|| WishboneError::KeyMissing(key.to_string()))?;
        }
        Err(WishboneError::KeyMissing(key.to_string()))
    }

    /// Whether the event has `key`.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_ok()
    }

    /// Sets `key` to `value`, creating intermediate mappings on the way down.
    /// Sibling keys of existing mappings along the path survive.
    pub fn set(&mut self, value: Value, key: &str) {
        let mut nested = value;
        for segment in key.split('.').rev() {
            let mut wrap = Map::new();
            wrap.insert(segment.to_string(), nested);
            nested = Value::Object(wrap);
        }
        if let Value::Object(update) = nested {
            merge_maps(&mut self.map, update);
        }
    }

    /// Copies the value under `source` to `destination`.
    pub fn copy(&mut self, source: &str, destination: &str) -> Result<()> {
        let value = self.get(source)?;
        self.set(value, destination);
        Ok(())
    }

    /// Deletes `key`. Roots of reserved keys are refused.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let segments: Vec<&str> = key.split('.').collect();
        if segments.len() == 1 && EVENT_RESERVED.contains(&segments[0]) {
            return Err(WishboneError::ReservedKey(key.to_string()));
        }
        if segments.len() == 1 {
            self.map
                .remove(segments[0])
                .ok_or_else(|| WishboneError::KeyMissing(key.to_string()))?;
            return Ok(());
        }
        let parent_path = segments[..segments.len() - 1].join(".");
        let leaf = segments[segments.len() - 1];
        let mut parent = match self.get(&parent_path)? {
            Value::Object(map) => map,
            _ => return Err(WishboneError::KeyMissing(key.to_string())),
        };
        parent
            .remove(leaf)
            .ok_or_else(|| WishboneError::KeyMissing(key.to_string()))?;
        // Replace rather than merge so the removal sticks.
        self.replace_path(&parent_path, Value::Object(parent));
        Ok(())
    }

    fn replace_path(&mut self, key: &str, value: Value) {
        let segments: Vec<&str> = key.split('.').collect();
        let mut cursor = &mut self.map;
        for (i, segment) in segments.iter().enumerate() {
            if i == segments.len() - 1 {
                cursor.insert(segment.to_string(), value);
                return;
            }
            let entry = cursor
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            cursor = entry.as_object_mut().expect("object ensured above");
        }
    }

    /// Dumps the content of the event. `tmp` and `errors` are omitted unless
    /// `complete` is set.
    pub fn dump(&self, complete: bool) -> Value {
        let mut out = Map::new();
        for (key, value) in &self.map {
            if !complete && (key == "tmp" || key == "errors") {
                continue;
            }
            out.insert(key.clone(), value.clone());
        }
        Value::Object(out)
    }

    /// Aligns this event to a complete dumped mapping, re-stamping the
    /// timestamp to now.
    pub fn slurp(&mut self, data: Value) -> Result<()> {
        let map = match data {
            Value::Object(map) => map,
            other => {
                return Err(WishboneError::InvalidEventFormat(format!(
                    "expected a mapping, got {other}"
                )))
            }
        };
        let checks: [(&str, fn(&Value) -> bool); 6] = [
            ("timestamp", Value::is_number),
            ("version", Value::is_number),
            ("data", |_| true),
            ("tmp", Value::is_object),
            ("errors", Value::is_object),
            ("ttl", Value::is_u64),
        ];
        for (field, valid) in checks {
            let value = map.get(field).ok_or_else(|| {
                WishboneError::InvalidEventFormat(format!("{field} is missing"))
            })?;
            if !valid(value) {
                return Err(WishboneError::InvalidEventFormat(format!(
                    "{field} type is not valid"
                )));
            }
        }
        self.map = map;
        self.map.insert("timestamp".into(), now_timestamp().into());
        Ok(())
    }
}

/// Recursive map merge; nested mappings merge key-wise, anything else is
/// replaced.
fn merge_maps(target: &mut Map<String, Value>, update: Map<String, Value>) {
    for (key, value) in update {
        match target.entry(key) {
            serde_json::map::Entry::Occupied(mut slot) => match (slot.get_mut(), value) {
                (Value::Object(existing), Value::Object(incoming)) => {
                    merge_maps(existing, incoming);
                }
                (slot_value, value) => *slot_value = value,
            },
            serde_json::map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
        }
    }
}

/// A bounded ordered batch of events with a text delimiter.
#[derive(Debug, Clone)]
pub struct Bulk {
    events: Vec<Event>,
    max_size: Option<usize>,
    delimiter: String,
    error: Option<(String, String)>,
}

impl Default for Bulk {
    fn default() -> Self {
        Self::new(None, "\n")
    }
}

impl Bulk {
    /// Creates a bulk holding at most `max_size` events (unbounded when
    /// `None`), joined by `delimiter` on string dumps.
    pub fn new(max_size: Option<usize>, delimiter: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            max_size,
            delimiter: delimiter.into(),
            error: None,
        }
    }

    /// Appends an event. Fails with [`WishboneError::BulkFull`] once the
    /// maximum size is reached.
    pub fn append(&mut self, event: Event) -> Result<()> {
        if let Some(max) = self.max_size {
            if self.events.len() >= max {
                return Err(WishboneError::BulkFull(max));
            }
        }
        self.events.push(event);
        Ok(())
    }

    /// Iterates over the contained events in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// The number of contained events.
    pub fn size(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Collects `field` of each contained event; events missing the field are
    /// skipped.
    pub fn dump_field_as_list(&self, field: &str) -> Vec<Value> {
        self.events
            .iter()
            .filter_map(|event| event.get(field).ok())
            .collect()
    }

    /// Joins `field` of each contained event with the bulk delimiter; events
    /// missing the field are skipped.
    pub fn dump_field_as_string(&self, field: &str) -> String {
        let parts: Vec<String> = self
            .events
            .iter()
            .filter_map(|event| event.get(field).ok())
            .map(|value| match value {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        parts.join(&self.delimiter)
    }

    /// Attaches the failure that diverted this bulk to the `failed` queue.
    pub fn set_error(&mut self, kind: String, reason: String) {
        self.error = Some((kind, reason));
    }

    pub fn error(&self) -> Option<&(String, String)> {
        self.error.as_ref()
    }
}

/// What actually travels through a queue: a single event or a bulk of them.
#[derive(Debug, Clone)]
pub enum Envelope {
    Event(Event),
    Bulk(Bulk),
}

impl Envelope {
    /// Burns one hop on a single event; bulks carry no hop budget.
    pub fn decrement_ttl(&mut self) -> Result<()> {
        match self {
            Self::Event(event) => event.decrement_ttl(),
            Self::Bulk(_) => Ok(()),
        }
    }

    /// Records a consumer failure: on events under `errors.<module>`, on
    /// bulks in the bulk error slot.
    pub fn record_error(&mut self, module: &str, error: &WishboneError) {
        match self {
            Self::Event(event) => {
                let info = Value::Array(vec![
                    error.kind().into(),
                    error.to_string().into(),
                ]);
                event.set(info, &format!("errors.{module}"));
            }
            Self::Bulk(bulk) => {
                bulk.set_error(error.kind().to_string(), error.to_string());
            }
        }
    }

    /// Releases the confirmation waiter of every contained event that names
    /// `module` in its confirmation set.
    pub fn confirm_for(&self, module: &str) {
        match self {
            Self::Event(event) => {
                if event.confirmation_modules().contains(module) {
                    event.confirm();
                }
            }
            Self::Bulk(bulk) => {
                for event in bulk.iter() {
                    if event.confirmation_modules().contains(module) {
                        event.confirm();
                    }
                }
            }
        }
    }

    /// The uuid used in log lines about this envelope.
    pub fn uuid(&self) -> Option<String> {
        match self {
            Self::Event(event) => event.uuid(),
            Self::Bulk(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            Self::Bulk(_) => None,
        }
    }

    pub fn as_event_mut(&mut self) -> Option<&mut Event> {
        match self {
            Self::Event(event) => Some(event),
            Self::Bulk(_) => None,
        }
    }
}

impl From<Event> for Envelope {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

impl From<Bulk> for Envelope {
    fn from(bulk: Bulk) -> Self {
        Self::Bulk(bulk)
    }
}

/// One sampled queue statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub time: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub tags: Vec<String>,
}

impl Metric {
    /// The mapping form carried as event data on the `metrics` queue.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("metric serializes")
    }
}

/// One structured log record, carried as event data on the `logs` queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub time: f64,
    pub level: SyslogLevel,
    pub pid: u32,
    pub module: String,
    pub message: String,
}

impl Log {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("log serializes")
    }

    /// Parses a log record back out of event data.
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|err| WishboneError::InvalidData(format!("not a log record: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_event_has_reserved_keys() {
        let event = Event::new(json!("test"));
        for key in ["timestamp", "version", "data", "tmp", "errors", "ttl", "uuid"] {
            assert!(event.has(key), "missing {key}");
        }
        assert_eq!(event.get("data").unwrap(), json!("test"));
        assert_eq!(event.ttl(), 254);
    }

    #[test]
    fn dotted_set_creates_intermediates() {
        let mut event = Event::new(Value::Null);
        event.set(json!(1), "tmp.one.two.three");
        assert_eq!(event.get("tmp.one.two.three").unwrap(), json!(1));

        event.set(json!(2), "tmp.one.sibling");
        assert_eq!(event.get("tmp.one.two.three").unwrap(), json!(1));
        assert_eq!(event.get("tmp.one.sibling").unwrap(), json!(2));
    }

    #[test]
    fn delete_reserved_root_fails() {
        let mut event = Event::new(Value::Null);
        for key in EVENT_RESERVED {
            assert!(event.delete(key).is_err(), "{key} deletable");
        }
        event.set(json!("x"), "tmp.scratch");
        event.delete("tmp.scratch").unwrap();
        assert!(!event.has("tmp.scratch"));
        assert!(event.has("tmp"));
    }

    #[test]
    fn ttl_decrements_then_expires() {
        let mut event = Event::new(Value::Null).with_ttl(EventTtl::new(2));
        event.decrement_ttl().unwrap();
        event.decrement_ttl().unwrap();
        assert_eq!(event.ttl(), 0);
        assert!(matches!(
            event.decrement_ttl(),
            Err(WishboneError::TtlExpired)
        ));
    }

    #[test]
    fn slurp_restamps_timestamp() {
        let event = Event::new(json!({"a": 1}));
        let mut dump = event.dump(true);
        dump["timestamp"] = json!(1.0);

        let slurped = Event::from_value(dump).unwrap();
        assert_eq!(slurped.get("data").unwrap(), json!({"a": 1}));
        assert!(slurped.get("timestamp").unwrap().as_f64().unwrap() > 1.0);
    }

    #[test]
    fn slurp_rejects_bad_shapes() {
        assert!(Event::from_value(json!("nope")).is_err());
        assert!(Event::from_value(json!({"data": 1})).is_err());
        let mut dump = Event::new(Value::Null).dump(true);
        dump["ttl"] = json!("many");
        assert!(Event::from_value(dump).is_err());
    }

    #[test]
    fn dump_hides_scratch_unless_complete() {
        let mut event = Event::new(Value::Null);
        event.set(json!(1), "tmp.x");
        assert!(event.dump(false).get("tmp").is_none());
        assert!(event.dump(true).get("tmp").is_some());
    }

    #[test]
    fn bulk_bounds_and_flatten() {
        let mut bulk = Bulk::new(Some(2), ",");
        bulk.append(Event::new(json!("a"))).unwrap();
        bulk.append(Event::new(json!("b"))).unwrap();
        assert!(matches!(
            bulk.append(Event::new(json!("c"))),
            Err(WishboneError::BulkFull(2))
        ));
        assert_eq!(bulk.dump_field_as_string("data"), "a,b");
        assert_eq!(bulk.dump_field_as_list("data").len(), 2);
    }

    #[tokio::test]
    async fn confirm_before_wait_does_not_block() {
        let modules: HashSet<String> = ["sink".to_string()].into();
        let event = Event::new(Value::Null).with_confirmation(modules);
        event.confirm();
        event.confirmed().await;
    }
}
