use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::campaign::CampaignId;

pub type EventPayload = Map<String, Value>;

const RESERVED_KEYS: [&str; 3] = ["type", "campaign_id", "ts"];

/// Append-only `events.jsonl` log shared by every thread of a session.
///
/// - each line is one compact JSON object
/// - `type`, `campaign_id` and `ts` are always set by the log itself;
///   payload keys with those names are dropped
/// - a log built with [`EventLog::disabled`] accepts events and writes nothing
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    sink: Option<Arc<EventSink>>,
}

#[derive(Debug)]
struct EventSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            sink: Some(Arc::new(EventSink {
                path: path.into(),
                lock: Mutex::new(()),
            })),
        }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.sink.as_deref().map(|sink| sink.path.as_path())
    }

    pub fn emit(
        &self,
        event_type: &str,
        campaign_id: Option<CampaignId>,
        payload: EventPayload,
    ) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "campaign_id".to_string(),
            campaign_id
                .map(|id| Value::String(id.to_string()))
                .unwrap_or(Value::Null),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            event.insert(key, value);
        }
        let event = Value::Object(event);

        let Some(sink) = self.sink.as_deref() else {
            return Ok(event);
        };
        if let Some(parent) = sink.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(&event)?;
        let _guard = sink
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&sink.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(event)
    }
}

/// Builds an [`EventPayload`] from a `json!` object literal.
pub fn payload(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => EventPayload::new(),
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
