use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// Everything the tint pipeline reports about a run, one record per
/// event. Chain runs emit the `Chain*`/`Step*` events, single-pass runs
/// the `Tint*` ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    ChainStarted {
        provider: String,
        regions: usize,
    },
    StepStarted {
        step: usize,
        label: String,
    },
    StepCompleted {
        step: usize,
        label: String,
    },
    StepFailed {
        step: usize,
        label: String,
        kind: String,
        error: String,
    },
    /// A step not attempted, or whose in-flight result was discarded,
    /// because the run was cancelled.
    StepSkipped {
        step: usize,
        label: String,
    },
    ChainCompleted {
        applied: usize,
        failed: usize,
        skipped: usize,
    },
    TintStarted {
        provider: String,
        size: String,
    },
    TintCompleted {
        bytes: usize,
    },
    TintFailed {
        kind: String,
        error: String,
    },
}

/// Append-only writer for the pipeline's `events.jsonl`.
///
/// Every line is one compact JSON object: the event's own fields plus
/// `pipeline_id` and an RFC3339 `ts` stamped at write time.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    pipeline_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, pipeline_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                pipeline_id: pipeline_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn pipeline_id(&self) -> &str {
        &self.inner.pipeline_id
    }

    pub fn emit(&self, event: &PipelineEvent) -> anyhow::Result<Value> {
        let mut record = match serde_json::to_value(event)? {
            Value::Object(map) => map,
            other => anyhow::bail!("pipeline event serialized to non-object: {other}"),
        };
        record.insert(
            "pipeline_id".to_string(),
            Value::String(self.inner.pipeline_id.clone()),
        );
        record.insert("ts".to_string(), Value::String(now_utc_iso()));

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&record)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(record))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
