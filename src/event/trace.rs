//! NDJSON Trace Writer
//!
//! Writes run events to newline-delimited JSON files under `.kiln/traces/`
//! for debugging and `kiln trace show`.

use crate::error::{KilnError, Result};
use crate::event::{Event, EventLog};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// Directory for trace files
pub const TRACE_DIR: &str = ".kiln/traces";

/// NDJSON trace writer
pub struct TraceWriter {
    writer: Arc<Mutex<BufWriter<File>>>,
    path: PathBuf,
}

/// Only alphanumerics, `-` and `_` (run ids become file names)
fn validate_run_id(run_id: &str) -> Result<()> {
    if run_id.is_empty()
        || !run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(KilnError::ValidationError {
            reason: format!(
                "Invalid run_id: must be alphanumeric with hyphens/underscores only, got: {}",
                run_id
            ),
        });
    }
    Ok(())
}

impl TraceWriter {
    /// Create a trace file for a run in the default trace directory
    pub fn new(run_id: &str) -> Result<Self> {
        Self::in_dir(Path::new(TRACE_DIR), run_id)
    }

    /// Create a trace file for a run in `dir`
    ///
    /// The run_id is validated to prevent path traversal.
    pub fn in_dir(dir: &Path, run_id: &str) -> Result<Self> {
        validate_run_id(run_id)?;
        fs::create_dir_all(dir)?;

        let path = dir.join(format!("{}.ndjson", run_id));
        let file = File::create(&path)?;
        let writer = BufWriter::new(file);

        tracing::info!(path = %path.display(), "Created trace file");

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            path,
        })
    }

    /// Write a single event to the trace file
    pub fn write_event(&self, event: &Event) -> Result<()> {
        let json = serde_json::to_string(event)?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Write all events from an EventLog
    pub fn write_all(&self, event_log: &EventLog) -> Result<()> {
        event_log.with_events(|events| events.iter().try_for_each(|e| self.write_event(e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered events
    pub fn close(&self) -> Result<()> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

/// Generate a unique run ID
///
/// Format: `YYYY-MM-DDTHH-MM-SS-XXXX` where XXXX is random hex
pub fn generate_run_id() -> String {
    use chrono::Utc;

    let now = Utc::now();
    let timestamp = now.format("%Y-%m-%dT%H-%M-%S");
    let random: u32 = rand::random::<u32>() % 0x10000;

    format!("{}-{:04x}", timestamp, random)
}

/// Hash of the IR document
///
/// Uses xxh3 (fast, non-cryptographic).
/// Format: `xxh3:XXXXXXXXXXXXXXXX` (16 hex chars)
pub fn calculate_pipeline_hash(source: &str) -> String {
    use xxhash_rust::xxh3::xxh3_64;

    let hash = xxh3_64(source.as_bytes());
    format!("xxh3:{:016x}", hash)
}

/// List trace files in the default trace directory
pub fn list_traces() -> Result<Vec<TraceInfo>> {
    list_traces_in(Path::new(TRACE_DIR))
}

/// List trace files in `dir`, newest first
pub fn list_traces_in(trace_dir: &Path) -> Result<Vec<TraceInfo>> {
    if !trace_dir.exists() {
        return Ok(vec![]);
    }

    let mut traces = Vec::new();

    for entry in fs::read_dir(trace_dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.extension().map(|e| e == "ndjson").unwrap_or(false) {
            let metadata = entry.metadata()?;
            let run_id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();

            traces.push(TraceInfo {
                run_id,
                path,
                size_bytes: metadata.len(),
                modified: metadata.modified().ok(),
            });
        }
    }

    traces.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.run_id.cmp(&a.run_id)));

    Ok(traces)
}

/// Read back every event of a trace
pub fn read_trace(trace_dir: &Path, run_id: &str) -> Result<Vec<Event>> {
    validate_run_id(run_id)?;
    let path = trace_dir.join(format!("{}.ndjson", run_id));
    let file = File::open(&path)?;

    let mut events = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}

/// Information about a trace file
#[derive(Debug)]
pub struct TraceInfo {
    pub run_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<std::time::SystemTime>,
}
